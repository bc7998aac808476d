//! Provider implementations for local model backends.
//!
//! Each sub-module is gated behind a Cargo feature flag. Only providers whose
//! features are enabled will be compiled.
//!
//! | Module | Feature | Engine |
//! |--------|---------|--------|
//! | `candle` | `provider-candle` | [Candle](https://github.com/huggingface/candle), weights from HuggingFace Hub |
//! | `onnx` | `provider-onnx` | [ONNX Runtime](https://onnxruntime.ai) via `ort`, exported models on disk |
//!
//! Both serve the `ner` and `zero_shot` tasks.

#[cfg(any(feature = "provider-candle", feature = "provider-onnx"))]
pub(crate) mod common;

#[cfg(feature = "provider-candle")]
pub mod candle;

#[cfg(feature = "provider-onnx")]
pub mod onnx;

// Re-exports (same order as module declarations above).
#[cfg(feature = "provider-candle")]
pub use candle::LocalCandleProvider;

#[cfg(feature = "provider-onnx")]
pub use onnx::LocalOnnxProvider;
