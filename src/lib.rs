//! Named-entity recognition and zero-shot classification over local
//! transformer models.
//!
//! Uni-NLP turns raw token-classification and NLI logits into application
//! results: BIO decoding into character-offset entities, adjacency
//! aggregation, offset-correct chunking of long documents, grouping of
//! repeated mentions, and entailment-based zero-shot label scores. Models run
//! locally through Candle or ONNX Runtime behind a provider-agnostic runtime.
//!
//! # Key concepts
//!
//! - **[`ModelRuntime`](runtime::ModelRuntime)**: owns providers and a catalog
//!   of model aliases, loads each distinct model once and hands out
//!   instrumented handles.
//! - **[`ModelAliasSpec`](api::ModelAliasSpec)**: maps an alias such as
//!   `"ner/default"` to a provider and model.
//! - **Traits**: [`TokenClassifierModel`](traits::TokenClassifierModel) and
//!   [`EntailmentModel`](traits::EntailmentModel) are what providers return.
//! - **Pipelines**: [`ner::analyze`] and [`zero_shot::classify`] are pure
//!   functions of the text and those traits.
//! - **[`AnalysisService`](service::AnalysisService)**: validation, result
//!   caching and engine failover in front of both pipelines; the `server`
//!   feature exposes it over HTTP.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use uni_nlp::api::{ModelAliasSpec, ModelTask};
//! use uni_nlp::ner::{self, NerOptions};
//! use uni_nlp::runtime::ModelRuntime;
//! # #[cfg(feature = "provider-candle")]
//! use uni_nlp::provider::candle::LocalCandleProvider;
//!
//! # #[cfg(feature = "provider-candle")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = ModelAliasSpec {
//!     alias: "ner/local".into(),
//!     task: ModelTask::Ner,
//!     provider_id: "local/candle".into(),
//!     model_id: "dslim/bert-base-NER".into(),
//!     revision: None,
//!     warmup: Default::default(),
//!     required: true,
//!     timeout: None,
//!     load_timeout: None,
//!     retry: None,
//!     circuit_breaker: None,
//!     options: serde_json::Value::Null,
//! };
//!
//! let runtime = ModelRuntime::builder()
//!     .register_provider(LocalCandleProvider::new())
//!     .catalog(vec![spec])
//!     .build()
//!     .await?;
//!
//! let model = runtime.token_classifier("ner/local").await?;
//! let analysis = ner::analyze(
//!     model.as_ref(),
//!     "Ada Lovelace worked with Charles Babbage in London.",
//!     &NerOptions::default(),
//! )
//! .await?;
//! for entity in &analysis.entities {
//!     println!("{} [{}] {}..{}", entity.entity, entity.entity_type, entity.start, entity.end);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod labels;
pub mod ner;
mod options_validation;
pub mod provider;
pub mod reliability;
pub mod result_cache;
pub mod runtime;
pub mod scoring;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod traits;
pub mod zero_shot;

#[cfg(test)]
mod mock;
