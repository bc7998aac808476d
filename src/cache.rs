//! Where local providers keep model files.
//!
//! Each model gets `<root>/<provider>/<sanitized model id>`, where the root is
//! `$UNI_NLP_CACHE_DIR` or `.uni_nlp_cache` in the working directory. An alias
//! can point elsewhere with `cache_dir` (Candle downloads) or `model_dir`
//! (exported ONNX models).

use serde_json::Value;
use std::path::PathBuf;

/// Overrides the cache root for every model.
pub const CACHE_ROOT_ENV: &str = "UNI_NLP_CACHE_DIR";

const DEFAULT_CACHE_ROOT: &str = ".uni_nlp_cache";

/// Directory-safe form of a model id: `/` becomes `--`, anything outside
/// `[A-Za-z0-9._-]` is dropped.
pub fn sanitize_model_name(model_id: &str) -> String {
    model_id
        .replace('/', "--")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

fn cache_root() -> PathBuf {
    std::env::var_os(CACHE_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT))
}

fn resolve(provider: &str, model_id: &str, options: &Value, override_key: &str) -> PathBuf {
    match options.get(override_key).and_then(Value::as_str) {
        Some(dir) => PathBuf::from(dir),
        None => cache_root()
            .join(provider)
            .join(sanitize_model_name(model_id)),
    }
}

/// Download directory of a model; `options.cache_dir` wins.
pub fn resolve_cache_dir(provider: &str, model_id: &str, options: &Value) -> PathBuf {
    resolve(provider, model_id, options, "cache_dir")
}

/// Directory of an exported model (`model.onnx`, `tokenizer.json`,
/// `config.json`); `options.model_dir` wins.
pub fn resolve_model_dir(provider: &str, model_id: &str, options: &Value) -> PathBuf {
    resolve(provider, model_id, options, "model_dir")
}
