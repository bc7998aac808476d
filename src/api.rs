//! Catalog types: what a model alias is, how it is keyed once loaded, and
//! how catalogs are read from JSON.

use crate::error::{Result, RuntimeError};
use crate::reliability::CircuitBreakerConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// What a model is loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTask {
    /// Per-token BIO tagging.
    Ner,
    /// Premise/hypothesis entailment, used for zero-shot labels.
    ZeroShot,
}

impl ModelTask {
    /// Name used in catalogs and as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ner => "ner",
            Self::ZeroShot => "zero_shot",
        }
    }
}

impl fmt::Display for ModelTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a provider or an alias is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WarmupPolicy {
    /// During [`build`](crate::runtime::ModelRuntimeBuilder::build), which
    /// waits for it.
    Eager,
    /// On first use.
    #[default]
    Lazy,
    /// In a task spawned by `build`; early callers wait on the same load.
    Background,
}

impl fmt::Display for WarmupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eager => "eager",
            Self::Lazy => "lazy",
            Self::Background => "background",
        })
    }
}

/// One catalog entry: an alias such as `"ner/default"` bound to a provider,
/// a model and its load and inference settings.
///
/// ```json
/// {
///   "alias": "zero_shot/default",
///   "task": "zero_shot",
///   "provider_id": "local/candle",
///   "model_id": "cross-encoder/nli-MiniLM2-L6-H768",
///   "warmup": "eager",
///   "options": { "entailment_index": 1 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAliasSpec {
    /// `task/name`.
    pub alias: String,
    pub task: ModelTask,
    /// `local/candle` or `local/onnx`.
    pub provider_id: String,
    /// Hub repository for Candle; a display name for ONNX, whose files come
    /// from the `model_dir` option.
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default)]
    pub warmup: WarmupPolicy,
    /// A failed eager load of a required alias fails runtime startup.
    #[serde(default)]
    pub required: bool,
    /// Per-call inference timeout, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Load timeout, seconds; 600 when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Provider options, checked against the provider's allowed keys when
    /// the runtime is built.
    #[serde(default)]
    pub options: Value,
}

/// Retries of transient inference failures with doubling backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts in total, the first call included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl RetryConfig {
    /// Delay before 1-based `attempt`: `initial_backoff_ms * 2^(attempt - 1)`,
    /// saturating.
    pub fn get_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
        }
    }
}

/// Identity of a loaded model. Aliases with equal keys share one instance;
/// the alias itself and the inference settings are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRuntimeKey {
    pub task: ModelTask,
    pub provider_id: String,
    pub model_id: String,
    pub revision: Option<String>,
    /// Options in canonical JSON form.
    pub options: String,
}

impl ModelRuntimeKey {
    pub fn new(spec: &ModelAliasSpec) -> Self {
        Self {
            task: spec.task,
            provider_id: spec.provider_id.clone(),
            model_id: spec.model_id.clone(),
            revision: spec.revision.clone(),
            options: canonical_json(&spec.options),
        }
    }
}

/// Compact JSON with object keys sorted at every level, so documents that
/// differ only in key order render identically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(k, _)| *k);
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl ModelAliasSpec {
    /// Alias shape and the numeric settings that would make the alias
    /// unusable.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RuntimeError::Config(msg));

        if self.alias.is_empty() {
            return invalid("Alias cannot be empty".to_string());
        }
        if !self.alias.contains('/') {
            return invalid(format!(
                "Alias '{}' must be in 'task/name' format",
                self.alias
            ));
        }
        if self.timeout == Some(0) {
            return invalid("Inference timeout must be greater than 0".to_string());
        }
        if self.load_timeout == Some(0) {
            return invalid("Load timeout must be greater than 0".to_string());
        }
        if self.retry.as_ref().is_some_and(|r| r.max_attempts == 0) {
            return invalid(format!(
                "Retry max_attempts for alias '{}' must be at least 1",
                self.alias
            ));
        }
        if self
            .circuit_breaker
            .as_ref()
            .is_some_and(|b| b.failure_threshold == 0)
        {
            return invalid(format!(
                "Circuit breaker failure_threshold for alias '{}' must be at least 1",
                self.alias
            ));
        }
        Ok(())
    }

    pub fn from_json(value: Value) -> Result<Self> {
        let spec: Self = parse(serde_json::from_value(value), "ModelAliasSpec")?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let spec: Self = parse(serde_json::from_str(s), "ModelAliasSpec")?;
        spec.validate()?;
        Ok(spec)
    }
}

fn parse<T: DeserializeOwned>(parsed: serde_json::Result<T>, what: &str) -> Result<T> {
    parsed.map_err(|e| RuntimeError::Config(format!("Invalid {} JSON: {}", what, e)))
}

/// Parse and validate a JSON array of alias specs.
pub fn catalog_from_str(s: &str) -> Result<Vec<ModelAliasSpec>> {
    let specs: Vec<ModelAliasSpec> = parse(serde_json::from_str(s), "catalog")?;
    specs.iter().try_for_each(ModelAliasSpec::validate)?;
    Ok(specs)
}

pub fn catalog_from_file(path: impl AsRef<Path>) -> Result<Vec<ModelAliasSpec>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        RuntimeError::Config(format!(
            "Failed to read catalog file '{}': {}",
            path.display(),
            e
        ))
    })?;
    catalog_from_str(&contents)
}
