//! Service and server configuration.
//!
//! Both structs deserialize from JSON with every field optional, and can be
//! overridden from `UNI_NLP_*` environment variables.

use crate::error::{Result, RuntimeError};
use crate::ner::{AggregationStrategy, NerOptions};
use crate::result_cache::ResultCacheConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which models the [`AnalysisService`](crate::service::AnalysisService)
/// uses and how it runs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub ner_alias: String,
    /// Tried once when the primary NER model fails with an engine error.
    pub ner_fallback_alias: Option<String>,
    pub zero_shot_alias: String,
    pub zero_shot_fallback_alias: Option<String>,
    pub ner: NerOptions,
    /// Inference calls allowed in flight at once across both operations.
    pub max_concurrent_inferences: usize,
    /// `None` disables result caching.
    pub result_cache: Option<ResultCacheConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ner_alias: "ner/default".to_string(),
            ner_fallback_alias: None,
            zero_shot_alias: "zero_shot/default".to_string(),
            zero_shot_fallback_alias: None,
            ner: NerOptions::default(),
            max_concurrent_inferences: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            result_cache: Some(ResultCacheConfig::default()),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        RuntimeError::Config(format!("Invalid value '{}' for {}: {}", value, key, e))
    })
}

impl ServiceConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| RuntimeError::Config(format!("Invalid service config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!(
                "Failed to read service config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `UNI_NLP_*` overrides looked up through `var`.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `UNI_NLP_NER_ALIAS` | `ner_alias` |
    /// | `UNI_NLP_NER_FALLBACK_ALIAS` | `ner_fallback_alias` |
    /// | `UNI_NLP_ZERO_SHOT_ALIAS` | `zero_shot_alias` |
    /// | `UNI_NLP_ZERO_SHOT_FALLBACK_ALIAS` | `zero_shot_fallback_alias` |
    /// | `UNI_NLP_AGGREGATION` | `ner.aggregation` (`none` / `simple`) |
    /// | `UNI_NLP_CHUNK_THRESHOLD` | `ner.chunk_threshold` |
    /// | `UNI_NLP_MAX_CONCURRENCY` | `max_concurrent_inferences` |
    /// | `UNI_NLP_CACHE_ENTRIES` | `result_cache.max_entries` (`0` disables) |
    /// | `UNI_NLP_CACHE_TTL_SECS` | `result_cache.ttl_secs` |
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = var("UNI_NLP_NER_ALIAS") {
            self.ner_alias = v;
        }
        if let Some(v) = var("UNI_NLP_NER_FALLBACK_ALIAS") {
            self.ner_fallback_alias = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = var("UNI_NLP_ZERO_SHOT_ALIAS") {
            self.zero_shot_alias = v;
        }
        if let Some(v) = var("UNI_NLP_ZERO_SHOT_FALLBACK_ALIAS") {
            self.zero_shot_fallback_alias = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = var("UNI_NLP_AGGREGATION") {
            self.ner.aggregation = parse_var::<AggregationStrategy>("UNI_NLP_AGGREGATION", &v)?;
        }
        if let Some(v) = var("UNI_NLP_CHUNK_THRESHOLD") {
            self.ner.chunk_threshold = parse_var("UNI_NLP_CHUNK_THRESHOLD", &v)?;
        }
        if let Some(v) = var("UNI_NLP_MAX_CONCURRENCY") {
            self.max_concurrent_inferences = parse_var("UNI_NLP_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = var("UNI_NLP_CACHE_ENTRIES") {
            let max_entries: usize = parse_var("UNI_NLP_CACHE_ENTRIES", &v)?;
            self.result_cache = (max_entries > 0).then(|| ResultCacheConfig {
                max_entries,
                ..self.result_cache.unwrap_or_default()
            });
        }
        if let Some(v) = var("UNI_NLP_CACHE_TTL_SECS") {
            let ttl_secs = parse_var("UNI_NLP_CACHE_TTL_SECS", &v)?;
            if let Some(cache) = self.result_cache.as_mut() {
                cache.ttl_secs = ttl_secs;
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ner_alias.is_empty() || self.zero_shot_alias.is_empty() {
            return Err(RuntimeError::Config(
                "Model aliases must not be empty".to_string(),
            ));
        }
        if self.max_concurrent_inferences == 0 {
            return Err(RuntimeError::Config(
                "max_concurrent_inferences must be greater than 0".to_string(),
            ));
        }
        if self.ner.chunk_threshold == 0 {
            return Err(RuntimeError::Config(
                "ner.chunk_threshold must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of the HTTP front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Model catalog file; a built-in Candle catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8001".to_string(),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            catalog_path: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// `UNI_NLP_BIND`, `UNI_NLP_CORS_ORIGINS` (comma separated) and
    /// `UNI_NLP_CATALOG`.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = var("UNI_NLP_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = var("UNI_NLP_CORS_ORIGINS") {
            self.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("UNI_NLP_CATALOG") {
            self.catalog_path = Some(PathBuf::from(v));
        }
        self
    }
}
