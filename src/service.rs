//! The analysis service: request validation, bounded concurrency, result
//! caching and engine failover in front of the NER and zero-shot pipelines.

use crate::config::ServiceConfig;
use crate::error::{Result, RuntimeError};
use crate::ner::{self, EntityAnalysis};
use crate::result_cache::ResultCache;
use crate::runtime::ModelRuntime;
use crate::zero_shot::{self, ZeroShotResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Overall service state derived from model readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Both models ready.
    Healthy,
    /// Exactly one model ready.
    Degraded,
    /// No model ready.
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub zero_shot_model: ModelStatus,
    pub ner_model: ModelStatus,
    pub device: String,
}

/// Zero-shot scores together with the labels picked from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroShotAnalysis {
    #[serde(flatten)]
    pub result: ZeroShotResult,
    /// Labels picked under the requested `multi_label` mode.
    pub selected: Vec<String>,
}

/// Entity extraction and zero-shot classification over a [`ModelRuntime`].
pub struct AnalysisService {
    runtime: Arc<ModelRuntime>,
    config: ServiceConfig,
    permits: Semaphore,
    entity_cache: Option<ResultCache<EntityAnalysis>>,
    zero_shot_cache: Option<ResultCache<ZeroShotResult>>,
}

impl AnalysisService {
    pub fn new(runtime: Arc<ModelRuntime>, config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runtime,
            permits: Semaphore::new(config.max_concurrent_inferences),
            entity_cache: config.result_cache.map(ResultCache::new),
            zero_shot_cache: config.result_cache.map(ResultCache::new),
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<ModelRuntime> {
        &self.runtime
    }

    /// Recognize and group the entities of `text`.
    pub async fn analyze_entities(&self, text: &str) -> Result<EntityAnalysis> {
        let result = self.analyze_entities_inner(text).await;
        record_request("entities", &result);
        result
    }

    async fn analyze_entities_inner(&self, text: &str) -> Result<EntityAnalysis> {
        if text.trim().is_empty() {
            return Err(RuntimeError::InvalidInput(
                "text cannot be empty.".to_string(),
            ));
        }

        let options = self.config.ner;
        let key = ResultCache::<EntityAnalysis>::key(&json!({
            "operation": "entities",
            "text": text,
            "aggregation": options.aggregation.to_string(),
            "chunk_threshold": options.chunk_threshold,
        }));
        if let Some(hit) = self.entity_cache.as_ref().and_then(|c| c.get(&key)) {
            return Ok(hit);
        }

        tracing::info!(chars = text.chars().count(), "Entity analysis requested");
        let analysis = self
            .with_failover(
                "entities",
                &self.config.ner_alias,
                self.config.ner_fallback_alias.as_deref(),
                |alias| async move {
                    let model = self.runtime.token_classifier(&alias).await?;
                    ner::analyze(model.as_ref(), text, &options).await
                },
            )
            .await?;

        tracing::info!(
            mentions = analysis.entities.len(),
            unique = analysis.grouped_entities.unique_count(),
            "Entity analysis complete"
        );
        if let Some(cache) = &self.entity_cache {
            cache.insert(key, analysis.clone());
        }
        Ok(analysis)
    }

    /// Score every candidate label against `text`.
    ///
    /// `multi_label` only changes which labels are selected; scores are cached
    /// and shared between both modes.
    pub async fn analyze_zero_shot(
        &self,
        text: &str,
        candidate_labels: &[String],
        multi_label: bool,
    ) -> Result<ZeroShotAnalysis> {
        let result = self.analyze_zero_shot_inner(text, candidate_labels).await;
        record_request("zero_shot", &result);
        let result = result?;
        let selected = result
            .selected(multi_label)
            .into_iter()
            .map(String::from)
            .collect();
        Ok(ZeroShotAnalysis { result, selected })
    }

    async fn analyze_zero_shot_inner(
        &self,
        text: &str,
        candidate_labels: &[String],
    ) -> Result<ZeroShotResult> {
        if candidate_labels.is_empty() {
            return Err(RuntimeError::InvalidInput(
                "candidate_labels list cannot be empty.".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(RuntimeError::InvalidInput(
                "text cannot be empty.".to_string(),
            ));
        }

        let key = ResultCache::<ZeroShotResult>::key(&json!({
            "operation": "zero_shot",
            "text": text,
            "labels": candidate_labels,
        }));
        if let Some(hit) = self.zero_shot_cache.as_ref().and_then(|c| c.get(&key)) {
            return Ok(hit);
        }

        tracing::info!(
            chars = text.chars().count(),
            labels = ?candidate_labels,
            "Zero-shot classification requested"
        );
        let result = self
            .with_failover(
                "zero_shot",
                &self.config.zero_shot_alias,
                self.config.zero_shot_fallback_alias.as_deref(),
                |alias| async move {
                    let model = self.runtime.entailment(&alias).await?;
                    zero_shot::classify(model.as_ref(), text, candidate_labels).await
                },
            )
            .await?;

        if let Some(cache) = &self.zero_shot_cache {
            cache.insert(key, result.clone());
        }
        Ok(result)
    }

    /// Readiness of both models. A model counts as ready when its primary or
    /// its fallback alias is loaded and not short-circuited.
    pub async fn health(&self) -> HealthReport {
        let zero_shot_model = self
            .model_status(
                &self.config.zero_shot_alias,
                self.config.zero_shot_fallback_alias.as_deref(),
            )
            .await;
        let ner_model = self
            .model_status(&self.config.ner_alias, self.config.ner_fallback_alias.as_deref())
            .await;

        let status = match (zero_shot_model.ready, ner_model.ready) {
            (true, true) => HealthStatus::Healthy,
            (false, false) => HealthStatus::Critical,
            _ => HealthStatus::Degraded,
        };

        HealthReport {
            status,
            zero_shot_model,
            ner_model,
            device: device_name().to_string(),
        }
    }

    async fn model_status(&self, primary: &str, fallback: Option<&str>) -> ModelStatus {
        let name = match self.runtime.spec(primary).await {
            Some(spec) => spec.model_id,
            None => primary.to_string(),
        };
        let mut ready = self.runtime.is_ready(primary).await;
        if !ready && let Some(fallback) = fallback {
            ready = self.runtime.is_ready(fallback).await;
        }
        ModelStatus { name, ready }
    }

    /// Run `call` on `primary` inside a concurrency permit; on an engine
    /// failure retry once on `fallback`.
    async fn with_failover<T, F, Fut>(
        &self,
        operation: &'static str,
        primary: &str,
        fallback: Option<&str>,
        call: F,
    ) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let primary_known = self.runtime.contains_alias(primary).await;
        let fallback = match fallback {
            Some(alias) if self.runtime.contains_alias(alias).await => Some(alias),
            _ => None,
        };
        if !primary_known && fallback.is_none() {
            tracing::error!(operation, alias = primary, "No model configured for operation");
            return Err(RuntimeError::Unavailable);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RuntimeError::Unavailable)?;

        let first = if primary_known {
            call(primary.to_string()).await
        } else {
            Err(RuntimeError::Unavailable)
        };

        match (first, fallback) {
            (Err(e), Some(alias)) if e.is_engine_failure() => {
                tracing::warn!(
                    operation,
                    primary,
                    fallback = alias,
                    error = %e,
                    "Primary model failed, retrying on fallback"
                );
                metrics::counter!("analysis.failover.total", "operation" => operation).increment(1);
                call(alias.to_string()).await
            }
            (result, _) => result,
        }
    }
}

fn record_request<T>(operation: &'static str, result: &Result<T>) {
    let status = match result {
        Ok(_) => "success",
        Err(RuntimeError::InvalidInput(_)) => "invalid",
        Err(e) => {
            tracing::error!(operation, error = %e, "Analysis failed");
            "failure"
        }
    };
    metrics::counter!("analysis.requests.total", "operation" => operation, "status" => status)
        .increment(1);
}

/// Compute device the local providers run on.
pub fn device_name() -> &'static str {
    if cfg!(feature = "gpu-cuda") {
        "GPU"
    } else {
        "CPU"
    }
}
