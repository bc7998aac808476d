//! Per-alias call policy: timeouts, retries with backoff, a circuit breaker,
//! and the inference metrics. The runtime wraps every model handle it hands
//! out in one of the instrumented adapters below.

use crate::api::{ModelTask, RetryConfig};
use crate::error::{Result, RuntimeError};
use crate::labels::LabelMap;
use crate::traits::{EntailmentModel, TokenClassifierModel, TokenLogits};
use crate::zero_shot::NliLabels;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time the breaker stays open before one probe call is let through.
    pub open_wait_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_wait_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since: Instant },
    /// The single probe admitted after the open period is running.
    Probing,
}

/// How a call got past the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Consecutive-failure circuit breaker. Clones share state.
///
/// Closed until `failure_threshold` failures in a row, then open: calls fail
/// with [`RuntimeError::Unavailable`] without running. After
/// `open_wait_seconds` one probe runs; its success closes the breaker and its
/// failure reopens it.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BreakerState::Closed { failures: 0 })),
        }
    }

    fn open_wait(&self) -> Duration {
        Duration::from_secs(self.config.open_wait_seconds)
    }

    /// Whether a call made now would be rejected.
    pub fn is_open(&self) -> bool {
        match *self.state.lock().unwrap() {
            BreakerState::Closed { .. } => false,
            BreakerState::Open { since } => since.elapsed() < self.open_wait(),
            BreakerState::Probing => true,
        }
    }

    fn admit(&self) -> Result<Admission> {
        let mut state = self.state.lock().unwrap();
        match *state {
            BreakerState::Closed { .. } => Ok(Admission::Normal),
            BreakerState::Open { since } if since.elapsed() >= self.open_wait() => {
                *state = BreakerState::Probing;
                Ok(Admission::Probe)
            }
            BreakerState::Open { .. } | BreakerState::Probing => Err(RuntimeError::Unavailable),
        }
    }

    fn record(&self, admission: Admission, succeeded: bool) {
        let mut state = self.state.lock().unwrap();
        *state = match (*state, admission, succeeded) {
            (_, Admission::Probe, true) => BreakerState::Closed { failures: 0 },
            (_, Admission::Probe, false) => BreakerState::Open {
                since: Instant::now(),
            },
            (BreakerState::Closed { .. }, Admission::Normal, true) => {
                BreakerState::Closed { failures: 0 }
            }
            (BreakerState::Closed { failures }, Admission::Normal, false) => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    tracing::warn!(failures, "Circuit breaker opened");
                    BreakerState::Open {
                        since: Instant::now(),
                    }
                } else {
                    BreakerState::Closed { failures }
                }
            }
            // A call admitted before the breaker opened failed late.
            (BreakerState::Open { .. }, Admission::Normal, false) => BreakerState::Open {
                since: Instant::now(),
            },
            (current, Admission::Normal, _) => current,
        };
    }

    /// Run `f` unless the breaker rejects the call.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit()?;
        let result = f().await;
        self.record(admission, result.is_ok());
        result
    }
}

/// What the instrumented adapters apply around each model call.
///
/// Every attempt is bounded by `timeout` and passes the breaker. Retryable
/// failures are retried up to `retry.max_attempts`. Each call, retries
/// included, records `model_inference.duration_seconds` and
/// `model_inference.total`.
#[derive(Clone)]
pub struct InferencePolicy {
    pub alias: String,
    pub provider_id: String,
    pub task: ModelTask,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryConfig>,
    pub breaker: Option<CircuitBreaker>,
}

impl InferencePolicy {
    /// Metrics only.
    pub fn passthrough(alias: &str, provider_id: &str, task: ModelTask) -> Self {
        Self {
            alias: alias.to_string(),
            provider_id: provider_id.to_string(),
            task,
            timeout: None,
            retry: None,
            breaker: None,
        }
    }

    /// Run `call` under this policy; `call` builds one attempt.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let max_attempts = self.retry.as_ref().map_or(1, |r| r.max_attempts.max(1));

        let mut attempt = 1;
        let result = loop {
            let error = match self.attempt(call()).await {
                Ok(value) => break Ok(value),
                Err(e) => e,
            };
            if !error.is_retryable() || attempt >= max_attempts {
                break Err(error);
            }
            let backoff = self
                .retry
                .as_ref()
                .map(|r| r.get_backoff(attempt))
                .unwrap_or_default();
            tracing::warn!(
                alias = %self.alias,
                task = %self.task,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Inference failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        };

        self.record(started.elapsed(), result.is_ok());
        result
    }

    async fn attempt<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let bounded = async {
            let Some(limit) = self.timeout else {
                return fut.await;
            };
            tokio::time::timeout(limit, fut)
                .await
                .unwrap_or(Err(RuntimeError::Timeout))
        };
        match &self.breaker {
            Some(breaker) => breaker.call(|| bounded).await,
            None => bounded.await,
        }
    }

    fn record(&self, elapsed: Duration, succeeded: bool) {
        metrics::histogram!(
            "model_inference.duration_seconds",
            "alias" => self.alias.clone(),
            "task" => self.task.as_str(),
            "provider" => self.provider_id.clone()
        )
        .record(elapsed.as_secs_f64());
        let status = if succeeded { "success" } else { "failure" };
        metrics::counter!(
            "model_inference.total",
            "alias" => self.alias.clone(),
            "task" => self.task.as_str(),
            "provider" => self.provider_id.clone(),
            "status" => status
        )
        .increment(1);
    }
}

/// [`TokenClassifierModel`] calls routed through an [`InferencePolicy`].
pub struct InstrumentedTokenClassifier {
    pub inner: Arc<dyn TokenClassifierModel>,
    pub policy: InferencePolicy,
}

#[async_trait]
impl TokenClassifierModel for InstrumentedTokenClassifier {
    async fn classify_tokens(&self, text: &str) -> Result<TokenLogits> {
        self.policy
            .run(move || self.inner.classify_tokens(text))
            .await
    }

    fn labels(&self) -> &LabelMap {
        self.inner.labels()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn warmup(&self) -> Result<()> {
        self.inner.warmup().await
    }
}

/// [`EntailmentModel`] calls routed through an [`InferencePolicy`].
pub struct InstrumentedEntailmentModel {
    pub inner: Arc<dyn EntailmentModel>,
    pub policy: InferencePolicy,
}

#[async_trait]
impl EntailmentModel for InstrumentedEntailmentModel {
    async fn entailment_logits(&self, premise: &str, hypothesis: &str) -> Result<Vec<f32>> {
        self.policy
            .run(move || self.inner.entailment_logits(premise, hypothesis))
            .await
    }

    fn nli_labels(&self) -> NliLabels {
        self.inner.nli_labels()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn warmup(&self) -> Result<()> {
        self.inner.warmup().await
    }
}
