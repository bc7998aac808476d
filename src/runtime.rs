//! Model runtime: provider registry, alias catalog and the shared cache of
//! loaded model instances.

use crate::api::{ModelAliasSpec, ModelRuntimeKey, WarmupPolicy};
use crate::error::{Result, RuntimeError};
use crate::options_validation::validate_provider_options;
use crate::reliability::{
    CircuitBreaker, InferencePolicy, InstrumentedEntailmentModel,
    InstrumentedTokenClassifier,
};
use crate::traits::{
    EntailmentModel, LoadedModelHandle, ModelProvider, ProviderHealth, TokenClassifierModel,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Load timeout used when an alias sets none.
const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(600);

type ProviderMap = HashMap<String, Box<dyn ModelProvider>>;

/// Owns the registered providers and the alias catalog, and hands out
/// instrumented model handles.
///
/// Build one with [`ModelRuntime::builder()`]. Handles come from
/// [`token_classifier`](Self::token_classifier) and
/// [`entailment`](Self::entailment). Aliases that resolve to the same
/// [`ModelRuntimeKey`] share one loaded instance, loaded at most once even
/// under concurrent first requests.
pub struct ModelRuntime {
    providers: ProviderMap,
    registry: ModelRegistry,
    catalog: RwLock<HashMap<String, ModelAliasSpec>>,
    /// Keyed by alias; every handle for an alias sees the same breaker state.
    breakers: std::sync::Mutex<HashMap<String, CircuitBreaker>>,
}

/// Loaded instances plus one in-flight load lock per key.
#[derive(Default)]
struct ModelRegistry {
    loaded: RwLock<HashMap<ModelRuntimeKey, LoadedModelHandle>>,
    loading: Mutex<HashMap<ModelRuntimeKey, Arc<Mutex<()>>>>,
}

impl ModelRegistry {
    async fn get(&self, key: &ModelRuntimeKey) -> Option<LoadedModelHandle> {
        self.loaded.read().await.get(key).cloned()
    }

    async fn contains(&self, key: &ModelRuntimeKey) -> bool {
        self.loaded.read().await.contains_key(key)
    }

    async fn insert(&self, key: ModelRuntimeKey, handle: LoadedModelHandle) {
        self.loaded.write().await.insert(key, handle);
    }

    async fn load_lock(&self, key: &ModelRuntimeKey) -> Arc<Mutex<()>> {
        self.loading
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Waiters keep their own clone of the lock, so the entry can go as soon
    /// as the load that created it finishes.
    async fn release_load_lock(&self, key: &ModelRuntimeKey) {
        self.loading.lock().await.remove(key);
    }
}

/// Check one catalog entry against the registered providers.
fn admit(providers: &ProviderMap, spec: &ModelAliasSpec) -> Result<()> {
    spec.validate()?;
    if !providers.contains_key(&spec.provider_id) {
        return Err(RuntimeError::Config(format!(
            "Unknown provider '{}' for alias '{}'",
            spec.provider_id, spec.alias
        )));
    }
    validate_provider_options(&spec.provider_id, spec.task, &spec.options)
}

impl ModelRuntime {
    pub fn builder() -> ModelRuntimeBuilder {
        ModelRuntimeBuilder::default()
    }

    /// Add an alias to a running runtime.
    pub async fn register(&self, spec: ModelAliasSpec) -> Result<()> {
        admit(&self.providers, &spec)?;
        let mut catalog = self.catalog.write().await;
        if catalog.contains_key(&spec.alias) {
            return Err(RuntimeError::Config(format!(
                "Alias '{}' already exists",
                spec.alias
            )));
        }
        catalog.insert(spec.alias.clone(), spec);
        Ok(())
    }

    pub async fn contains_alias(&self, alias: &str) -> bool {
        self.catalog.read().await.contains_key(alias)
    }

    /// The catalog entry for `alias`, if registered.
    pub async fn spec(&self, alias: &str) -> Option<ModelAliasSpec> {
        self.catalog.read().await.get(alias).cloned()
    }

    async fn lookup_spec(&self, alias: &str) -> Result<ModelAliasSpec> {
        self.spec(alias)
            .await
            .ok_or_else(|| RuntimeError::Config(format!("Alias '{}' not found", alias)))
    }

    /// Load every catalog entry, stopping at the first failure.
    pub async fn prefetch_all(&self) -> Result<()> {
        let specs: Vec<ModelAliasSpec> = self.catalog.read().await.values().cloned().collect();
        for spec in &specs {
            tracing::info!(alias = %spec.alias, "Prefetching model");
            self.ensure_loaded(spec).await?;
        }
        Ok(())
    }

    /// Load the given aliases, stopping at the first unknown alias or failed
    /// load. Loaded models are skipped.
    pub async fn prefetch(&self, aliases: &[&str]) -> Result<()> {
        for alias in aliases {
            let spec = self.lookup_spec(alias).await?;
            tracing::info!(alias = %alias, "Prefetching model");
            self.ensure_loaded(&spec).await?;
        }
        Ok(())
    }

    /// Token classifier behind `alias`, loading it on first use.
    pub async fn token_classifier(&self, alias: &str) -> Result<Arc<dyn TokenClassifierModel>> {
        let (spec, inner) = self
            .typed_handle::<dyn TokenClassifierModel>(alias, "TokenClassifierModel")
            .await?;
        Ok(Arc::new(InstrumentedTokenClassifier {
            inner,
            policy: self.policy_for(&spec),
        }))
    }

    /// NLI model behind `alias`, loading it on first use.
    pub async fn entailment(&self, alias: &str) -> Result<Arc<dyn EntailmentModel>> {
        let (spec, inner) = self
            .typed_handle::<dyn EntailmentModel>(alias, "EntailmentModel")
            .await?;
        Ok(Arc::new(InstrumentedEntailmentModel {
            inner,
            policy: self.policy_for(&spec),
        }))
    }

    async fn typed_handle<M: ?Sized + Send + Sync + 'static>(
        &self,
        alias: &str,
        trait_name: &str,
    ) -> Result<(ModelAliasSpec, Arc<M>)> {
        let spec = self.lookup_spec(alias).await?;
        let handle = self.ensure_loaded(&spec).await?;
        match handle.downcast_ref::<Arc<M>>() {
            Some(model) => Ok((spec, model.clone())),
            None => Err(RuntimeError::CapabilityMismatch(format!(
                "Model for alias '{}' does not implement {}",
                alias, trait_name
            ))),
        }
    }

    /// Whether `alias` is loaded and its breaker, if any, is closed. Never
    /// loads anything.
    pub async fn is_ready(&self, alias: &str) -> bool {
        let Some(spec) = self.spec(alias).await else {
            return false;
        };
        if !self.registry.contains(&ModelRuntimeKey::new(&spec)).await {
            return false;
        }
        !self
            .breakers
            .lock()
            .unwrap()
            .get(alias)
            .is_some_and(CircuitBreaker::is_open)
    }

    /// Health of the provider serving `alias`.
    pub async fn provider_health(&self, alias: &str) -> Result<ProviderHealth> {
        let spec = self.lookup_spec(alias).await?;
        Ok(self.provider(&spec)?.health().await)
    }

    fn provider(&self, spec: &ModelAliasSpec) -> Result<&dyn ModelProvider> {
        self.providers
            .get(&spec.provider_id)
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                RuntimeError::ProviderNotFound(format!("Provider '{}' not found", spec.provider_id))
            })
    }

    fn policy_for(&self, spec: &ModelAliasSpec) -> InferencePolicy {
        let mut policy = InferencePolicy::passthrough(&spec.alias, &spec.provider_id, spec.task);
        policy.timeout = spec.timeout.map(Duration::from_secs);
        policy.retry = spec.retry.clone();
        policy.breaker = spec.circuit_breaker.as_ref().map(|config| {
            self.breakers
                .lock()
                .unwrap()
                .entry(spec.alias.clone())
                .or_insert_with(|| CircuitBreaker::new(config.clone()))
                .clone()
        });
        policy
    }

    /// Cached instance for `spec`, loading it under the per-key lock when
    /// absent.
    #[tracing::instrument(skip(self, spec), fields(alias = %spec.alias))]
    async fn ensure_loaded(&self, spec: &ModelAliasSpec) -> Result<LoadedModelHandle> {
        let key = ModelRuntimeKey::new(spec);
        if let Some(handle) = self.registry.get(&key).await {
            return Ok(handle);
        }

        let lock = self.registry.load_lock(&key).await;
        let _guard = lock.lock().await;

        // Another caller may have finished the load while we waited.
        let result = match self.registry.get(&key).await {
            Some(handle) => Ok(handle),
            None => {
                let limit = spec
                    .load_timeout
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_LOAD_TIMEOUT);
                match tokio::time::timeout(limit, self.load_and_warm(spec)).await {
                    Ok(Ok(handle)) => {
                        self.registry.insert(key.clone(), handle.clone()).await;
                        Ok(handle)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => {
                        record_load(spec, "timeout");
                        tracing::error!(
                            provider = %spec.provider_id,
                            timeout_secs = limit.as_secs(),
                            "Model load timed out"
                        );
                        Err(RuntimeError::Timeout)
                    }
                }
            }
        };

        self.registry.release_load_lock(&key).await;
        result
    }

    async fn load_and_warm(&self, spec: &ModelAliasSpec) -> Result<LoadedModelHandle> {
        let provider = self.provider(spec)?;
        tracing::info!(
            provider = %spec.provider_id,
            model = %spec.model_id,
            task = %spec.task,
            "Loading model"
        );

        let started = Instant::now();
        let loaded = provider.load(spec).await;
        metrics::histogram!("model_load.duration_seconds", "task" => spec.task.to_string())
            .record(started.elapsed().as_secs_f64());

        let handle = loaded.inspect_err(|e| {
            record_load(spec, "failure");
            tracing::error!(error = %e, "Model load failed");
        })?;
        record_load(spec, "success");

        if let Some(model) = handle.downcast_ref::<Arc<dyn TokenClassifierModel>>() {
            model.warmup().await?;
        } else if let Some(model) = handle.downcast_ref::<Arc<dyn EntailmentModel>>() {
            model.warmup().await?;
        }
        Ok(handle)
    }

    async fn warm_providers(self: &Arc<Self>, policy: WarmupPolicy) -> Result<()> {
        match policy {
            WarmupPolicy::Lazy => {}
            WarmupPolicy::Eager => {
                for (id, provider) in &self.providers {
                    tracing::info!(provider = %id, "Warming up provider");
                    provider.warmup().await.map_err(|e| {
                        RuntimeError::Load(format!("Failed to warmup provider {}: {}", id, e))
                    })?;
                }
            }
            WarmupPolicy::Background => {
                for id in self.providers.keys().cloned() {
                    let runtime = Arc::clone(self);
                    tokio::spawn(async move {
                        if let Some(provider) = runtime.providers.get(&id)
                            && let Err(e) = provider.warmup().await
                        {
                            tracing::error!(provider = %id, error = %e, "Background provider warmup failed");
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply each alias's own warmup policy. Only a failing `required` eager
    /// alias aborts.
    async fn warm_models(self: &Arc<Self>) -> Result<()> {
        let specs: Vec<ModelAliasSpec> = self.catalog.read().await.values().cloned().collect();
        for spec in specs {
            match spec.warmup {
                WarmupPolicy::Lazy => {}
                WarmupPolicy::Eager => {
                    tracing::info!(alias = %spec.alias, "Loading model eagerly");
                    if let Err(e) = self.ensure_loaded(&spec).await {
                        if spec.required {
                            return Err(e);
                        }
                        tracing::warn!(
                            alias = %spec.alias,
                            error = %e,
                            "Optional model failed to load; continuing"
                        );
                    }
                }
                WarmupPolicy::Background => {
                    let runtime = Arc::clone(self);
                    tokio::spawn(async move {
                        if let Err(e) = runtime.ensure_loaded(&spec).await {
                            tracing::error!(alias = %spec.alias, error = %e, "Background model load failed");
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

fn record_load(spec: &ModelAliasSpec, status: &'static str) {
    metrics::counter!(
        "model_load.total",
        "task" => spec.task.to_string(),
        "provider" => spec.provider_id.clone(),
        "status" => status
    )
    .increment(1);
}

/// Collects providers, the catalog and the provider warmup policy.
///
/// ```rust,no_run
/// # use uni_nlp::runtime::ModelRuntime;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = ModelRuntime::builder()
///     .catalog_from_file("catalog.json")?
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ModelRuntimeBuilder {
    providers: ProviderMap,
    catalog: Vec<ModelAliasSpec>,
    warmup_policy: WarmupPolicy,
}

impl ModelRuntimeBuilder {
    /// Register a provider under its
    /// [`provider_id`](crate::traits::ModelProvider::provider_id). A later
    /// provider with the same id replaces an earlier one.
    pub fn register_provider<P: ModelProvider + 'static>(mut self, provider: P) -> Self {
        self.providers
            .insert(provider.provider_id().to_string(), Box::new(provider));
        self
    }

    pub fn catalog(mut self, catalog: Vec<ModelAliasSpec>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Catalog from a JSON array of alias specs.
    pub fn catalog_from_str(mut self, s: &str) -> Result<Self> {
        self.catalog = crate::api::catalog_from_str(s)?;
        Ok(self)
    }

    pub fn catalog_from_file(mut self, path: impl AsRef<std::path::Path>) -> Result<Self> {
        self.catalog = crate::api::catalog_from_file(path)?;
        Ok(self)
    }

    /// How providers are warmed during [`build`](Self::build). Aliases carry
    /// their own policy.
    pub fn warmup_policy(mut self, policy: WarmupPolicy) -> Self {
        self.warmup_policy = policy;
        self
    }

    /// Validate the catalog, warm providers and models, and return the
    /// runtime.
    ///
    /// Fails on an invalid or duplicate alias, an unknown provider, a failed
    /// eager provider warmup, or a failed `required` eager model load.
    pub async fn build(self) -> Result<Arc<ModelRuntime>> {
        let mut catalog = HashMap::with_capacity(self.catalog.len());
        for spec in self.catalog {
            admit(&self.providers, &spec)?;
            if let Some(previous) = catalog.insert(spec.alias.clone(), spec) {
                return Err(RuntimeError::Config(format!(
                    "Duplicate alias '{}' in catalog",
                    previous.alias
                )));
            }
        }

        let runtime = Arc::new(ModelRuntime {
            providers: self.providers,
            registry: ModelRegistry::default(),
            catalog: RwLock::new(catalog),
            breakers: std::sync::Mutex::new(HashMap::new()),
        });

        runtime.warm_providers(self.warmup_policy).await?;
        runtime.warm_models().await?;
        Ok(runtime)
    }
}
