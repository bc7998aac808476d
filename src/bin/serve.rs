//! `uni-nlp-serve`: HTTP service for entity extraction and zero-shot
//! classification.
//!
//! Configuration comes from the environment (see
//! [`ServiceConfig::with_overrides`](uni_nlp::config::ServiceConfig::with_overrides)
//! and [`ServerConfig::with_overrides`](uni_nlp::config::ServerConfig::with_overrides)).
//! Without `UNI_NLP_CATALOG` a built-in catalog serves `dslim/bert-base-NER`
//! and a BERT NLI cross-encoder through the Candle provider.
//!
//! Models that fail to load at startup leave the service running in a
//! degraded state; `/health` reports which model is missing.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uni_nlp::api::{ModelAliasSpec, catalog_from_file, catalog_from_str};
use uni_nlp::config::{ServerConfig, ServiceConfig};
use uni_nlp::runtime::ModelRuntime;
use uni_nlp::server;
use uni_nlp::service::AnalysisService;

const DEFAULT_CATALOG: &str = r#"[
  {
    "alias": "ner/default",
    "task": "ner",
    "provider_id": "local/candle",
    "model_id": "dslim/bert-base-NER"
  },
  {
    "alias": "zero_shot/default",
    "task": "zero_shot",
    "provider_id": "local/candle",
    "model_id": "cross-encoder/nli-MiniLM2-L6-H768"
  }
]"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server_config = ServerConfig::from_env();
    let service_config = ServiceConfig::from_env()?;

    let catalog: Vec<ModelAliasSpec> = match &server_config.catalog_path {
        Some(path) => catalog_from_file(path)?,
        None => catalog_from_str(DEFAULT_CATALOG)?,
    };
    tracing::info!(models = catalog.len(), "Model catalog loaded");

    let mut builder = ModelRuntime::builder().catalog(catalog);
    #[cfg(feature = "provider-onnx")]
    {
        builder = builder.register_provider(uni_nlp::provider::LocalOnnxProvider::new());
    }
    #[cfg(feature = "provider-candle")]
    {
        builder = builder.register_provider(uni_nlp::provider::LocalCandleProvider::new());
    }
    let runtime = builder.build().await?;

    let aliases = [
        Some(service_config.ner_alias.as_str()),
        service_config.ner_fallback_alias.as_deref(),
        Some(service_config.zero_shot_alias.as_str()),
        service_config.zero_shot_fallback_alias.as_deref(),
    ];
    for alias in aliases.into_iter().flatten() {
        match runtime.prefetch(&[alias]).await {
            Ok(()) => tracing::info!(alias, "Model ready"),
            Err(e) => tracing::warn!(alias, error = %e, "Model failed to load, continuing without it"),
        }
    }

    let service = Arc::new(AnalysisService::new(runtime, service_config)?);
    let health = service.health().await;
    tracing::info!(status = ?health.status, device = %health.device, "Service health at startup");

    let app = server::router(service, &server_config);
    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr).await?;
    tracing::info!(addr = %server_config.bind_addr, "uni-nlp listening");
    axum::serve(listener, app).await?;
    Ok(())
}
