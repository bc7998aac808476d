//! ONNX Runtime as the primary NER engine with Candle as fallback.
//!
//! The ONNX alias expects an exported model directory:
//! ```sh
//! optimum-cli export onnx --model dslim/bert-base-NER ./models/bert-base-NER
//! UNI_NLP_ONNX_NER_DIR=./models/bert-base-NER \
//!     cargo run --example onnx_with_fallback --features provider-onnx,provider-candle
//! ```
//! When the directory is missing the ONNX load fails and the service answers
//! from the Candle model instead.

use serde_json::json;
use std::sync::Arc;
use uni_nlp::api::{ModelAliasSpec, ModelTask, WarmupPolicy};
use uni_nlp::config::ServiceConfig;
use uni_nlp::provider::{LocalCandleProvider, LocalOnnxProvider};
use uni_nlp::runtime::ModelRuntime;
use uni_nlp::service::AnalysisService;

fn ner_spec(alias: &str, provider_id: &str, options: serde_json::Value) -> ModelAliasSpec {
    ModelAliasSpec {
        alias: alias.to_string(),
        task: ModelTask::Ner,
        provider_id: provider_id.to_string(),
        model_id: "dslim/bert-base-NER".to_string(),
        revision: None,
        warmup: WarmupPolicy::Lazy,
        required: false,
        timeout: Some(30),
        load_timeout: None,
        retry: None,
        circuit_breaker: None,
        options,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let model_dir = std::env::var("UNI_NLP_ONNX_NER_DIR")
        .unwrap_or_else(|_| "./models/bert-base-NER".to_string());

    let runtime = ModelRuntime::builder()
        .register_provider(LocalOnnxProvider::new())
        .register_provider(LocalCandleProvider::new())
        .catalog(vec![
            ner_spec("ner/onnx", "local/onnx", json!({ "model_dir": model_dir })),
            ner_spec("ner/candle", "local/candle", serde_json::Value::Null),
        ])
        .build()
        .await?;

    let service = Arc::new(AnalysisService::new(
        runtime,
        ServiceConfig {
            ner_alias: "ner/onnx".to_string(),
            ner_fallback_alias: Some("ner/candle".to_string()),
            ..ServiceConfig::default()
        },
    )?);

    let analysis = service
        .analyze_entities("Grace Hopper joined the Navy in New York and later worked at Remington Rand.")
        .await?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);

    let health = service.health().await;
    println!("ner ready: {} on {}", health.ner_model.ready, health.device);
    Ok(())
}
