use uni_nlp::api::{ModelAliasSpec, ModelTask, WarmupPolicy};
use uni_nlp::runtime::ModelRuntime;
#[cfg(feature = "provider-candle")]
use uni_nlp::provider::LocalCandleProvider;
#[cfg(feature = "provider-onnx")]
use uni_nlp::provider::LocalOnnxProvider;

fn spec(provider_id: &str, task: ModelTask, options: serde_json::Value) -> ModelAliasSpec {
    ModelAliasSpec {
        alias: format!("{task}/default"),
        task,
        provider_id: provider_id.to_string(),
        model_id: "dslim/bert-base-NER".to_string(),
        revision: None,
        warmup: WarmupPolicy::Lazy,
        required: false,
        timeout: None,
        load_timeout: None,
        retry: None,
        circuit_breaker: None,
        options,
    }
}

#[cfg(feature = "provider-candle")]
async fn candle_build(task: ModelTask, options: serde_json::Value) -> uni_nlp::error::Result<()> {
    ModelRuntime::builder()
        .register_provider(LocalCandleProvider::new())
        .catalog(vec![spec("local/candle", task, options)])
        .build()
        .await
        .map(|_| ())
}

#[cfg(feature = "provider-candle")]
#[tokio::test]
async fn builder_rejects_unknown_candle_option_key() {
    let err = candle_build(ModelTask::Ner, serde_json::json!({"unknown": true}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown option"));
}

#[cfg(feature = "provider-candle")]
#[tokio::test]
async fn builder_rejects_invalid_candle_option_type() {
    let err = candle_build(ModelTask::Ner, serde_json::json!({"cache_dir": 123}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must be a string"));

    let err = candle_build(ModelTask::Ner, serde_json::json!({"max_length": 0}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("max_length"));
}

#[cfg(feature = "provider-candle")]
#[tokio::test]
async fn builder_accepts_valid_candle_options() {
    assert!(
        candle_build(
            ModelTask::Ner,
            serde_json::json!({"cache_dir": "/tmp/models", "max_length": 256})
        )
        .await
        .is_ok()
    );
    assert!(
        candle_build(
            ModelTask::ZeroShot,
            serde_json::json!({"entailment_index": 2, "contradiction_index": 0})
        )
        .await
        .is_ok()
    );
}

#[cfg(feature = "provider-candle")]
#[tokio::test]
async fn nli_indices_rejected_for_ner() {
    let err = candle_build(ModelTask::Ner, serde_json::json!({"entailment_index": 2}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("only valid for zero_shot"));
}

#[cfg(feature = "provider-candle")]
#[tokio::test]
async fn register_rejects_unknown_candle_option_key() {
    let runtime = ModelRuntime::builder()
        .register_provider(LocalCandleProvider::new())
        .build()
        .await
        .unwrap();

    let err = runtime
        .register(spec(
            "local/candle",
            ModelTask::Ner,
            serde_json::json!({"unknown": true}),
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown option"));
}

#[cfg(feature = "provider-onnx")]
#[tokio::test]
async fn onnx_options_are_validated() {
    let build = |options| async move {
        ModelRuntime::builder()
            .register_provider(LocalOnnxProvider::new())
            .catalog(vec![spec("local/onnx", ModelTask::Ner, options)])
            .build()
            .await
            .map(|_| ())
    };

    assert!(
        build(serde_json::json!({"model_dir": "/models/ner", "intra_threads": 2}))
            .await
            .is_ok()
    );
    let err = build(serde_json::json!({"token_type_ids": "yes"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must be a boolean"));
    let err = build(serde_json::json!({"cache_dir": "/tmp"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown option"));
}

#[tokio::test]
async fn unknown_providers_skip_option_validation() {
    let runtime = ModelRuntime::builder().build().await.unwrap();
    // No provider registered: rejected for the provider, not the options.
    let err = runtime
        .register(spec("custom/x", ModelTask::Ner, serde_json::json!({"any": 1})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown provider"));
}
