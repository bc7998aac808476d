//! Quick-start example: run a local Candle NER model and a zero-shot NLI model
//! over a short text.
//!
//! Run with:
//! ```sh
//! cargo run --example quick_start --features provider-candle
//! ```

#[cfg(feature = "provider-candle")]
use uni_nlp::api::{ModelAliasSpec, ModelTask};
#[cfg(feature = "provider-candle")]
use uni_nlp::ner::{self, NerOptions};
#[cfg(feature = "provider-candle")]
use uni_nlp::provider::candle::LocalCandleProvider;
#[cfg(feature = "provider-candle")]
use uni_nlp::runtime::ModelRuntime;
#[cfg(feature = "provider-candle")]
use uni_nlp::zero_shot;

#[cfg(feature = "provider-candle")]
fn spec(alias: &str, task: ModelTask, model_id: &str) -> ModelAliasSpec {
    ModelAliasSpec {
        alias: alias.to_string(),
        task,
        provider_id: "local/candle".to_string(),
        model_id: model_id.to_string(),
        revision: None,
        warmup: Default::default(), // Lazy by default
        required: true,
        timeout: None,
        load_timeout: None,
        retry: None,
        circuit_breaker: None,
        options: serde_json::Value::Null,
    }
}

#[cfg(feature = "provider-candle")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let text = "Ada Lovelace corresponded with Charles Babbage from London. \
                Lovelace later published notes on the Analytical Engine.";

    // 1. One alias per task
    let runtime = ModelRuntime::builder()
        .register_provider(LocalCandleProvider::new())
        .catalog(vec![
            spec("ner/local", ModelTask::Ner, "dslim/bert-base-NER"),
            spec(
                "zero_shot/local",
                ModelTask::ZeroShot,
                "cross-encoder/nli-MiniLM2-L6-H768",
            ),
        ])
        .build()
        .await?;

    // 2. Entities, grouped by type
    let ner_model = runtime.token_classifier("ner/local").await?;
    let analysis = ner::analyze(ner_model.as_ref(), text, &NerOptions::default()).await?;
    for (entity_type, groups) in analysis.grouped_entities.iter() {
        for group in groups {
            println!("{entity_type:>5}  {} (x{})", group.entity, group.count);
        }
    }

    // 3. Zero-shot topic scores
    let nli_model = runtime.entailment("zero_shot/local").await?;
    let labels = ["history", "mathematics", "cooking"].map(String::from);
    let result = zero_shot::classify(nli_model.as_ref(), text, &labels).await?;
    for (label, score) in result.labels.iter().zip(&result.scores) {
        println!("{label:>12}: {score:.3}");
    }
    println!("selected: {:?}", result.selected(false));

    Ok(())
}

#[cfg(not(feature = "provider-candle"))]
fn main() {
    eprintln!(
        "This example requires the `provider-candle` feature.\n\
         Run with: cargo run --example quick_start --features provider-candle"
    );
}
