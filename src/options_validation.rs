//! Checks the provider options of an alias before anything is loaded.
//!
//! Runs from [`ModelRuntimeBuilder::build`](crate::runtime::ModelRuntimeBuilder::build)
//! and [`ModelRuntime::register`](crate::runtime::ModelRuntime::register).

use crate::api::ModelTask;
use crate::error::{Result, RuntimeError};
use serde_json::{Map, Value};

/// Accepted shape of one option value.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Text,
    PositiveInt,
    Flag,
    /// Non-negative logit column; zero-shot aliases only.
    NliColumn,
}

const CANDLE_OPTIONS: &[(&str, Kind)] = &[
    ("cache_dir", Kind::Text),
    ("max_length", Kind::PositiveInt),
    ("entailment_index", Kind::NliColumn),
    ("contradiction_index", Kind::NliColumn),
];

const ONNX_OPTIONS: &[(&str, Kind)] = &[
    ("model_dir", Kind::Text),
    ("max_length", Kind::PositiveInt),
    ("intra_threads", Kind::PositiveInt),
    ("token_type_ids", Kind::Flag),
    ("entailment_index", Kind::NliColumn),
    ("contradiction_index", Kind::NliColumn),
];

fn schema(provider_id: &str) -> Option<&'static [(&'static str, Kind)]> {
    match provider_id {
        "local/candle" => Some(CANDLE_OPTIONS),
        "local/onnx" => Some(ONNX_OPTIONS),
        _ => None,
    }
}

/// Validate `options` for `provider_id`. `null` means no options. Providers
/// without a known schema accept anything.
pub fn validate_provider_options(
    provider_id: &str,
    task: ModelTask,
    options: &Value,
) -> Result<()> {
    let Some(schema) = schema(provider_id) else {
        return Ok(());
    };
    let map: &Map<String, Value> = match options {
        Value::Null => return Ok(()),
        Value::Object(map) => map,
        _ => {
            return Err(RuntimeError::Config(format!(
                "Options for provider '{}' must be a JSON object or null",
                provider_id
            )));
        }
    };

    for (key, value) in map {
        let Some((_, kind)) = schema.iter().find(|(name, _)| name == key) else {
            return Err(RuntimeError::Config(format!(
                "Unknown option '{}' for provider '{}'",
                key, provider_id
            )));
        };
        check(provider_id, task, key, *kind, value)?;
    }
    Ok(())
}

fn check(provider_id: &str, task: ModelTask, key: &str, kind: Kind, value: &Value) -> Result<()> {
    let expected = match kind {
        Kind::Text if !value.is_string() => "a string",
        Kind::Flag if !value.is_boolean() => "a boolean",
        Kind::PositiveInt if value.as_u64().is_none() => "a positive integer",
        Kind::PositiveInt if value.as_u64() == Some(0) => "greater than 0",
        Kind::NliColumn if value.as_u64().is_none() => "a non-negative integer",
        Kind::NliColumn if task != ModelTask::ZeroShot => {
            return Err(RuntimeError::Config(format!(
                "Option '{}' is only valid for zero_shot tasks",
                key
            )));
        }
        _ => return Ok(()),
    };
    Err(RuntimeError::Config(format!(
        "Option '{}' for provider '{}' must be {}",
        key, provider_id, expected
    )))
}
