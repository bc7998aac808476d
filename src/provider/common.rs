//! Tokenizer and model-config plumbing shared by the local providers.

use crate::error::{Result, RuntimeError};
use crate::labels::LabelMap;
use crate::traits::{SUBWORD_PREFIX, Token};
use crate::zero_shot::{MAX_PAIR_TOKENS, NliLabels};
use serde_json::Value;
use std::path::Path;
use tokenizers::{Encoding, Tokenizer, TruncationParams};

/// Sequence length used when `options.max_length` is not set.
pub(crate) const DEFAULT_MAX_LENGTH: usize = MAX_PAIR_TOKENS;

pub(crate) fn max_length(options: &Value) -> usize {
    options
        .get("max_length")
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_MAX_LENGTH)
}

/// NLI columns from `id2label`, with `entailment_index` /
/// `contradiction_index` options taking precedence.
pub(crate) fn nli_labels(labels: &LabelMap, options: &Value) -> NliLabels {
    let index = |key: &str| options.get(key).and_then(Value::as_u64).map(|v| v as usize);
    NliLabels::from_label_map(labels)
        .with_overrides(index("entailment_index"), index("contradiction_index"))
}

pub(crate) fn read_config(path: &Path) -> Result<Value> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| RuntimeError::Load(e.to_string()))?;
    serde_json::from_str(&contents)
        .map_err(|e| RuntimeError::Load(format!("Invalid model config: {}", e)))
}

/// Hidden width declared by a BERT-style `config.json`.
pub(crate) fn hidden_size(config: &Value) -> Result<usize> {
    config
        .get("hidden_size")
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| RuntimeError::Load("Model config has no hidden_size".to_string()))
}

/// Load a tokenizer that truncates to `max_length` and never pads.
pub(crate) fn load_tokenizer(path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| RuntimeError::Load(format!("Failed to load tokenizer: {}", e)))?;
    tokenizer.with_padding(None);
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| RuntimeError::Load(format!("Failed to set truncation: {}", e)))?;
    Ok(tokenizer)
}

/// Encode a single text with character (not byte) offsets.
pub(crate) fn encode_text(tokenizer: &Tokenizer, text: &str) -> Result<Encoding> {
    tokenizer
        .encode_char_offsets(text, true)
        .map_err(|e| RuntimeError::InferenceError(format!("Tokenization failed: {}", e)))
}

pub(crate) fn encode_pair(tokenizer: &Tokenizer, premise: &str, hypothesis: &str) -> Result<Encoding> {
    tokenizer
        .encode((premise, hypothesis), true)
        .map_err(|e| RuntimeError::InferenceError(format!("Tokenization failed: {}", e)))
}

/// Decoder view of an encoding.
///
/// A token continues the previous word when it carries the WordPiece prefix
/// or shares the previous token's word id. Special tokens report no span.
pub(crate) fn tokens_from_encoding(encoding: &Encoding) -> Vec<Token> {
    let special = encoding.get_special_tokens_mask();
    let attention = encoding.get_attention_mask();
    let offsets = encoding.get_offsets();
    let words = encoding.get_word_ids();

    let mut previous_word = None;
    encoding
        .get_ids()
        .iter()
        .zip(encoding.get_tokens())
        .enumerate()
        .map(|(i, (&id, text))| {
            let word = words.get(i).copied().flatten();
            let same_word = word.is_some() && word == previous_word;
            previous_word = word;

            let is_special = special.get(i).is_some_and(|&m| m == 1);
            let mut token = Token::new(id, text.as_str());
            token.is_special = is_special;
            token.is_subword = text.starts_with(SUBWORD_PREFIX) || same_word;
            token.attention = attention.get(i).map(|&m| m as u8).unwrap_or(1);
            if !is_special
                && let Some(&(start, end)) = offsets.get(i)
                && start < end
            {
                token.span = Some((start, end));
            }
            token
        })
        .collect()
}
