//! Core traits that every provider and model implementation must satisfy,
//! plus the raw model-output types they exchange with the decoders.

use crate::api::{ModelAliasSpec, ModelTask};
use crate::error::Result;
use crate::labels::LabelMap;
use crate::zero_shot::NliLabels;
use async_trait::async_trait;
use std::any::Any;

/// Advertised capabilities of a [`ModelProvider`].
#[derive(Debug, Clone)]
pub struct ProviderCapabilities {
    /// The set of [`ModelTask`] variants this provider can handle.
    pub supported_tasks: Vec<ModelTask>,
}

/// Health status reported by a provider.
#[derive(Debug, Clone)]
pub enum ProviderHealth {
    /// The provider is fully operational.
    Healthy,
    /// The provider is operational but experiencing partial issues.
    Degraded(String),
    /// The provider cannot serve requests.
    Unhealthy(String),
}

/// A pluggable backend that knows how to load models for one or more
/// [`ModelTask`] types.
///
/// Providers are registered with [`ModelRuntimeBuilder::register_provider`](crate::runtime::ModelRuntimeBuilder::register_provider)
/// and are identified by their [`provider_id`](ModelProvider::provider_id)
/// (e.g. `"local/candle"`, `"local/onnx"`).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Unique identifier for this provider (e.g. `"local/candle"`).
    fn provider_id(&self) -> &'static str;

    /// Return the set of tasks this provider supports.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Load a model described by `spec` and return a type-erased handle.
    ///
    /// The returned [`LoadedModelHandle`] is expected to contain an
    /// `Arc<dyn TokenClassifierModel>` or `Arc<dyn EntailmentModel>` depending
    /// on the task.
    async fn load(&self, spec: &ModelAliasSpec) -> Result<LoadedModelHandle>;

    /// Report the current health of this provider.
    async fn health(&self) -> ProviderHealth;

    /// Optional one-time warmup hook called during runtime startup.
    ///
    /// The default implementation is a no-op.
    async fn warmup(&self) -> Result<()> {
        Ok(())
    }
}

/// A type-erased, reference-counted handle to a loaded model instance.
///
/// Providers wrap their concrete model (e.g. `Arc<dyn TokenClassifierModel>`)
/// inside this `Arc<dyn Any + Send + Sync>` so the runtime can store them
/// uniformly. The runtime later downcasts the handle back to the expected
/// trait object.
pub type LoadedModelHandle = std::sync::Arc<dyn Any + Send + Sync>;

/// One tokenizer output unit as seen by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Vocabulary id.
    pub id: u32,
    /// Surface text as produced by the tokenizer, sub-word marker included
    /// (e.g. `"##bee"`).
    pub text: String,
    /// Continuation of the previous word rather than the start of a new one.
    pub is_subword: bool,
    /// Model-special token (`[CLS]`, `[SEP]`, ...). Never part of an entity.
    pub is_special: bool,
    /// Attention-mask bit; `0` marks padding.
    pub attention: u8,
    /// Character span `[start, end)` in the analyzed text, when the tokenizer
    /// reports one.
    pub span: Option<(usize, usize)>,
}

/// WordPiece continuation prefix.
pub const SUBWORD_PREFIX: &str = "##";

impl Token {
    /// A regular attended token; the sub-word flag follows the `##` prefix.
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id,
            is_subword: text.starts_with(SUBWORD_PREFIX),
            text,
            is_special: false,
            attention: 1,
            span: None,
        }
    }

    pub fn special(id: u32, text: impl Into<String>) -> Self {
        Self {
            is_special: true,
            ..Self::new(id, text)
        }
    }

    pub fn padding(id: u32) -> Self {
        Self {
            attention: 0,
            ..Self::special(id, "[PAD]")
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = Some((start, end));
        self
    }

    /// Text with the sub-word marker removed.
    pub fn surface(&self) -> &str {
        self.text
            .strip_prefix(SUBWORD_PREFIX)
            .unwrap_or(&self.text)
    }

    /// Whether the decoder must ignore this token entirely.
    pub fn is_skipped(&self) -> bool {
        self.attention == 0 || self.is_special
    }
}

/// Raw output of a token-classification forward pass over one text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenLogits {
    pub tokens: Vec<Token>,
    /// `[tokens.len()][num_labels]` scores, row `i` belonging to `tokens[i]`.
    pub logits: Vec<Vec<f32>>,
}

impl TokenLogits {
    pub fn new(tokens: Vec<Token>, logits: Vec<Vec<f32>>) -> Self {
        Self { tokens, logits }
    }

    /// Replace every row by its softmax so scores read as probabilities.
    pub fn into_probabilities(mut self) -> Self {
        for row in &mut self.logits {
            *row = crate::scoring::softmax(row);
        }
        self
    }
}

/// A model that tags every token of a text with a BIO label distribution.
#[async_trait]
pub trait TokenClassifierModel: Send + Sync {
    /// Tokenize `text` (truncating to the model limit) and return the tokens
    /// with their raw per-label logits.
    async fn classify_tokens(&self, text: &str) -> Result<TokenLogits>;

    /// The model's `id2label` map; index `i` names logit column `i`.
    fn labels(&self) -> &LabelMap;

    /// The underlying model identifier (e.g. a HuggingFace repo ID).
    fn model_id(&self) -> &str;

    /// Optional warmup hook. The default is a no-op.
    async fn warmup(&self) -> Result<()> {
        Ok(())
    }
}

/// A natural-language-inference model scoring a premise/hypothesis pair.
#[async_trait]
pub trait EntailmentModel: Send + Sync {
    /// Raw class logits for `(premise, hypothesis)`, truncated to the model
    /// limit.
    async fn entailment_logits(&self, premise: &str, hypothesis: &str) -> Result<Vec<f32>>;

    /// Which logit columns mean entailment and contradiction.
    fn nli_labels(&self) -> NliLabels {
        NliLabels::default()
    }

    /// The underlying model identifier.
    fn model_id(&self) -> &str;

    /// Optional warmup hook. The default is a no-op.
    async fn warmup(&self) -> Result<()> {
        Ok(())
    }
}
