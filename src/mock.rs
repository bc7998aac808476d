#![allow(dead_code)]

//! Mock implementations for testing
//!
//! This module provides mock model implementations and providers for testing purposes.
//! All types are gated with `#[cfg(test)]`.

use crate::api::{ModelAliasSpec, ModelTask, WarmupPolicy};
use crate::error::{Result, RuntimeError};
use crate::labels::LabelMap;
use crate::runtime::ModelRuntime;
use crate::traits::{
    EntailmentModel, LoadedModelHandle, ModelProvider, ProviderCapabilities, ProviderHealth,
    Token, TokenClassifierModel, TokenLogits,
};
use crate::zero_shot::hypothesis;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Label set of the mock tagger, CoNLL style.
pub const MOCK_NER_LABELS: [&str; 7] = [
    "O", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC",
];

/// Logit given to the winning column of a tagged row.
const TAG_LOGIT: f32 = 6.0;

fn default_lexicon() -> HashMap<String, String> {
    [
        ("ada", "B-PER"),
        ("lovelace", "I-PER"),
        ("acme", "B-ORG"),
        ("corp", "I-ORG"),
        ("apple", "B-ORG"),
        ("paris", "B-LOC"),
        ("london", "B-LOC"),
    ]
    .into_iter()
    .map(|(word, tag)| (word.to_string(), tag.to_string()))
    .collect()
}

/// Word-level tagger: every whitespace-separated word becomes one token,
/// tagged from a lowercase lexicon (punctuation trimmed) or `O`.
pub struct MockTokenClassifier {
    model_id: String,
    labels: LabelMap,
    lexicon: HashMap<String, String>,
    fail_on_classify: bool,
    fail_count: AtomicU32,
    delay_ms: u64,
    call_count: Arc<AtomicU32>,
    warmup_count: Arc<AtomicU32>,
}

impl MockTokenClassifier {
    pub fn new(model_id: String) -> Self {
        Self {
            model_id,
            labels: LabelMap::new(MOCK_NER_LABELS),
            lexicon: default_lexicon(),
            fail_on_classify: false,
            fail_count: AtomicU32::new(0),
            delay_ms: 0,
            call_count: Arc::new(AtomicU32::new(0)),
            warmup_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_tag(mut self, word: &str, tag: &str) -> Self {
        self.lexicon.insert(word.to_lowercase(), tag.to_string());
        self
    }

    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = AtomicU32::new(count);
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_warmup_tracker(mut self, tracker: Arc<AtomicU32>) -> Self {
        self.warmup_count = tracker;
        self
    }

    pub fn with_failure(mut self, fail: bool) -> Self {
        self.fail_on_classify = fail;
        self
    }

    pub fn with_call_tracker(mut self, tracker: Arc<AtomicU32>) -> Self {
        self.call_count = tracker;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn warmup_count(&self) -> u32 {
        self.warmup_count.load(Ordering::SeqCst)
    }

    fn row_for(&self, word: &str) -> Vec<f32> {
        let key = word
            .trim_matches(|c: char| c.is_ascii_punctuation())
            .to_lowercase();
        let tag = self.lexicon.get(&key).map(String::as_str).unwrap_or("O");
        let column = self.labels.position_of(tag).unwrap_or(0);
        let mut row = vec![0.0; self.labels.len()];
        row[column] = TAG_LOGIT;
        row
    }
}

#[async_trait]
impl TokenClassifierModel for MockTokenClassifier {
    async fn classify_tokens(&self, text: &str) -> Result<TokenLogits> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        if self.fail_on_classify {
            return Err(RuntimeError::InferenceError(
                "Mock classification failure".to_string(),
            ));
        }

        let current_fails = self.fail_count.load(Ordering::SeqCst);
        if current_fails > 0 {
            self.fail_count.fetch_sub(1, Ordering::SeqCst);
            return Err(RuntimeError::Unavailable); // Unavailable is retryable
        }

        let blank = vec![0.0; self.labels.len()];
        let mut tokens = vec![Token::special(101, "[CLS]")];
        let mut logits = vec![blank.clone()];

        let mut word_start = None;
        let chars: Vec<char> = text.chars().collect();
        for (index, c) in chars.iter().chain(std::iter::once(&' ')).enumerate() {
            match (c.is_whitespace(), word_start) {
                (false, None) => word_start = Some(index),
                (true, Some(start)) => {
                    let word: String = chars[start..index].iter().collect();
                    logits.push(self.row_for(&word));
                    tokens.push(Token::new(1000 + tokens.len() as u32, word).with_span(start, index));
                    word_start = None;
                }
                _ => {}
            }
        }

        tokens.push(Token::special(102, "[SEP]"));
        logits.push(blank);
        Ok(TokenLogits::new(tokens, logits))
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn warmup(&self) -> Result<()> {
        self.warmup_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Two-class NLI model answering with a fixed entailment probability per
/// candidate label (0.5 for labels it does not know).
pub struct MockEntailmentModel {
    model_id: String,
    probabilities: HashMap<String, f32>,
    fail_on_score: bool,
    call_count: Arc<AtomicU32>,
    warmup_count: AtomicU32,
}

impl MockEntailmentModel {
    pub fn new(model_id: String) -> Self {
        Self {
            model_id,
            probabilities: HashMap::new(),
            fail_on_score: false,
            call_count: Arc::new(AtomicU32::new(0)),
            warmup_count: AtomicU32::new(0),
        }
    }

    pub fn with_probability(mut self, label: &str, probability: f32) -> Self {
        self.probabilities.insert(hypothesis(label), probability);
        self
    }

    pub fn with_failure(mut self, fail: bool) -> Self {
        self.fail_on_score = fail;
        self
    }

    pub fn with_call_tracker(mut self, tracker: Arc<AtomicU32>) -> Self {
        self.call_count = tracker;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntailmentModel for MockEntailmentModel {
    async fn entailment_logits(&self, _premise: &str, hypothesis: &str) -> Result<Vec<f32>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.fail_on_score {
            return Err(RuntimeError::InferenceError(
                "Mock entailment failure".to_string(),
            ));
        }

        let p = self
            .probabilities
            .get(hypothesis)
            .copied()
            .unwrap_or(0.5)
            .clamp(1e-6, 1.0 - 1e-6);
        // [not_entailment, entailment] with softmax(row)[1] == p
        Ok(vec![0.0, (p / (1.0 - p)).ln()])
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn warmup(&self) -> Result<()> {
        self.warmup_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock provider with configurable behavior
pub struct MockProvider {
    provider_id: &'static str,
    supported_tasks: Vec<ModelTask>,
    health: ProviderHealth,
    load_count: Arc<AtomicU32>,
    inference_count: Arc<AtomicU32>,
    warmup_count: AtomicU32,
    load_delay_ms: u64,
    model_delay_ms: u64,
    model_fail_count: u32,
    model_failure: bool,
    fail_on_load: bool,
    entailment_probabilities: Vec<(String, f32)>,
    model_warmup_tracker: Option<Arc<AtomicU32>>,
}

impl MockProvider {
    pub fn new(provider_id: &'static str, supported_tasks: Vec<ModelTask>) -> Self {
        Self {
            provider_id,
            supported_tasks,
            health: ProviderHealth::Healthy,
            load_count: Arc::new(AtomicU32::new(0)),
            inference_count: Arc::new(AtomicU32::new(0)),
            warmup_count: AtomicU32::new(0),
            load_delay_ms: 0,
            model_delay_ms: 0,
            model_fail_count: 0,
            model_failure: false,
            fail_on_load: false,
            entailment_probabilities: Vec::new(),
            model_warmup_tracker: None,
        }
    }

    /// Serves both tasks.
    pub fn nlp() -> Self {
        Self::new("mock/nlp", vec![ModelTask::Ner, ModelTask::ZeroShot])
    }

    pub fn ner_only() -> Self {
        Self::new("mock/ner", vec![ModelTask::Ner])
    }

    pub fn zero_shot_only() -> Self {
        Self::new("mock/zero_shot", vec![ModelTask::ZeroShot])
    }

    pub fn failing() -> Self {
        let mut provider = Self::new("mock/failing", vec![ModelTask::Ner, ModelTask::ZeroShot]);
        provider.fail_on_load = true;
        provider
    }

    pub fn with_model_fail_count(mut self, count: u32) -> Self {
        self.model_fail_count = count;
        self
    }

    pub fn with_model_delay(mut self, delay_ms: u64) -> Self {
        self.model_delay_ms = delay_ms;
        self
    }

    pub fn with_model_failure(mut self, fail: bool) -> Self {
        self.model_failure = fail;
        self
    }

    pub fn with_model_warmup_tracker(mut self, tracker: Arc<AtomicU32>) -> Self {
        self.model_warmup_tracker = Some(tracker);
        self
    }

    pub fn with_entailment(mut self, label: &str, probability: f32) -> Self {
        self.entailment_probabilities
            .push((label.to_string(), probability));
        self
    }

    pub fn with_health(mut self, health: ProviderHealth) -> Self {
        self.health = health;
        self
    }

    pub fn with_load_delay(mut self, delay_ms: u64) -> Self {
        self.load_delay_ms = delay_ms;
        self
    }

    /// Counter shared with the provider, readable after it moved into a runtime.
    pub fn load_counter(&self) -> Arc<AtomicU32> {
        self.load_count.clone()
    }

    /// Inference calls across every model this provider loads.
    pub fn inference_counter(&self) -> Arc<AtomicU32> {
        self.inference_count.clone()
    }

    pub fn load_count(&self) -> u32 {
        self.load_count.load(Ordering::SeqCst)
    }

    pub fn warmup_count(&self) -> u32 {
        self.warmup_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_id(&self) -> &'static str {
        self.provider_id
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supported_tasks: self.supported_tasks.clone(),
        }
    }

    async fn load(&self, spec: &ModelAliasSpec) -> Result<LoadedModelHandle> {
        self.load_count.fetch_add(1, Ordering::SeqCst);

        if self.load_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.load_delay_ms)).await;
        }

        if self.fail_on_load {
            return Err(RuntimeError::Load("Mock load failure".to_string()));
        }

        if !self.supported_tasks.contains(&spec.task) {
            return Err(RuntimeError::CapabilityMismatch(format!(
                "Mock provider does not support task {:?}",
                spec.task
            )));
        }

        // Use correct double-Arc wrapping pattern
        match spec.task {
            ModelTask::Ner => {
                let mut model = MockTokenClassifier::new(spec.model_id.clone())
                    .with_failure(self.model_failure)
                    .with_call_tracker(self.inference_count.clone());
                if self.model_delay_ms > 0 {
                    model = model.with_delay(self.model_delay_ms);
                }
                if self.model_fail_count > 0 {
                    model = model.with_fail_count(self.model_fail_count);
                }
                if let Some(tracker) = &self.model_warmup_tracker {
                    model = model.with_warmup_tracker(tracker.clone());
                }
                let handle: Arc<dyn TokenClassifierModel> = Arc::new(model);
                Ok(Arc::new(handle) as LoadedModelHandle)
            }
            ModelTask::ZeroShot => {
                let model = self.entailment_probabilities.iter().fold(
                    MockEntailmentModel::new(spec.model_id.clone())
                        .with_failure(self.model_failure)
                        .with_call_tracker(self.inference_count.clone()),
                    |model, (label, p)| model.with_probability(label, *p),
                );
                let handle: Arc<dyn EntailmentModel> = Arc::new(model);
                Ok(Arc::new(handle) as LoadedModelHandle)
            }
        }
    }

    async fn health(&self) -> ProviderHealth {
        self.health.clone()
    }

    async fn warmup(&self) -> Result<()> {
        self.warmup_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Helper function to create a simple spec
pub fn make_spec(
    alias: &str,
    task: ModelTask,
    provider_id: &str,
    model_id: &str,
) -> ModelAliasSpec {
    ModelAliasSpec {
        alias: alias.to_string(),
        task,
        provider_id: provider_id.to_string(),
        model_id: model_id.to_string(),
        revision: None,
        warmup: WarmupPolicy::Lazy,
        required: false,
        timeout: None,
        load_timeout: None,
        retry: None,
        circuit_breaker: None,
        options: serde_json::Value::Object(serde_json::Map::new()),
    }
}

/// Create a runtime with both mock tasks under `ner/test` and `zero_shot/test`.
pub async fn runtime_with_nlp(provider: MockProvider) -> Result<Arc<ModelRuntime>> {
    let provider_id = provider.provider_id;
    ModelRuntime::builder()
        .register_provider(provider)
        .catalog(vec![
            make_spec("ner/test", ModelTask::Ner, provider_id, "test-ner"),
            make_spec("zero_shot/test", ModelTask::ZeroShot, provider_id, "test-nli"),
        ])
        .build()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tagger_emits_char_spans_and_specials() {
        let model = MockTokenClassifier::new("m".into());
        let out = model.classify_tokens("Ada  visited Paris.").await.unwrap();

        assert!(out.tokens.first().unwrap().is_special);
        assert!(out.tokens.last().unwrap().is_special);
        assert_eq!(out.tokens.len(), out.logits.len());
        assert_eq!(out.tokens[1].span, Some((0, 3)));
        assert_eq!(out.tokens[2].span, Some((5, 12)));
        assert_eq!(out.tokens[3].text, "Paris.");
        assert_eq!(out.tokens[3].span, Some((13, 19)));
    }

    #[tokio::test]
    async fn entailment_logits_reproduce_probability() {
        let model = MockEntailmentModel::new("m".into()).with_probability("politics", 0.7);
        let logits = model
            .entailment_logits("text", &hypothesis("politics"))
            .await
            .unwrap();
        let p = crate::scoring::softmax(&logits)[1];
        assert!((p - 0.7).abs() < 1e-5);
    }
}
