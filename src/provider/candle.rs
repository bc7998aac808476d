use crate::api::{ModelAliasSpec, ModelTask};
use crate::error::{Result, RuntimeError};
use crate::labels::LabelMap;
use crate::provider::common;
use crate::traits::{
    EntailmentModel, LoadedModelHandle, ModelProvider, ProviderCapabilities, ProviderHealth,
    TokenClassifierModel, TokenLogits,
};
use crate::zero_shot::NliLabels;
use async_trait::async_trait;
use candle_core::{Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{
    Repo, RepoType,
    api::tokio::{Api, ApiBuilder, ApiRepo},
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;

fn load_err(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::Load(e.to_string())
}

fn inference_err(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::InferenceError(e.to_string())
}

/// Local NER and NLI provider using the
/// [Candle](https://github.com/huggingface/candle) ML framework.
///
/// Loads BERT checkpoints with a token-classification head (`ner`) or a
/// sequence-classification head (`zero_shot`) from HuggingFace Hub. The model
/// config is fetched at load time so labels are known up front; weights and
/// tokenizer are fetched lazily on first inference or warmup.
#[derive(Default)]
pub struct LocalCandleProvider;

impl LocalCandleProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelProvider for LocalCandleProvider {
    fn provider_id(&self) -> &'static str {
        "local/candle"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supported_tasks: vec![ModelTask::Ner, ModelTask::ZeroShot],
        }
    }

    async fn load(&self, spec: &ModelAliasSpec) -> Result<LoadedModelHandle> {
        let cache_dir = crate::cache::resolve_cache_dir("candle", &spec.model_id, &spec.options);
        let source = HubSource {
            model_id: spec.model_id.clone(),
            revision: spec.revision.clone(),
            cache_dir,
        };

        let config = source.config().await?;
        let labels = LabelMap::from_model_config(&config)?;
        let max_length = common::max_length(&spec.options);

        tracing::info!(
            model = %spec.model_id,
            task = %spec.task,
            labels = labels.len(),
            "Initializing Candle model"
        );

        match spec.task {
            ModelTask::Ner => {
                if labels.is_empty() {
                    return Err(RuntimeError::Load(format!(
                        "Model '{}' declares no id2label; cannot decode entities",
                        spec.model_id
                    )));
                }
                let model = CandleTokenClassifier {
                    source,
                    config,
                    labels,
                    max_length,
                    state: Mutex::new(None),
                };
                let handle: Arc<dyn TokenClassifierModel> = Arc::new(model);
                Ok(Arc::new(handle) as LoadedModelHandle)
            }
            ModelTask::ZeroShot => {
                let nli_labels = common::nli_labels(&labels, &spec.options);
                let model = CandleEntailmentModel {
                    source,
                    config,
                    nli_labels,
                    max_length,
                    state: Mutex::new(None),
                };
                let handle: Arc<dyn EntailmentModel> = Arc::new(model);
                Ok(Arc::new(handle) as LoadedModelHandle)
            }
        }
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth::Healthy
    }

    async fn warmup(&self) -> Result<()> {
        tracing::info!("Warming up LocalCandleProvider");
        // Pre-initialize HF API to warm up network/cache
        let _ = Api::new().map_err(load_err)?;
        Ok(())
    }
}

/// A linear layer stored under the first of `prefixes` present in the weights.
struct Head {
    prefixes: &'static [&'static str],
    in_dim: usize,
    out_dim: usize,
}

/// Where a model's files come from.
struct HubSource {
    model_id: String,
    revision: Option<String>,
    cache_dir: PathBuf,
}

impl HubSource {
    fn repo(&self) -> Result<ApiRepo> {
        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .build()
            .map_err(load_err)?;
        let repo = match &self.revision {
            Some(rev) => Repo::with_revision(self.model_id.clone(), RepoType::Model, rev.clone()),
            None => Repo::model(self.model_id.clone()),
        };
        Ok(api.repo(repo))
    }

    async fn config(&self) -> Result<Value> {
        let path = self.repo()?.get("config.json").await.map_err(load_err)?;
        common::read_config(&path)
    }

    /// Download tokenizer and weights, then build the encoder and `heads`.
    async fn fetch(
        &self,
        config: &Value,
        max_length: usize,
        heads: &[Head],
    ) -> Result<LoadedEncoder> {
        let repo = self.repo()?;
        let tokenizer_path = repo.get("tokenizer.json").await.map_err(load_err)?;
        let tokenizer = common::load_tokenizer(&tokenizer_path, max_length)?;

        let device = select_device()?;
        let vb = match repo.get("model.safetensors").await {
            Ok(weights) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights], DTYPE, &device)
                    .map_err(load_err)?
            },
            Err(e) => {
                tracing::warn!(model = %self.model_id, error = %e, "No safetensors weights, trying pytorch_model.bin");
                let weights = repo.get("pytorch_model.bin").await.map_err(load_err)?;
                VarBuilder::from_pth(&weights, DTYPE, &device).map_err(load_err)?
            }
        };

        let bert_config: BertConfig = serde_json::from_value(config.clone()).map_err(load_err)?;
        let encoder = BertModel::load(vb.clone(), &bert_config).map_err(load_err)?;

        let mut linears = Vec::with_capacity(heads.len());
        for head in heads {
            let linear = head
                .prefixes
                .iter()
                .find_map(|prefix| candle_nn::linear(head.in_dim, head.out_dim, vb.pp(*prefix)).ok())
                .ok_or_else(|| {
                    RuntimeError::Load(format!(
                        "Model '{}' has no weights for head '{}'",
                        self.model_id,
                        head.prefixes.join("' or '")
                    ))
                })?;
            linears.push(linear);
        }

        Ok(LoadedEncoder {
            encoder,
            heads: linears,
            tokenizer,
            device,
        })
    }
}

fn select_device() -> Result<Device> {
    #[cfg(feature = "gpu-cuda")]
    {
        Device::cuda_if_available(0).map_err(load_err)
    }
    #[cfg(not(feature = "gpu-cuda"))]
    {
        Ok(Device::Cpu)
    }
}

struct LoadedEncoder {
    encoder: BertModel,
    heads: Vec<Linear>,
    tokenizer: Tokenizer,
    device: Device,
}

impl LoadedEncoder {
    /// Hidden states `[1, seq, hidden]` for one encoding.
    fn hidden_states(&self, encoding: &tokenizers::Encoding) -> Result<Tensor> {
        let row = |values: &[u32]| -> Result<Tensor> {
            Tensor::new(values, &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(inference_err)
        };
        let input_ids = row(encoding.get_ids())?;
        let token_type_ids = row(encoding.get_type_ids())?;
        let attention_mask = row(encoding.get_attention_mask())?;
        self.encoder
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(inference_err)
    }

    /// Token logits through the single `classifier` head.
    fn classify(&self, text: &str) -> Result<TokenLogits> {
        let encoding = common::encode_text(&self.tokenizer, text)?;
        let tokens = common::tokens_from_encoding(&encoding);
        if tokens.is_empty() {
            return Ok(TokenLogits::default());
        }

        let hidden = self.hidden_states(&encoding)?;
        let logits: Vec<Vec<f32>> = self.heads[0]
            .forward(&hidden)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec2())
            .map_err(inference_err)?;

        Ok(TokenLogits::new(tokens, logits))
    }

    /// Pair logits through the pooler and `classifier` heads.
    fn entail(&self, premise: &str, hypothesis: &str) -> Result<Vec<f32>> {
        let encoding = common::encode_pair(&self.tokenizer, premise, hypothesis)?;
        let hidden = self.hidden_states(&encoding)?;

        let cls = hidden
            .narrow(1, 0, 1)
            .and_then(|t| t.squeeze(1))
            .map_err(inference_err)?;
        let pooled = self.heads[0]
            .forward(&cls)
            .and_then(|t| t.tanh())
            .map_err(inference_err)?;
        self.heads[1]
            .forward(&pooled)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1())
            .map_err(inference_err)
    }
}

/// BERT token classifier: encoder plus a linear `classifier` head.
pub struct CandleTokenClassifier {
    source: HubSource,
    config: Value,
    labels: LabelMap,
    max_length: usize,
    state: Mutex<Option<Arc<LoadedEncoder>>>,
}

impl CandleTokenClassifier {
    async fn ensure_loaded(&self) -> Result<Arc<LoadedEncoder>> {
        let mut state = self.state.lock().await;
        if let Some(loaded) = state.as_ref() {
            return Ok(loaded.clone());
        }

        tracing::info!(model = %self.source.model_id, "Loading Candle token classifier");
        let hidden = common::hidden_size(&self.config)?;
        let loaded = self
            .source
            .fetch(
                &self.config,
                self.max_length,
                &[Head {
                    prefixes: &["classifier"],
                    in_dim: hidden,
                    out_dim: self.labels.len(),
                }],
            )
            .await?;
        tracing::info!(model = %self.source.model_id, "Candle token classifier loaded");

        let loaded = Arc::new(loaded);
        *state = Some(loaded.clone());
        Ok(loaded)
    }
}

#[async_trait]
impl TokenClassifierModel for CandleTokenClassifier {
    async fn classify_tokens(&self, text: &str) -> Result<TokenLogits> {
        let loaded = self.ensure_loaded().await?;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || loaded.classify(&text))
            .await
            .map_err(|e| RuntimeError::InferenceError(format!("Join error: {}", e)))?
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn model_id(&self) -> &str {
        &self.source.model_id
    }

    async fn warmup(&self) -> Result<()> {
        self.ensure_loaded().await.map(|_| ())
    }
}

/// BERT sequence classifier fine-tuned on NLI: encoder, tanh pooler over
/// `[CLS]`, linear `classifier` head.
pub struct CandleEntailmentModel {
    source: HubSource,
    config: Value,
    nli_labels: NliLabels,
    max_length: usize,
    state: Mutex<Option<Arc<LoadedEncoder>>>,
}

impl CandleEntailmentModel {
    async fn ensure_loaded(&self) -> Result<Arc<LoadedEncoder>> {
        let mut state = self.state.lock().await;
        if let Some(loaded) = state.as_ref() {
            return Ok(loaded.clone());
        }

        let hidden = common::hidden_size(&self.config)?;
        let num_labels = LabelMap::from_model_config(&self.config)?.len().max(2);

        tracing::info!(model = %self.source.model_id, num_labels, "Loading Candle NLI model");
        let loaded = self
            .source
            .fetch(
                &self.config,
                self.max_length,
                &[
                    Head {
                        prefixes: &["bert.pooler.dense", "pooler.dense"],
                        in_dim: hidden,
                        out_dim: hidden,
                    },
                    Head {
                        prefixes: &["classifier"],
                        in_dim: hidden,
                        out_dim: num_labels,
                    },
                ],
            )
            .await?;
        tracing::info!(model = %self.source.model_id, "Candle NLI model loaded");

        let loaded = Arc::new(loaded);
        *state = Some(loaded.clone());
        Ok(loaded)
    }
}

#[async_trait]
impl EntailmentModel for CandleEntailmentModel {
    async fn entailment_logits(&self, premise: &str, hypothesis: &str) -> Result<Vec<f32>> {
        let loaded = self.ensure_loaded().await?;
        let premise = premise.to_string();
        let hypothesis = hypothesis.to_string();
        tokio::task::spawn_blocking(move || loaded.entail(&premise, &hypothesis))
            .await
            .map_err(|e| RuntimeError::InferenceError(format!("Join error: {}", e)))?
    }

    fn nli_labels(&self) -> NliLabels {
        self.nli_labels
    }

    fn model_id(&self) -> &str {
        &self.source.model_id
    }

    async fn warmup(&self) -> Result<()> {
        self.ensure_loaded().await.map(|_| ())
    }
}
