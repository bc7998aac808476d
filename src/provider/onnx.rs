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
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, Tokenizer};

fn load_err(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::Load(e.to_string())
}

fn inference_err(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::InferenceError(e.to_string())
}

/// Local NER and NLI provider running exported models on ONNX Runtime.
///
/// Expects a directory holding `model.onnx`, `tokenizer.json` and
/// `config.json` (the layout produced by `optimum-cli export onnx`). The
/// directory comes from `options.model_dir`, or the cache layout under
/// `UNI_NLP_CACHE_DIR`. Nothing is downloaded.
#[derive(Default)]
pub struct LocalOnnxProvider;

impl LocalOnnxProvider {
    pub fn new() -> Self {
        Self
    }
}

/// Session settings read from the alias options.
#[derive(Debug, Clone)]
struct SessionOptions {
    max_length: usize,
    intra_threads: usize,
    token_type_ids: bool,
}

impl SessionOptions {
    fn from_options(options: &Value) -> Self {
        let default_threads = std::thread::available_parallelism()
            .map(|n| (n.get() / 2).max(1))
            .unwrap_or(1);
        Self {
            max_length: common::max_length(options),
            intra_threads: options
                .get("intra_threads")
                .and_then(Value::as_u64)
                .map(|v| v as usize)
                .unwrap_or(default_threads),
            token_type_ids: options
                .get("token_type_ids")
                .and_then(Value::as_bool)
                .unwrap_or(true),
        }
    }
}

#[async_trait]
impl ModelProvider for LocalOnnxProvider {
    fn provider_id(&self) -> &'static str {
        "local/onnx"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supported_tasks: vec![ModelTask::Ner, ModelTask::ZeroShot],
        }
    }

    async fn load(&self, spec: &ModelAliasSpec) -> Result<LoadedModelHandle> {
        let model_dir = crate::cache::resolve_model_dir("onnx", &spec.model_id, &spec.options);
        let settings = SessionOptions::from_options(&spec.options);

        tracing::info!(
            model = %spec.model_id,
            task = %spec.task,
            dir = %model_dir.display(),
            threads = settings.intra_threads,
            "Initializing ONNX model"
        );

        let engine = {
            let model_dir = model_dir.clone();
            let settings = settings.clone();
            tokio::task::spawn_blocking(move || OnnxEngine::open(&model_dir, settings))
                .await
                .map_err(|e| RuntimeError::Load(format!("Join error: {}", e)))??
        };
        let engine = Arc::new(engine);

        match spec.task {
            ModelTask::Ner => {
                if engine.labels.is_empty() {
                    return Err(RuntimeError::Load(format!(
                        "Model at '{}' declares no id2label; cannot decode entities",
                        model_dir.display()
                    )));
                }
                let model = OnnxTokenClassifier {
                    model_id: spec.model_id.clone(),
                    engine,
                };
                let handle: Arc<dyn TokenClassifierModel> = Arc::new(model);
                Ok(Arc::new(handle) as LoadedModelHandle)
            }
            ModelTask::ZeroShot => {
                let nli_labels = common::nli_labels(&engine.labels, &spec.options);
                let model = OnnxEntailmentModel {
                    model_id: spec.model_id.clone(),
                    engine,
                    nli_labels,
                };
                let handle: Arc<dyn EntailmentModel> = Arc::new(model);
                Ok(Arc::new(handle) as LoadedModelHandle)
            }
        }
    }

    async fn health(&self) -> ProviderHealth {
        ProviderHealth::Healthy
    }
}

/// One ONNX session with its tokenizer and label map.
struct OnnxEngine {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: LabelMap,
    token_type_ids: bool,
}

impl OnnxEngine {
    fn open(dir: &Path, settings: SessionOptions) -> Result<Self> {
        let file = |name: &str| -> Result<PathBuf> {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(RuntimeError::Load(format!(
                    "Missing '{}' in model directory '{}'",
                    name,
                    dir.display()
                )))
            }
        };

        let config = common::read_config(&file("config.json")?)?;
        let labels = LabelMap::from_model_config(&config)?;
        let tokenizer = common::load_tokenizer(&file("tokenizer.json")?, settings.max_length)?;

        let session = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(settings.intra_threads)
            .map_err(load_err)?
            .commit_from_file(file("model.onnx")?)
            .map_err(|e| RuntimeError::Load(format!("Failed to load ONNX model: {}", e)))?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            labels,
            token_type_ids: settings.token_type_ids,
        })
    }

    /// Run one encoding; returns the `logits` output shape and data.
    fn run(&self, encoding: &Encoding) -> Result<(Vec<i64>, Vec<f32>)> {
        let seq_len = encoding.get_ids().len();
        let shape = [1i64, seq_len as i64];
        let column = |values: &[u32]| -> Result<Tensor<i64>> {
            let data: Vec<i64> = values.iter().map(|&v| v as i64).collect();
            Tensor::from_array((shape, data.into_boxed_slice())).map_err(inference_err)
        };

        let input_ids = column(encoding.get_ids())?;
        let attention_mask = column(encoding.get_attention_mask())?;

        let mut session = self.session.lock().unwrap();
        let result = if self.token_type_ids {
            let token_type_ids = column(encoding.get_type_ids())?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])
        };
        let outputs = result
            .map_err(|e| RuntimeError::InferenceError(format!("ONNX inference failed: {}", e)))?;

        let (shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(inference_err)?;
        let dims: &[i64] = shape;
        Ok((dims.to_vec(), data.to_vec()))
    }
}

fn classify_blocking(engine: &OnnxEngine, text: &str) -> Result<TokenLogits> {
    let encoding = common::encode_text(&engine.tokenizer, text)?;
    let tokens = common::tokens_from_encoding(&encoding);
    if tokens.is_empty() {
        return Ok(TokenLogits::default());
    }

    let (dims, data) = engine.run(&encoding)?;
    // [1, seq, labels]
    if dims.len() != 3 || dims[0] != 1 || dims[1] as usize != tokens.len() {
        return Err(RuntimeError::InferenceError(format!(
            "Unexpected logits shape {:?} for {} tokens",
            dims,
            tokens.len()
        )));
    }
    let logits = data
        .chunks(dims[2] as usize)
        .map(<[f32]>::to_vec)
        .collect();
    Ok(TokenLogits::new(tokens, logits))
}

fn entail_blocking(engine: &OnnxEngine, premise: &str, hypothesis: &str) -> Result<Vec<f32>> {
    let encoding = common::encode_pair(&engine.tokenizer, premise, hypothesis)?;
    let (dims, data) = engine.run(&encoding)?;
    // [1, classes]
    if dims.len() != 2 || dims[0] != 1 {
        return Err(RuntimeError::InferenceError(format!(
            "Unexpected logits shape {:?}",
            dims
        )));
    }
    Ok(data)
}

/// Token classifier backed by an ONNX session.
pub struct OnnxTokenClassifier {
    model_id: String,
    engine: Arc<OnnxEngine>,
}

#[async_trait]
impl TokenClassifierModel for OnnxTokenClassifier {
    async fn classify_tokens(&self, text: &str) -> Result<TokenLogits> {
        let engine = self.engine.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || classify_blocking(&engine, &text))
            .await
            .map_err(|e| RuntimeError::InferenceError(format!("Join error: {}", e)))?
    }

    fn labels(&self) -> &LabelMap {
        &self.engine.labels
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn warmup(&self) -> Result<()> {
        self.classify_tokens("warmup").await.map(|_| ())
    }
}

/// NLI sequence classifier backed by an ONNX session.
pub struct OnnxEntailmentModel {
    model_id: String,
    engine: Arc<OnnxEngine>,
    nli_labels: NliLabels,
}

#[async_trait]
impl EntailmentModel for OnnxEntailmentModel {
    async fn entailment_logits(&self, premise: &str, hypothesis: &str) -> Result<Vec<f32>> {
        let engine = self.engine.clone();
        let premise = premise.to_string();
        let hypothesis = hypothesis.to_string();
        tokio::task::spawn_blocking(move || entail_blocking(&engine, &premise, &hypothesis))
            .await
            .map_err(|e| RuntimeError::InferenceError(format!("Join error: {}", e)))?
    }

    fn nli_labels(&self) -> NliLabels {
        self.nli_labels
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn warmup(&self) -> Result<()> {
        self.entailment_logits("warmup", "This text is about warmup.")
            .await
            .map(|_| ())
    }
}
