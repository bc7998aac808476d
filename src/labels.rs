//! Index-to-label maps read from a model's `config.json` (`id2label`).

use crate::error::{Result, RuntimeError};
use serde_json::Value;

/// Ordered class labels of a classification head; position `i` names the
/// class whose logit sits at index `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Build the map from a HuggingFace `config.json` document.
    ///
    /// Returns an empty map when the config carries no `id2label`. Keys must be
    /// the contiguous range `0..n`.
    pub fn from_model_config(config: &Value) -> Result<Self> {
        let Some(id2label) = config.get("id2label") else {
            return Ok(Self::default());
        };
        let Some(entries) = id2label.as_object() else {
            return Err(RuntimeError::Load(
                "config.json 'id2label' must be an object".to_string(),
            ));
        };

        let mut labels = vec![None; entries.len()];
        for (key, value) in entries {
            let index: usize = key.parse().map_err(|_| {
                RuntimeError::Load(format!("config.json id2label key '{}' is not an index", key))
            })?;
            let label = value.as_str().ok_or_else(|| {
                RuntimeError::Load(format!("config.json id2label[{}] must be a string", key))
            })?;
            let slot = labels.get_mut(index).ok_or_else(|| {
                RuntimeError::Load(format!(
                    "config.json id2label index {} is outside 0..{}",
                    index,
                    entries.len()
                ))
            })?;
            *slot = Some(label.to_string());
        }

        let labels = labels
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| RuntimeError::Load("config.json id2label has gaps".to_string()))?;
        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Index of the first label equal to `name`, ignoring ASCII case.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .position(|label| label.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
