//! Zero-shot classification through natural-language inference.
//!
//! Every candidate label is turned into the hypothesis
//! `"This text is about <label>."` and scored against the text as premise.
//! [`entailment_score`] reduces the model's class logits to a single
//! entailment probability, whatever the number of classes.

use crate::error::Result;
use crate::labels::LabelMap;
use crate::scoring::{sigmoid, softmax};
use crate::traits::EntailmentModel;
use serde::{Deserialize, Serialize};

/// Labels scoring above this are selected in multi-label mode.
pub const MULTI_LABEL_THRESHOLD: f32 = 0.5;

/// Token budget of a premise/hypothesis pair, special tokens included.
pub const MAX_PAIR_TOKENS: usize = 512;

/// The hypothesis sentence for `label`.
pub fn hypothesis(label: &str) -> String {
    format!("This text is about {label}.")
}

/// Logit columns carrying the entailment and contradiction classes.
///
/// Unset columns fall back to defaults chosen from the number of classes the
/// model returns: entailment is column 1 of a binary head and the last column
/// otherwise; contradiction is column 0 (the other column of a binary head).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NliLabels {
    pub entailment: Option<usize>,
    pub contradiction: Option<usize>,
}

impl NliLabels {
    pub fn new(entailment: Option<usize>, contradiction: Option<usize>) -> Self {
        Self {
            entailment,
            contradiction,
        }
    }

    /// Locate the classes by name in a model's `id2label`.
    pub fn from_label_map(labels: &LabelMap) -> Self {
        Self {
            entailment: labels.position_of("entailment"),
            contradiction: labels
                .position_of("contradiction")
                .or_else(|| labels.position_of("not_entailment")),
        }
    }

    /// Explicit column choices take precedence over names.
    pub fn with_overrides(self, entailment: Option<usize>, contradiction: Option<usize>) -> Self {
        Self {
            entailment: entailment.or(self.entailment),
            contradiction: contradiction.or(self.contradiction),
        }
    }

    fn resolve(&self, num_classes: usize) -> (usize, usize) {
        let in_range = |index: Option<usize>| index.filter(|&i| i < num_classes);
        let entailment = in_range(self.entailment).unwrap_or(if num_classes == 2 {
            1
        } else {
            num_classes - 1
        });
        let contradiction = in_range(self.contradiction).unwrap_or(if num_classes == 2 {
            1 - entailment
        } else {
            0
        });
        (entailment, contradiction)
    }
}

/// Entailment probability in `[0, 1]` from one pair's class logits.
///
/// * two classes: softmax over both, probability of the entailment column;
/// * three or more: softmax over the contradiction/entailment pair only, the
///   neutral class is ignored;
/// * a single logit: its sigmoid;
/// * no logits: `0`.
pub fn entailment_score(logits: &[f32], labels: NliLabels) -> f32 {
    match logits.len() {
        0 => 0.0,
        1 => sigmoid(logits[0]),
        n => {
            let (entailment, contradiction) = labels.resolve(n);
            if entailment == contradiction {
                return softmax(logits)[entailment];
            }
            let pair = softmax(&[logits[contradiction], logits[entailment]]);
            pair[1]
        }
    }
}

/// Scores of every candidate label, in the order the labels were given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroShotResult {
    /// The analyzed text.
    pub sequence: String,
    pub labels: Vec<String>,
    /// `scores[i]` is the entailment probability of `labels[i]`.
    pub scores: Vec<f32>,
}

impl ZeroShotResult {
    /// Labels chosen by the decision policy.
    ///
    /// Single-label mode picks the highest score (the earliest label on ties);
    /// multi-label mode keeps every label above [`MULTI_LABEL_THRESHOLD`].
    pub fn selected(&self, multi_label: bool) -> Vec<&str> {
        if multi_label {
            return self
                .labels
                .iter()
                .zip(&self.scores)
                .filter(|(_, score)| **score > MULTI_LABEL_THRESHOLD)
                .map(|(label, _)| label.as_str())
                .collect();
        }
        crate::scoring::argmax(&self.scores)
            .and_then(|(index, _)| self.labels.get(index))
            .map(|label| vec![label.as_str()])
            .unwrap_or_default()
    }
}

/// Score `candidate_labels` against `text`, one entailment call per label.
///
/// An empty label list gives an empty result without calling the model.
pub async fn classify(
    model: &dyn EntailmentModel,
    text: &str,
    candidate_labels: &[String],
) -> Result<ZeroShotResult> {
    let nli_labels = model.nli_labels();
    let mut scores = Vec::with_capacity(candidate_labels.len());

    for label in candidate_labels {
        let logits = model.entailment_logits(text, &hypothesis(label)).await?;
        scores.push(entailment_score(&logits, nli_labels));
    }

    tracing::debug!(
        model = model.model_id(),
        labels = candidate_labels.len(),
        "Zero-shot classification complete"
    );

    Ok(ZeroShotResult {
        sequence: text.to_string(),
        labels: candidate_labels.to_vec(),
        scores,
    })
}
