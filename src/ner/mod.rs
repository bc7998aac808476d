//! Named-entity recognition: BIO decoding, aggregation, chunking and grouping.
//!
//! The pipeline for one document is
//! [`chunk::extract_fragments`] (which calls [`decoder::decode`] per chunk)
//! → [`aggregate::aggregate`] → [`group::group_entities`]. Every step is a pure
//! function of the text and the model output; [`analyze`] strings them together.

pub mod aggregate;
pub mod chunk;
pub mod decoder;
pub mod group;

pub use aggregate::{AggregationStrategy, aggregate};
pub use chunk::DEFAULT_CHUNK_THRESHOLD;
pub use decoder::decode;
pub use group::{GroupedEntities, GroupedEntity, group_entities};

use crate::error::Result;
use crate::traits::TokenClassifierModel;
use serde::{Deserialize, Serialize};

/// Sentinel for a start/end the decoder could not locate in the text.
pub const UNKNOWN_POSITION: i64 = -1;

/// A decoded span before aggregation; offsets are relative to the chunk it
/// came from until shifted.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFragment {
    pub entity_type: String,
    pub text: String,
    pub score: f32,
    pub start: i64,
    pub end: i64,
}

/// A recognized entity in document coordinates.
///
/// For positioned entities `0 <= start <= end <= chars(document)`;
/// `start == -1` means the position is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity text as reconstructed from its tokens.
    pub entity: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Mean of the contributing token probabilities.
    pub score: f32,
    pub start: i64,
    pub end: i64,
}

impl Entity {
    pub fn has_position(&self) -> bool {
        self.start != UNKNOWN_POSITION
    }
}

impl From<EntityFragment> for Entity {
    fn from(fragment: EntityFragment) -> Self {
        Self {
            entity: fragment.text,
            entity_type: fragment.entity_type,
            score: fragment.score,
            start: fragment.start,
            end: fragment.end,
        }
    }
}

/// Knobs of the NER pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NerOptions {
    pub aggregation: AggregationStrategy,
    /// Documents longer than this many characters are split into paragraphs.
    pub chunk_threshold: usize,
}

impl Default for NerOptions {
    fn default() -> Self {
        Self {
            aggregation: AggregationStrategy::Simple,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
        }
    }
}

/// Result of analyzing one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityAnalysis {
    /// Entities in document order.
    pub entities: Vec<Entity>,
    pub grouped_entities: GroupedEntities,
}

/// Recognize, aggregate and group the entities of `text`.
pub async fn analyze(
    model: &dyn TokenClassifierModel,
    text: &str,
    options: &NerOptions,
) -> Result<EntityAnalysis> {
    let fragments = chunk::extract_fragments(model, text, options.chunk_threshold).await?;
    let entities = aggregate(fragments, options.aggregation);
    let grouped_entities = group_entities(&entities);

    tracing::debug!(
        model = model.model_id(),
        mentions = entities.len(),
        unique = grouped_entities.unique_count(),
        "Entity analysis complete"
    );

    Ok(EntityAnalysis {
        entities,
        grouped_entities,
    })
}
