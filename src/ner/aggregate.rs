//! Merging of adjacent same-type fragments into final entities.

use super::{Entity, EntityFragment, UNKNOWN_POSITION};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How decoded fragments become entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStrategy {
    /// Every fragment becomes one entity.
    None,
    /// Runs of same-type fragments at most one character apart are merged.
    #[default]
    Simple,
}

impl FromStr for AggregationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "simple" => Ok(Self::Simple),
            other => Err(format!("unknown aggregation strategy '{other}'")),
        }
    }
}

impl std::fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Simple => write!(f, "simple"),
        }
    }
}

/// Turn document-ordered fragments into entities.
///
/// Under [`AggregationStrategy::Simple`] a fragment joins the entity before it
/// when both have the same type and `next.start - current.end <= 1`. The merged
/// text is space-joined, `end` comes from the later fragment, and the score is
/// the mean of the running score and the newcomer's. Fragments without a
/// position never merge.
pub fn aggregate(fragments: Vec<EntityFragment>, strategy: AggregationStrategy) -> Vec<Entity> {
    match strategy {
        AggregationStrategy::None => fragments.into_iter().map(Entity::from).collect(),
        AggregationStrategy::Simple => merge_adjacent(fragments),
    }
}

fn merge_adjacent(fragments: Vec<EntityFragment>) -> Vec<Entity> {
    let mut merged: Vec<Entity> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        if let Some(current) = merged.last_mut()
            && current.entity_type == fragment.entity_type
            && current.end != UNKNOWN_POSITION
            && fragment.start != UNKNOWN_POSITION
            && fragment.start - current.end <= 1
        {
            current.entity.push(' ');
            current.entity.push_str(&fragment.text);
            current.end = fragment.end;
            current.score = (current.score + fragment.score) / 2.0;
            continue;
        }
        merged.push(Entity::from(fragment));
    }
    merged
}
