//! Case-insensitive deduplication of entity mentions per type.

use super::Entity;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::collections::HashMap;

/// All mentions of one entity text (compared lowercase) within one type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct GroupedEntity {
    /// Text of the first mention, original casing.
    pub entity: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub count: usize,
    pub mentions: Vec<Entity>,
}

/// Entity groups keyed by type.
///
/// Types appear in order of their first mention, and groups within a type in
/// order of their first mention. Serializes as a JSON object in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedEntities {
    by_type: Vec<(String, Vec<GroupedEntity>)>,
}

impl GroupedEntities {
    /// Groups for `entity_type`, if any mention had that type.
    pub fn get(&self, entity_type: &str) -> Option<&[GroupedEntity]> {
        self.by_type
            .iter()
            .find(|(ty, _)| ty == entity_type)
            .map(|(_, groups)| groups.as_slice())
    }

    /// Entity types in first-mention order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_type.iter().map(|(ty, _)| ty.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[GroupedEntity])> {
        self.by_type
            .iter()
            .map(|(ty, groups)| (ty.as_str(), groups.as_slice()))
    }

    /// Number of distinct entities across all types.
    pub fn unique_count(&self) -> usize {
        self.by_type.iter().map(|(_, groups)| groups.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// All mentions, type by type, group by group.
    pub fn mentions(&self) -> impl Iterator<Item = &Entity> {
        self.by_type
            .iter()
            .flat_map(|(_, groups)| groups.iter())
            .flat_map(|group| group.mentions.iter())
    }
}

impl Serialize for GroupedEntities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.by_type.len()))?;
        for (ty, groups) in &self.by_type {
            map.serialize_entry(ty, groups)?;
        }
        map.end()
    }
}

/// Group `entities` by type, then by lowercase text.
pub fn group_entities(entities: &[Entity]) -> GroupedEntities {
    let mut by_type: Vec<(String, Vec<GroupedEntity>)> = Vec::new();
    // type -> (slot in `by_type`, lowercase text -> slot in that type's groups)
    let mut index: HashMap<&str, (usize, HashMap<String, usize>)> = HashMap::new();

    for entity in entities {
        let (type_slot, texts) = index.entry(entity.entity_type.as_str()).or_insert_with(|| {
            by_type.push((entity.entity_type.clone(), Vec::new()));
            (by_type.len() - 1, HashMap::new())
        });
        let groups = &mut by_type[*type_slot].1;

        match texts.get(&entity.entity.to_lowercase()) {
            Some(&slot) => {
                let group = &mut groups[slot];
                group.count += 1;
                group.mentions.push(entity.clone());
            }
            None => {
                texts.insert(entity.entity.to_lowercase(), groups.len());
                groups.push(GroupedEntity {
                    entity: entity.entity.clone(),
                    entity_type: entity.entity_type.clone(),
                    count: 1,
                    mentions: vec![entity.clone()],
                });
            }
        }
    }

    GroupedEntities { by_type }
}
