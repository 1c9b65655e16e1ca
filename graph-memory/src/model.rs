//! Knowledge graph types
//!
//! Value types shared by every backend: entities, relations, the graph
//! aggregate, and the read-only projections returned by summary and search.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum observations returned per entity by `open_nodes`
pub const OPEN_NODES_OBSERVATION_CAP: usize = 100;

/// A named node in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique name within the graph
    pub name: String,
    /// Free-form type label
    pub entity_type: String,
    /// Ordered observations, no duplicates
    #[serde(default)]
    pub observations: Vec<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            observations: Vec::new(),
        }
    }

    /// Append an observation
    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observations.push(observation.into());
        self
    }

    /// Replace all observations
    pub fn with_observations<I, S>(mut self, observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observations = observations.into_iter().map(Into::into).collect();
        self
    }

    /// Append observations not already present, returning the ones added.
    pub fn merge_observations<'a, I>(&mut self, observations: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut added = Vec::new();
        for obs in observations {
            if !self.observations.contains(obs) {
                self.observations.push(obs.clone());
                added.push(obs.clone());
            }
        }
        added
    }
}

/// A directed, typed edge between two entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub from: String,
    pub to: String,
    /// Active-voice verb phrase, e.g. "works_at"
    pub relation_type: String,
}

impl Relation {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation_type: relation_type.into(),
        }
    }

    /// Composite key `(from, to, relation_type)`
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.from, &self.to, &self.relation_type)
    }

    /// Whether `name` is either endpoint
    pub fn touches(&self, name: &str) -> bool {
        self.from == name || self.to == name
    }
}

/// The whole graph, or a slice of it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    /// Set when observations were capped to protect memory
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl KnowledgeGraph {
    pub fn new(entities: Vec<Entity>, relations: Vec<Relation>) -> Self {
        Self {
            entities,
            relations,
            truncated: false,
        }
    }

    /// Cap every entity's observations, flagging the graph if anything was cut.
    pub fn cap_observations(&mut self, cap: usize) {
        for entity in &mut self.entities {
            if entity.observations.len() > cap {
                entity.observations.truncate(cap);
                self.truncated = true;
            }
        }
    }
}

/// Observations to remove from one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationDeletion {
    pub entity_name: String,
    pub observations: Vec<String>,
}

impl ObservationDeletion {
    pub fn new<I, S>(entity_name: impl Into<String>, observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_name: entity_name.into(),
            observations: observations.into_iter().map(Into::into).collect(),
        }
    }
}

/// Lightweight entity listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub name: String,
    pub entity_type: String,
}

/// Counts and a capped entity listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub total_entities: usize,
    pub total_relations: usize,
    /// entity type -> count
    pub entity_types: BTreeMap<String, usize>,
    /// relation type -> count
    pub relation_types: BTreeMap<String, usize>,
    /// Most recently created first
    pub entities: Vec<EntitySummary>,
    pub limit: usize,
    pub has_more: bool,
}

impl GraphSummary {
    /// Build a summary from a graph whose entities are in creation order.
    pub fn from_graph(graph: &KnowledgeGraph, limit: usize) -> Self {
        let mut entity_types = BTreeMap::new();
        for entity in &graph.entities {
            *entity_types.entry(entity.entity_type.clone()).or_insert(0) += 1;
        }

        let mut relation_types = BTreeMap::new();
        for relation in &graph.relations {
            *relation_types
                .entry(relation.relation_type.clone())
                .or_insert(0) += 1;
        }

        let take = if limit == 0 {
            graph.entities.len()
        } else {
            limit
        };
        let entities = graph
            .entities
            .iter()
            .rev()
            .take(take)
            .map(|e| EntitySummary {
                name: e.name.clone(),
                entity_type: e.entity_type.clone(),
            })
            .collect();

        Self {
            total_entities: graph.entities.len(),
            total_relations: graph.relations.len(),
            entity_types,
            relation_types,
            entities,
            limit,
            has_more: limit > 0 && graph.entities.len() > limit,
        }
    }
}

/// One ranked search hit with preview snippets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySearchHit {
    pub name: String,
    pub entity_type: String,
    pub snippets: Vec<String>,
    pub observations_count: usize,
    pub relations_count: usize,
}

/// Ranked search hits with pagination info
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub entities: Vec<EntitySearchHit>,
    pub total: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl SearchResult {
    pub fn empty(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Names in rank order
    pub fn names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }
}

/// How much of the graph `read_graph` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    Full,
    #[default]
    Summary,
}

impl ReadMode {
    /// `"full"` selects the whole graph; anything else is a summary.
    pub fn from_mode(mode: &str) -> Self {
        if mode.eq_ignore_ascii_case("full") {
            Self::Full
        } else {
            Self::Summary
        }
    }
}

/// Result of `read_graph`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphView {
    Full(KnowledgeGraph),
    Summary(GraphSummary),
}

impl GraphView {
    pub fn into_full(self) -> Option<KnowledgeGraph> {
        match self {
            Self::Full(graph) => Some(graph),
            Self::Summary(_) => None,
        }
    }

    pub fn into_summary(self) -> Option<GraphSummary> {
        match self {
            Self::Summary(summary) => Some(summary),
            Self::Full(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_serialization_uses_camel_case() {
        let entity = Entity::new("Alice", "person").with_observation("likes tea");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["entityType"], "person");
        assert_eq!(json["observations"][0], "likes tea");
    }

    #[test]
    fn test_merge_observations_skips_duplicates() {
        let mut entity = Entity::new("Alice", "person").with_observations(["a", "b"]);
        let incoming = vec!["b".to_string(), "c".to_string(), "c".to_string()];
        let added = entity.merge_observations(&incoming);

        assert_eq!(added, vec!["c".to_string()]);
        assert_eq!(entity.observations, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cap_observations_sets_truncated() {
        let many: Vec<String> = (0..150).map(|i| format!("obs {i}")).collect();
        let mut graph = KnowledgeGraph::new(
            vec![
                Entity::new("Big", "thing").with_observations(many),
                Entity::new("Small", "thing").with_observation("one"),
            ],
            vec![],
        );

        graph.cap_observations(OPEN_NODES_OBSERVATION_CAP);
        assert!(graph.truncated);
        assert_eq!(graph.entities[0].observations.len(), 100);
        assert_eq!(graph.entities[1].observations.len(), 1);
    }

    #[test]
    fn test_truncated_omitted_when_false() {
        let json = serde_json::to_string(&KnowledgeGraph::default()).unwrap();
        assert!(!json.contains("truncated"));
    }

    #[test]
    fn test_summary_lists_newest_first() {
        let graph = KnowledgeGraph::new(
            vec![
                Entity::new("A", "x"),
                Entity::new("B", "y"),
                Entity::new("C", "x"),
            ],
            vec![Relation::new("A", "B", "knows")],
        );

        let summary = GraphSummary::from_graph(&graph, 2);
        assert_eq!(summary.total_entities, 3);
        assert_eq!(summary.total_relations, 1);
        assert_eq!(summary.entity_types.get("x"), Some(&2));
        assert_eq!(summary.relation_types.get("knows"), Some(&1));
        let names: Vec<_> = summary.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B"]);
        assert!(summary.has_more);
    }

    #[test]
    fn test_read_mode_from_mode() {
        assert_eq!(ReadMode::from_mode("full"), ReadMode::Full);
        assert_eq!(ReadMode::from_mode("FULL"), ReadMode::Full);
        assert_eq!(ReadMode::from_mode("summary"), ReadMode::Summary);
        assert_eq!(ReadMode::from_mode(""), ReadMode::Summary);
    }

    #[test]
    fn test_relation_touches() {
        let rel = Relation::new("A", "B", "knows");
        assert!(rel.touches("A"));
        assert!(rel.touches("B"));
        assert!(!rel.touches("C"));
        assert_eq!(rel.key(), ("A", "B", "knows"));
    }
}
