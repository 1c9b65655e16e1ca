//! Line-delimited JSON backend
//!
//! The file holds one record per line, entities first, each tagged with a
//! `type` field. Every operation loads the whole file, works on an in-memory
//! copy indexed by name, and mutations write the whole file back.
//!
//! The rewrite is a single `fs::write`, so a crash mid-write can leave a
//! truncated file. Lines that fail to parse are skipped on load.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Storage;
use crate::config::{BackendKind, StorageConfig};
use crate::error::{Result, StorageError};
use crate::model::{
    Entity, GraphSummary, GraphView, KnowledgeGraph, ObservationDeletion, ReadMode, Relation,
    SearchResult, OPEN_NODES_OBSERVATION_CAP,
};
use crate::search::{self, Candidate, QueryTerms};

/// One line of the file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Record {
    Entity {
        name: String,
        #[serde(rename = "entityType")]
        entity_type: String,
        #[serde(default)]
        observations: Vec<String>,
    },
    Relation {
        from: String,
        to: String,
        #[serde(rename = "relationType")]
        relation_type: String,
    },
}

/// The loaded graph with lookup indices
#[derive(Debug, Default)]
struct GraphFile {
    graph: KnowledgeGraph,
    by_name: HashMap<String, usize>,
    relation_keys: HashSet<Relation>,
}

impl GraphFile {
    fn load(path: &Path) -> Result<Self> {
        let mut file = Self::default();
        if !path.exists() {
            return Ok(file);
        }

        let content = fs::read_to_string(path)?;
        let mut skipped = 0usize;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(Record::Entity {
                    name,
                    entity_type,
                    observations,
                }) => {
                    let entity = Entity::new(name, entity_type).with_observations(observations);
                    file.upsert_entity(&entity);
                }
                Ok(Record::Relation {
                    from,
                    to,
                    relation_type,
                }) => {
                    file.push_relation(Relation::new(from, to, relation_type));
                }
                Err(e) => {
                    skipped += 1;
                    log::debug!("Skipping unreadable line: {}", e);
                }
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {} malformed lines in {}", skipped, path.display());
        }
        log::debug!(
            "Loaded {} entities and {} relations from {}",
            file.graph.entities.len(),
            file.graph.relations.len(),
            path.display()
        );
        Ok(file)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        for entity in &self.graph.entities {
            let record = Record::Entity {
                name: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
                observations: entity.observations.clone(),
            };
            out.push_str(&serde_json::to_string(&record)?);
            out.push('\n');
        }
        for relation in &self.graph.relations {
            let record = Record::Relation {
                from: relation.from.clone(),
                to: relation.to.clone(),
                relation_type: relation.relation_type.clone(),
            };
            out.push_str(&serde_json::to_string(&record)?);
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Entity> {
        let idx = *self.by_name.get(name)?;
        self.graph.entities.get_mut(idx)
    }

    fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Insert or merge; returns the entity as stored.
    fn upsert_entity(&mut self, entity: &Entity) -> Entity {
        if let Some(existing) = self.get_mut(&entity.name) {
            existing.entity_type = entity.entity_type.clone();
            existing.merge_observations(&entity.observations);
            return existing.clone();
        }

        let mut fresh = Entity::new(entity.name.clone(), entity.entity_type.clone());
        fresh.merge_observations(&entity.observations);
        self.by_name
            .insert(fresh.name.clone(), self.graph.entities.len());
        self.graph.entities.push(fresh.clone());
        fresh
    }

    fn push_relation(&mut self, relation: Relation) -> bool {
        if !self.relation_keys.insert(relation.clone()) {
            return false;
        }
        self.graph.relations.push(relation);
        true
    }

    /// Insert when both endpoints exist and the key is new.
    fn insert_relation(&mut self, relation: &Relation) -> bool {
        if !self.contains(&relation.from) || !self.contains(&relation.to) {
            return false;
        }
        self.push_relation(relation.clone())
    }

    fn reindex(&mut self) {
        self.by_name = self
            .graph
            .entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        self.relation_keys = self.graph.relations.iter().cloned().collect();
    }

    fn relation_counts(&self) -> HashMap<&str, usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for relation in &self.graph.relations {
            *counts.entry(relation.from.as_str()).or_insert(0) += 1;
            if relation.to != relation.from {
                *counts.entry(relation.to.as_str()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Knowledge graph stored in a single JSONL file
pub struct JsonlStorage {
    path: PathBuf,
    /// Serializes load-modify-save cycles; `true` once initialized
    state: Mutex<bool>,
}

impl JsonlStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            path: config.file_path,
            state: Mutex::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_graph<T>(&self, f: impl FnOnce(&GraphFile) -> Result<T>) -> Result<T> {
        let state = self.state.lock();
        if !*state {
            return Err(StorageError::NotInitialized);
        }
        let file = GraphFile::load(&self.path)?;
        f(&file)
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut GraphFile) -> Result<T>) -> Result<T> {
        let state = self.state.lock();
        if !*state {
            return Err(StorageError::NotInitialized);
        }
        let mut file = GraphFile::load(&self.path)?;
        let out = f(&mut file)?;
        file.save(&self.path)?;
        Ok(out)
    }
}

impl Storage for JsonlStorage {
    fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        *state = true;
        log::debug!("JSONL storage ready at {}", self.path.display());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        *self.state.lock() = false;
        Ok(())
    }

    fn create_entities(&self, entities: &[Entity]) -> Result<Vec<Entity>> {
        self.mutate(|file| Ok(entities.iter().map(|e| file.upsert_entity(e)).collect()))
    }

    fn delete_entities(&self, names: &[String]) -> Result<()> {
        let doomed: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.mutate(|file| {
            file.graph
                .entities
                .retain(|e| !doomed.contains(e.name.as_str()));
            file.graph
                .relations
                .retain(|r| !doomed.contains(r.from.as_str()) && !doomed.contains(r.to.as_str()));
            file.reindex();
            Ok(())
        })
    }

    fn create_relations(&self, relations: &[Relation]) -> Result<Vec<Relation>> {
        self.mutate(|file| {
            Ok(relations
                .iter()
                .filter(|r| file.insert_relation(r))
                .cloned()
                .collect())
        })
    }

    fn delete_relations(&self, relations: &[Relation]) -> Result<()> {
        let doomed: HashSet<&Relation> = relations.iter().collect();
        self.mutate(|file| {
            file.graph.relations.retain(|r| !doomed.contains(r));
            file.reindex();
            Ok(())
        })
    }

    fn add_observations(
        &self,
        observations: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>> {
        self.mutate(|file| {
            if let Some(missing) = observations.keys().find(|name| !file.contains(name)) {
                return Err(StorageError::not_found(missing.clone()));
            }

            let mut added = HashMap::with_capacity(observations.len());
            for (name, contents) in observations {
                if let Some(entity) = file.get_mut(name) {
                    added.insert(name.clone(), entity.merge_observations(contents));
                }
            }
            Ok(added)
        })
    }

    fn delete_observations(&self, deletions: &[ObservationDeletion]) -> Result<()> {
        self.mutate(|file| {
            for deletion in deletions {
                if let Some(entity) = file.get_mut(&deletion.entity_name) {
                    entity
                        .observations
                        .retain(|o| !deletion.observations.contains(o));
                }
            }
            Ok(())
        })
    }

    fn read_graph(&self, mode: ReadMode, limit: usize) -> Result<GraphView> {
        self.with_graph(|file| {
            Ok(match mode {
                ReadMode::Full => GraphView::Full(file.graph.clone()),
                ReadMode::Summary => GraphView::Summary(GraphSummary::from_graph(&file.graph, limit)),
            })
        })
    }

    fn search_nodes(&self, query: &str, limit: usize) -> Result<SearchResult> {
        let terms = QueryTerms::parse(query);
        if terms.is_empty() {
            return Ok(SearchResult::empty(limit));
        }

        self.with_graph(|file| {
            let counts = file.relation_counts();
            let candidates = file.graph.entities.iter().map(|e| {
                let relations = counts.get(e.name.as_str()).copied().unwrap_or(0);
                Candidate::new(e.clone(), relations)
            });
            Ok(search::rank(&terms, candidates, limit, None))
        })
    }

    fn open_nodes(&self, names: &[String]) -> Result<KnowledgeGraph> {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.with_graph(|file| {
            let entities = file
                .graph
                .entities
                .iter()
                .filter(|e| wanted.contains(e.name.as_str()))
                .cloned()
                .collect();
            let relations = file
                .graph
                .relations
                .iter()
                .filter(|r| wanted.contains(r.from.as_str()) || wanted.contains(r.to.as_str()))
                .cloned()
                .collect();

            let mut graph = KnowledgeGraph::new(entities, relations);
            graph.cap_observations(OPEN_NODES_OBSERVATION_CAP);
            Ok(graph)
        })
    }

    fn export_data(&self) -> Result<KnowledgeGraph> {
        self.with_graph(|file| Ok(file.graph.clone()))
    }

    fn import_data(&self, graph: &KnowledgeGraph) -> Result<()> {
        self.mutate(|file| {
            for entity in &graph.entities {
                file.upsert_entity(entity);
            }
            let linked = graph
                .relations
                .iter()
                .filter(|r| file.insert_relation(r))
                .count();
            log::debug!(
                "Imported {} entities and {} of {} relations",
                graph.entities.len(),
                linked,
                graph.relations.len()
            );
            Ok(())
        })
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Jsonl
    }
}
