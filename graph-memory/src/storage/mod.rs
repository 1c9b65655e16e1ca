//! Storage abstraction
//!
//! One capability trait, two physical representations:
//!
//! - [`JsonlStorage`]: the whole graph as one newline-delimited JSON file,
//!   rewritten on every mutation
//! - [`SqliteStorage`]: normalized tables with cascading deletes and an
//!   optional FTS5 index
//!
//! Callers pick a backend through [`new_storage`] (or [`open_storage`], which
//! also runs the auto-migration policy) and only talk to the trait afterwards.

use std::collections::HashMap;

use crate::config::{detect_backend, BackendKind, StorageConfig};
use crate::error::Result;
use crate::migration::Migrator;
use crate::model::{
    Entity, GraphView, KnowledgeGraph, ObservationDeletion, ReadMode, Relation, SearchResult,
};

mod fts;
pub mod jsonl;
pub mod sqlite;

pub use jsonl::JsonlStorage;
pub use sqlite::{GraphAnalysis, SqliteStorage};

/// Knowledge graph persistence
///
/// Every call is synchronous and runs on the caller's thread. Duplicate and
/// constraint conditions are resolved by merge-or-ignore, never reported.
pub trait Storage: Send + Sync {
    /// Prepare the physical store. Idempotent.
    fn initialize(&self) -> Result<()>;

    /// Release resources held since `initialize`.
    fn close(&self) -> Result<()>;

    /// Insert new entities; existing names get the new type and a union of
    /// observations. Returns the post-merge entities.
    fn create_entities(&self, entities: &[Entity]) -> Result<Vec<Entity>>;

    /// Remove entities and every relation touching them. Unknown names are ignored.
    fn delete_entities(&self, names: &[String]) -> Result<()>;

    /// Insert relations with a novel key whose endpoints both exist. Returns
    /// only the relations actually inserted.
    fn create_relations(&self, relations: &[Relation]) -> Result<Vec<Relation>>;

    /// Remove relations matching exactly on `(from, to, relation_type)`.
    fn delete_relations(&self, relations: &[Relation]) -> Result<()>;

    /// Append non-duplicate observations per entity. Any unknown entity fails
    /// the whole batch with `NotFound` and nothing is written.
    fn add_observations(
        &self,
        observations: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>>;

    /// Remove observations; unknown entities and observations are ignored.
    fn delete_observations(&self, deletions: &[ObservationDeletion]) -> Result<()>;

    /// Whole graph or a summary listing up to `limit` entities (0 = all).
    fn read_graph(&self, mode: ReadMode, limit: usize) -> Result<GraphView>;

    /// Ranked OR-of-words search (`limit` 0 = unlimited).
    fn search_nodes(&self, query: &str, limit: usize) -> Result<SearchResult>;

    /// Named entities plus relations touching any of them, observations capped.
    fn open_nodes(&self, names: &[String]) -> Result<KnowledgeGraph>;

    /// Full graph for migration
    fn export_data(&self) -> Result<KnowledgeGraph>;

    /// Merge-or-insert a full graph
    fn import_data(&self, graph: &KnowledgeGraph) -> Result<()>;

    /// Which representation this is
    fn kind(&self) -> BackendKind;
}

/// Build the backend named by `config.kind` (not yet initialized).
pub fn new_storage(config: &StorageConfig) -> Box<dyn Storage> {
    match config.kind {
        BackendKind::Sqlite => Box::new(SqliteStorage::new(config.clone())),
        BackendKind::Jsonl => Box::new(JsonlStorage::new(config.clone())),
    }
}

/// Resolve, migrate if needed, build and initialize a backend.
///
/// A JSONL config is redirected to an existing `.db` sibling, or with
/// auto-migration on, migrated into one first. A failed migration is logged
/// and the JSONL file keeps serving requests.
pub fn open_storage(config: &StorageConfig) -> Result<Box<dyn Storage>> {
    let mut resolved = config.clone();

    if config.kind == BackendKind::Jsonl {
        let detection = detect_backend(&config.file_path, config.auto_migrate);
        resolved.kind = detection.kind;
        resolved.file_path = detection.path;

        if detection.needs_migration {
            log::info!(
                "Migrating {} to {}",
                config.file_path.display(),
                resolved.file_path.display()
            );
            let migrator = Migrator::new(config.clone()).with_progress(|current, total, message| {
                log::debug!("Migration progress [{}/{}]: {}", current, total, message);
            });

            match migrator.migrate_jsonl_to_sqlite(&config.file_path, &resolved.file_path) {
                Ok(result) => log::info!(
                    "Migrated {} entities and {} relations",
                    result.entities_count,
                    result.relations_count
                ),
                Err(e) => {
                    log::warn!("Migration failed, falling back to JSONL: {}", e);
                    resolved.kind = BackendKind::Jsonl;
                    resolved.file_path = config.file_path.clone();
                }
            }
        }
    }

    let storage = new_storage(&resolved);
    storage.initialize()?;
    log::info!(
        "{} storage opened at: {}",
        storage.kind(),
        resolved.file_path.display()
    );
    Ok(storage)
}
