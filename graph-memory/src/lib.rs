//! Graph Memory
//!
//! Persistent knowledge graph storage for AI agent memory: named, typed
//! entities carrying free-text observations, joined by directed, typed
//! relations.
//!
//! ## Features
//!
//! - **Two backends, one trait** - a JSONL file or a SQLite database behind [`Storage`]
//! - **Ranked search** - exact name, partial name, type and content tiers with snippets
//! - **FTS5 indexing** - stemmed prefix matching on SQLite, with a `LIKE` scan fallback
//! - **Verified migration** - batched JSONL to SQLite transfer with backup and checks
//!
//! ## Example
//!
//! ```ignore
//! use graph_memory::{open_storage, Entity, Relation, StorageConfig};
//!
//! let storage = open_storage(&StorageConfig::jsonl("memory.json"))?;
//!
//! storage.create_entities(&[
//!     Entity::new("Alice", "person").with_observation("Prefers Rust"),
//!     Entity::new("Acme", "company"),
//! ])?;
//! storage.create_relations(&[Relation::new("Alice", "Acme", "works_at")])?;
//!
//! let hits = storage.search_nodes("rust", 10)?;
//! ```

pub mod config;
pub mod error;
pub mod migration;
pub mod model;
pub mod search;
pub mod storage;

// Re-exports for convenience
pub use config::{resolve_memory_path, BackendKind, StorageConfig};
pub use error::{Result, StorageError};
pub use migration::{execute_migration, MigrateCommand, MigrationResult, Migrator};
pub use model::{
    Entity, EntitySearchHit, GraphSummary, GraphView, KnowledgeGraph, ObservationDeletion,
    ReadMode, Relation, SearchResult,
};
pub use storage::{new_storage, open_storage, JsonlStorage, SqliteStorage, Storage};
