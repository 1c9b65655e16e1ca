//! JSONL to SQLite migration
//!
//! Moves a JSONL store into a fresh SQLite database in seven steps: check
//! the source, open it, export it, back it up, open the destination, import
//! in batches, verify. The source file is never modified.
//!
//! Verification tolerates relations that point at entities missing from the
//! destination ("orphaned"), which JSONL files accumulate over time.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{is_relational_path, relational_path_for, StorageConfig};
use crate::error::{Result, StorageError};
use crate::model::{KnowledgeGraph, Relation};
use crate::storage::{JsonlStorage, SqliteStorage, Storage};

/// Non-orphaned relations allowed to go missing before verification fails
const MAX_UNEXPLAINED_MISSING: usize = 5;

/// Orphaned relations logged individually
const MAX_LOGGED_ORPHANS: usize = 10;

/// Progress listener: `(current, total, message)`, where total is 100
pub type ProgressFn = Box<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Outcome of one migration run
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationResult {
    pub success: bool,
    /// Nothing was written
    pub dry_run: bool,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    /// Entities found in the source
    pub entities_count: usize,
    /// Relations found in the source
    pub relations_count: usize,
    pub duration: Duration,
    /// Copy of the source taken before the import
    pub backup_path: Option<PathBuf>,
}

/// Runs JSONL to SQLite migrations
pub struct Migrator {
    config: StorageConfig,
    batch_size: usize,
    progress: Option<ProgressFn>,
}

impl Migrator {
    pub fn new(config: StorageConfig) -> Self {
        let batch_size = config.effective_batch();
        Self {
            config,
            batch_size,
            progress: None,
        }
    }

    /// Observe progress; the listener runs synchronously between steps.
    pub fn with_progress<F>(mut self, listener: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(listener));
        self
    }

    fn report(&self, current: usize, total: usize, message: &str) {
        if let Some(listener) = &self.progress {
            listener(current, total, message);
        }
    }

    /// Migrate `jsonl_path` into a SQLite database at `sqlite_path`.
    ///
    /// The database is built at a hidden staging path beside `sqlite_path`
    /// and moved into place only after verification passes, so a failed run
    /// never leaves a database at `sqlite_path`.
    pub fn migrate_jsonl_to_sqlite(
        &self,
        jsonl_path: &Path,
        sqlite_path: &Path,
    ) -> Result<MigrationResult> {
        let started = Instant::now();
        let staging = staging_path_for(sqlite_path)?;

        let (source, graph) = self.read_source(jsonl_path)?;

        let backup = backup_path_for(jsonl_path).and_then(|backup| {
            fs::copy(jsonl_path, &backup)?;
            Ok(backup)
        });
        let backup_path = match backup {
            Ok(backup) => {
                self.report(40, 100, "Created backup");
                Some(backup)
            }
            Err(e) => {
                log::warn!("Failed to create backup of {}: {}", jsonl_path.display(), e);
                None
            }
        };

        if staging.exists() {
            log::warn!("Removing stale staging database {}", staging.display());
            remove_database(&staging)?;
        }

        let outcome = self.build_database(&staging, &graph);
        source.close()?;
        if let Err(e) = outcome {
            if let Err(cleanup) = remove_database(&staging) {
                log::warn!(
                    "Failed to remove staging database {}: {}",
                    staging.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        move_database(&staging, sqlite_path)?;
        self.report(100, 100, "Migration completed successfully!");

        Ok(MigrationResult {
            success: true,
            dry_run: false,
            source_path: jsonl_path.to_path_buf(),
            dest_path: sqlite_path.to_path_buf(),
            entities_count: graph.entities.len(),
            relations_count: graph.relations.len(),
            duration: started.elapsed(),
            backup_path,
        })
    }

    /// Steps five to seven against a fresh database at `path`.
    fn build_database(&self, path: &Path, graph: &KnowledgeGraph) -> Result<()> {
        let dest = SqliteStorage::new(
            StorageConfig::sqlite(path)
                .with_wal_mode(true)
                .with_cache_size(10_000)
                .with_busy_timeout(Duration::from_secs(5))
                .with_full_text_search(self.config.full_text_search),
        );
        dest.initialize()
            .map_err(|e| StorageError::migration(format!("failed to initialize SQLite storage: {}", e)))?;

        self.report(50, 100, "Importing data to SQLite...");
        let outcome = self.import_in_batches(&dest, graph).and_then(|_| {
            self.report(90, 100, "Verifying migration...");
            let imported = dest.export_data()?;
            verify_migration(graph, &imported)
        });

        let closed = dest.close();
        outcome?;
        closed
    }

    /// Steps one to three: check, open and export the source.
    fn read_source(&self, jsonl_path: &Path) -> Result<(JsonlStorage, KnowledgeGraph)> {
        if !jsonl_path.exists() {
            return Err(StorageError::migration(format!(
                "source file does not exist: {}",
                jsonl_path.display()
            )));
        }
        self.report(0, 100, "Initializing migration...");

        let source = JsonlStorage::new(StorageConfig::jsonl(jsonl_path));
        source
            .initialize()
            .map_err(|e| StorageError::migration(format!("failed to initialize JSONL storage: {}", e)))?;

        self.report(10, 100, "Reading source data...");
        let graph = source
            .export_data()
            .map_err(|e| StorageError::migration(format!("failed to export data: {}", e)))?;

        self.report(
            30,
            100,
            &format!(
                "Found {} entities and {} relations",
                graph.entities.len(),
                graph.relations.len()
            ),
        );
        Ok((source, graph))
    }

    fn import_in_batches(&self, dest: &dyn Storage, graph: &KnowledgeGraph) -> Result<()> {
        let total = (graph.entities.len() + graph.relations.len()).max(1);
        let mut done = 0usize;

        for (i, batch) in graph.entities.chunks(self.batch_size).enumerate() {
            let start = i * self.batch_size;
            dest.create_entities(batch).map_err(|e| {
                StorageError::migration(format!(
                    "failed to import entity batch {}-{}: {}",
                    start,
                    start + batch.len(),
                    e
                ))
            })?;
            done += batch.len();
            self.report(
                50 + done * 40 / total,
                100,
                &format!("Imported {}/{} entities", start + batch.len(), graph.entities.len()),
            );
        }

        for (i, batch) in graph.relations.chunks(self.batch_size).enumerate() {
            let start = i * self.batch_size;
            dest.create_relations(batch).map_err(|e| {
                StorageError::migration(format!(
                    "failed to import relation batch {}-{}: {}",
                    start,
                    start + batch.len(),
                    e
                ))
            })?;
            done += batch.len();
            self.report(
                50 + done * 40 / total,
                100,
                &format!("Imported {}/{} relations", start + batch.len(), graph.relations.len()),
            );
        }

        Ok(())
    }

    /// Migrate `memory_path` to its `.db` sibling when that makes sense.
    ///
    /// Returns `None` when the path is already relational, the file does not
    /// exist, or the database is already there.
    pub fn auto_migrate(&self, memory_path: &Path) -> Result<Option<MigrationResult>> {
        if is_relational_path(memory_path) || !memory_path.exists() {
            return Ok(None);
        }

        let sqlite_path = relational_path_for(memory_path);
        if sqlite_path.exists() {
            log::info!(
                "SQLite database already exists at {}, skipping migration",
                sqlite_path.display()
            );
            return Ok(None);
        }

        log::info!(
            "Auto-migrating from {} to {}",
            memory_path.display(),
            sqlite_path.display()
        );
        self.migrate_jsonl_to_sqlite(memory_path, &sqlite_path)
            .map(Some)
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StorageError::invalid_path(path.display().to_string()))
}

/// `.memory.json.backup_20240131_235959` beside the original
fn backup_path_for(path: &Path) -> Result<PathBuf> {
    let base = file_name_of(path)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    Ok(path.with_file_name(format!(".{}.backup_{}", base, stamp)))
}

/// `.memory.db.migrating` beside the destination
fn staging_path_for(path: &Path) -> Result<PathBuf> {
    let base = file_name_of(path)?;
    Ok(path.with_file_name(format!(".{}.migrating", base)))
}

/// Compare a migrated graph against its source.
pub fn verify_migration(source: &KnowledgeGraph, dest: &KnowledgeGraph) -> Result<()> {
    if source.entities.len() != dest.entities.len() {
        return Err(StorageError::verification(format!(
            "entity count mismatch: source={}, dest={}",
            source.entities.len(),
            dest.entities.len()
        )));
    }

    if source.relations.len() != dest.relations.len() {
        log::warn!(
            "Relation count mismatch: source={}, dest={}",
            source.relations.len(),
            dest.relations.len()
        );

        let present: HashSet<(&str, &str, &str)> =
            dest.relations.iter().map(Relation::key).collect();
        let names: HashSet<&str> = dest.entities.iter().map(|e| e.name.as_str()).collect();

        let mut missing = 0usize;
        let mut orphaned = 0usize;
        for relation in source.relations.iter().filter(|r| !present.contains(&r.key())) {
            missing += 1;
            if names.contains(relation.from.as_str()) && names.contains(relation.to.as_str()) {
                log::warn!(
                    "Missing relation: {} -> {} ({})",
                    relation.from,
                    relation.to,
                    relation.relation_type
                );
            } else {
                orphaned += 1;
                if orphaned <= MAX_LOGGED_ORPHANS {
                    log::info!(
                        "Orphaned relation (missing entity): {} -> {} ({})",
                        relation.from,
                        relation.to,
                        relation.relation_type
                    );
                }
            }
        }

        let unexplained = missing - orphaned;
        if unexplained > MAX_UNEXPLAINED_MISSING {
            return Err(StorageError::verification(format!(
                "relation count mismatch: source={}, dest={} (missing: {}, orphaned: {}, non-orphaned missing: {})",
                source.relations.len(),
                dest.relations.len(),
                missing,
                orphaned,
                unexplained
            )));
        }
        if orphaned > 0 {
            log::info!("Removed {} orphaned relations during migration", orphaned);
        }
        if unexplained > 0 {
            log::warn!("{} valid relations were not migrated", unexplained);
        }
    }

    spot_check(source, dest)
}

/// First, middle and last source entity must match on type and observation count.
fn spot_check(source: &KnowledgeGraph, dest: &KnowledgeGraph) -> Result<()> {
    let n = source.entities.len();
    if n == 0 {
        return Ok(());
    }

    let mut indices = vec![0, n / 2, n - 1];
    indices.dedup();

    for idx in indices {
        let expected = &source.entities[idx];
        let actual = dest
            .entities
            .iter()
            .find(|e| e.name == expected.name)
            .ok_or_else(|| {
                StorageError::verification(format!(
                    "entity {} not found in destination",
                    expected.name
                ))
            })?;

        if expected.entity_type != actual.entity_type {
            return Err(StorageError::verification(format!(
                "entity type mismatch for {}: source={}, dest={}",
                expected.name, expected.entity_type, actual.entity_type
            )));
        }
        if expected.observations.len() != actual.observations.len() {
            return Err(StorageError::verification(format!(
                "observation count mismatch for {}: source={}, dest={}",
                expected.name,
                expected.observations.len(),
                actual.observations.len()
            )));
        }
    }
    Ok(())
}

/// Standalone migration request
#[derive(Debug, Clone, Default)]
pub struct MigrateCommand {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Read and report only
    pub dry_run: bool,
    /// Replace an existing destination
    pub force: bool,
    /// Log progress
    pub verbose: bool,
}

/// Run a [`MigrateCommand`].
///
/// A dry run reads the source and reports counts without writing anything.
/// Otherwise an existing destination is refused unless `force` is set, in
/// which case it is removed along with its WAL side files.
pub fn execute_migration(cmd: &MigrateCommand) -> Result<MigrationResult> {
    let mut migrator = Migrator::new(StorageConfig::default());
    if cmd.verbose {
        migrator = migrator.with_progress(|current, total, message| {
            log::info!("[{}%] {}", current * 100 / total.max(1), message);
        });
    }

    if cmd.dry_run {
        let started = Instant::now();
        log::info!(
            "DRY RUN: would migrate from {} to {}",
            cmd.source.display(),
            cmd.destination.display()
        );
        let (source, graph) = migrator.read_source(&cmd.source)?;
        source.close()?;
        log::info!(
            "Would migrate {} entities and {} relations",
            graph.entities.len(),
            graph.relations.len()
        );
        return Ok(MigrationResult {
            success: true,
            dry_run: true,
            source_path: cmd.source.clone(),
            dest_path: cmd.destination.clone(),
            entities_count: graph.entities.len(),
            relations_count: graph.relations.len(),
            duration: started.elapsed(),
            backup_path: None,
        });
    }

    if cmd.destination.exists() {
        if !cmd.force {
            return Err(StorageError::migration(format!(
                "destination file already exists: {} (use --force to overwrite)",
                cmd.destination.display()
            )));
        }
        remove_database(&cmd.destination)?;
        log::info!("Removed existing destination {}", cmd.destination.display());
    }

    let result = migrator.migrate_jsonl_to_sqlite(&cmd.source, &cmd.destination)?;
    log::info!("Migration completed successfully!");
    log::info!("  Entities migrated: {}", result.entities_count);
    log::info!("  Relations migrated: {}", result.relations_count);
    log::info!("  Duration: {:?}", result.duration);
    if let Some(backup) = &result.backup_path {
        log::info!("  Backup saved to: {}", backup.display());
    }
    Ok(result)
}

const SIDE_FILE_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove a database file and its WAL side files, whichever exist.
fn remove_database(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    for suffix in SIDE_FILE_SUFFIXES {
        let side = with_suffix(path, suffix);
        if side.exists() {
            fs::remove_file(&side)?;
        }
    }
    log::debug!("Removed database {}", path.display());
    Ok(())
}

/// Rename a closed database and its side files; stale side files at the
/// target are dropped.
fn move_database(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)?;
    for suffix in SIDE_FILE_SUFFIXES {
        let side = with_suffix(from, suffix);
        let target = with_suffix(to, suffix);
        if side.exists() {
            fs::rename(&side, &target)?;
        } else if target.is_file() {
            fs::remove_file(&target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, ReadMode};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn write_jsonl(path: &Path, graph: &KnowledgeGraph) {
        let storage = JsonlStorage::new(StorageConfig::jsonl(path));
        storage.initialize().unwrap();
        storage.import_data(graph).unwrap();
    }

    fn sample_graph(entities: usize) -> KnowledgeGraph {
        let entities: Vec<Entity> = (0..entities)
            .map(|i| {
                Entity::new(format!("entity-{i}"), if i % 2 == 0 { "even" } else { "odd" })
                    .with_observations((0..(i % 4)).map(|j| format!("fact {j} about {i}")))
            })
            .collect();
        let relations = entities
            .windows(2)
            .map(|pair| Relation::new(&pair[0].name, &pair[1].name, "precedes"))
            .collect();
        KnowledgeGraph::new(entities, relations)
    }

    fn export_sqlite(path: &Path) -> KnowledgeGraph {
        let storage = SqliteStorage::new(StorageConfig::sqlite(path));
        storage.initialize().unwrap();
        storage
            .read_graph(ReadMode::Full, 0)
            .unwrap()
            .into_full()
            .unwrap()
    }

    #[test]
    fn test_round_trip_in_small_batches() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        let db = dir.path().join("memory.db");
        let graph = sample_graph(25);
        write_jsonl(&jsonl, &graph);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let migrator = Migrator::new(StorageConfig::default().with_migration_batch(7))
            .with_progress(move |current, _, _| sink.lock().unwrap().push(current));

        let result = migrator.migrate_jsonl_to_sqlite(&jsonl, &db).unwrap();
        assert!(result.success);
        assert!(!result.dry_run);
        assert_eq!(result.entities_count, 25);
        assert_eq!(result.relations_count, 24);

        let migrated = export_sqlite(&db);
        assert_eq!(migrated.entities.len(), 25);
        assert_eq!(migrated.relations.len(), 24);
        for (before, after) in graph.entities.iter().zip(&migrated.entities) {
            assert_eq!(before.name, after.name);
            assert_eq!(before.entity_type, after.entity_type);
            assert_eq!(before.observations, after.observations);
        }

        let progress = seen.lock().unwrap();
        assert_eq!(progress.first(), Some(&0));
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_backup_written_beside_source() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        write_jsonl(&jsonl, &sample_graph(3));

        let result = Migrator::new(StorageConfig::default())
            .migrate_jsonl_to_sqlite(&jsonl, &dir.path().join("memory.db"))
            .unwrap();

        let backup = result.backup_path.unwrap();
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".memory.json.backup_"));
        assert_eq!(
            fs::read_to_string(&backup).unwrap(),
            fs::read_to_string(&jsonl).unwrap()
        );
    }

    #[test]
    fn test_orphaned_relations_tolerated() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        let mut content = String::new();
        for name in ["A", "B"] {
            content.push_str(&format!(
                "{{\"type\":\"entity\",\"name\":\"{name}\",\"entityType\":\"t\"}}\n"
            ));
        }
        content.push_str("{\"type\":\"relation\",\"from\":\"A\",\"to\":\"B\",\"relationType\":\"knows\"}\n");
        for ghost in ["X", "Y", "Z"] {
            content.push_str(&format!(
                "{{\"type\":\"relation\",\"from\":\"A\",\"to\":\"{ghost}\",\"relationType\":\"knew\"}}\n"
            ));
        }
        fs::write(&jsonl, content).unwrap();

        let db = dir.path().join("memory.db");
        let result = Migrator::new(StorageConfig::default())
            .migrate_jsonl_to_sqlite(&jsonl, &db)
            .unwrap();

        assert!(result.success);
        assert_eq!(result.relations_count, 4);
        assert_eq!(export_sqlite(&db).relations.len(), 1);
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let err = Migrator::new(StorageConfig::default())
            .migrate_jsonl_to_sqlite(&dir.path().join("nope.json"), &dir.path().join("nope.db"))
            .unwrap_err();

        assert!(matches!(err, StorageError::Migration(_)));
        assert!(!dir.path().join("nope.db").exists());
    }

    #[test]
    fn test_verify_entity_count_mismatch() {
        let source = sample_graph(3);
        let mut dest = source.clone();
        dest.entities.pop();
        dest.relations.pop();

        let err = verify_migration(&source, &dest).unwrap_err();
        assert!(err.to_string().contains("entity count mismatch"));
    }

    #[test]
    fn test_verify_non_orphaned_loss_threshold() {
        let source = sample_graph(10);

        let mut five_lost = source.clone();
        five_lost.relations.truncate(source.relations.len() - 5);
        assert!(verify_migration(&source, &five_lost).is_ok());

        let mut six_lost = source.clone();
        six_lost.relations.truncate(source.relations.len() - 6);
        let err = verify_migration(&source, &six_lost).unwrap_err();
        assert!(matches!(err, StorageError::Verification(_)));
        assert!(err.to_string().contains("non-orphaned missing: 6"));
    }

    #[test]
    fn test_verify_spot_check_catches_type_change() {
        let source = sample_graph(5);
        let mut dest = source.clone();
        dest.entities[2].entity_type = "changed".to_string();

        let err = verify_migration(&source, &dest).unwrap_err();
        assert!(err.to_string().contains("entity type mismatch for entity-2"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        write_jsonl(&jsonl, &sample_graph(4));
        let before: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();

        let result = execute_migration(&MigrateCommand {
            source: jsonl.clone(),
            destination: dir.path().join("memory.db"),
            dry_run: true,
            ..Default::default()
        })
        .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.entities_count, 4);
        assert_eq!(result.relations_count, 3);
        assert!(result.backup_path.is_none());
        assert!(!dir.path().join("memory.db").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), before.len());
    }

    #[test]
    fn test_existing_destination_requires_force() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        let db = dir.path().join("memory.db");
        write_jsonl(&jsonl, &sample_graph(2));
        fs::write(&db, "stale").unwrap();
        fs::write(dir.path().join("memory.db-wal"), "stale").unwrap();

        let mut cmd = MigrateCommand {
            source: jsonl,
            destination: db.clone(),
            verbose: true,
            ..Default::default()
        };
        let err = execute_migration(&cmd).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(fs::read_to_string(&db).unwrap(), "stale");

        cmd.force = true;
        let result = execute_migration(&cmd).unwrap();
        assert!(result.success);
        assert_eq!(export_sqlite(&db).entities.len(), 2);
    }

    #[test]
    fn test_auto_migrate_policy() {
        let dir = TempDir::new().unwrap();
        let migrator = Migrator::new(StorageConfig::default());

        let jsonl = dir.path().join("memory.json");
        assert!(migrator.auto_migrate(&jsonl).unwrap().is_none());
        assert!(migrator
            .auto_migrate(&dir.path().join("graph.sqlite"))
            .unwrap()
            .is_none());

        write_jsonl(&jsonl, &sample_graph(2));
        let result = migrator.auto_migrate(&jsonl).unwrap().unwrap();
        assert_eq!(result.dest_path, dir.path().join("memory.db"));

        assert!(migrator.auto_migrate(&jsonl).unwrap().is_none());
    }

    #[test]
    fn test_database_staged_until_verified() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        let db = dir.path().join("memory.db");
        let staging = staging_path_for(&db).unwrap();
        write_jsonl(&jsonl, &sample_graph(4));

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let (db_at_verify, staging_at_verify) = (db.clone(), staging.clone());
        let migrator = Migrator::new(StorageConfig::default()).with_progress(move |current, _, _| {
            if current == 90 {
                *sink.lock().unwrap() = Some((db_at_verify.exists(), staging_at_verify.exists()));
            }
        });

        migrator.migrate_jsonl_to_sqlite(&jsonl, &db).unwrap();

        assert_eq!(*seen.lock().unwrap(), Some((false, true)));
        assert!(db.exists());
        assert!(!staging.exists());
        assert_eq!(export_sqlite(&db).entities.len(), 4);
    }

    #[test]
    fn test_stale_staging_database_replaced() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        let db = dir.path().join("memory.db");
        let staging = staging_path_for(&db).unwrap();
        write_jsonl(&jsonl, &sample_graph(3));
        fs::write(&staging, "half written").unwrap();
        fs::write(with_suffix(&staging, "-wal"), "half written").unwrap();

        let result = Migrator::new(StorageConfig::default())
            .migrate_jsonl_to_sqlite(&jsonl, &db)
            .unwrap();

        assert!(result.success);
        assert!(!staging.exists());
        assert!(!with_suffix(&staging, "-wal").exists());
        assert_eq!(export_sqlite(&db).entities.len(), 3);
    }

    #[test]
    fn test_backup_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        write_jsonl(&jsonl, &sample_graph(2));

        // Occupy every backup name the run could pick with a directory.
        let now = chrono::Local::now();
        for offset in 0..10 {
            let stamp = (now + chrono::Duration::seconds(offset)).format("%Y%m%d_%H%M%S");
            fs::create_dir(dir.path().join(format!(".memory.json.backup_{}", stamp))).unwrap();
        }

        let db = dir.path().join("memory.db");
        let result = Migrator::new(StorageConfig::default())
            .migrate_jsonl_to_sqlite(&jsonl, &db)
            .unwrap();

        assert!(result.success);
        assert!(result.backup_path.is_none());
        assert_eq!(export_sqlite(&db).entities.len(), 2);
    }

    #[test]
    fn test_paths_without_file_name_rejected() {
        let root = Path::new("/");
        assert!(matches!(backup_path_for(root), Err(StorageError::InvalidPath(_))));
        assert!(matches!(staging_path_for(root), Err(StorageError::InvalidPath(_))));

        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("memory.json");
        write_jsonl(&jsonl, &sample_graph(1));
        let err = Migrator::new(StorageConfig::default())
            .migrate_jsonl_to_sqlite(&jsonl, root)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }
}
