//! Storage configuration
//!
//! Selects the backend, the file it lives in, and the SQLite tuning knobs.
//! Also hosts the path and backend detection rules used when a front end
//! starts up with nothing more than a memory file path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, StorageError};

/// Environment variable consulted when no explicit memory path is given
pub const MEMORY_FILE_ENV: &str = "MEMORY_FILE_PATH";

/// Default migration batch size
pub const DEFAULT_MIGRATION_BATCH: usize = 1000;

const DEFAULT_MEMORY_FILE: &str = "memory.json";
const RELATIONAL_EXTENSIONS: [&str; 3] = ["db", "sqlite", "sqlite3"];

/// Physical storage representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Normalized SQLite tables
    #[default]
    Sqlite,
    /// One JSON record per line, rewritten on every mutation
    Jsonl,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Jsonl => "jsonl",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "jsonl" => Ok(Self::Jsonl),
            _ => Err(StorageError::unknown_backend(s)),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Which backend to build
    pub kind: BackendKind,
    /// Path to the database or JSONL file
    pub file_path: PathBuf,
    /// Migrate a JSONL file to SQLite on startup
    pub auto_migrate: bool,
    /// Records per migration batch
    pub migration_batch: usize,
    /// Enable SQLite write-ahead logging
    pub wal_mode: bool,
    /// SQLite page cache size (pages); 0 leaves the engine default
    pub cache_size: i64,
    /// How long SQLite waits on a locked database
    pub busy_timeout: Duration,
    /// Maintain the FTS5 index alongside the tables
    pub full_text_search: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Sqlite,
            file_path: PathBuf::from("memory.db"),
            auto_migrate: true,
            migration_batch: DEFAULT_MIGRATION_BATCH,
            wal_mode: true,
            cache_size: 10_000,
            busy_timeout: Duration::from_secs(5),
            full_text_search: true,
        }
    }
}

impl StorageConfig {
    /// SQLite store at `path` with default tuning
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: BackendKind::Sqlite,
            file_path: path.into(),
            ..Default::default()
        }
    }

    /// JSONL store at `path`
    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: BackendKind::Jsonl,
            file_path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_auto_migrate(mut self, auto_migrate: bool) -> Self {
        self.auto_migrate = auto_migrate;
        self
    }

    pub fn with_migration_batch(mut self, batch: usize) -> Self {
        self.migration_batch = batch;
        self
    }

    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub fn with_cache_size(mut self, pages: i64) -> Self {
        self.cache_size = pages;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_full_text_search(mut self, enabled: bool) -> Self {
        self.full_text_search = enabled;
        self
    }

    /// Batch size, falling back to the default when unset
    pub fn effective_batch(&self) -> usize {
        if self.migration_batch == 0 {
            DEFAULT_MIGRATION_BATCH
        } else {
            self.migration_batch
        }
    }
}

/// Whether the path carries a SQLite extension
pub fn is_relational_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            RELATIONAL_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// `memory.json` -> `memory.db`; relational paths are returned unchanged.
pub fn relational_path_for(path: &Path) -> PathBuf {
    if is_relational_path(path) {
        path.to_path_buf()
    } else {
        path.with_extension("db")
    }
}

/// Resolve the memory file path.
///
/// Order: explicit argument, `MEMORY_FILE_PATH`, then `memory.json` beside the
/// executable. Relative paths are anchored at the executable's directory.
pub fn resolve_memory_path(explicit: Option<&str>) -> PathBuf {
    let raw = explicit
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(MEMORY_FILE_ENV).ok().filter(|p| !p.is_empty()))
        .unwrap_or_else(|| DEFAULT_MEMORY_FILE.to_string());

    let path = PathBuf::from(raw);
    if path.is_absolute() {
        return path;
    }
    executable_dir().join(path)
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Outcome of backend detection for a memory path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub kind: BackendKind,
    pub path: PathBuf,
    /// A JSONL file must be migrated into `path` before use
    pub needs_migration: bool,
}

/// Decide which backend serves `path`.
pub fn detect_backend(path: &Path, auto_migrate: bool) -> Detection {
    if is_relational_path(path) {
        return Detection {
            kind: BackendKind::Sqlite,
            path: path.to_path_buf(),
            needs_migration: false,
        };
    }

    let sqlite_path = relational_path_for(path);
    if sqlite_path.exists() {
        log::info!("Found existing SQLite database: {}", sqlite_path.display());
        return Detection {
            kind: BackendKind::Sqlite,
            path: sqlite_path,
            needs_migration: false,
        };
    }

    if auto_migrate && path.exists() {
        log::info!(
            "{} will be migrated to SQLite at {}",
            path.display(),
            sqlite_path.display()
        );
        return Detection {
            kind: BackendKind::Sqlite,
            path: sqlite_path,
            needs_migration: true,
        };
    }

    Detection {
        kind: BackendKind::Jsonl,
        path: path.to_path_buf(),
        needs_migration: false,
    }
}
