//! SQLite backend
//!
//! Entities, observations and relations live in separate tables keyed by
//! integer ids, with `ON DELETE CASCADE` doing the relation and observation
//! cleanup. Every mutating call runs in a single transaction.
//!
//! Search goes through the FTS5 index when it is available and falls back
//! to `LIKE` scans otherwise; either way candidates are ranked by
//! [`search::rank`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{fts, Storage};
use crate::config::{BackendKind, StorageConfig};
use crate::error::{Result, StorageError};
use crate::model::{
    Entity, EntitySummary, GraphSummary, GraphView, KnowledgeGraph, ObservationDeletion, ReadMode,
    Relation, SearchResult, OPEN_NODES_OBSERVATION_CAP,
};
use crate::search::{self, Candidate, MatchTier, QueryTerms};

/// Current schema version stored in `metadata`
pub const SCHEMA_VERSION: &str = "1.0";

const DEFAULT_SUGGESTIONS: usize = 10;
const MOST_CONNECTED_LIMIT: i64 = 10;

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);

CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE,
    UNIQUE(entity_id, content)
);
CREATE INDEX IF NOT EXISTS idx_observations_entity ON observations(entity_id);

CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_entity_id INTEGER NOT NULL,
    to_entity_id INTEGER NOT NULL,
    relation_type TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (from_entity_id) REFERENCES entities(id) ON DELETE CASCADE,
    FOREIGN KEY (to_entity_id) REFERENCES entities(id) ON DELETE CASCADE,
    UNIQUE(from_entity_id, to_entity_id, relation_type)
);
CREATE INDEX IF NOT EXISTS idx_relations_from ON relations(from_entity_id);
CREATE INDEX IF NOT EXISTS idx_relations_to ON relations(to_entity_id);
CREATE INDEX IF NOT EXISTS idx_relations_type ON relations(relation_type);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', '1.0');
"#;

const RELATION_COLUMNS: &str = r#"
SELECT r.id, f.name, t.name, r.relation_type
FROM relations r
JOIN entities f ON f.id = r.from_entity_id
JOIN entities t ON t.id = r.to_entity_id
"#;

/// An entity ranked by relation count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedEntity {
    pub name: String,
    pub entity_type: String,
    pub connection_count: usize,
}

/// Aggregate statistics over the whole graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphAnalysis {
    pub entity_count: usize,
    pub relation_count: usize,
    pub observation_count: usize,
    pub entity_types: BTreeMap<String, usize>,
    pub relation_types: BTreeMap<String, usize>,
    /// Up to ten entities with the most relations, busiest first
    pub most_connected: Vec<ConnectedEntity>,
}

struct Inner {
    conn: Connection,
    fts: bool,
}

/// Knowledge graph stored in a SQLite database
pub struct SqliteStorage {
    config: StorageConfig,
    inner: Mutex<Option<Inner>>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }

    /// Whether searches currently go through the FTS5 index
    pub fn is_full_text_enabled(&self) -> bool {
        self.inner.lock().as_ref().map(|i| i.fts).unwrap_or(false)
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(StorageError::NotInitialized)?;
        f(inner)
    }

    fn apply_pragmas(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if self.config.wal_mode {
            match conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            }) {
                Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
                Ok(mode) => log::warn!("WAL mode unavailable, journal mode is {}", mode),
                Err(e) => log::warn!("Failed to enable WAL mode: {}", e),
            }
        }

        if self.config.cache_size != 0 {
            if let Err(e) = conn.pragma_update(None, "cache_size", self.config.cache_size) {
                log::warn!("Failed to set cache size: {}", e);
            }
        }

        if !self.config.busy_timeout.is_zero() {
            if let Err(e) = conn.busy_timeout(self.config.busy_timeout) {
                log::warn!("Failed to set busy timeout: {}", e);
            }
        }

        Ok(())
    }

    /// Re-derive the full-text index from the tables.
    pub fn rebuild_search_index(&self) -> Result<()> {
        self.with_inner(|inner| {
            if !inner.fts {
                return Err(StorageError::other("Full-text search is not enabled"));
            }
            fts::rebuild(&inner.conn)?;
            log::info!("Search index rebuilt");
            Ok(())
        })
    }

    /// Entity names then entity types starting with `partial`.
    ///
    /// Half of `limit` (default 10) goes to names, the rest to types.
    pub fn search_suggestions(&self, partial: &str, limit: usize) -> Result<Vec<String>> {
        let limit = if limit == 0 { DEFAULT_SUGGESTIONS } else { limit };
        let pattern = format!("{}%", escape_like(partial));

        self.with_inner(|inner| {
            let conn = &inner.conn;
            let mut suggestions: Vec<String> = {
                let mut stmt = conn.prepare_cached(
                    "SELECT DISTINCT name FROM entities WHERE name LIKE ?1 ESCAPE '\\'
                     ORDER BY name LIMIT ?2",
                )?;
                let names = stmt
                    .query_map(params![pattern, (limit / 2) as i64], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                names
            };

            let remaining = limit.saturating_sub(suggestions.len());
            if remaining > 0 {
                let mut stmt = conn.prepare_cached(
                    "SELECT DISTINCT entity_type FROM entities WHERE entity_type LIKE ?1 ESCAPE '\\'
                     ORDER BY entity_type LIMIT ?2",
                )?;
                for entity_type in stmt.query_map(params![pattern, remaining as i64], |row| {
                    row.get::<_, String>(0)
                })? {
                    suggestions.push(entity_type?);
                }
            }
            Ok(suggestions)
        })
    }

    /// Counts, type distributions and the most connected entities.
    pub fn analyze_graph(&self) -> Result<GraphAnalysis> {
        self.with_inner(|inner| {
            let conn = &inner.conn;
            let most_connected = {
                let mut stmt = conn.prepare_cached(
                    "SELECT name, entity_type, connection_count FROM (
                         SELECT e.name, e.entity_type,
                                (SELECT COUNT(*) FROM relations r WHERE r.from_entity_id = e.id)
                              + (SELECT COUNT(*) FROM relations r WHERE r.to_entity_id = e.id)
                                AS connection_count
                         FROM entities e
                     )
                     WHERE connection_count > 0
                     ORDER BY connection_count DESC, name
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![MOST_CONNECTED_LIMIT], |row| {
                        Ok(ConnectedEntity {
                            name: row.get(0)?,
                            entity_type: row.get(1)?,
                            connection_count: row.get::<_, i64>(2)? as usize,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };

            Ok(GraphAnalysis {
                entity_count: count_rows(conn, "entities")?,
                relation_count: count_rows(conn, "relations")?,
                observation_count: count_rows(conn, "observations")?,
                entity_types: type_counts(
                    conn,
                    "SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type",
                )?,
                relation_types: type_counts(
                    conn,
                    "SELECT relation_type, COUNT(*) FROM relations GROUP BY relation_type",
                )?,
                most_connected,
            })
        })
    }
}

impl Storage for SqliteStorage {
    fn initialize(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.is_some() {
            return Ok(());
        }

        let path = &self.config.file_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        self.apply_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;

        let fts = self.config.full_text_search
            && match fts::install(&conn) {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("Full-text search unavailable, using LIKE scans: {}", e);
                    false
                }
            };

        log::debug!(
            "SQLite storage ready at {} (full-text search: {})",
            path.display(),
            fts
        );
        *guard = Some(Inner { conn, fts });
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(inner) = self.inner.lock().take() {
            inner.conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }

    fn create_entities(&self, entities: &[Entity]) -> Result<Vec<Entity>> {
        self.with_inner(|inner| {
            let tx = inner.conn.transaction()?;
            let mut stored = Vec::with_capacity(entities.len());
            for entity in entities {
                let id = upsert_entity(&tx, entity)?;
                stored.push(Entity {
                    name: entity.name.clone(),
                    entity_type: entity.entity_type.clone(),
                    observations: observations_of(&tx, id, None)?,
                });
            }
            tx.commit()?;
            Ok(stored)
        })
    }

    fn delete_entities(&self, names: &[String]) -> Result<()> {
        self.with_inner(|inner| {
            let tx = inner.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM entities WHERE name = ?1")?;
                for name in names {
                    stmt.execute(params![name])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn create_relations(&self, relations: &[Relation]) -> Result<Vec<Relation>> {
        self.with_inner(|inner| {
            let tx = inner.conn.transaction()?;
            let mut created = Vec::new();
            for relation in relations {
                if insert_relation(&tx, relation)? {
                    created.push(relation.clone());
                }
            }
            tx.commit()?;
            Ok(created)
        })
    }

    fn delete_relations(&self, relations: &[Relation]) -> Result<()> {
        self.with_inner(|inner| {
            let tx = inner.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "DELETE FROM relations
                     WHERE from_entity_id = (SELECT id FROM entities WHERE name = ?1)
                       AND to_entity_id = (SELECT id FROM entities WHERE name = ?2)
                       AND relation_type = ?3",
                )?;
                for r in relations {
                    stmt.execute(params![r.from, r.to, r.relation_type])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn add_observations(
        &self,
        observations: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>> {
        self.with_inner(|inner| {
            let tx = inner.conn.transaction()?;

            let mut ids = HashMap::with_capacity(observations.len());
            for name in observations.keys() {
                let id = entity_id(&tx, name)?.ok_or_else(|| StorageError::not_found(name.clone()))?;
                ids.insert(name.as_str(), id);
            }

            let mut added = HashMap::with_capacity(observations.len());
            for (name, contents) in observations {
                let id = ids[name.as_str()];
                let mut fresh = Vec::new();
                for content in contents {
                    if insert_observation(&tx, id, content)? {
                        fresh.push(content.clone());
                    }
                }
                added.insert(name.clone(), fresh);
            }

            tx.commit()?;
            Ok(added)
        })
    }

    fn delete_observations(&self, deletions: &[ObservationDeletion]) -> Result<()> {
        self.with_inner(|inner| {
            let tx = inner.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "DELETE FROM observations
                     WHERE entity_id = (SELECT id FROM entities WHERE name = ?1)
                       AND content = ?2",
                )?;
                for deletion in deletions {
                    for content in &deletion.observations {
                        stmt.execute(params![deletion.entity_name, content])?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn read_graph(&self, mode: ReadMode, limit: usize) -> Result<GraphView> {
        self.with_inner(|inner| match mode {
            ReadMode::Full => Ok(GraphView::Full(load_graph(&inner.conn)?)),
            ReadMode::Summary => Ok(GraphView::Summary(load_summary(&inner.conn, limit)?)),
        })
    }

    fn search_nodes(&self, query: &str, limit: usize) -> Result<SearchResult> {
        let terms = QueryTerms::parse(query);
        if terms.is_empty() {
            return Ok(SearchResult::empty(limit));
        }

        self.with_inner(|inner| {
            let conn = &inner.conn;
            if inner.fts {
                match indexed_candidates(conn, &terms) {
                    Ok(candidates) => {
                        return Ok(search::rank(
                            &terms,
                            candidates,
                            limit,
                            Some(MatchTier::Content),
                        ))
                    }
                    Err(e) => log::warn!("Full-text search failed, falling back to scan: {}", e),
                }
            }

            let ids = like_matches(conn, terms.words())?;
            let candidates = load_candidates(conn, &ids)?;
            Ok(search::rank(&terms, candidates, limit, None))
        })
    }

    fn open_nodes(&self, names: &[String]) -> Result<KnowledgeGraph> {
        self.with_inner(|inner| {
            let conn = &inner.conn;
            let mut found: BTreeMap<i64, (String, String)> = BTreeMap::new();
            {
                let mut stmt =
                    conn.prepare_cached("SELECT id, entity_type FROM entities WHERE name = ?1")?;
                for name in names {
                    let row = stmt
                        .query_row(params![name], |row| {
                            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                        })
                        .optional()?;
                    if let Some((id, entity_type)) = row {
                        found.insert(id, (name.clone(), entity_type));
                    }
                }
            }

            let mut entities = Vec::with_capacity(found.len());
            for (&id, (name, entity_type)) in &found {
                entities.push(Entity {
                    name: name.clone(),
                    entity_type: entity_type.clone(),
                    observations: observations_of(conn, id, Some(OPEN_NODES_OBSERVATION_CAP + 1))?,
                });
            }

            let mut relations: BTreeMap<i64, Relation> = BTreeMap::new();
            {
                let sql = format!(
                    "{} WHERE r.from_entity_id = ?1 OR r.to_entity_id = ?1",
                    RELATION_COLUMNS
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                for &id in found.keys() {
                    for row in stmt.query_map(params![id], relation_row)? {
                        let (rel_id, relation) = row?;
                        relations.insert(rel_id, relation);
                    }
                }
            }

            let mut graph = KnowledgeGraph::new(entities, relations.into_values().collect());
            graph.cap_observations(OPEN_NODES_OBSERVATION_CAP);
            Ok(graph)
        })
    }

    fn export_data(&self) -> Result<KnowledgeGraph> {
        self.with_inner(|inner| load_graph(&inner.conn))
    }

    fn import_data(&self, graph: &KnowledgeGraph) -> Result<()> {
        self.with_inner(|inner| {
            let tx = inner.conn.transaction()?;
            for entity in &graph.entities {
                upsert_entity(&tx, entity)?;
            }
            let mut linked = 0usize;
            for relation in &graph.relations {
                if insert_relation(&tx, relation)? {
                    linked += 1;
                }
            }
            tx.commit()?;
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
        BackendKind::Sqlite
    }
}

/// Insert or retype the entity and add its observations. Returns the row id.
fn upsert_entity(conn: &Connection, entity: &Entity) -> Result<i64> {
    let id: i64 = {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO entities (name, entity_type) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET
                 entity_type = excluded.entity_type,
                 updated_at = CURRENT_TIMESTAMP
             RETURNING id",
        )?;
        stmt.query_row(params![entity.name, entity.entity_type], |row| row.get(0))?
    };
    for content in &entity.observations {
        insert_observation(conn, id, content)?;
    }
    Ok(id)
}

fn insert_observation(conn: &Connection, entity_id: i64, content: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO observations (entity_id, content) VALUES (?1, ?2)
         ON CONFLICT(entity_id, content) DO NOTHING",
    )?;
    Ok(stmt.execute(params![entity_id, content])? == 1)
}

/// Insert when both endpoints exist and the key is new.
fn insert_relation(conn: &Connection, relation: &Relation) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO relations (from_entity_id, to_entity_id, relation_type)
         SELECT f.id, t.id, ?3 FROM entities f, entities t
         WHERE f.name = ?1 AND t.name = ?2
         ON CONFLICT DO NOTHING",
    )?;
    let changed = stmt.execute(params![relation.from, relation.to, relation.relation_type])?;
    Ok(changed == 1)
}

fn entity_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM entities WHERE name = ?1")?;
    Ok(stmt.query_row(params![name], |row| row.get(0)).optional()?)
}

/// Observations in insertion order, optionally capped at `limit` rows.
fn observations_of(conn: &Connection, entity_id: i64, limit: Option<usize>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT content FROM observations WHERE entity_id = ?1 ORDER BY id LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![entity_id, sql_limit(limit.unwrap_or(0))], |row| {
            row.get(0)
        })?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(rows)
}

fn relation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, Relation)> {
    Ok((
        row.get(0)?,
        Relation {
            from: row.get(1)?,
            to: row.get(2)?,
            relation_type: row.get(3)?,
        },
    ))
}

fn load_graph(conn: &Connection) -> Result<KnowledgeGraph> {
    let mut entities = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();
    {
        let mut stmt =
            conn.prepare_cached("SELECT id, name, entity_type FROM entities ORDER BY id")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            index.insert(row.get(0)?, entities.len());
            entities.push(Entity::new(
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ));
        }
    }

    {
        let mut stmt =
            conn.prepare_cached("SELECT entity_id, content FROM observations ORDER BY id")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let entity_id: i64 = row.get(0)?;
            if let Some(&i) = index.get(&entity_id) {
                entities[i].observations.push(row.get(1)?);
            }
        }
    }

    let relations = {
        let sql = format!("{} ORDER BY r.id", RELATION_COLUMNS);
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], relation_row)?
            .map(|row| row.map(|(_, relation)| relation))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    Ok(KnowledgeGraph::new(entities, relations))
}

fn load_summary(conn: &Connection, limit: usize) -> Result<GraphSummary> {
    let total_entities = count_rows(conn, "entities")?;
    let entities = {
        let mut stmt = conn.prepare_cached(
            "SELECT name, entity_type FROM entities ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![sql_limit(limit)], |row| {
                Ok(EntitySummary {
                    name: row.get(0)?,
                    entity_type: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    Ok(GraphSummary {
        total_entities,
        total_relations: count_rows(conn, "relations")?,
        entity_types: type_counts(
            conn,
            "SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type",
        )?,
        relation_types: type_counts(
            conn,
            "SELECT relation_type, COUNT(*) FROM relations GROUP BY relation_type",
        )?,
        entities,
        limit,
        has_more: limit > 0 && total_entities > limit,
    })
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 =
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(count as usize)
}

fn type_counts(conn: &Connection, sql: &str) -> Result<BTreeMap<String, usize>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let counts = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
    Ok(counts)
}

/// FTS hits (stemmed prefixes) plus every substring match.
fn indexed_candidates(conn: &Connection, terms: &QueryTerms) -> Result<Vec<Candidate>> {
    let Some(fts_query) = fts::build_query(terms.words()) else {
        return Ok(Vec::new());
    };
    let mut ids = fts::matching_entity_ids(conn, &fts_query)?;
    ids.extend(like_matches(conn, terms.words())?);
    load_candidates(conn, &ids)
}

/// Ids of entities containing any word in name, type or an observation.
fn like_matches(conn: &Connection, words: &[String]) -> Result<BTreeSet<i64>> {
    let sql = "SELECT e.id FROM entities e
         WHERE e.name LIKE ?1 ESCAPE '\\'
            OR e.entity_type LIKE ?1 ESCAPE '\\'
            OR EXISTS (
                SELECT 1 FROM observations o
                WHERE o.entity_id = e.id AND o.content LIKE ?1 ESCAPE '\\'
            )";

    let mut stmt = conn.prepare_cached(sql)?;
    let mut ids = BTreeSet::new();
    let mut seen = HashSet::new();
    for word in words {
        if !seen.insert(word.to_lowercase()) {
            continue;
        }
        let pattern = format!("%{}%", escape_like(word));
        for id in stmt.query_map(params![pattern], |row| row.get::<_, i64>(0))? {
            ids.insert(id?);
        }
    }
    Ok(ids)
}

fn load_candidates(conn: &Connection, ids: &BTreeSet<i64>) -> Result<Vec<Candidate>> {
    let mut entity_stmt = conn.prepare_cached("SELECT name, entity_type FROM entities WHERE id = ?1")?;
    let mut count_stmt = conn.prepare_cached(
        "SELECT COUNT(*) FROM relations WHERE from_entity_id = ?1 OR to_entity_id = ?1",
    )?;

    let mut candidates = Vec::with_capacity(ids.len());
    for &id in ids {
        let row = entity_stmt
            .query_row(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()?;
        let Some((name, entity_type)) = row else {
            continue;
        };

        let relations: i64 = count_stmt.query_row(params![id], |row| row.get(0))?;
        let entity = Entity {
            name,
            entity_type,
            observations: observations_of(conn, id, None)?,
        };
        candidates.push(Candidate::new(entity, relations as usize));
    }
    Ok(candidates)
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `LIMIT` value; SQLite treats a negative limit as none.
fn sql_limit(limit: usize) -> i64 {
    if limit == 0 {
        -1
    } else {
        limit as i64
    }
}
