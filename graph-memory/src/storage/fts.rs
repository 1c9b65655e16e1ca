//! FTS5 index over entity names, types and observation text
//!
//! Both virtual tables are external-content tables kept in sync by triggers,
//! so they hold only the token index and never a second copy of the text.

use std::collections::BTreeSet;

use rusqlite::{params, Connection};

use crate::error::Result;

const FTS_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
    name,
    entity_type,
    content='entities',
    content_rowid='id',
    tokenize='porter unicode61 remove_diacritics 1'
);

CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(
    content,
    content='observations',
    content_rowid='id',
    tokenize='porter unicode61 remove_diacritics 1'
);

CREATE TRIGGER IF NOT EXISTS entities_fts_insert AFTER INSERT ON entities BEGIN
    INSERT INTO entities_fts(rowid, name, entity_type)
    VALUES (new.id, new.name, new.entity_type);
END;

CREATE TRIGGER IF NOT EXISTS entities_fts_delete AFTER DELETE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, entity_type)
    VALUES ('delete', old.id, old.name, old.entity_type);
END;

CREATE TRIGGER IF NOT EXISTS entities_fts_update AFTER UPDATE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, entity_type)
    VALUES ('delete', old.id, old.name, old.entity_type);
    INSERT INTO entities_fts(rowid, name, entity_type)
    VALUES (new.id, new.name, new.entity_type);
END;

CREATE TRIGGER IF NOT EXISTS observations_fts_insert AFTER INSERT ON observations BEGIN
    INSERT INTO observations_fts(rowid, content) VALUES (new.id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS observations_fts_delete AFTER DELETE ON observations BEGIN
    INSERT INTO observations_fts(observations_fts, rowid, content)
    VALUES ('delete', old.id, old.content);
END;

CREATE TRIGGER IF NOT EXISTS observations_fts_update AFTER UPDATE ON observations BEGIN
    INSERT INTO observations_fts(observations_fts, rowid, content)
    VALUES ('delete', old.id, old.content);
    INSERT INTO observations_fts(rowid, content) VALUES (new.id, new.content);
END;
"#;

const MATCH_SQL: &str = r#"
SELECT rowid FROM entities_fts WHERE entities_fts MATCH ?1
UNION
SELECT o.entity_id
FROM observations_fts
JOIN observations o ON o.id = observations_fts.rowid
WHERE observations_fts MATCH ?1
"#;

fn is_installed(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table' AND name IN ('entities_fts', 'observations_fts')",
        [],
        |row| row.get(0),
    )?;
    Ok(count == 2)
}

/// Create the index and its triggers. Returns `true` if the tables were new.
///
/// New tables over existing rows are populated right away.
pub(super) fn install(conn: &Connection) -> Result<bool> {
    let existed = is_installed(conn)?;
    conn.execute_batch(FTS_SCHEMA)?;
    if existed {
        return Ok(false);
    }

    let rows: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
    if rows > 0 {
        log::info!("Populating search index for {} existing entities", rows);
        rebuild(conn)?;
    }
    Ok(true)
}

/// Re-derive both indexes from their content tables.
pub(super) fn rebuild(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "INSERT INTO entities_fts(entities_fts) VALUES ('rebuild');
         INSERT INTO observations_fts(observations_fts) VALUES ('rebuild');",
    )?;
    Ok(())
}

/// Prefix OR query, each word quoted so FTS operators are taken literally.
pub(super) fn build_query(words: &[String]) -> Option<String> {
    if words.is_empty() {
        return None;
    }
    let parts: Vec<String> = words
        .iter()
        .map(|w| format!("\"{}\"*", w.replace('"', "\"\"")))
        .collect();
    Some(parts.join(" OR "))
}

/// Ids of entities whose name, type or any observation matches.
pub(super) fn matching_entity_ids(conn: &Connection, fts_query: &str) -> Result<BTreeSet<i64>> {
    let mut stmt = conn.prepare_cached(MATCH_SQL)?;
    let ids = stmt
        .query_map(params![fts_query], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(ids)
}
