//! SQL DDL for the search index.
//!
//! Defines `postings` (term → entry line with weight), `indexed_entries` (the
//! revision and digest each entry was indexed at), and `schema_meta`. The index
//! is derived data: when the stored layout version differs from
//! [`INDEX_LAYOUT_VERSION`] the tables are dropped and rebuilt, never migrated.

use rusqlite::{Connection, OptionalExtension};

/// Bump when the table layout or tokenization changes.
pub const INDEX_LAYOUT_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS indexed_entries (
    kind TEXT NOT NULL,
    entry_id TEXT NOT NULL,
    revision INTEGER NOT NULL,
    digest TEXT NOT NULL,
    PRIMARY KEY (kind, entry_id)
);

CREATE TABLE IF NOT EXISTS postings (
    term TEXT NOT NULL,
    kind TEXT NOT NULL,
    entry_id TEXT NOT NULL,
    line INTEGER NOT NULL,
    weight INTEGER NOT NULL CHECK(weight > 0),
    PRIMARY KEY (term, kind, entry_id, line)
);

CREATE INDEX IF NOT EXISTS idx_postings_entry ON postings(kind, entry_id);
"#;

const DROP_SQL: &str = r#"
DROP TABLE IF EXISTS postings;
DROP TABLE IF EXISTS indexed_entries;
DROP TABLE IF EXISTS schema_meta;
"#;

/// Create tables, discarding any index written with a different layout.
///
/// Returns `true` if the index is empty and needs a full rebuild.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<bool> {
    let stored = stored_layout_version(conn)?;
    if stored.is_some_and(|v| v != INDEX_LAYOUT_VERSION) {
        tracing::info!(
            stored = ?stored,
            current = INDEX_LAYOUT_VERSION,
            "search index layout changed, discarding"
        );
        conn.execute_batch(DROP_SQL)?;
    }

    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('layout_version', ?1)",
        [INDEX_LAYOUT_VERSION.to_string()],
    )?;

    Ok(stored != Some(INDEX_LAYOUT_VERSION))
}

fn stored_layout_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let has_meta: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_meta'",
        [],
        |row| row.get(0),
    )?;
    if !has_meta {
        return Ok(None);
    }
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'layout_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}
