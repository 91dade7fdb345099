//! Database schema definitions.
//!
//! Every DDL builder takes the schema name (`main` or `disk`) so the same
//! definitions create both the RAM working set and the disk mirror. The
//! sync-tracker table and its triggers are only ever installed on the RAM
//! copy.

use webrecall_core::constants::EMBEDDING_DIM;

/// Regular tables whose changes are captured by triggers, with the key
/// column the tracker records.
pub const TRACKED_TABLES: &[(&str, &str)] = &[
    ("crawled_content", "id"),
    ("content_chunks", "id"),
    ("sessions", "session_id"),
    ("blocked_domains", "pattern"),
    ("kg_processing_queue", "id"),
];

/// The vector table, tracked by explicit calls instead of triggers.
pub const VECTOR_TABLE: &str = "content_vectors";

/// SQL to create the crawled content table
pub fn create_content_table(db: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {db}.crawled_content (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,
    markdown TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    retention TEXT NOT NULL DEFAULT 'permanent',
    session_id TEXT,
    tags TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{{}}'
)
"#
    )
}

/// SQL to create the chunk sibling table. Chunk ids double as the rowids of
/// the vector table.
pub fn create_chunks_table(db: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {db}.content_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_id INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL,
    word_count INTEGER NOT NULL,
    kg_processed INTEGER NOT NULL DEFAULT 0
)
"#
    )
}

/// SQL to create the vector index virtual table.
pub fn create_vectors_table(db: &str) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {db}.content_vectors USING vec0(embedding float[{EMBEDDING_DIM}])"
    )
}

/// SQL to create the sessions table
pub fn create_sessions_table(db: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {db}.sessions (
    session_id TEXT PRIMARY KEY NOT NULL,
    created_at INTEGER NOT NULL
)
"#
    )
}

/// SQL to create the blocked domains table
pub fn create_blocklist_table(db: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {db}.blocked_domains (
    pattern TEXT PRIMARY KEY NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
)
"#
    )
}

/// SQL to create the knowledge-graph processing queue
pub fn create_kg_queue_table(db: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {db}.kg_processing_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    error TEXT,
    skipped_reason TEXT
)
"#
    )
}

/// Index on content URLs for upsert lookups
pub fn create_content_url_index(db: &str) -> String {
    format!("CREATE INDEX IF NOT EXISTS {db}.idx_content_url ON crawled_content(url)")
}

/// Index on chunk ownership for cascade deletes and parity checks
pub fn create_chunk_content_index(db: &str) -> String {
    format!("CREATE INDEX IF NOT EXISTS {db}.idx_chunks_content ON content_chunks(content_id)")
}

/// Index on retention for list filters and the sweeper
pub fn create_content_retention_index(db: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {db}.idx_content_retention ON crawled_content(retention, timestamp)"
    )
}

/// The RAM-only change tracker.
pub const CREATE_SYNC_TRACKER: &str = r#"
CREATE TABLE IF NOT EXISTS sync_tracker (
    table_name TEXT NOT NULL,
    record_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    changed_at INTEGER NOT NULL,
    PRIMARY KEY (table_name, record_id) ON CONFLICT REPLACE
)
"#;

/// Trigger DDL capturing one operation on one tracked table (RAM copy
/// only). `op` is INSERT/UPDATE/DELETE; the row reference follows from it.
fn tracker_trigger(table: &str, key: &str, op: &str) -> String {
    let rowref = if op == "DELETE" { "OLD" } else { "NEW" };
    let suffix = match op {
        "INSERT" => "ins",
        "UPDATE" => "upd",
        _ => "del",
    };
    format!(
        r#"
CREATE TRIGGER IF NOT EXISTS trk_{table}_{suffix} AFTER {op} ON {table}
BEGIN
    INSERT OR REPLACE INTO sync_tracker(table_name, record_id, operation, changed_at)
    VALUES ('{table}', CAST({rowref}.{key} AS TEXT), '{op}', strftime('%s', 'now'));
END
"#
    )
}

/// All tracker triggers for the RAM copy.
pub fn tracker_triggers() -> Vec<String> {
    let mut ddl = Vec::new();
    for (table, key) in TRACKED_TABLES {
        for op in ["INSERT", "UPDATE", "DELETE"] {
            ddl.push(tracker_trigger(table, key, op));
        }
    }
    ddl
}

/// Every DDL statement for a full schema under the given database name.
pub fn full_schema(db: &str) -> Vec<String> {
    vec![
        create_content_table(db),
        create_chunks_table(db),
        create_vectors_table(db),
        create_sessions_table(db),
        create_blocklist_table(db),
        create_kg_queue_table(db),
        create_content_url_index(db),
        create_chunk_content_index(db),
        create_content_retention_index(db),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_parameterized_by_database_name() {
        assert!(create_content_table("disk").contains("disk.crawled_content"));
        assert!(create_vectors_table("main").contains("main.content_vectors"));
        assert!(create_vectors_table("main").contains("float[384]"));
    }

    #[test]
    fn one_trigger_per_operation_per_tracked_table() {
        let triggers = tracker_triggers();
        assert_eq!(triggers.len(), TRACKED_TABLES.len() * 3);
        assert!(triggers.iter().any(|t| t.contains("trk_crawled_content_del")));
        assert!(triggers.iter().all(|t| t.contains("sync_tracker")));
    }

    #[test]
    fn delete_triggers_reference_old_row() {
        let ddl = tracker_trigger("crawled_content", "id", "DELETE");
        assert!(ddl.contains("OLD.id"));
        let ddl = tracker_trigger("crawled_content", "id", "INSERT");
        assert!(ddl.contains("NEW.id"));
    }
}
