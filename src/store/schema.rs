use rusqlite::Connection;

use crate::errors::MappingError;

pub fn ensure_schema(conn: &Connection) -> Result<(), MappingError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_node_labels (
            node_id INTEGER NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
            label   TEXT NOT NULL,
            PRIMARY KEY (node_id, label)
        );
        CREATE TABLE IF NOT EXISTS graph_relationships (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            start_id INTEGER NOT NULL REFERENCES graph_nodes(id),
            end_id   INTEGER NOT NULL REFERENCES graph_nodes(id),
            rel_type TEXT NOT NULL,
            data     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_labels_label ON graph_node_labels(label);
        CREATE INDEX IF NOT EXISTS idx_rels_start ON graph_relationships(start_id);
        CREATE INDEX IF NOT EXISTS idx_rels_end ON graph_relationships(end_id);
        CREATE INDEX IF NOT EXISTS idx_rels_type ON graph_relationships(rel_type);
        "#,
    )
    .map_err(|e| MappingError::driver(e.to_string()))?;
    Ok(())
}
