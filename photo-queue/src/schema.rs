use rusqlite::{Connection, Result};

/// Initialize the upload queue database schema.
pub fn init_queue_schema(conn: &Connection) -> Result<()> {
    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Schema version table for the queue
    conn.execute(
        "CREATE TABLE IF NOT EXISTS queue_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Check current queue schema version
    let current_version: i32 = conn
        .query_row(
            "SELECT version FROM queue_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        create_queue_schema_v1(conn)?;
        conn.execute("INSERT INTO queue_schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

/// Create queue schema version 1
fn create_queue_schema_v1(conn: &Connection) -> Result<()> {
    // Table: upload_queue - one row per pending upload job
    conn.execute(
        "CREATE TABLE IF NOT EXISTS upload_queue (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL DEFAULT 'POST',
            headers TEXT,
            body_type TEXT NOT NULL CHECK(body_type IN ('multipart', 'raw')),
            raw_body BLOB,
            meta TEXT
        )",
        [],
    )?;

    // Listing order is creation order
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_upload_queue_created ON upload_queue(created_at)",
        [],
    )?;

    // Table: upload_queue_parts - ordered multipart bodies, bytes as BLOBs
    conn.execute(
        "CREATE TABLE IF NOT EXISTS upload_queue_parts (
            queue_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            field_name TEXT NOT NULL,
            file_name TEXT,
            mime_type TEXT NOT NULL,
            bytes BLOB NOT NULL,
            PRIMARY KEY (queue_id, seq),
            FOREIGN KEY (queue_id) REFERENCES upload_queue(id) ON DELETE CASCADE
        )",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_queue_schema(&conn).unwrap();
        init_queue_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row(
                "SELECT MAX(version) FROM queue_schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 1);
    }
}
