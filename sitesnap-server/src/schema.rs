use rusqlite::{Connection, Result};

/// Initialize the server database schema.
pub fn init_server_schema(conn: &Connection) -> Result<()> {
    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Schema version table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS server_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT version FROM server_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        create_server_schema_v1(conn)?;
        conn.execute("INSERT INTO server_schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

/// Create server schema version 1
fn create_server_schema_v1(conn: &Connection) -> Result<()> {
    // Table: photo_entries - append-only history, one row per delivered
    // photo variant. Rows are never updated or deleted by normal flow;
    // the rowid doubles as server-observed arrival order.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photo_entries (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            category_id TEXT NOT NULL,
            full_path TEXT NOT NULL,
            thumb_path TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            sharpness REAL NOT NULL DEFAULT 0,
            capture_token TEXT,
            checksum TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_photo_entries_slot
         ON photo_entries(job_id, category_id)",
        [],
    )?;

    // Table: photo_snapshots - one row per (job, category) slot holding
    // the canonical selection and slot metadata.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photo_snapshots (
            job_id TEXT NOT NULL,
            category_id TEXT NOT NULL,
            current_full_path TEXT,
            current_thumb_path TEXT,
            selected_entry_id TEXT,
            pinned INTEGER NOT NULL DEFAULT 0 CHECK(pinned IN (0,1)),
            serial_number TEXT,
            meter TEXT,
            ocr_status TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (job_id, category_id)
        )",
        [],
    )?;

    // Trigger for updated_at in photo_snapshots
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_photo_snapshots_timestamp
         AFTER UPDATE ON photo_snapshots
         BEGIN
            UPDATE photo_snapshots SET updated_at = CURRENT_TIMESTAMP
            WHERE job_id = NEW.job_id AND category_id = NEW.category_id;
         END",
        [],
    )?;

    Ok(())
}
