use rusqlite::{Connection, Result};

/// Initialize the agent database schema.
pub fn init_app_schema(conn: &Connection) -> Result<()> {
    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS app_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT version FROM app_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        create_app_schema_v1(conn)?;
        conn.execute("INSERT INTO app_schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

/// Create agent schema version 1
fn create_app_schema_v1(conn: &Connection) -> Result<()> {
    // Table: agent_settings - connection settings and device identity.
    // One row; newest row wins (mirrors the settings lifecycle of the
    // settings service).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS agent_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_url TEXT NOT NULL,
            upload_path TEXT NOT NULL DEFAULT '/api/photos/upload',
            probe_path TEXT NOT NULL DEFAULT '/health',
            enabled INTEGER NOT NULL DEFAULT 1 CHECK(enabled IN (0,1)),
            device_id TEXT,
            thumb_max_edge INTEGER NOT NULL DEFAULT 512,
            last_drain TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Trigger for updated_at in agent_settings
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_agent_settings_timestamp
         AFTER UPDATE ON agent_settings
         BEGIN
            UPDATE agent_settings SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    Ok(())
}
