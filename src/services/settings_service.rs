use rusqlite::{params, Connection};

use crate::config::AgentConfig;
use crate::error::AppError;
use crate::models::AgentSettings;

/// Loads the agent settings from the database (newest row wins)
pub fn load_settings(conn: &Connection) -> Result<Option<AgentSettings>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, server_url, upload_path, probe_path, enabled, device_id, thumb_max_edge, last_drain, created_at, updated_at
         FROM agent_settings
         ORDER BY id DESC
         LIMIT 1",
    )?;

    let result = stmt.query_row([], |row| {
        Ok(AgentSettings {
            id: row.get(0)?,
            server_url: row.get(1)?,
            upload_path: row.get(2)?,
            probe_path: row.get(3)?,
            enabled: row.get::<_, i32>(4)? != 0,
            device_id: row.get(5)?,
            thumb_max_edge: row.get::<_, i64>(6)? as u32,
            last_drain: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    });

    match result {
        Ok(settings) => Ok(Some(settings)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// Returns existing settings, or seeds them from the config file on the
/// first start. Runtime state (device id in particular) always comes from
/// the database afterwards.
pub fn ensure_settings(
    conn: &Connection,
    config: &AgentConfig,
) -> Result<AgentSettings, AppError> {
    if let Some(settings) = load_settings(conn)? {
        return Ok(settings);
    }

    conn.execute(
        "INSERT INTO agent_settings (server_url, upload_path, probe_path, enabled, thumb_max_edge)
         VALUES (?1, ?2, ?3, 1, ?4)",
        params![
            config.server_url,
            config.upload_path,
            config.probe_path,
            config.thumb_max_edge as i64,
        ],
    )?;

    log::info!("Seeded agent settings for {}", config.server_url);
    load_settings(conn)?
        .ok_or_else(|| AppError::Other("Settings missing after insert".to_string()))
}

/// Stable device id, generated and persisted on first use
pub fn get_device_id(conn: &Connection) -> Result<String, AppError> {
    let settings = load_settings(conn)?
        .ok_or_else(|| AppError::NotFound("Agent settings not initialized".to_string()))?;

    if let Some(id) = settings.device_id {
        return Ok(id);
    }

    let new_id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "UPDATE agent_settings SET device_id = ?1 WHERE id = ?2",
        params![new_id, settings.id],
    )?;
    Ok(new_id)
}

/// Enables or disables background draining
pub fn set_enabled(conn: &Connection, enabled: bool) -> Result<(), AppError> {
    conn.execute(
        "UPDATE agent_settings SET enabled = ?1 WHERE id = (SELECT MAX(id) FROM agent_settings)",
        [enabled],
    )?;
    Ok(())
}

/// Updates the timestamp of the last completed drain
pub fn update_last_drain(conn: &Connection) -> Result<(), AppError> {
    conn.execute(
        "UPDATE agent_settings SET last_drain = CURRENT_TIMESTAMP WHERE id = (SELECT MAX(id) FROM agent_settings)",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::init_app_schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_app_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn ensure_settings_seeds_once() {
        let conn = test_conn();
        let config = AgentConfig::default();

        let first = ensure_settings(&conn, &config).unwrap();
        let second = ensure_settings(&conn, &config).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.server_url, config.server_url);
        assert!(first.enabled);
    }

    #[test]
    fn device_id_is_stable_across_calls() {
        let conn = test_conn();
        ensure_settings(&conn, &AgentConfig::default()).unwrap();

        let id = get_device_id(&conn).unwrap();
        assert_eq!(get_device_id(&conn).unwrap(), id);
    }

    #[test]
    fn enabled_flag_roundtrip() {
        let conn = test_conn();
        ensure_settings(&conn, &AgentConfig::default()).unwrap();

        set_enabled(&conn, false).unwrap();
        assert!(!load_settings(&conn).unwrap().unwrap().enabled);
    }
}
