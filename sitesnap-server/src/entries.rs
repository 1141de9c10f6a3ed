use rusqlite::{params, Connection, OptionalExtension};
use ulid::Ulid;

use crate::error::ApiError;

/// One immutable delivered photo variant.
///
/// Many entries may exist per (job, category) slot; repeated delivery of
/// the same logical photo simply produces more history.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoEntry {
    pub id: String,
    pub job_id: String,
    pub category_id: String,
    pub full_path: String,
    pub thumb_path: String,
    pub created_at: String,
    /// Server-observed arrival order. Recency decisions use this, never
    /// client clocks.
    pub arrival_seq: i64,
    pub sharpness: f64,
    pub capture_token: Option<String>,
    pub checksum: Option<String>,
}

/// Input for appending one entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub job_id: String,
    pub category_id: String,
    pub full_path: String,
    pub thumb_path: String,
    pub sharpness: f64,
    pub capture_token: Option<String>,
    pub checksum: Option<String>,
}

/// Append one entry to the history. Never overwrites, never dedupes.
pub fn append_entry(conn: &Connection, entry: &NewEntry) -> Result<PhotoEntry, ApiError> {
    let id = Ulid::new().to_string();

    conn.execute(
        "INSERT INTO photo_entries (id, job_id, category_id, full_path, thumb_path, sharpness, capture_token, checksum)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            entry.job_id,
            entry.category_id,
            entry.full_path,
            entry.thumb_path,
            entry.sharpness,
            entry.capture_token,
            entry.checksum,
        ],
    )?;

    let stored = get_entry(conn, &id)?
        .ok_or_else(|| ApiError::Internal("entry vanished after insert".to_string()))?;
    log::debug!(
        "Appended entry {} for slot ({}, {})",
        stored.id,
        stored.job_id,
        stored.category_id
    );
    Ok(stored)
}

/// Full history for a slot, server arrival order ascending.
pub fn list_entries(
    conn: &Connection,
    job_id: &str,
    category_id: &str,
) -> Result<Vec<PhotoEntry>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT id, job_id, category_id, full_path, thumb_path, created_at, rowid, sharpness, capture_token, checksum
         FROM photo_entries
         WHERE job_id = ?1 AND category_id = ?2
         ORDER BY rowid ASC",
    )?;

    let entries = stmt
        .query_map(params![job_id, category_id], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Single entry lookup by id.
pub fn get_entry(conn: &Connection, entry_id: &str) -> Result<Option<PhotoEntry>, ApiError> {
    let entry = conn
        .query_row(
            "SELECT id, job_id, category_id, full_path, thumb_path, created_at, rowid, sharpness, capture_token, checksum
             FROM photo_entries
             WHERE id = ?1",
            params![entry_id],
            row_to_entry,
        )
        .optional()?;

    Ok(entry)
}

/// True once a job has any history at all.
pub fn job_has_entries(conn: &Connection, job_id: &str) -> Result<bool, ApiError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM photo_entries WHERE job_id = ?1",
        params![job_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<PhotoEntry> {
    Ok(PhotoEntry {
        id: row.get(0)?,
        job_id: row.get(1)?,
        category_id: row.get(2)?,
        full_path: row.get(3)?,
        thumb_path: row.get(4)?,
        created_at: row.get(5)?,
        arrival_seq: row.get(6)?,
        sharpness: row.get(7)?,
        capture_token: row.get(8)?,
        checksum: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_server_schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_server_schema(&conn).unwrap();
        conn
    }

    fn new_entry(job: &str, cat: &str, sharpness: f64) -> NewEntry {
        NewEntry {
            job_id: job.to_string(),
            category_id: cat.to_string(),
            full_path: "j/c/full.jpg".to_string(),
            thumb_path: "j/c/thumb.webp".to_string(),
            sharpness,
            capture_token: None,
            checksum: None,
        }
    }

    #[test]
    fn append_assigns_id_and_arrival_seq() {
        let conn = test_conn();
        let first = append_entry(&conn, &new_entry("j1", "c1", 10.0)).unwrap();
        let second = append_entry(&conn, &new_entry("j1", "c1", 20.0)).unwrap();

        assert_ne!(first.id, second.id);
        assert!(second.arrival_seq > first.arrival_seq);
    }

    #[test]
    fn duplicates_become_separate_history_rows() {
        let conn = test_conn();
        let entry = new_entry("j1", "c1", 10.0);
        // A client retry after a lost ack delivers the same payload twice.
        append_entry(&conn, &entry).unwrap();
        append_entry(&conn, &entry).unwrap();

        assert_eq!(list_entries(&conn, "j1", "c1").unwrap().len(), 2);
    }

    #[test]
    fn list_is_scoped_to_the_slot() {
        let conn = test_conn();
        append_entry(&conn, &new_entry("j1", "c1", 1.0)).unwrap();
        append_entry(&conn, &new_entry("j1", "c2", 1.0)).unwrap();
        append_entry(&conn, &new_entry("j2", "c1", 1.0)).unwrap();

        assert_eq!(list_entries(&conn, "j1", "c1").unwrap().len(), 1);
        assert!(job_has_entries(&conn, "j2").unwrap());
        assert!(!job_has_entries(&conn, "j3").unwrap());
    }
}
