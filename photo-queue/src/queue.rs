use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::models::{BodyEncoding, NewUpload, QueuedUpload, UploadBody, UploadPart};
use crate::schema::init_queue_schema;

/// Error type for queue operations
#[derive(Debug)]
pub enum QueueError {
    /// The durable store cannot be opened or accessed. Callers should fall
    /// back to a best-effort immediate send with no retry guarantee.
    StorageUnavailable(String),
    Database(rusqlite::Error),
    Encoding(serde_json::Error),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::StorageUnavailable(msg) => write!(f, "Queue storage unavailable: {}", msg),
            QueueError::Database(e) => write!(f, "Database error: {}", e),
            QueueError::Encoding(e) => write!(f, "Encoding error: {}", e),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        QueueError::Database(err)
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Encoding(err)
    }
}

/// Durable FIFO queue of pending uploads.
///
/// Jobs are persisted before `enqueue` returns and stay queued across
/// process restarts until a delivery is confirmed (`remove`) or they are
/// purged manually. One queue is owned by one device; re-entrancy control
/// lives in the dispatcher, not here.
#[derive(Clone)]
pub struct UploadQueue {
    conn: Arc<Mutex<Connection>>,
}

impl UploadQueue {
    /// Open (or create) a queue database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, QueueError> {
        let conn = Connection::open(path)
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;
        init_queue_schema(&conn)
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Attach to an existing connection (shared with the application DB).
    /// The queue schema is initialized on the shared connection.
    pub fn with_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, QueueError> {
        {
            let guard = lock(&conn)?;
            init_queue_schema(&guard)
                .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;
        }
        Ok(Self { conn })
    }

    /// Persist a job durably and return its id.
    pub fn enqueue(&self, job: &NewUpload) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now().timestamp_millis();
        let headers_json = match &job.headers {
            Some(h) => Some(serde_json::to_string(h)?),
            None => None,
        };
        let meta_json = match &job.meta {
            Some(m) => Some(serde_json::to_string(m)?),
            None => None,
        };

        let mut guard = lock(&self.conn)?;
        let tx = guard.transaction()?;

        match &job.body {
            UploadBody::Multipart(parts) => {
                tx.execute(
                    "INSERT INTO upload_queue (id, created_at, endpoint, method, headers, body_type, meta)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'multipart', ?6)",
                    params![
                        id.to_string(),
                        created_at,
                        job.endpoint,
                        job.method,
                        headers_json,
                        meta_json,
                    ],
                )?;
                for (seq, part) in parts.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO upload_queue_parts (queue_id, seq, field_name, file_name, mime_type, bytes)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            id.to_string(),
                            seq as i64,
                            part.field_name,
                            part.file_name,
                            part.mime_type,
                            part.bytes,
                        ],
                    )?;
                }
            }
            UploadBody::Raw(bytes) => {
                tx.execute(
                    "INSERT INTO upload_queue (id, created_at, endpoint, method, headers, body_type, raw_body, meta)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'raw', ?6, ?7)",
                    params![
                        id.to_string(),
                        created_at,
                        job.endpoint,
                        job.method,
                        headers_json,
                        bytes,
                        meta_json,
                    ],
                )?;
            }
        }

        tx.commit()?;
        log::debug!("Enqueued upload {} for {}", id, job.endpoint);
        Ok(id)
    }

    /// All not-yet-confirmed jobs in creation order (FIFO).
    pub fn list_pending(&self) -> Result<Vec<QueuedUpload>, QueueError> {
        let guard = lock(&self.conn)?;

        let mut stmt = guard.prepare(
            "SELECT id, created_at, endpoint, method, headers, body_type, raw_body, meta
             FROM upload_queue
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows: Vec<(String, i64, String, String, Option<String>, String, Option<Vec<u8>>, Option<String>)> =
            stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (id_str, created_at, endpoint, method, headers_json, body_type, raw_body, meta_json) in rows {
            let id = Uuid::parse_str(&id_str)
                .map_err(|_| QueueError::Database(rusqlite::Error::InvalidQuery))?;

            let headers: Option<HashMap<String, String>> = match headers_json {
                Some(json) => Some(serde_json::from_str(&json)?),
                None => None,
            };
            let meta: Option<serde_json::Value> = match meta_json {
                Some(json) => Some(serde_json::from_str(&json)?),
                None => None,
            };

            let body = match BodyEncoding::parse(&body_type) {
                Some(BodyEncoding::Raw) => UploadBody::Raw(raw_body.unwrap_or_default()),
                _ => UploadBody::Multipart(self.load_parts(&guard, &id_str)?),
            };

            jobs.push(QueuedUpload {
                id,
                created_at,
                endpoint,
                method,
                headers,
                body,
                meta,
            });
        }

        Ok(jobs)
    }

    fn load_parts(&self, conn: &Connection, queue_id: &str) -> Result<Vec<UploadPart>, QueueError> {
        let mut stmt = conn.prepare(
            "SELECT field_name, file_name, mime_type, bytes
             FROM upload_queue_parts
             WHERE queue_id = ?1
             ORDER BY seq ASC",
        )?;

        let parts = stmt
            .query_map(params![queue_id], |row| {
                Ok(UploadPart {
                    field_name: row.get(0)?,
                    file_name: row.get(1)?,
                    mime_type: row.get(2)?,
                    bytes: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(parts)
    }

    /// Delete a job. Removing an absent id is a no-op, not an error.
    pub fn remove(&self, id: Uuid) -> Result<(), QueueError> {
        let guard = lock(&self.conn)?;
        let rows = guard.execute(
            "DELETE FROM upload_queue WHERE id = ?1",
            params![id.to_string()],
        )?;
        if rows == 0 {
            log::debug!("Queue remove: {} already gone", id);
        }
        Ok(())
    }

    /// Number of jobs still waiting for delivery.
    pub fn count_pending(&self) -> Result<usize, QueueError> {
        let guard = lock(&self.conn)?;
        let count: usize =
            guard.query_row("SELECT COUNT(*) FROM upload_queue", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Manually drop every queued job. Returns the number removed.
    pub fn purge_all(&self) -> Result<usize, QueueError> {
        let guard = lock(&self.conn)?;
        let rows = guard.execute("DELETE FROM upload_queue", [])?;
        log::info!("Purged {} queued uploads", rows);
        Ok(rows)
    }
}

fn lock(conn: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>, QueueError> {
    conn.lock()
        .map_err(|_| QueueError::StorageUnavailable("queue connection poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadPart;

    fn multipart_job(endpoint: &str) -> NewUpload {
        NewUpload::post_multipart(
            endpoint,
            vec![
                UploadPart::text("jobId", "j-1"),
                UploadPart::file("photo", "cap.jpg", "image/jpeg", vec![0xff, 0xd8, 0x00, 0x01]),
            ],
        )
    }

    #[test]
    fn enqueue_then_list_returns_job_with_bytes_intact() {
        let queue = UploadQueue::open_in_memory();
        let id = queue.enqueue(&multipart_job("http://localhost/upload")).unwrap();

        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        match &pending[0].body {
            UploadBody::Multipart(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[1].bytes, vec![0xff, 0xd8, 0x00, 0x01]);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let queue = UploadQueue::open(&path).unwrap();
        let id = queue.enqueue(&multipart_job("http://localhost/upload")).unwrap();
        drop(queue);

        // Simulated restart: a fresh process opens the same file.
        let reopened = UploadQueue::open(&path).unwrap();
        let pending = reopened.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[test]
    fn listing_preserves_creation_order() {
        let queue = UploadQueue::open_in_memory();
        let first = queue.enqueue(&multipart_job("http://localhost/a")).unwrap();
        let second = queue.enqueue(&multipart_job("http://localhost/b")).unwrap();
        let third = queue.enqueue(&multipart_job("http://localhost/c")).unwrap();

        let ids: Vec<Uuid> = queue.list_pending().unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first, second, third]);
    }

    #[test]
    fn remove_is_idempotent() {
        let queue = UploadQueue::open_in_memory();
        let id = queue.enqueue(&multipart_job("http://localhost/upload")).unwrap();

        queue.remove(id).unwrap();
        // Second removal of the same id must be a no-op.
        queue.remove(id).unwrap();
        assert_eq!(queue.count_pending().unwrap(), 0);
    }

    #[test]
    fn raw_body_roundtrip() {
        let queue = UploadQueue::open_in_memory();
        let job = NewUpload {
            endpoint: "http://localhost/upload".to_string(),
            method: "POST".to_string(),
            headers: Some(
                [("content-type".to_string(), "application/json".to_string())]
                    .into_iter()
                    .collect(),
            ),
            body: UploadBody::Raw(br#"{"jobId":"j-1"}"#.to_vec()),
            meta: None,
        };
        queue.enqueue(&job).unwrap();

        let pending = queue.list_pending().unwrap();
        match &pending[0].body {
            UploadBody::Raw(bytes) => assert_eq!(bytes, br#"{"jobId":"j-1"}"#),
            other => panic!("unexpected body: {:?}", other),
        }
        assert_eq!(
            pending[0].headers.as_ref().unwrap()["content-type"],
            "application/json"
        );
    }

    impl UploadQueue {
        fn open_in_memory() -> Self {
            let conn = Connection::open_in_memory().unwrap();
            init_queue_schema(&conn).unwrap();
            Self {
                conn: Arc::new(Mutex::new(conn)),
            }
        }
    }
}
