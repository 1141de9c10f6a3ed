use rusqlite::{params, Connection, OptionalExtension};

use crate::categories::CategoryTemplate;
use crate::entries::{get_entry, PhotoEntry};
use crate::error::ApiError;

/// The canonical current photo and metadata for one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoSnapshot {
    pub job_id: String,
    pub category_id: String,
    pub current_full_path: Option<String>,
    pub current_thumb_path: Option<String>,
    pub selected_entry_id: Option<String>,
    /// Set by an explicit technician selection. While unset, automatic
    /// reconciliation may move the selection freely.
    pub pinned: bool,
    pub serial_number: Option<String>,
    pub meter: Option<String>,
    pub ocr_status: Option<String>,
    pub updated_at: String,
}

/// Read the snapshot row for a slot.
pub fn get_snapshot(
    conn: &Connection,
    job_id: &str,
    category_id: &str,
) -> Result<Option<PhotoSnapshot>, ApiError> {
    let snapshot = conn
        .query_row(
            "SELECT job_id, category_id, current_full_path, current_thumb_path,
                    selected_entry_id, pinned, serial_number, meter, ocr_status, updated_at
             FROM photo_snapshots
             WHERE job_id = ?1 AND category_id = ?2",
            params![job_id, category_id],
            |row| {
                Ok(PhotoSnapshot {
                    job_id: row.get(0)?,
                    category_id: row.get(1)?,
                    current_full_path: row.get(2)?,
                    current_thumb_path: row.get(3)?,
                    selected_entry_id: row.get(4)?,
                    pinned: row.get::<_, i32>(5)? != 0,
                    serial_number: row.get(6)?,
                    meter: row.get(7)?,
                    ocr_status: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            },
        )
        .optional()?;

    Ok(snapshot)
}

/// Reconcile the snapshot after an entry was appended.
///
/// While no explicit pin exists, the most recent arrival wins the
/// selection. Once pinned, automatic upserts never touch the selection
/// again. The whole rule is one conditional write, which is what lets
/// concurrent upserts from different devices converge without a
/// transaction spanning insert and snapshot update.
pub fn upsert_from_entry(conn: &Connection, entry: &PhotoEntry) -> Result<(), ApiError> {
    conn.execute(
        "INSERT INTO photo_snapshots
            (job_id, category_id, current_full_path, current_thumb_path, selected_entry_id, pinned)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)
         ON CONFLICT(job_id, category_id) DO UPDATE SET
            current_full_path = excluded.current_full_path,
            current_thumb_path = excluded.current_thumb_path,
            selected_entry_id = excluded.selected_entry_id
         WHERE photo_snapshots.pinned = 0",
        params![
            entry.job_id,
            entry.category_id,
            entry.full_path,
            entry.thumb_path,
            entry.id,
        ],
    )?;
    Ok(())
}

/// Merge slot metadata, decoupled from photo selection. Supplying a value
/// overwrites the stored one (last-write-wins); absent fields stay.
pub fn merge_metadata(
    conn: &Connection,
    job_id: &str,
    category_id: &str,
    serial_number: Option<&str>,
    meter: Option<&str>,
    ocr_status: Option<&str>,
) -> Result<(), ApiError> {
    conn.execute(
        "INSERT OR IGNORE INTO photo_snapshots (job_id, category_id) VALUES (?1, ?2)",
        params![job_id, category_id],
    )?;

    if let Some(serial) = serial_number {
        conn.execute(
            "UPDATE photo_snapshots SET serial_number = ?1 WHERE job_id = ?2 AND category_id = ?3",
            params![serial, job_id, category_id],
        )?;
    }
    if let Some(meter) = meter {
        conn.execute(
            "UPDATE photo_snapshots SET meter = ?1 WHERE job_id = ?2 AND category_id = ?3",
            params![meter, job_id, category_id],
        )?;
    }
    if let Some(status) = ocr_status {
        conn.execute(
            "UPDATE photo_snapshots SET ocr_status = ?1 WHERE job_id = ?2 AND category_id = ?3",
            params![status, job_id, category_id],
        )?;
    }

    Ok(())
}

/// Explicit technician selection. Validates that the entry belongs to the
/// slot, then overwrites the selection unconditionally and makes it sticky
/// against future automatic upserts.
pub fn pin_selection(
    conn: &Connection,
    job_id: &str,
    category_id: &str,
    entry_id: &str,
) -> Result<(), ApiError> {
    let entry = get_entry(conn, entry_id)?.ok_or_else(|| {
        ApiError::SelectionMismatch(format!("photo {} does not exist", entry_id))
    })?;

    if entry.job_id != job_id || entry.category_id != category_id {
        return Err(ApiError::SelectionMismatch(format!(
            "photo {} belongs to slot ({}, {}), not ({}, {})",
            entry_id, entry.job_id, entry.category_id, job_id, category_id
        )));
    }

    conn.execute(
        "INSERT INTO photo_snapshots
            (job_id, category_id, current_full_path, current_thumb_path, selected_entry_id, pinned)
         VALUES (?1, ?2, ?3, ?4, ?5, 1)
         ON CONFLICT(job_id, category_id) DO UPDATE SET
            current_full_path = excluded.current_full_path,
            current_thumb_path = excluded.current_thumb_path,
            selected_entry_id = excluded.selected_entry_id,
            pinned = 1",
        params![
            job_id,
            category_id,
            entry.full_path,
            entry.thumb_path,
            entry.id,
        ],
    )?;

    log::info!(
        "Pinned entry {} for slot ({}, {})",
        entry_id,
        job_id,
        category_id
    );
    Ok(())
}

/// Automatic choice for cold-start population: strictly greatest
/// sharpness, ties broken toward the earliest-created entry.
pub fn select_best<'a>(entries: &'a [PhotoEntry]) -> Option<&'a PhotoEntry> {
    let mut best: Option<&PhotoEntry> = None;
    for entry in entries {
        match best {
            None => best = Some(entry),
            Some(current) => {
                if entry.sharpness > current.sharpness
                    || (entry.sharpness == current.sharpness
                        && entry.arrival_seq < current.arrival_seq)
                {
                    best = Some(entry);
                }
            }
        }
    }
    best
}

/// Populate a missing selection from history (legacy data, or metadata
/// rows created before any photo arrived). Does nothing once a selection
/// or pin exists; the guard is part of the single conditional write.
pub fn ensure_selection(
    conn: &Connection,
    job_id: &str,
    category_id: &str,
    entries: &[PhotoEntry],
) -> Result<(), ApiError> {
    let best = match select_best(entries) {
        Some(entry) => entry,
        None => return Ok(()),
    };

    conn.execute(
        "INSERT INTO photo_snapshots
            (job_id, category_id, current_full_path, current_thumb_path, selected_entry_id, pinned)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)
         ON CONFLICT(job_id, category_id) DO UPDATE SET
            current_full_path = excluded.current_full_path,
            current_thumb_path = excluded.current_thumb_path,
            selected_entry_id = excluded.selected_entry_id
         WHERE photo_snapshots.pinned = 0
           AND photo_snapshots.selected_entry_id IS NULL",
        params![
            job_id,
            category_id,
            best.full_path,
            best.thumb_path,
            best.id,
        ],
    )?;
    Ok(())
}

/// Completion accounting for one category.
///
/// Complete iff the slot has at least one entry (or a legacy snapshot
/// carrying URLs without surviving history) and, when the template
/// demands a serial number, a non-empty one is recorded. A cable-length
/// category never blocks on the meter value.
pub fn category_complete(
    template: &CategoryTemplate,
    entry_count: usize,
    snapshot: Option<&PhotoSnapshot>,
) -> bool {
    let has_photo =
        entry_count > 0 || snapshot.map(|s| s.current_full_path.is_some()).unwrap_or(false);
    if !has_photo {
        return false;
    }

    if template.requires_serial_number() {
        return snapshot
            .and_then(|s| s.serial_number.as_deref())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
    }

    true
}
