use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::entries::{job_has_entries, list_entries};
use crate::error::ApiResult;
use crate::snapshot::{category_complete, ensure_selection, get_snapshot};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PhotoItem {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub thumb: String,
    #[serde(rename = "remoteUrl")]
    pub remote_url: Option<String>,
    pub sharpness: f64,
    /// Always "uploaded" here: entries only exist once delivery succeeded.
    /// Queued/pending states live on the client.
    #[serde(rename = "uploadState")]
    pub upload_state: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CategoryItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "requiresSerialNumber")]
    pub requires_serial_number: bool,
    #[serde(rename = "requiresCable")]
    pub requires_cable: bool,
    pub photos: Vec<PhotoItem>,
    #[serde(rename = "selectedPhotoId")]
    pub selected_photo_id: Option<String>,
    #[serde(rename = "serialNumber")]
    pub serial_number: Option<String>,
    pub meter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Progress {
    pub total: usize,
    pub complete: usize,
    pub uploaded: usize,
    pub percent: usize,
}

#[derive(Debug, Serialize)]
pub struct JobPhotosResponse {
    pub items: Vec<CategoryItem>,
    pub status: &'static str,
    pub progress: Progress,
}

/// GET /api/jobs/{job_id}/photos
///
/// Full per-category history plus the canonical selection and completion
/// accounting for one job.
pub async fn job_photos(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobPhotosResponse>> {
    let conn = state.db()?;

    let mut items = Vec::with_capacity(state.categories.len());
    let mut complete = 0;
    let mut uploaded = 0;

    for template in state.categories.iter() {
        let entries = list_entries(&conn, &job_id, &template.id)?;
        // Cold-start population: legacy rows may have history but no
        // selection yet.
        ensure_selection(&conn, &job_id, &template.id, &entries)?;
        let snapshot = get_snapshot(&conn, &job_id, &template.id)?;

        let is_complete = category_complete(template, entries.len(), snapshot.as_ref());
        if is_complete {
            complete += 1;
        }
        let has_photo = !entries.is_empty()
            || snapshot
                .as_ref()
                .map(|s| s.current_full_path.is_some())
                .unwrap_or(false);
        if has_photo {
            uploaded += 1;
        }

        let photos = entries
            .iter()
            .map(|entry| PhotoItem {
                id: entry.id.clone(),
                created_at: entry.created_at.clone(),
                thumb: state.storage.url_for(&entry.thumb_path),
                remote_url: Some(state.storage.url_for(&entry.full_path)),
                sharpness: entry.sharpness,
                upload_state: "uploaded",
            })
            .collect();

        items.push(CategoryItem {
            id: template.id.clone(),
            name: template.name.clone(),
            kind: template.kind.as_str(),
            requires_serial_number: template.requires_serial_number(),
            requires_cable: template.requires_cable(),
            photos,
            selected_photo_id: snapshot.as_ref().and_then(|s| s.selected_entry_id.clone()),
            serial_number: snapshot.as_ref().and_then(|s| s.serial_number.clone()),
            meter: snapshot.as_ref().and_then(|s| s.meter.clone()),
        });
    }

    let total = state.categories.len();
    let percent = if total > 0 { complete * 100 / total } else { 0 };
    let status = if job_has_entries(&conn, &job_id)? {
        "active"
    } else {
        "pending"
    };

    Ok(Json(JobPhotosResponse {
        items,
        status,
        progress: Progress {
            total,
            complete,
            uploaded,
            percent,
        },
    }))
}
