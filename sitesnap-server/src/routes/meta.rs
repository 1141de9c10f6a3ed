use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::routes::OkResponse;
use crate::snapshot::{merge_metadata, pin_selection};
use crate::state::AppState;

/// Metadata update for one slot.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaUpdate {
    pub job_id: String,
    pub category_id: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub meter: Option<String>,
    #[serde(default)]
    pub ocr_status: Option<String>,
    #[serde(default)]
    pub selected_photo_id: Option<String>,
}

/// POST /api/photos/meta
///
/// All-or-nothing: a failed selection validation rolls the whole request
/// back, so no other field of the same request is applied either.
pub async fn update_meta(
    State(state): State<AppState>,
    Json(update): Json<MetaUpdate>,
) -> ApiResult<Json<OkResponse>> {
    if update.job_id.trim().is_empty() || update.category_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "jobId and categoryId are required".to_string(),
        ));
    }

    let mut conn = state.db()?;
    let tx = conn.transaction()?;

    // Selection first: it is the only part that can fail validation, and
    // it must fail before any metadata lands.
    if let Some(entry_id) = &update.selected_photo_id {
        pin_selection(&tx, &update.job_id, &update.category_id, entry_id)?;
    }

    merge_metadata(
        &tx,
        &update.job_id,
        &update.category_id,
        update.serial_number.as_deref(),
        update.meter.as_deref(),
        update.ocr_status.as_deref(),
    )?;

    tx.commit()?;

    log::debug!(
        "Meta updated for slot ({}, {})",
        update.job_id,
        update.category_id
    );
    Ok(Json(OkResponse::new()))
}
