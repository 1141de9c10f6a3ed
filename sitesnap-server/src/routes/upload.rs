use axum::extract::{FromRequest, Multipart, Request, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entries::{append_entry, NewEntry};
use crate::error::{ApiError, ApiResult};
use crate::snapshot::{merge_metadata, upsert_from_entry};
use crate::state::AppState;

/// Acknowledgment for a stored upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    #[serde(rename = "entryId")]
    pub entry_id: String,
    #[serde(rename = "photoUrl")]
    pub photo_url: String,
    #[serde(rename = "thumbUrl")]
    pub thumb_url: String,
}

/// JSON variant of the upload request (data-URL payloads).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonUpload {
    job_id: String,
    category_id: String,
    data_url: String,
    thumb_data_url: String,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    meter: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    sharpness: Option<f64>,
}

/// Both wire variants normalize into this before anything is written.
struct UploadRequest {
    job_id: String,
    category_id: String,
    photo: Vec<u8>,
    photo_ext: &'static str,
    thumb: Vec<u8>,
    thumb_ext: &'static str,
    serial_number: Option<String>,
    meter: Option<String>,
    token: Option<String>,
    sharpness: Option<f64>,
}

/// POST /api/photos/upload
///
/// Accepts `multipart/form-data` (file parts) or JSON (data URLs) for the
/// same logical operation. The photo is stored, appended to the slot's
/// history and reconciled into the snapshot in one transaction. Repeated
/// delivery of the same capture is not an error; it simply adds history.
pub async fn upload_photo(
    State(state): State<AppState>,
    request: Request,
) -> ApiResult<Json<UploadResponse>> {
    let content_type = request
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut upload = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        parse_multipart(multipart).await?
    } else if content_type.starts_with("application/json") {
        let Json(body): Json<JsonUpload> = Json::from_request(request, &())
            .await
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        normalize_json(body)?
    } else {
        return Err(ApiError::Validation(
            "expected multipart/form-data or application/json".to_string(),
        ));
    };

    validate(&state, &upload)?;

    // Store content before touching the database; an orphaned file from a
    // failed request is harmless, a dangling entry row is not.
    let photo_bytes = std::mem::take(&mut upload.photo);
    let thumb_bytes = std::mem::take(&mut upload.thumb);
    let storage = state.storage.clone();
    let job_id = upload.job_id.clone();
    let category_id = upload.category_id.clone();
    let photo_ext = upload.photo_ext;
    let thumb_ext = upload.thumb_ext;

    let (full, thumb) = tokio::task::spawn_blocking(move || {
        let file_id = Uuid::new_v4();
        let full = storage.store(
            &job_id,
            &category_id,
            &format!("{}.{}", file_id, photo_ext),
            &photo_bytes,
        )?;
        let thumb = storage.store(
            &job_id,
            &category_id,
            &format!("{}_thumb.{}", file_id, thumb_ext),
            &thumb_bytes,
        )?;
        Ok::<_, std::io::Error>((full, thumb))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("storage task failed: {}", e)))??;

    let response = {
        let mut conn = state.db()?;
        let tx = conn.transaction()?;

        let entry = append_entry(
            &tx,
            &NewEntry {
                job_id: upload.job_id.clone(),
                category_id: upload.category_id.clone(),
                full_path: full.rel_path,
                thumb_path: thumb.rel_path,
                sharpness: upload.sharpness.unwrap_or(0.0),
                capture_token: upload.token.clone(),
                checksum: Some(full.checksum),
            },
        )?;

        upsert_from_entry(&tx, &entry)?;

        if upload.serial_number.is_some() || upload.meter.is_some() {
            merge_metadata(
                &tx,
                &entry.job_id,
                &entry.category_id,
                upload.serial_number.as_deref(),
                upload.meter.as_deref(),
                None,
            )?;
        }

        tx.commit()?;

        log::info!(
            "Upload accepted: entry {} for slot ({}, {})",
            entry.id,
            entry.job_id,
            entry.category_id
        );

        UploadResponse {
            ok: true,
            entry_id: entry.id,
            photo_url: state.storage.url_for(&entry.full_path),
            thumb_url: state.storage.url_for(&entry.thumb_path),
        }
    };

    Ok(Json(response))
}

fn validate(state: &AppState, upload: &UploadRequest) -> ApiResult<()> {
    if upload.job_id.trim().is_empty() {
        return Err(ApiError::Validation("jobId is required".to_string()));
    }
    if upload.category_id.trim().is_empty() {
        return Err(ApiError::Validation("categoryId is required".to_string()));
    }
    if state.categories.get(&upload.category_id).is_none() {
        return Err(ApiError::Validation(format!(
            "unknown category {}",
            upload.category_id
        )));
    }
    if upload.photo.is_empty() {
        return Err(ApiError::Validation("photo payload is empty".to_string()));
    }
    if upload.thumb.is_empty() {
        return Err(ApiError::Validation("thumb payload is empty".to_string()));
    }
    Ok(())
}

async fn parse_multipart(mut multipart: Multipart) -> ApiResult<UploadRequest> {
    let mut job_id = String::new();
    let mut category_id = String::new();
    let mut photo: Option<(Vec<u8>, &'static str)> = None;
    let mut thumb: Option<(Vec<u8>, &'static str)> = None;
    let mut serial_number = None;
    let mut meter = None;
    let mut token = None;
    let mut sharpness = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "jobId" => job_id = read_text(field).await?,
            "categoryId" => category_id = read_text(field).await?,
            "photo" => {
                let ext = ext_for_mime(field.content_type().unwrap_or("image/jpeg"));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(e.to_string()))?;
                photo = Some((bytes.to_vec(), ext));
            }
            "thumb" => {
                let ext = ext_for_mime(field.content_type().unwrap_or("image/webp"));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(e.to_string()))?;
                thumb = Some((bytes.to_vec(), ext));
            }
            "serialNumber" => serial_number = non_empty(read_text(field).await?),
            "meter" => meter = non_empty(read_text(field).await?),
            "token" => token = non_empty(read_text(field).await?),
            "sharpness" => {
                sharpness = read_text(field).await?.trim().parse::<f64>().ok();
            }
            _ => {} // ignore unknown fields
        }
    }

    let (photo, photo_ext) =
        photo.ok_or_else(|| ApiError::Validation("photo file is required".to_string()))?;
    let (thumb, thumb_ext) =
        thumb.ok_or_else(|| ApiError::Validation("thumb file is required".to_string()))?;

    Ok(UploadRequest {
        job_id,
        category_id,
        photo,
        photo_ext,
        thumb,
        thumb_ext,
        serial_number,
        meter,
        token,
        sharpness,
    })
}

fn normalize_json(body: JsonUpload) -> ApiResult<UploadRequest> {
    let (photo, photo_ext) = decode_data_url(&body.data_url)?;
    let (thumb, thumb_ext) = decode_data_url(&body.thumb_data_url)?;

    Ok(UploadRequest {
        job_id: body.job_id,
        category_id: body.category_id,
        photo,
        photo_ext,
        thumb,
        thumb_ext,
        serial_number: body.serial_number.and_then(non_empty),
        meter: body.meter.and_then(non_empty),
        token: body.token.and_then(non_empty),
        sharpness: body.sharpness,
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn ext_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Decode a `data:image/...;base64,...` URL into bytes plus an extension.
fn decode_data_url(data_url: &str) -> ApiResult<(Vec<u8>, &'static str)> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| ApiError::Validation("not a data URL".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ApiError::Validation("malformed data URL".to_string()))?;

    if !header.ends_with(";base64") {
        return Err(ApiError::Validation(
            "only base64 data URLs are supported".to_string(),
        ));
    }
    let mime = header.trim_end_matches(";base64");

    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ApiError::Validation(format!("invalid base64 payload: {}", e)))?;

    Ok((bytes, ext_for_mime(mime)))
}
