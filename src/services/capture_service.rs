use std::path::{Path, PathBuf};

use photo_queue::{
    prepare_capture, DeliveryNotice, Dispatcher, NewUpload, QueueError, UploadPart, UploadQueue,
};
use serial_scan::{AbortFlag, ScanError, SerialScanner};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::AgentSettings;

/// One captured photo on its way into the pipeline.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub job_id: String,
    pub category_id: String,
    pub image: Vec<u8>,
    pub mime_type: String,
    /// Cable meter reading entered by the technician, if any.
    pub meter: Option<String>,
}

/// How the capture left the device.
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Persisted durably; the agent delivers it when connectivity allows.
    Queued(Uuid),
    /// Durable storage was unavailable; sent immediately with no retry
    /// guarantee.
    Sent(DeliveryNotice),
}

/// Prepare a capture (thumbnail, sharpness, serial scan) and enqueue it.
///
/// The serial scan is advisory; a scan failure never blocks the upload.
/// If the durable queue cannot be used, the capture falls back to one
/// best-effort immediate send.
pub async fn capture_photo(
    queue: &UploadQueue,
    dispatcher: &Dispatcher,
    scanner: &SerialScanner,
    settings: &AgentSettings,
    request: CaptureRequest,
) -> Result<CaptureOutcome, AppError> {
    if request.job_id.trim().is_empty() || request.category_id.trim().is_empty() {
        return Err(AppError::Validation(
            "job and category are required".to_string(),
        ));
    }
    if request.image.is_empty() {
        return Err(AppError::Validation("image is empty".to_string()));
    }

    let prepared = prepare_capture(request.image.clone(), settings.thumb_max_edge).await?;

    let abort = AbortFlag::new();
    let serial = match scanner
        .extract_candidates(request.image.clone(), &abort)
        .await
    {
        Ok(outcome) => outcome.best,
        Err(ScanError::Aborted) => None,
        Err(e) => {
            log::warn!("Serial scan failed: {}", e);
            None
        }
    };

    let token = Uuid::new_v4();
    let ext = ext_for_mime(&request.mime_type);

    let mut parts = vec![
        UploadPart::text("jobId", &request.job_id),
        UploadPart::text("categoryId", &request.category_id),
        UploadPart::file(
            "photo",
            &format!("{}.{}", token, ext),
            &request.mime_type,
            request.image,
        ),
        UploadPart::file(
            "thumb",
            &format!("{}_thumb.webp", token),
            "image/webp",
            prepared.thumb,
        ),
        UploadPart::text("token", &token.to_string()),
        UploadPart::text("sharpness", &format!("{:.3}", prepared.sharpness)),
    ];
    if let Some(serial) = &serial {
        parts.push(UploadPart::text("serialNumber", serial));
    }
    if let Some(meter) = &request.meter {
        parts.push(UploadPart::text("meter", meter));
    }

    let job = NewUpload::post_multipart(&settings.upload_url(), parts).with_meta(
        serde_json::json!({
            "jobId": request.job_id,
            "categoryId": request.category_id,
            "token": token.to_string(),
            "deviceId": settings.device_id,
        }),
    );

    match queue.enqueue(&job) {
        Ok(id) => {
            log::info!(
                "Capture queued for slot ({}, {}): {}",
                request.job_id,
                request.category_id,
                id
            );
            Ok(CaptureOutcome::Queued(id))
        }
        Err(QueueError::StorageUnavailable(msg)) => {
            log::warn!("Durable queue unavailable ({}), sending immediately", msg);
            let notice = dispatcher.send_immediate(job).await?;
            Ok(CaptureOutcome::Sent(notice))
        }
        Err(e) => Err(e.into()),
    }
}

/// One file found in the spool directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SpoolItem {
    pub job_id: String,
    pub category_id: String,
    pub path: PathBuf,
}

/// Parse a spool filename of the form `<jobId>__<categoryId>__<rest>`.
fn parse_spool_name(file_name: &str) -> Option<(String, String)> {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s)?;
    let mut parts = stem.splitn(3, "__");
    let job_id = parts.next()?.trim();
    let category_id = parts.next()?.trim();
    parts.next()?; // the free-form rest must exist
    if job_id.is_empty() || category_id.is_empty() {
        return None;
    }
    Some((job_id.to_string(), category_id.to_string()))
}

/// Scan the spool directory for captured photos.
pub fn scan_spool(dir: &Path) -> Result<Vec<SpoolItem>, AppError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if !(lower.ends_with(".jpg") || lower.ends_with(".jpeg")) {
            continue;
        }
        match parse_spool_name(name) {
            Some((job_id, category_id)) => items.push(SpoolItem {
                job_id,
                category_id,
                path: entry.path(),
            }),
            None => log::warn!("Spool file {} does not match <job>__<category>__<name>", name),
        }
    }

    // Deterministic intake order
    items.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(items)
}

/// Ingest every spooled capture: enqueue it and remove the source file.
/// Files that fail validation move to `rejected/` instead of blocking the
/// spool forever.
pub async fn ingest_spool(
    queue: &UploadQueue,
    dispatcher: &Dispatcher,
    scanner: &SerialScanner,
    settings: &AgentSettings,
    dir: &Path,
) -> Result<usize, AppError> {
    let items = scan_spool(dir)?;
    let mut ingested = 0;

    for item in items {
        let image = std::fs::read(&item.path)?;
        let request = CaptureRequest {
            job_id: item.job_id.clone(),
            category_id: item.category_id.clone(),
            image,
            mime_type: "image/jpeg".to_string(),
            meter: None,
        };

        match capture_photo(queue, dispatcher, scanner, settings, request).await {
            Ok(_) => {
                std::fs::remove_file(&item.path)?;
                ingested += 1;
            }
            Err(e) => {
                log::error!("Spool ingest failed for {:?}: {}", item.path, e);
                let rejected = dir.join("rejected");
                std::fs::create_dir_all(&rejected)?;
                if let Some(name) = item.path.file_name() {
                    let _ = std::fs::rename(&item.path, rejected.join(name));
                }
            }
        }
    }

    if ingested > 0 {
        log::info!("Ingested {} captures from spool", ingested);
    }
    Ok(ingested)
}

fn ext_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photo_queue::UploadBody;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn test_queue() -> UploadQueue {
        let conn = Connection::open_in_memory().unwrap();
        UploadQueue::with_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    fn test_settings() -> AgentSettings {
        AgentSettings {
            id: 1,
            server_url: "http://127.0.0.1:9".to_string(),
            upload_path: "/api/photos/upload".to_string(),
            probe_path: "/health".to_string(),
            enabled: true,
            device_id: Some("dev-1".to_string()),
            thumb_max_edge: 16,
            last_drain: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn jpeg_bytes() -> Vec<u8> {
        use image::{DynamicImage, GrayImage, Luma};
        use std::io::Cursor;

        let img = GrayImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn capture_lands_in_the_queue_with_all_fields() {
        let queue = test_queue();
        let dispatcher = Dispatcher::new(queue.clone());
        let scanner = SerialScanner::with_default_recognizer();
        let settings = test_settings();

        let outcome = capture_photo(
            &queue,
            &dispatcher,
            &scanner,
            &settings,
            CaptureRequest {
                job_id: "j-1".to_string(),
                category_id: "cable-run".to_string(),
                image: jpeg_bytes(),
                mime_type: "image/jpeg".to_string(),
                meter: Some("42.5".to_string()),
            },
        )
        .await
        .unwrap();

        assert!(matches!(outcome, CaptureOutcome::Queued(_)));

        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].endpoint, "http://127.0.0.1:9/api/photos/upload");

        let UploadBody::Multipart(parts) = &pending[0].body else {
            panic!("expected multipart body");
        };
        let names: Vec<&str> = parts.iter().map(|p| p.field_name.as_str()).collect();
        assert!(names.contains(&"jobId"));
        assert!(names.contains(&"photo"));
        assert!(names.contains(&"thumb"));
        assert!(names.contains(&"sharpness"));
        assert!(names.contains(&"meter"));

        // The thumbnail was re-encoded as WebP.
        let thumb = parts.iter().find(|p| p.field_name == "thumb").unwrap();
        assert_eq!(&thumb.bytes[0..4], b"RIFF");
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_queueing() {
        let queue = test_queue();
        let dispatcher = Dispatcher::new(queue.clone());
        let scanner = SerialScanner::with_default_recognizer();

        let result = capture_photo(
            &queue,
            &dispatcher,
            &scanner,
            &test_settings(),
            CaptureRequest {
                job_id: "".to_string(),
                category_id: "cable-run".to_string(),
                image: jpeg_bytes(),
                mime_type: "image/jpeg".to_string(),
                meter: None,
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(queue.count_pending().unwrap(), 0);
    }

    #[test]
    fn spool_names_parse_job_and_category() {
        assert_eq!(
            parse_spool_name("j-100__cable-run__IMG_0042.jpg"),
            Some(("j-100".to_string(), "cable-run".to_string()))
        );
        assert_eq!(parse_spool_name("missing-parts.jpg"), None);
        assert_eq!(parse_spool_name("a__b.jpg"), None);
    }

    #[test]
    fn scan_spool_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("j-1__site-overview__a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("unparseable.jpg"), b"x").unwrap();

        let items = scan_spool(dir.path()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].job_id, "j-1");
        assert_eq!(items[0].category_id, "site-overview");
    }
}
