//! End-to-end tests for the upload/meta/read API against the real router.
//!
//! No network involved: requests go through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http_body_util::BodyExt;
use tower::ServiceExt;

use sitesnap_server::{
    build_router, init_server_schema, AppState, CategoryCatalog, PhotoStorage,
};

fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    init_server_schema(&conn).unwrap();

    let storage = PhotoStorage::new(dir.path(), "/photos");
    let state = AppState::new(conn, storage, CategoryCatalog::default_catalog());
    (build_router(state), dir)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn json_upload_body(job: &str, category: &str, payload: &[u8], serial: Option<&str>) -> String {
    let mut body = serde_json::json!({
        "jobId": job,
        "categoryId": category,
        "dataUrl": format!("data:image/jpeg;base64,{}", BASE64.encode(payload)),
        "thumbDataUrl": format!("data:image/webp;base64,{}", BASE64.encode(b"thumb")),
    });
    if let Some(serial) = serial {
        body["serialNumber"] = serde_json::Value::String(serial.to_string());
    }
    body.to_string()
}

async fn upload(app: &Router, job: &str, category: &str, payload: &[u8]) -> serde_json::Value {
    let request = Request::builder()
        .method("POST")
        .uri("/api/photos/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json_upload_body(job, category, payload, None)))
        .unwrap();

    let (status, json) = send(app, request).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", json);
    assert_eq!(json["ok"], true);
    json
}

async fn read_job(app: &Router, job: &str) -> serde_json::Value {
    let request = Request::builder()
        .uri(format!("/api/jobs/{}/photos", job))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    json
}

fn category_item<'a>(json: &'a serde_json::Value, id: &str) -> &'a serde_json::Value {
    json["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["id"] == id)
        .unwrap()
}

#[tokio::test]
async fn upload_returns_entry_id_and_urls() {
    let (app, _dir) = test_app();

    let ack = upload(&app, "j-100", "site-overview", b"jpeg-1").await;
    assert!(ack["entryId"].as_str().unwrap().len() > 10);
    assert!(ack["photoUrl"].as_str().unwrap().starts_with("/photos/j-100/site-overview/"));
    assert!(ack["thumbUrl"].as_str().unwrap().contains("_thumb"));
}

#[tokio::test]
async fn multipart_and_json_land_in_the_same_history() {
    let (app, _dir) = test_app();

    upload(&app, "j-100", "site-overview", b"jpeg-json").await;

    let boundary = "X-SITESNAP-TEST";
    let mut body = Vec::new();
    for (name, value) in [("jobId", "j-100"), ("categoryId", "site-overview")] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    for (name, file, mime, bytes) in [
        ("photo", "a.jpg", "image/jpeg", b"jpeg-multipart".as_slice()),
        ("thumb", "a.webp", "image/webp", b"thumb".as_slice()),
    ] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                boundary, name, file, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/photos/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "multipart upload failed: {}", json);

    let job = read_job(&app, "j-100").await;
    let photos = category_item(&job, "site-overview")["photos"].as_array().unwrap().len();
    assert_eq!(photos, 2);
}

#[tokio::test]
async fn unknown_category_is_rejected_and_not_stored() {
    let (app, _dir) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/api/photos/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json_upload_body("j-1", "not-a-category", b"x", None)))
        .unwrap();

    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("not-a-category"));

    let job = read_job(&app, "j-1").await;
    assert_eq!(job["status"], "pending");
}

#[tokio::test]
async fn recency_wins_until_pin_then_pin_sticks() {
    let (app, _dir) = test_app();

    let e1 = upload(&app, "j-7", "final-install", b"first").await;
    let e2 = upload(&app, "j-7", "final-install", b"second").await;

    // Unpinned: the most recent upload is canonical.
    let job = read_job(&app, "j-7").await;
    assert_eq!(
        category_item(&job, "final-install")["selectedPhotoId"],
        e2["entryId"]
    );

    // Technician pins the first shot.
    let pin = Request::builder()
        .method("POST")
        .uri("/api/photos/meta")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "jobId": "j-7",
                "categoryId": "final-install",
                "selectedPhotoId": e1["entryId"],
            })
            .to_string(),
        ))
        .unwrap();
    let (status, _) = send(&app, pin).await;
    assert_eq!(status, StatusCode::OK);

    // A later upload must not demote the pinned choice.
    upload(&app, "j-7", "final-install", b"third").await;
    let job = read_job(&app, "j-7").await;
    assert_eq!(
        category_item(&job, "final-install")["selectedPhotoId"],
        e1["entryId"]
    );
}

#[tokio::test]
async fn meta_update_is_all_or_nothing() {
    let (app, _dir) = test_app();

    // An entry in a different category.
    let other = upload(&app, "j-9", "site-overview", b"other").await;
    upload(&app, "j-9", "equipment-label", b"label").await;

    // Selection validation fails; the serial in the same request must not
    // be applied either.
    let request = Request::builder()
        .method("POST")
        .uri("/api/photos/meta")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "jobId": "j-9",
                "categoryId": "equipment-label",
                "serialNumber": "WK774105",
                "selectedPhotoId": other["entryId"],
            })
            .to_string(),
        ))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("belongs to"));

    let job = read_job(&app, "j-9").await;
    assert_eq!(
        category_item(&job, "equipment-label")["serialNumber"],
        serde_json::Value::Null
    );
}

#[tokio::test]
async fn serial_number_flips_completion_without_new_photo() {
    let (app, _dir) = test_app();

    upload(&app, "j-5", "equipment-label", b"label-shot").await;

    let job = read_job(&app, "j-5").await;
    assert_eq!(job["progress"]["complete"], 0);
    assert_eq!(job["progress"]["uploaded"], 1);

    let request = Request::builder()
        .method("POST")
        .uri("/api/photos/meta")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "jobId": "j-5",
                "categoryId": "equipment-label",
                "serialNumber": "HFE09F3HKDT",
            })
            .to_string(),
        ))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let job = read_job(&app, "j-5").await;
    assert_eq!(job["progress"]["complete"], 1);
    let item = category_item(&job, "equipment-label");
    assert_eq!(item["serialNumber"], "HFE09F3HKDT");
}

#[tokio::test]
async fn empty_job_reads_as_pending_with_all_categories() {
    let (app, _dir) = test_app();

    let job = read_job(&app, "j-empty").await;
    assert_eq!(job["status"], "pending");
    assert_eq!(job["items"].as_array().unwrap().len(), 4);
    assert_eq!(job["progress"]["total"], 4);
    assert_eq!(job["progress"]["complete"], 0);
    assert_eq!(job["progress"]["percent"], 0);
}

#[tokio::test]
async fn health_answers_head_requests_for_probes() {
    let (app, _dir) = test_app();

    let request = Request::builder()
        .method("HEAD")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_deliveries_are_kept_as_history() {
    let (app, _dir) = test_app();

    // A client retry after a lost ack delivers the identical payload
    // twice; both become entries.
    upload(&app, "j-2", "site-overview", b"same-bytes").await;
    upload(&app, "j-2", "site-overview", b"same-bytes").await;

    let job = read_job(&app, "j-2").await;
    let photos = category_item(&job, "site-overview")["photos"].as_array().unwrap();
    assert_eq!(photos.len(), 2);
    assert_eq!(photos[0]["uploadState"], "uploaded");
}
