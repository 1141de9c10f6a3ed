use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a queued job's stored body maps onto the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyEncoding {
    /// Ordered form parts, re-encoded as `multipart/form-data` on send.
    Multipart,
    /// Opaque bytes sent as-is (content type taken from the job headers).
    Raw,
}

impl BodyEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyEncoding::Multipart => "multipart",
            BodyEncoding::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multipart" => Some(BodyEncoding::Multipart),
            "raw" => Some(BodyEncoding::Raw),
            _ => None,
        }
    }
}

/// One part of a multipart job body.
///
/// Bytes are kept as raw buffers end to end; they are stored as BLOBs and
/// never re-encoded as text.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPart {
    pub field_name: String,
    /// Present for file parts, absent for plain form fields.
    pub file_name: Option<String>,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadPart {
    /// Plain text form field.
    pub fn text(field_name: &str, value: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            file_name: None,
            mime_type: "text/plain".to_string(),
            bytes: value.as_bytes().to_vec(),
        }
    }

    /// File part with a filename and content type.
    pub fn file(field_name: &str, file_name: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            field_name: field_name.to_string(),
            file_name: Some(file_name.to_string()),
            mime_type: mime_type.to_string(),
            bytes,
        }
    }
}

/// The stored body of a queued job.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadBody {
    Multipart(Vec<UploadPart>),
    Raw(Vec<u8>),
}

impl UploadBody {
    pub fn encoding(&self) -> BodyEncoding {
        match self {
            UploadBody::Multipart(_) => BodyEncoding::Multipart,
            UploadBody::Raw(_) => BodyEncoding::Raw,
        }
    }
}

/// A job handed to the queue. The queue assigns the id and creation time.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub endpoint: String,
    pub method: String,
    pub headers: Option<HashMap<String, String>>,
    pub body: UploadBody,
    /// Free-form metadata echoed back in delivery notices (e.g. the slot
    /// the upload belongs to), never sent over the wire.
    pub meta: Option<serde_json::Value>,
}

impl NewUpload {
    /// POST job with a multipart body, the common case.
    pub fn post_multipart(endpoint: &str, parts: Vec<UploadPart>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            method: "POST".to_string(),
            headers: None,
            body: UploadBody::Multipart(parts),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// A persisted job as returned by `list_pending`.
///
/// Immutable once stored; the only mutation is deletion after the remote
/// end has confirmed acceptance.
#[derive(Debug, Clone)]
pub struct QueuedUpload {
    pub id: Uuid,
    /// Enqueue time in epoch milliseconds. Listing order is creation order.
    pub created_at: i64,
    pub endpoint: String,
    pub method: String,
    pub headers: Option<HashMap<String, String>>,
    pub body: UploadBody,
    pub meta: Option<serde_json::Value>,
}

/// Best-effort notification published after a confirmed delivery.
///
/// Carries the server-assigned identifiers so optimistic local state can
/// reconcile. Losing a notice is harmless: the next snapshot read from the
/// server reflects the truth.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryNotice {
    pub queue_id: Uuid,
    pub entry_id: Option<String>,
    pub photo_url: Option<String>,
    pub thumb_url: Option<String>,
    pub meta: Option<serde_json::Value>,
}
