use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{DeliveryNotice, NewUpload, QueuedUpload, UploadBody};
use crate::queue::{QueueError, UploadQueue};

/// Bounded in-memory session log (volatile, lost on restart).
const DRAIN_LOG_CAP: usize = 500;

/// Errors from a single delivery attempt.
#[derive(Debug)]
pub enum DispatchError {
    Queue(QueueError),
    /// Connection-level failure (offline, DNS, timeout). Transient.
    Request(reqwest::Error),
    /// The remote answered with a non-2xx status.
    Rejected { status: u16, body: String },
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Queue(e) => write!(f, "Queue error: {}", e),
            DispatchError::Request(e) => write!(f, "Request failed: {}", e),
            DispatchError::Rejected { status, body } => {
                write!(f, "Remote rejected upload ({}): {}", status, body)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<QueueError> for DispatchError {
    fn from(err: QueueError) -> Self {
        DispatchError::Queue(err)
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Request(err)
    }
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed(DrainStats),
    /// Another drain was already in flight; this call was a no-op.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Session log entry for one drain pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DrainLogEntry {
    pub ts_ms: i64,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Server acknowledgment body for a successful upload.
#[derive(Debug, Default, Deserialize)]
struct UploadAck {
    #[serde(default)]
    #[allow(dead_code)]
    ok: bool,
    #[serde(default, rename = "entryId")]
    entry_id: Option<String>,
    #[serde(default, rename = "photoUrl")]
    photo_url: Option<String>,
    #[serde(default, rename = "thumbUrl")]
    thumb_url: Option<String>,
}

struct DispatcherInner {
    queue: UploadQueue,
    client: reqwest::Client,
    draining: AtomicBool,
    notices: watch::Sender<Option<DeliveryNotice>>,
    drain_log: Mutex<Vec<DrainLogEntry>>,
}

/// Sends queued jobs to their endpoints, strictly in order.
///
/// A drain never runs two jobs concurrently: job N+1 is not started until
/// job N's attempt has completed, which preserves per-slot delivery order
/// from a single device. The first failed attempt ends the pass; everything
/// still queued is retried on the next trigger.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(queue: UploadQueue) -> Self {
        let (notices, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(DispatcherInner {
                queue,
                client: reqwest::Client::new(),
                draining: AtomicBool::new(false),
                notices,
                drain_log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscribe to best-effort delivery notices.
    pub fn subscribe_deliveries(&self) -> watch::Receiver<Option<DeliveryNotice>> {
        self.inner.notices.subscribe()
    }

    /// Attempt delivery of every queued job, oldest first.
    ///
    /// Single-flight per process: a call while another drain is running
    /// returns `AlreadyRunning` without touching the queue.
    pub async fn drain(&self) -> Result<DrainOutcome, QueueError> {
        if self.inner.draining.swap(true, Ordering::SeqCst) {
            log::debug!("Drain already in progress, skipping");
            return Ok(DrainOutcome::AlreadyRunning);
        }
        let _guard = DrainGuard {
            flag: &self.inner.draining,
        };

        let jobs = self.inner.queue.list_pending()?;
        let mut stats = DrainStats::default();

        for job in jobs {
            stats.attempted += 1;
            match self.deliver(&job).await {
                Ok(notice) => {
                    self.inner.queue.remove(job.id)?;
                    stats.delivered += 1;
                    // Best-effort: nobody listening is fine.
                    let _ = self.inner.notices.send(Some(notice));
                }
                Err(e) => {
                    stats.failed += 1;
                    log::warn!("Upload {} failed, staying queued: {}", job.id, e);
                    // Stop here: skipping past a failed job could reorder
                    // same-slot deliveries.
                    break;
                }
            }
        }

        self.append_log(&stats);
        if stats.attempted > 0 {
            log::info!(
                "Drain complete: {} delivered, {} failed of {}",
                stats.delivered,
                stats.failed,
                stats.attempted
            );
        }
        Ok(DrainOutcome::Completed(stats))
    }

    /// Best-effort immediate send, bypassing the queue.
    ///
    /// Used when durable storage is unavailable: no retry guarantee.
    pub async fn send_immediate(&self, job: NewUpload) -> Result<DeliveryNotice, DispatchError> {
        let queued = QueuedUpload {
            id: Uuid::new_v4(),
            created_at: Utc::now().timestamp_millis(),
            endpoint: job.endpoint,
            method: job.method,
            headers: job.headers,
            body: job.body,
            meta: job.meta,
        };
        self.deliver(&queued).await
    }

    /// Recent drain results, oldest first.
    pub fn drain_log(&self) -> Vec<DrainLogEntry> {
        match self.inner.drain_log.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }

    async fn deliver(&self, job: &QueuedUpload) -> Result<DeliveryNotice, DispatchError> {
        let method = reqwest::Method::from_bytes(job.method.as_bytes())
            .unwrap_or(reqwest::Method::POST);
        let mut request = self.inner.client.request(method, &job.endpoint);

        if let Some(headers) = &job.headers {
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        request = match &job.body {
            UploadBody::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    let mut p = reqwest::multipart::Part::bytes(part.bytes.clone());
                    if let Some(file_name) = &part.file_name {
                        p = p.file_name(file_name.clone());
                    }
                    p = p.mime_str(&part.mime_type)?;
                    form = form.part(part.field_name.clone(), p);
                }
                request.multipart(form)
            }
            UploadBody::Raw(bytes) => request.body(bytes.clone()),
        };

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // The ack body is informational; an unparseable body still counts
        // as a confirmed delivery.
        let ack = response.json::<UploadAck>().await.unwrap_or_default();
        log::debug!("Delivered upload {} (entry {:?})", job.id, ack.entry_id);

        Ok(DeliveryNotice {
            queue_id: job.id,
            entry_id: ack.entry_id,
            photo_url: ack.photo_url,
            thumb_url: ack.thumb_url,
            meta: job.meta.clone(),
        })
    }

    fn append_log(&self, stats: &DrainStats) {
        if let Ok(mut guard) = self.inner.drain_log.lock() {
            guard.push(DrainLogEntry {
                ts_ms: Utc::now().timestamp_millis(),
                attempted: stats.attempted,
                delivered: stats.delivered,
                failed: stats.failed,
            });
            let len = guard.len();
            if len > DRAIN_LOG_CAP {
                let remove = len - DRAIN_LOG_CAP;
                guard.drain(0..remove);
            }
        }
    }
}

struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
