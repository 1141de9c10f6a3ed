//! # Photo Queue
//!
//! A durable upload queue for offline-first photo capture.
//!
//! This crate provides the client-side delivery pipeline for job-site
//! photo uploads:
//! - Durable queueing of upload jobs in SQLite (survives restarts)
//! - Connectivity monitoring with an active liveness probe
//! - Sequential, single-flight dispatch with delivery notifications
//! - Thumbnail generation and sharpness scoring for captured images
//!
//! ## Platform Separation
//!
//! This crate focuses on cross-platform delivery logic. Capture sources
//! (camera integration, file pickers) belong in the application crate.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use photo_queue::{UploadQueue, Dispatcher};
//!
//! let queue = UploadQueue::open("/path/to/queue.db")?;
//! let id = queue.enqueue(job)?;
//!
//! let dispatcher = Dispatcher::new(queue);
//! dispatcher.drain().await?;
//! ```

pub mod connectivity;
pub mod dispatcher;
pub mod models;
pub mod queue;
pub mod schema;
pub mod thumbnail;

pub use connectivity::{ConnectivityConfig, ConnectivityMonitor};
pub use dispatcher::{DispatchError, Dispatcher, DrainLogEntry, DrainOutcome, DrainStats};
pub use models::{BodyEncoding, DeliveryNotice, NewUpload, QueuedUpload, UploadBody, UploadPart};
pub use queue::{QueueError, UploadQueue};
pub use schema::init_queue_schema;
pub use thumbnail::{create_upload_thumbnail, prepare_capture, sharpness_score, ThumbnailError};
