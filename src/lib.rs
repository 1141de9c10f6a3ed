//! Technician-side agent for job-site photo documentation.
//!
//! Captured photos are prepared (thumbnail + sharpness), scanned for
//! serial numbers, and enqueued in a durable local queue. A background
//! agent drains the queue to the sitesnap server whenever connectivity
//! allows; nothing is ever lost to a dead zone on site.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod services;

pub use config::AgentConfig;
pub use error::AppError;
