//! # Serial Scan
//!
//! Best-effort extraction of equipment serial numbers from captured photos.
//!
//! The pipeline runs up to three phases:
//! 1. Barcode decode through a pluggable decoder seam
//! 2. Text recognition at two page-segmentation assumptions, stopping
//!    early once a label-anchored match ("S/N: ...") is found
//! 3. Normalization of common OCR confusions in fixed-format serials
//!
//! Extraction is advisory: finding nothing is not an error, the user
//! enters the value manually. Long-running recognition observes an abort
//! flag between phases and never writes partial results.
//!
//! ## Separation of Concerns
//!
//! This crate does not own any persistent state and does not decide what
//! a serial number means for completion accounting. It only produces
//! candidate strings.

pub mod normalize;
pub mod scanner;

pub use normalize::{normalize_serial, qualifies, MIN_SERIAL_LEN};
pub use scanner::{
    AbortFlag, BarcodeDecoder, ScanError, ScanOutcome, SegmentationMode, SerialScanner,
    TextRecognizer,
};
