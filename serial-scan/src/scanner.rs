use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;

use crate::normalize::{normalize_serial, qualifies};

/// Error type for scan operations
#[derive(Debug)]
pub enum ScanError {
    /// The caller gave up; no partial result was produced.
    Aborted,
    Recognition(String),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Aborted => write!(f, "Recognition aborted by caller"),
            ScanError::Recognition(msg) => write!(f, "Recognition error: {}", msg),
        }
    }
}

impl std::error::Error for ScanError {}

/// Cooperative cancellation flag, checked between recognition phases.
#[derive(Clone, Default)]
pub struct AbortFlag {
    inner: Arc<AtomicBool>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Page-segmentation assumption for a recognition pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// Find text anywhere in the frame (labels, stickers).
    SparseText,
    /// Treat the frame as a single line (close-up of the serial itself).
    SingleLine,
}

/// Seam for barcode decoding. No decoder is bundled; the application may
/// plug a platform decoder in. Returning `None` simply skips the phase.
pub trait BarcodeDecoder: Send + Sync {
    fn decode(&self, image: &[u8]) -> Option<String>;
}

/// Seam for the OCR engine.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &[u8], mode: SegmentationMode) -> Result<String, ScanError>;
}

/// Result of an extraction run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// All qualifying candidates, deduplicated, in discovery order.
    pub candidates: Vec<String>,
    /// Barcode result if present, else the first label-anchored match,
    /// else the first qualifying candidate.
    pub best: Option<String>,
}

impl ScanOutcome {
    fn empty() -> Self {
        Self {
            candidates: Vec::new(),
            best: None,
        }
    }
}

/// Serial number extraction pipeline.
pub struct SerialScanner {
    barcode: Option<Arc<dyn BarcodeDecoder>>,
    recognizer: Arc<dyn TextRecognizer>,
    label_re: Regex,
    token_re: Regex,
}

impl SerialScanner {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            barcode: None,
            recognizer,
            // "S/N: ...", "SN ...", "Serial No. ..." and friends.
            label_re: Regex::new(
                r"(?i)(?:S\s*/?\s*N|SERIAL(?:\s*(?:NO|NUMBER))?)\s*[:#.]?\s*([A-Za-z0-9][A-Za-z0-9-]{3,})",
            )
            .expect("label regex is valid"),
            token_re: Regex::new(r"[A-Za-z0-9][A-Za-z0-9-]{4,}[A-Za-z0-9]")
                .expect("token regex is valid"),
        }
    }

    /// Scanner with the default recognizer (Tesseract when the `tesseract`
    /// feature is enabled, otherwise a no-op that defers to manual entry).
    pub fn with_default_recognizer() -> Self {
        Self::new(default_recognizer())
    }

    pub fn with_barcode_decoder(mut self, decoder: Arc<dyn BarcodeDecoder>) -> Self {
        self.barcode = Some(decoder);
        self
    }

    /// Runs the extraction phases against a captured image.
    ///
    /// Advisory: an empty outcome is a normal result, not an error. The
    /// abort flag is honored between phases; recognition work runs on the
    /// blocking pool.
    pub async fn extract_candidates(
        &self,
        image: Vec<u8>,
        abort: &AbortFlag,
    ) -> Result<ScanOutcome, ScanError> {
        let image = Arc::new(image);

        if abort.is_aborted() {
            return Err(ScanError::Aborted);
        }

        // Phase 1: barcode decode (optional).
        let barcode = match &self.barcode {
            Some(decoder) => {
                let decoder = decoder.clone();
                let img = image.clone();
                tokio::task::spawn_blocking(move || decoder.decode(&img))
                    .await
                    .map_err(|e| ScanError::Recognition(format!("Barcode task failed: {}", e)))?
            }
            None => None,
        };

        if abort.is_aborted() {
            return Err(ScanError::Aborted);
        }

        // Phase 2: sparse-text recognition.
        let sparse_text = self
            .recognize(image.clone(), SegmentationMode::SparseText)
            .await?;
        let mut labeled = self.label_matches(&sparse_text);
        let mut texts = vec![sparse_text];

        // Phase 3: single-line pass, skipped once a label anchored the hit.
        if labeled.is_empty() {
            if abort.is_aborted() {
                return Err(ScanError::Aborted);
            }
            let line_text = self
                .recognize(image.clone(), SegmentationMode::SingleLine)
                .await?;
            labeled = self.label_matches(&line_text);
            texts.push(line_text);
        }

        let mut outcome = ScanOutcome::empty();
        let push = |candidate: String, outcome: &mut ScanOutcome| {
            if !outcome.candidates.contains(&candidate) {
                outcome.candidates.push(candidate);
            }
        };

        if let Some(code) = &barcode {
            push(code.clone(), &mut outcome);
        }
        for hit in &labeled {
            push(hit.clone(), &mut outcome);
        }
        for text in &texts {
            for token in self.token_re.find_iter(text) {
                let normalized = normalize_serial(token.as_str());
                // Unanchored tokens additionally need a digit; a label
                // anchor vouches for purely structural matches.
                if qualifies(&normalized) && normalized.chars().any(|c| c.is_ascii_digit()) {
                    push(normalized, &mut outcome);
                }
            }
        }

        outcome.best = barcode
            .or_else(|| labeled.first().cloned())
            .or_else(|| outcome.candidates.first().cloned());

        if outcome.candidates.is_empty() {
            log::debug!("Serial scan found no candidates");
        }
        Ok(outcome)
    }

    async fn recognize(
        &self,
        image: Arc<Vec<u8>>,
        mode: SegmentationMode,
    ) -> Result<String, ScanError> {
        let recognizer = self.recognizer.clone();
        tokio::task::spawn_blocking(move || recognizer.recognize(&image, mode))
            .await
            .map_err(|e| ScanError::Recognition(format!("Recognition task failed: {}", e)))?
    }

    fn label_matches(&self, text: &str) -> Vec<String> {
        self.label_re
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| normalize_serial(m.as_str()))
            .filter(|candidate| qualifies(candidate))
            .collect()
    }
}

/// Tesseract-backed recognizer.
#[cfg(feature = "tesseract")]
pub struct TesseractRecognizer {
    languages: String,
}

#[cfg(feature = "tesseract")]
impl TesseractRecognizer {
    pub fn new(languages: &str) -> Self {
        Self {
            languages: if languages.is_empty() {
                "eng".to_string()
            } else {
                languages.to_string()
            },
        }
    }
}

#[cfg(feature = "tesseract")]
impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image_bytes: &[u8], mode: SegmentationMode) -> Result<String, ScanError> {
        use std::io::Cursor;

        // Convert to PNG in memory for leptess
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| ScanError::Recognition(format!("Failed to load image: {}", e)))?;
        let mut png_data = Vec::new();
        img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
            .map_err(|e| ScanError::Recognition(format!("Failed to convert image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.languages)
            .map_err(|e| ScanError::Recognition(format!("Failed to initialize Tesseract: {}", e)))?;

        let psm = match mode {
            SegmentationMode::SparseText => "11",
            SegmentationMode::SingleLine => "7",
        };
        lt.set_variable(leptess::Variable::TesseditPagesegMode, psm)
            .map_err(|e| ScanError::Recognition(format!("Failed to set PSM: {}", e)))?;
        lt.set_variable(
            leptess::Variable::TesseditCharWhitelist,
            "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-/:. ",
        )
        .map_err(|e| ScanError::Recognition(format!("Failed to set whitelist: {}", e)))?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ScanError::Recognition(format!("Failed to set image for OCR: {}", e)))?;

        lt.get_utf8_text()
            .map_err(|e| ScanError::Recognition(format!("OCR failed: {}", e)))
    }
}

/// No-op recognizer used when Tesseract is not compiled in. Extraction
/// then yields nothing and the technician types the serial by hand.
pub struct DisabledRecognizer;

impl TextRecognizer for DisabledRecognizer {
    fn recognize(&self, _image: &[u8], _mode: SegmentationMode) -> Result<String, ScanError> {
        log::debug!("Text recognition disabled (built without the tesseract feature)");
        Ok(String::new())
    }
}

#[cfg(feature = "tesseract")]
fn default_recognizer() -> Arc<dyn TextRecognizer> {
    Arc::new(TesseractRecognizer::new("eng"))
}

#[cfg(not(feature = "tesseract"))]
fn default_recognizer() -> Arc<dyn TextRecognizer> {
    Arc::new(DisabledRecognizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Recognizer returning canned text per mode, counting invocations.
    struct FakeRecognizer {
        sparse: String,
        line: String,
        calls: AtomicUsize,
        abort_after_call: Option<AbortFlag>,
    }

    impl FakeRecognizer {
        fn new(sparse: &str, line: &str) -> Self {
            Self {
                sparse: sparse.to_string(),
                line: line.to_string(),
                calls: AtomicUsize::new(0),
                abort_after_call: None,
            }
        }
    }

    impl TextRecognizer for FakeRecognizer {
        fn recognize(&self, _image: &[u8], mode: SegmentationMode) -> Result<String, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(flag) = &self.abort_after_call {
                flag.abort();
            }
            Ok(match mode {
                SegmentationMode::SparseText => self.sparse.clone(),
                SegmentationMode::SingleLine => self.line.clone(),
            })
        }
    }

    struct FixedBarcode(&'static str);

    impl BarcodeDecoder for FixedBarcode {
        fn decode(&self, _image: &[u8]) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn label_anchored_match_stops_early() {
        let recognizer = Arc::new(FakeRecognizer::new(
            "Model X200\nS/N: HFEQ9F3HKDT\nMade in DE",
            "IGNORED-999999",
        ));
        let scanner = SerialScanner::new(recognizer.clone());

        let outcome = scanner
            .extract_candidates(vec![0u8; 4], &AbortFlag::new())
            .await
            .unwrap();

        // Misread Q before the digit 9 is normalized away.
        assert_eq!(outcome.best.as_deref(), Some("HFE09F3HKDT"));
        // The single-line pass never ran.
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_through_to_single_line_pass() {
        let recognizer = Arc::new(FakeRecognizer::new(
            "no serial here",
            "WK-774105",
        ));
        let scanner = SerialScanner::new(recognizer.clone());

        let outcome = scanner
            .extract_candidates(vec![0u8; 4], &AbortFlag::new())
            .await
            .unwrap();

        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.best.as_deref(), Some("WK-774105"));
    }

    #[tokio::test]
    async fn barcode_wins_over_ocr() {
        let scanner = SerialScanner::new(Arc::new(FakeRecognizer::new(
            "S/N: HFEQ9F3HKDT",
            "",
        )))
        .with_barcode_decoder(Arc::new(FixedBarcode("BC77410X")));

        let outcome = scanner
            .extract_candidates(vec![0u8; 4], &AbortFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.best.as_deref(), Some("BC77410X"));
        // OCR hit is still reported as a candidate.
        assert!(outcome.candidates.contains(&"HFE09F3HKDT".to_string()));
    }

    #[tokio::test]
    async fn candidates_are_deduplicated_and_filtered() {
        let scanner = SerialScanner::new(Arc::new(FakeRecognizer::new(
            "S/N: WK774105 label WK774105 tiny AB1",
            "",
        )));

        let outcome = scanner
            .extract_candidates(vec![0u8; 4], &AbortFlag::new())
            .await
            .unwrap();

        let hits: Vec<&str> = outcome.candidates.iter().map(String::as_str).collect();
        assert_eq!(hits.iter().filter(|c| **c == "WK774105").count(), 1);
        assert!(!hits.iter().any(|c| c.len() < crate::normalize::MIN_SERIAL_LEN));
    }

    #[tokio::test]
    async fn no_candidates_is_not_an_error() {
        let scanner = SerialScanner::new(Arc::new(FakeRecognizer::new("", "")));
        let outcome = scanner
            .extract_candidates(vec![0u8; 4], &AbortFlag::new())
            .await
            .unwrap();
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.best, None);
    }

    #[tokio::test]
    async fn aborted_before_start() {
        let scanner = SerialScanner::new(Arc::new(FakeRecognizer::new("S/N: WK774105", "")));
        let abort = AbortFlag::new();
        abort.abort();

        assert!(matches!(
            scanner.extract_candidates(vec![0u8; 4], &abort).await,
            Err(ScanError::Aborted)
        ));
    }

    #[tokio::test]
    async fn abort_between_phases_is_observed() {
        let abort = AbortFlag::new();
        let mut recognizer = FakeRecognizer::new("nothing useful", "WK-774105");
        recognizer.abort_after_call = Some(abort.clone());
        let recognizer = Arc::new(recognizer);
        let scanner = SerialScanner::new(recognizer.clone());

        // The sparse pass runs, sets the flag, and the single-line pass
        // must not start.
        assert!(matches!(
            scanner.extract_candidates(vec![0u8; 4], &abort).await,
            Err(ScanError::Aborted)
        ));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_recognizer_yields_empty_outcome() {
        let scanner = SerialScanner::new(Arc::new(DisabledRecognizer));
        let outcome = scanner
            .extract_candidates(vec![0u8; 4], &AbortFlag::new())
            .await
            .unwrap();
        assert!(outcome.candidates.is_empty());
    }
}
