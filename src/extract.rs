// 📄 Text/Table Extraction - two independent passes over the PDF bytes
//
// primary:  pdf-extract layout pass (reading order, column spacing kept)
// fallback: lopdf raw text, page by page
//
// A failing pass yields "" and never suppresses the other one. Only a
// document that cannot be opened at all is an error. Encrypted documents are
// unlocked with the empty user password first, then with the caller's.

use crate::error::{ExtractionFailure, StatementError};
use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

// ============================================================================
// RAW DOCUMENT
// ============================================================================

/// PDF payload for a single parse invocation
#[derive(Debug, Clone)]
pub struct RawDocument {
    bytes: Vec<u8>,
}

impl RawDocument {
    /// Accept a payload no larger than `max_bytes`
    pub fn new(bytes: Vec<u8>, max_bytes: usize) -> Result<Self, StatementError> {
        if bytes.len() > max_bytes {
            return Err(StatementError::DocumentTooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }
        Ok(RawDocument { bytes })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// SHA-256 of the payload, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// TEXT SOURCE
// ============================================================================

/// Read-only view over the extracted text candidates handed to parsers
pub trait TextSource {
    fn primary_text(&self) -> &str;

    fn fallback_text(&self) -> &str;

    fn tables(&self) -> &[Vec<String>] {
        &[]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub primary_text: String,
    pub fallback_text: String,
    pub tables: Vec<Vec<String>>,
}

impl ExtractionResult {
    /// Build a result from already-extracted text; tables are re-detected
    pub fn from_texts(primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        let primary_text = primary.into();
        let fallback_text = fallback.into();
        let tables = if primary_text.trim().is_empty() {
            detect_tables(&fallback_text)
        } else {
            detect_tables(&primary_text)
        };

        ExtractionResult {
            primary_text,
            fallback_text,
            tables,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.primary_text.trim().is_empty() && self.fallback_text.trim().is_empty()
    }
}

impl TextSource for ExtractionResult {
    fn primary_text(&self) -> &str {
        &self.primary_text
    }

    fn fallback_text(&self) -> &str {
        &self.fallback_text
    }

    fn tables(&self) -> &[Vec<String>] {
        &self.tables
    }
}

// ============================================================================
// PDF EXTRACTOR
// ============================================================================

pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        PdfExtractor
    }

    pub fn extract(
        &self,
        document: &RawDocument,
        password: Option<&str>,
    ) -> Result<ExtractionResult, ExtractionFailure> {
        let bytes = document.bytes();
        if bytes.is_empty() {
            return Err(ExtractionFailure::Empty);
        }
        if !has_pdf_header(bytes) {
            return Err(ExtractionFailure::NotPdf("missing %PDF header".to_string()));
        }

        let mut doc =
            Document::load_mem(bytes).map_err(|e| ExtractionFailure::NotPdf(e.to_string()))?;
        let decrypted = if doc.is_encrypted() {
            unlock(|candidate| doc.decrypt(candidate).is_ok(), password)?;
            doc.trailer.remove(b"Encrypt");
            Some(decrypted_bytes(&mut doc))
        } else {
            None
        };

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(ExtractionFailure::NoPages);
        }

        let primary = match &decrypted {
            Some(plain) => primary_pass(plain),
            None => primary_pass(bytes),
        };
        let fallback = fallback_pass(&doc, &page_numbers);

        debug!(
            pages = page_numbers.len(),
            primary_chars = primary.len(),
            fallback_chars = fallback.len(),
            "extracted text candidates"
        );

        Ok(ExtractionResult::from_texts(primary, fallback))
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Try the empty user password, then the caller's. `try_password` reports
/// whether a candidate opened the document.
fn unlock<F>(mut try_password: F, password: Option<&str>) -> Result<(), ExtractionFailure>
where
    F: FnMut(&str) -> bool,
{
    if try_password("") {
        debug!("document opened with the empty user password");
        return Ok(());
    }
    match password.map(str::trim).filter(|p| !p.is_empty()) {
        None => Err(ExtractionFailure::PasswordRequired),
        Some(p) if try_password(p) => Ok(()),
        Some(_) => Err(ExtractionFailure::IncorrectPassword),
    }
}

/// Re-serialize a decrypted document for the layout pass
fn decrypted_bytes(doc: &mut Document) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = doc.save_to(&mut buf) {
        warn!(error = %e, "could not re-serialize decrypted document");
        buf.clear();
    }
    buf
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    // Some producers emit junk before the header; readers scan the first 1 KiB.
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

fn primary_pass(bytes: &[u8]) -> String {
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = ?e, "layout extraction failed");
            String::new()
        }
        Err(_) => {
            warn!("layout extraction panicked");
            String::new()
        }
    }
}

fn fallback_pass(doc: &Document, page_numbers: &[u32]) -> String {
    let mut pages = Vec::with_capacity(page_numbers.len());
    for &page in page_numbers {
        let text = panic::catch_unwind(AssertUnwindSafe(|| doc.extract_text(&[page])));
        match text {
            Ok(Ok(t)) => pages.push(t),
            Ok(Err(e)) => debug!(page, error = %e, "raw text extraction failed for page"),
            Err(_) => warn!(page, "raw text extraction panicked"),
        }
    }
    pages.join("\n")
}

// ============================================================================
// TABLE DETECTION
// ============================================================================

static CELL_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+|\s{2,}").expect("valid regex"));

/// Rows whose cells are separated by runs of 2+ spaces or tabs, 3 cells minimum
pub fn detect_tables(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .map(|line| {
            CELL_SPLIT
                .split(line.trim())
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|cells| cells.len() >= 3)
        .collect()
}
