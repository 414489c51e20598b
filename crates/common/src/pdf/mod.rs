//! PDF page text extraction
//!
//! Extracts text per page using lopdf. Page order is the document's page
//! order; a page whose text cannot be decoded yields an empty string so that
//! page numbering stays dense.

use crate::errors::{AppError, Result};
use tracing::{debug, warn};

/// Text of every page, in order. `pages[i]` is page `i + 1`.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::PdfParse {
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => texts.push(normalize(&text)),
            Err(e) => {
                warn!(page = page_number, error = %e, "Failed to extract text from page, keeping it empty");
                texts.push(String::new());
            }
        }
    }

    Ok(texts)
}

/// Whether the bytes carry the PDF file signature
pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Collapse runs of blank lines and trailing whitespace left by the extractor
fn normalize(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
