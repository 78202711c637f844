//! Plain-text extraction for document attachments.
//!
//! Nothing fancier than text recovery: the extracted text is handed to the
//! text classifier, so all we need is the prose a human would read. Payloads
//! that are mostly binary (compressed PDFs, images-in-a-wrapper) yield no
//! usable text and the caller fails closed.

use crate::error::ClassifierError;

/// Minimum share of printable characters for an extraction to count.
const MIN_PRINTABLE_RATIO: f32 = 0.7;

/// Maximum extracted length fed to the classifier.
const MAX_EXTRACTED_CHARS: usize = 8_000;

/// Recover readable text from a document payload.
///
/// Returns `Ok(text)` only when the payload decodes into predominantly
/// printable content; everything else is an extraction error so the caller
/// takes the fail-closed path.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, ClassifierError> {
    if bytes.is_empty() {
        return Err(ClassifierError::DocumentExtraction(format!(
            "{filename}: empty payload"
        )));
    }

    let decoded = String::from_utf8_lossy(bytes);

    let mut printable = 0usize;
    let mut total = 0usize;
    let mut kept = 0usize;
    let mut text = String::with_capacity(decoded.len().min(MAX_EXTRACTED_CHARS));

    for ch in decoded.chars() {
        total += 1;
        if ch == '\u{FFFD}' || (ch.is_control() && ch != '\n' && ch != '\t' && ch != '\r') {
            continue;
        }
        printable += 1;
        if kept < MAX_EXTRACTED_CHARS {
            text.push(ch);
            kept += 1;
        }
    }

    let ratio = printable as f32 / total.max(1) as f32;
    if ratio < MIN_PRINTABLE_RATIO {
        return Err(ClassifierError::DocumentExtraction(format!(
            "{filename}: payload is {:.0}% non-printable",
            (1.0 - ratio) * 100.0
        )));
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ClassifierError::DocumentExtraction(format!(
            "{filename}: zero-length extraction"
        )));
    }

    Ok(text)
}
