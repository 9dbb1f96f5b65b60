//! PDF text extraction via `pdf-extract`. Only the text layer is read; embedded
//! images, forms and JavaScript actions are never interpreted.

use crate::extract::ExtractError;

const PDF_MAGIC: &[u8] = b"%PDF-";
/// Readers accept the header anywhere in the first KiB.
const HEADER_WINDOW: usize = 1024;

pub fn extract(bytes: &[u8]) -> Result<String, ExtractError> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(ExtractError::ParseFailure(
            "not a PDF: missing %PDF- header".to_string(),
        ));
    }

    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractError::ParseFailure(format!("unreadable PDF: {e}")))
}
