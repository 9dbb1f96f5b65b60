//! Document Text Extractor: turns an uploaded résumé into bounded plain text.
//!
//! The size ceiling is checked on the raw byte count before any container is
//! opened. PDF and DOCX parsing run on the blocking pool under a time budget;
//! plain text is decoded inline.

mod docx;
mod pdf;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type '{0}'; expected pdf, docx or txt")]
    UnsupportedType(String),

    #[error("document is {size} bytes, over the {limit}-byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("cannot parse document: {0}")]
    ParseFailure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Pdf,
    Docx,
    Txt,
}

impl DocumentType {
    /// Accepts a bare kind (`pdf`), a MIME type (`application/pdf`, parameters
    /// ignored) or a file name whose extension decides.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let declared = declared.trim().to_ascii_lowercase();
        let essence = declared.split(';').next().unwrap_or("").trim();

        match essence {
            "pdf" | "application/pdf" => return Some(DocumentType::Pdf),
            "docx" | DOCX_MIME => return Some(DocumentType::Docx),
            "txt" | "text" | "text/plain" => return Some(DocumentType::Txt),
            _ => {}
        }

        match essence.rsplit_once('.') {
            Some((_, "pdf")) => Some(DocumentType::Pdf),
            Some((_, "docx")) => Some(DocumentType::Docx),
            Some((_, "txt")) => Some(DocumentType::Txt),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Docx => "docx",
            DocumentType::Txt => "txt",
        })
    }
}

/// Synchronous core: ceiling check, then the per-format extractor.
pub fn extract_text(bytes: &[u8], kind: DocumentType, max_bytes: usize) -> Result<String, ExtractError> {
    if bytes.len() > max_bytes {
        return Err(ExtractError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    match kind {
        DocumentType::Txt => Ok(String::from_utf8_lossy(bytes).into_owned()),
        DocumentType::Pdf => pdf::extract(bytes),
        DocumentType::Docx => docx::extract(bytes, max_bytes),
    }
}

#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    max_bytes: usize,
    parse_timeout: Duration,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES, Duration::from_secs(15))
    }
}

impl DocumentExtractor {
    pub fn new(max_bytes: usize, parse_timeout: Duration) -> Self {
        Self {
            max_bytes,
            parse_timeout,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn parse_timeout(&self) -> Duration {
        self.parse_timeout
    }

    pub async fn extract(&self, bytes: Bytes, declared_type: &str) -> Result<String, ExtractError> {
        if bytes.len() > self.max_bytes {
            return Err(ExtractError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        let kind = DocumentType::from_declared(declared_type)
            .ok_or_else(|| ExtractError::UnsupportedType(declared_type.to_string()))?;
        self.extract_kind(bytes, kind).await
    }

    pub async fn extract_kind(&self, bytes: Bytes, kind: DocumentType) -> Result<String, ExtractError> {
        if kind == DocumentType::Txt {
            return extract_text(&bytes, kind, self.max_bytes);
        }

        let max_bytes = self.max_bytes;
        let size = bytes.len();
        let task = tokio::task::spawn_blocking(move || extract_text(&bytes, kind, max_bytes));

        // On timeout the blocking thread finishes on its own; its result is dropped.
        let text = match tokio::time::timeout(self.parse_timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(ExtractError::ParseFailure(format!(
                    "{kind} parser aborted: {join_error}"
                )))
            }
            Err(_) => {
                return Err(ExtractError::ParseFailure(format!(
                    "{kind} parsing exceeded {:?}",
                    self.parse_timeout
                )))
            }
        };

        debug!(%kind, size, chars = text.chars().count(), "document text extracted");
        Ok(text)
    }
}
