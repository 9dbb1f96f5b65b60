//! DOCX text extraction. A DOCX is a ZIP container; the body text lives in
//! `word/document.xml`. Only that part is inflated, and only up to the upload
//! ceiling, so a small archive cannot expand into an unbounded buffer.
//! Macros, media and embedded objects are never opened.

use std::borrow::Cow;
use std::io::{Cursor, Read};
use std::sync::OnceLock;

use regex::Regex;

use crate::extract::ExtractError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const DOCUMENT_PART: &str = "word/document.xml";

pub fn extract(bytes: &[u8], max_bytes: usize) -> Result<String, ExtractError> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(ExtractError::ParseFailure(
            "not a DOCX: missing ZIP signature".to_string(),
        ));
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::ParseFailure(format!("unreadable DOCX container: {e}")))?;
    let entry = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ExtractError::ParseFailure(format!("DOCX has no {DOCUMENT_PART}")))?;

    let declared = entry.size();
    if declared > max_bytes as u64 {
        return Err(ExtractError::TooLarge {
            size: usize::try_from(declared).unwrap_or(usize::MAX),
            limit: max_bytes,
        });
    }

    // The declared size can lie; bound the actual inflation too.
    let mut raw = Vec::new();
    entry
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(|e| ExtractError::ParseFailure(format!("corrupt {DOCUMENT_PART}: {e}")))?;
    if raw.len() > max_bytes {
        return Err(ExtractError::TooLarge {
            size: raw.len(),
            limit: max_bytes,
        });
    }

    let xml = String::from_utf8(raw)
        .map_err(|_| ExtractError::ParseFailure(format!("{DOCUMENT_PART} is not UTF-8")))?;
    Ok(document_text(&xml))
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"<w:t(?:\s[^>]*)?>(?P<text>[^<]*)</w:t>|(?P<tab><w:tab\b[^>]*/>)|(?P<br><w:(?:br|cr)\b[^>]*/>)|(?P<para></w:p>)",
        )
        .expect("static regex must compile")
    })
}

/// Walks the WordprocessingML runs in document order: `w:t` text, tabs,
/// explicit breaks, and paragraph ends.
fn document_text(xml: &str) -> String {
    let mut out = String::new();
    for caps in token_pattern().captures_iter(xml) {
        if let Some(text) = caps.name("text") {
            out.push_str(&decode_entities(text.as_str()));
        } else if caps.name("tab").is_some() {
            out.push('\t');
        } else if caps.name("br").is_some() || caps.name("para").is_some() {
            out.push('\n');
        }
    }
    out
}

/// Decodes the five predefined XML entities and numeric character references.
/// Unknown or malformed references are kept verbatim.
fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').and_then(|semi| {
            let name = &rest[1..semi];
            let ch = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => name
                    .strip_prefix("#x")
                    .or_else(|| name.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
