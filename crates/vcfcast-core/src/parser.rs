//! Contact-file parser seam.
//!
//! The parser is a collaborator: the session only needs
//! `raw text -> [(name, [raw phone])]` or a single `MalformedInput` failure.
//! [`CardReader`] is a small reader for the `BEGIN:VCARD` / `FN` / `TEL` /
//! `END:VCARD` subset that contact exports actually use; it does not attempt
//! the full vCard grammar (parameters beyond the property name, encodings,
//! nested agents).

use crate::{ContactError, ParsedEntry};

/// Turns raw contact-file text into parser entries.
pub trait ContactParser: Send + Sync {
    /// Parse the whole file.
    ///
    /// # Errors
    ///
    /// - `ContactError::MalformedInput` if the text is not a contact file
    fn parse(&self, raw: &str) -> Result<Vec<ParsedEntry>, ContactError>;
}

/// Validate the declared content type and decode an upload to text.
///
/// A missing content type is accepted; a declared one must name a contact
/// card (`vcard`/`vcf`) or plain directory text.
pub fn decode_upload(bytes: &[u8], declared_type: Option<&str>) -> Result<String, ContactError> {
    if let Some(mime) = declared_type {
        let mime = mime.trim().to_ascii_lowercase();
        let accepted = mime.contains("vcard")
            || mime.contains("vcf")
            || mime == "text/plain"
            || mime == "text/directory";
        if !accepted {
            return Err(ContactError::UnsupportedFileType(mime));
        }
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| ContactError::MalformedInput(format!("file is not valid UTF-8: {e}")))?;

    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Reader for the common vCard subset.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardReader;

impl CardReader {
    /// Create a reader.
    pub fn new() -> Self {
        Self
    }
}

impl ContactParser for CardReader {
    fn parse(&self, raw: &str) -> Result<Vec<ParsedEntry>, ContactError> {
        let mut entries = Vec::new();
        let mut current: Option<ParsedEntry> = None;

        for line in unfold(raw) {
            let Some((head, value)) = line.split_once(':') else {
                continue;
            };
            let property = property_name(head);
            let value = value.trim();

            if property.eq_ignore_ascii_case("BEGIN") && value.eq_ignore_ascii_case("VCARD") {
                if current.is_some() {
                    return Err(malformed("BEGIN:VCARD inside an open card"));
                }
                current = Some(ParsedEntry::default());
            } else if property.eq_ignore_ascii_case("END") && value.eq_ignore_ascii_case("VCARD") {
                let entry = current.take().ok_or_else(|| malformed("END:VCARD without BEGIN"))?;
                entries.push(entry);
            } else if let Some(entry) = current.as_mut() {
                if property.eq_ignore_ascii_case("FN") && entry.name.is_none() {
                    entry.name = Some(unescape(value));
                } else if property.eq_ignore_ascii_case("TEL") && !value.is_empty() {
                    entry.phones.push(strip_uri_scheme(value).to_string());
                }
            }
        }

        if current.is_some() {
            return Err(malformed("card is missing END:VCARD"));
        }
        if entries.is_empty() {
            return Err(malformed("no BEGIN:VCARD found"));
        }

        Ok(entries)
    }
}

fn malformed(reason: &str) -> ContactError {
    ContactError::MalformedInput(reason.to_string())
}

/// Join folded continuation lines (leading space or tab) onto their parent.
fn unfold(raw: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match (line.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(continuation), Some(previous)) => previous.push_str(continuation),
            _ => lines.push(line.to_string()),
        }
    }
    lines
}

/// Property name without parameters or group prefix (`item1.TEL;TYPE=CELL`).
fn property_name(head: &str) -> &str {
    let name = head.split(';').next().unwrap_or(head).trim();
    name.rsplit('.').next().unwrap_or(name)
}

fn strip_uri_scheme(value: &str) -> &str {
    match value.get(..4) {
        Some(scheme) if scheme.eq_ignore_ascii_case("tel:") => &value[4..],
        _ => value,
    }
}

fn unescape(value: &str) -> String {
    value.replace("\\,", ",").replace("\\;", ";").replace("\\n", " ").replace("\\N", " ")
}
