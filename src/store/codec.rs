//! Line codec for the translation log.
//!
//! Every record is one LF-terminated line of TAB-separated fields:
//!
//! ```text
//! <seq> s <timestamp> <actor> <id> <text>
//! <seq> t <timestamp> <actor> <id> <lang> <text>
//! <seq> d <timestamp> <actor> <id>
//! ```
//!
//! Textual fields escape `\`, TAB, LF and CR as `\\`, `\t`, `\n` and `\r`.
//! Timestamps are RFC 3339 UTC with the shortest lossless fraction. The
//! format is frozen: `encode` of a given record always produces the same bytes.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use super::record::{EditRecord, RecordPayload, StringId};

/// First line of every log file.
pub const HEADER: &str = "#translation-log v1";

const SEPARATOR: char = '\t';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported log header {0:?}")]
    UnsupportedHeader(String),

    #[error("unknown record kind {0:?}")]
    UnknownKind(String),

    #[error("record kind {kind:?} expects {expected} fields, found {found}")]
    FieldCount {
        kind: String,
        expected: usize,
        found: usize,
    },

    #[error("unparseable sequence number {0:?}")]
    BadSequence(String),

    #[error("unparseable timestamp {0:?}")]
    BadTimestamp(String),

    #[error("invalid escape sequence in field {0}")]
    BadEscape(&'static str),

    #[error("empty {0} field")]
    EmptyField(&'static str),
}

/// Check the first line of a log file.
pub fn check_header(line: &str) -> Result<(), DecodeError> {
    if line == HEADER {
        Ok(())
    } else {
        Err(DecodeError::UnsupportedHeader(line.to_string()))
    }
}

/// Encode a record as a single line, without the trailing LF.
pub fn encode(record: &EditRecord) -> String {
    let mut fields: Vec<String> = vec![
        record.sequence.to_string(),
        kind_tag(&record.payload).to_string(),
        encode_timestamp(&record.timestamp),
        escape(&record.actor),
    ];
    match &record.payload {
        RecordPayload::StringAdded { id, text } => {
            fields.push(escape(id.as_str()));
            fields.push(escape(text));
        }
        RecordPayload::TranslationSet { id, lang, text } => {
            fields.push(escape(id.as_str()));
            fields.push(escape(lang));
            fields.push(escape(text));
        }
        RecordPayload::StringDeleted { id } => {
            fields.push(escape(id.as_str()));
        }
    }
    fields.join("\t")
}

/// Decode one line (without its LF) back into a record.
pub fn decode(line: &str) -> Result<EditRecord, DecodeError> {
    let fields: Vec<&str> = line.split(SEPARATOR).collect();
    if fields.len() < 2 {
        return Err(DecodeError::FieldCount {
            kind: String::new(),
            expected: 5,
            found: fields.len(),
        });
    }

    let kind = fields[1];
    let expected = match kind {
        "s" => 6,
        "t" => 7,
        "d" => 5,
        other => return Err(DecodeError::UnknownKind(other.to_string())),
    };
    if fields.len() != expected {
        return Err(DecodeError::FieldCount {
            kind: kind.to_string(),
            expected,
            found: fields.len(),
        });
    }

    let sequence = parse_sequence(fields[0])?;
    let timestamp = decode_timestamp(fields[2])?;
    let actor = unescape(fields[3], "actor")?;
    let id = StringId::from(non_empty(unescape(fields[4], "id")?, "id")?);

    let payload = match kind {
        "s" => RecordPayload::StringAdded {
            id,
            text: unescape(fields[5], "text")?,
        },
        "t" => RecordPayload::TranslationSet {
            id,
            lang: non_empty(unescape(fields[5], "lang")?, "lang")?,
            text: unescape(fields[6], "text")?,
        },
        _ => RecordPayload::StringDeleted { id },
    };

    Ok(EditRecord {
        sequence,
        timestamp,
        actor,
        payload,
    })
}

fn kind_tag(payload: &RecordPayload) -> &'static str {
    match payload {
        RecordPayload::StringAdded { .. } => "s",
        RecordPayload::TranslationSet { .. } => "t",
        RecordPayload::StringDeleted { .. } => "d",
    }
}

fn parse_sequence(field: &str) -> Result<u64, DecodeError> {
    // Reject signs and leading zeros so decode(encode(r)) stays byte-identical.
    let canonical = !field.is_empty()
        && field.bytes().all(|b| b.is_ascii_digit())
        && (field == "0" || !field.starts_with('0'));
    if !canonical {
        return Err(DecodeError::BadSequence(field.to_string()));
    }
    field
        .parse()
        .map_err(|_| DecodeError::BadSequence(field.to_string()))
}

fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn decode_timestamp(field: &str) -> Result<DateTime<Utc>, DecodeError> {
    let parsed = DateTime::parse_from_rfc3339(field)
        .map_err(|_| DecodeError::BadTimestamp(field.to_string()))?
        .with_timezone(&Utc);
    if encode_timestamp(&parsed) != field {
        return Err(DecodeError::BadTimestamp(field.to_string()));
    }
    Ok(parsed)
}

fn non_empty(value: String, field: &'static str) -> Result<String, DecodeError> {
    if value.is_empty() {
        Err(DecodeError::EmptyField(field))
    } else {
        Ok(value)
    }
}

/// Escape a textual field so it contains no separator or line terminator.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse of [`escape`]. Unknown escapes and raw CR are rejected.
pub fn unescape(value: &str, field: &'static str) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => out.push('\\'),
                Some('t') => out.push('\t'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                _ => return Err(DecodeError::BadEscape(field)),
            },
            '\r' | '\n' => return Err(DecodeError::BadEscape(field)),
            other => out.push(other),
        }
    }
    Ok(out)
}
