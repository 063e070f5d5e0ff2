//! Edit records: the immutable facts the translation log is made of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the SHA-256 digest of a string's text.
const STRING_ID_LEN: usize = 32;

/// Stable, content-derived identifier of a source string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringId(String);

impl StringId {
    /// Identifier for already-normalized text.
    pub fn for_text(normalized: &str) -> Self {
        let digest = Sha256::digest(normalized.as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(STRING_ID_LEN);
        StringId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StringId {
    fn from(value: String) -> Self {
        StringId(value)
    }
}

impl From<&str> for StringId {
    fn from(value: &str) -> Self {
        StringId(value.to_string())
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize source text before hashing and storing it.
///
/// Surrounding whitespace is trimmed and CRLF / CR line endings become LF, so
/// the same string uploaded from different platforms maps to one entry.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// What an edit record does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordPayload {
    StringAdded { id: StringId, text: String },
    TranslationSet { id: StringId, lang: String, text: String },
    StringDeleted { id: StringId },
}

impl RecordPayload {
    pub fn string_id(&self) -> &StringId {
        match self {
            RecordPayload::StringAdded { id, .. }
            | RecordPayload::TranslationSet { id, .. }
            | RecordPayload::StringDeleted { id } => id,
        }
    }
}

/// One entry of the append-only translation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRecord {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub payload: RecordPayload,
}

impl EditRecord {
    pub fn new(sequence: u64, actor: &str, payload: RecordPayload) -> Self {
        Self {
            sequence,
            timestamp: Utc::now(),
            actor: actor.to_string(),
            payload,
        }
    }
}
