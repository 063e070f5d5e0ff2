use std::path::PathBuf;
use thiserror::Error;

use crate::store::StringId;

/// Errors raised by the translation store, the log and the app registry.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid configuration: missing or invalid field {field:?}")]
    InvalidConfiguration { field: &'static str },

    #[error("app {0:?} is already registered")]
    AlreadyRegistered(String),

    #[error("storage location missing: {}", .0.display())]
    StorageMissing(PathBuf),

    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("app {0:?} not found")]
    NamespaceNotFound(String),

    #[error("app {0:?} has not been loaded")]
    NotLoaded(String),

    #[error("unknown string {0}")]
    UnknownString(StringId),

    #[error("string {0} was deleted")]
    StringDeleted(StringId),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Corruption,
    NotFound,
    Unauthorized,
    InvalidInput,
    Storage,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidConfiguration { .. }
            | StoreError::AlreadyRegistered(_)
            | StoreError::StorageMissing(_) => ErrorKind::Configuration,
            StoreError::CorruptRecord { .. } => ErrorKind::Corruption,
            StoreError::NamespaceNotFound(_)
            | StoreError::NotLoaded(_)
            | StoreError::UnknownString(_) => ErrorKind::NotFound,
            StoreError::Unauthorized => ErrorKind::Unauthorized,
            StoreError::StringDeleted(_) | StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::Io(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        StoreError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            StoreError::InvalidConfiguration { field: "Name" }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(StoreError::corrupt(12, "bad").kind(), ErrorKind::Corruption);
        assert_eq!(
            StoreError::UnknownString(StringId::for_text("x")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(StoreError::Unauthorized.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            StoreError::InvalidInput("empty".into()).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_corrupt_record_message_names_offset() {
        let err = StoreError::corrupt(42, "unknown record kind \"x\"");
        assert_eq!(
            err.to_string(),
            "corrupt record at offset 42: unknown record kind \"x\""
        );
    }

    #[test]
    fn test_invalid_configuration_names_field() {
        let err = StoreError::InvalidConfiguration { field: "UploadSecret" };
        assert!(err.to_string().contains("UploadSecret"));
    }
}
