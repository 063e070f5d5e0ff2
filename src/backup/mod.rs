//! Periodic off-site copies of every app's translation log.
//!
//! The scheduler takes a [`LogSnapshot`](crate::store::LogSnapshot) of each
//! loaded app and hands the bytes to a [`BackupTarget`]. Targets are
//! pluggable: an HTTP object store, a directory, or memory in tests.

mod scheduler;
mod target;

pub use scheduler::{BackupHandle, BackupReport, BackupScheduler, BackupSettings};
pub use target::{DirectoryTarget, HttpTarget, MemoryTarget};

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::BackupTargetConfig;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("backup target rejected upload ({status}): {message}")]
    Target { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BackupError {
    /// Whether another attempt could succeed.
    ///
    /// Client errors (4xx other than 408 and 429) mean the request itself is wrong.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackupError::Target { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            BackupError::Timeout(_) | BackupError::Io(_) | BackupError::Http(_) => true,
        }
    }
}

/// Destination for log snapshots.
pub trait BackupTarget: Send + Sync {
    /// Store `bytes` under `identifier`, replacing any previous object.
    fn put<'a>(&'a self, identifier: &'a str, bytes: &'a [u8])
        -> BoxFuture<'a, Result<(), BackupError>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Build the target named by the config file's `Backup` section.
///
/// A URL wins over a directory when both are set.
pub fn target_from_config(config: &BackupTargetConfig) -> Option<Arc<dyn BackupTarget>> {
    if let Some(url) = &config.url {
        return Some(Arc::new(HttpTarget::new(
            url.clone(),
            config.prefix.clone(),
            config.token.clone(),
        )));
    }
    config.directory.as_ref().map(|directory| {
        Arc::new(DirectoryTarget::new(directory.clone(), config.prefix.clone()))
            as Arc<dyn BackupTarget>
    })
}
