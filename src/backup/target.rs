use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::{BackupError, BackupTarget};

fn object_key(prefix: &str, identifier: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        identifier.to_string()
    } else {
        format!("{}/{}", prefix, identifier)
    }
}

/// Uploads snapshots with `PUT <base_url>/<prefix>/<identifier>`.
pub struct HttpTarget {
    client: reqwest::Client,
    base_url: String,
    prefix: String,
    token: Option<String>,
}

impl HttpTarget {
    pub fn new(base_url: String, prefix: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix,
            token,
        }
    }

    fn url_for(&self, identifier: &str) -> String {
        format!("{}/{}", self.base_url, object_key(&self.prefix, identifier))
    }
}

impl BackupTarget for HttpTarget {
    fn put<'a>(
        &'a self,
        identifier: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<(), BackupError>> {
        Box::pin(async move {
            let url = self.url_for(identifier);
            let mut request = self
                .client
                .put(&url)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(bytes.to_vec());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(BackupError::Target {
                    status: status.as_u16(),
                    message,
                });
            }
            debug!("Uploaded {} bytes to {}", bytes.len(), url);
            Ok(())
        })
    }

    fn describe(&self) -> String {
        self.url_for("")
    }
}

/// Copies snapshots into a local or mounted directory.
pub struct DirectoryTarget {
    root: PathBuf,
    prefix: String,
}

impl DirectoryTarget {
    pub fn new(root: PathBuf, prefix: String) -> Self {
        Self { root, prefix }
    }
}

impl BackupTarget for DirectoryTarget {
    fn put<'a>(
        &'a self,
        identifier: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<(), BackupError>> {
        Box::pin(async move {
            let path = self.root.join(object_key(&self.prefix, identifier));
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            // Readers of the directory never see a partial file
            let partial = path.with_extension("partial");
            tokio::fs::write(&partial, bytes).await?;
            tokio::fs::rename(&partial, &path).await?;
            debug!("Copied {} bytes to {}", bytes.len(), path.display());
            Ok(())
        })
    }

    fn describe(&self) -> String {
        self.root.join(&self.prefix).display().to_string()
    }
}

/// Keeps uploads in memory. Can be told to fail or stall.
#[derive(Default)]
pub struct MemoryTarget {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
    failures_left: Mutex<u32>,
    reject_status: Mutex<Option<u16>>,
    delay: Mutex<Option<Duration>>,
    attempts: Mutex<u32>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` uploads with a retryable 503.
    pub fn fail_next(&self, count: u32) {
        *self.failures_left.lock() = count;
    }

    /// Reject every upload with `status` until cleared with `None`.
    pub fn reject_with(&self, status: Option<u16>) {
        *self.reject_status.lock() = status;
    }

    /// Sleep this long inside every upload.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Stored objects in upload order.
    pub fn objects(&self) -> Vec<(String, Vec<u8>)> {
        self.objects.lock().clone()
    }

    /// Number of `put` calls, successful or not.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }
}

impl BackupTarget for MemoryTarget {
    fn put<'a>(
        &'a self,
        identifier: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<(), BackupError>> {
        Box::pin(async move {
            *self.attempts.lock() += 1;
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(status) = *self.reject_status.lock() {
                return Err(BackupError::Target {
                    status,
                    message: "rejected".to_string(),
                });
            }
            {
                let mut failures_left = self.failures_left.lock();
                if *failures_left > 0 {
                    *failures_left -= 1;
                    return Err(BackupError::Target {
                        status: 503,
                        message: "unavailable".to_string(),
                    });
                }
            }

            self.objects
                .lock()
                .push((identifier.to_string(), bytes.to_vec()));
            Ok(())
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("", "app/1.log"), "app/1.log");
        assert_eq!(object_key("/backups/", "app/1.log"), "backups/app/1.log");
    }

    // ==================== HTTP Target Tests ====================

    #[tokio::test]
    async fn test_http_target_puts_bytes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/apptranslator/sumatra/1.log"))
            .and(header("Authorization", "Bearer t0ken"))
            .and(body_bytes(b"#translation-log v1\n".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let target = HttpTarget::new(
            format!("{}/", mock_server.uri()),
            "apptranslator".to_string(),
            Some("t0ken".to_string()),
        );
        target
            .put("sumatra/1.log", b"#translation-log v1\n")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_target_reports_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad token"))
            .mount(&mock_server)
            .await;

        let target = HttpTarget::new(mock_server.uri(), String::new(), None);
        let err = target.put("sumatra/1.log", b"x").await.unwrap_err();
        match err {
            BackupError::Target { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "bad token");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    // ==================== Directory Target Tests ====================

    #[tokio::test]
    async fn test_directory_target_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(temp_dir.path().to_path_buf(), "backups".to_string());

        target.put("sumatra/1.log", b"data").await.unwrap();
        target.put("sumatra/1.log", b"newer").await.unwrap();

        let path = temp_dir.path().join("backups/sumatra/1.log");
        assert_eq!(std::fs::read(&path).unwrap(), b"newer");
        assert!(!path.with_extension("partial").exists());
    }

    // ==================== Memory Target Tests ====================

    #[tokio::test]
    async fn test_memory_target_failures() {
        let target = MemoryTarget::new();
        target.fail_next(1);

        assert!(target.put("a", b"1").await.is_err());
        target.put("a", b"1").await.unwrap();
        assert_eq!(target.attempts(), 2);
        assert_eq!(target.objects(), vec![("a".to_string(), b"1".to_vec())]);
    }
}
