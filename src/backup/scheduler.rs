use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use super::{BackupError, BackupTarget};
use crate::registry::{App, AppRegistry};
use crate::retry::{with_retry_if, RetryConfig};
use crate::store::LogSnapshot;

#[derive(Debug, Clone)]
pub struct BackupSettings {
    /// Time between backup runs
    pub interval: Duration,
    /// Limit for a single upload attempt
    pub upload_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            upload_timeout: Duration::from_secs(60),
            retry: RetryConfig::backup_upload(),
        }
    }
}

/// What one backup run did, per app name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub uploaded: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<String>,
    /// Shutdown was requested before every app was handled
    pub cancelled: bool,
}

enum Outcome {
    Uploaded(String),
    Unchanged,
    Cancelled,
}

/// Ships a snapshot of each loaded app to a [`BackupTarget`].
pub struct BackupScheduler {
    registry: Arc<AppRegistry>,
    target: Arc<dyn BackupTarget>,
    settings: BackupSettings,
    /// SHA-256 of the last uploaded snapshot per app
    last_digests: Mutex<HashMap<String, String>>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl BackupScheduler {
    pub fn new(
        registry: Arc<AppRegistry>,
        target: Arc<dyn BackupTarget>,
        settings: BackupSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            target,
            settings,
            last_digests: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Ask any running and future backup runs to stop.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Back up every loaded app once.
    ///
    /// Failures are logged and leave the app's digest untouched so the next
    /// run tries again. Overlapping runs are skipped.
    pub async fn run_once(&self) -> BackupReport {
        let mut report = BackupReport::default();
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Previous backup run still in progress, skipping");
            return report;
        }

        for app in self.registry.apps().iter().filter(|app| app.is_loaded()) {
            if self.is_shutting_down() {
                report.cancelled = true;
                break;
            }
            match self.backup_app(app).await {
                Ok(Outcome::Uploaded(identifier)) => {
                    info!("Backed up {} as {}", app.name(), identifier);
                    report.uploaded.push(app.name().to_string());
                }
                Ok(Outcome::Unchanged) => {
                    info!("Skipping backup of {}, unchanged since last upload", app.name());
                    report.unchanged.push(app.name().to_string());
                }
                Ok(Outcome::Cancelled) => {
                    info!("Backup of {} abandoned for shutdown", app.name());
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!("Backup of {} failed: {:#}", app.name(), e);
                    report.failed.push(app.name().to_string());
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        report
    }

    async fn backup_app(&self, app: &App) -> Result<Outcome> {
        let store = Arc::clone(app.store()?);
        let snapshot: LogSnapshot = tokio::task::spawn_blocking(move || store.snapshot()).await??;

        let digest = snapshot.digest();
        if self.last_digests.lock().get(app.name()) == Some(&digest) {
            return Ok(Outcome::Unchanged);
        }

        let identifier = format!(
            "{}/{}.log",
            app.config().data_dir,
            Utc::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let operation = format!("Backup {}", app.name());

        let target = &self.target;
        let bytes = snapshot.bytes.as_slice();
        let key = identifier.as_str();
        let timeout = self.settings.upload_timeout;
        let upload = with_retry_if(
            &self.settings.retry,
            &operation,
            || async move {
                match tokio::time::timeout(timeout, target.put(key, bytes)).await {
                    Ok(result) => result,
                    Err(_) => Err(BackupError::Timeout(timeout)),
                }
            },
            BackupError::is_retryable,
        );

        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            result = upload => {
                result?;
                self.last_digests.lock().insert(app.name().to_string(), digest);
                Ok(Outcome::Uploaded(identifier))
            }
            _ = shutdown.wait_for(|stop| *stop) => Ok(Outcome::Cancelled),
        }
    }

    /// Run [`run_once`](Self::run_once) every `settings.interval`.
    pub async fn start(self: Arc<Self>) -> Result<BackupHandle> {
        let jobs = JobScheduler::new().await?;

        let scheduler = Arc::clone(&self);
        let job = Job::new_repeated_async(self.settings.interval, move |_uuid, _l| {
            let scheduler = Arc::clone(&scheduler);
            Box::pin(async move {
                if scheduler.is_shutting_down() {
                    return;
                }
                let report = scheduler.run_once().await;
                info!(
                    "Backup run finished: {} uploaded, {} unchanged, {} failed",
                    report.uploaded.len(),
                    report.unchanged.len(),
                    report.failed.len()
                );
            })
        })?;
        jobs.add(job).await?;
        jobs.start().await?;

        info!(
            "✓ Backups scheduled every {:?} to {}",
            self.settings.interval,
            self.target.describe()
        );
        Ok(BackupHandle {
            scheduler: self,
            jobs,
        })
    }
}

/// Running backup job. Dropping it without [`shutdown`](Self::shutdown)
/// leaves the job running.
pub struct BackupHandle {
    scheduler: Arc<BackupScheduler>,
    jobs: JobScheduler,
}

impl BackupHandle {
    pub fn scheduler(&self) -> &Arc<BackupScheduler> {
        &self.scheduler
    }

    /// Stop scheduling runs and abandon an in-flight upload.
    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler.request_shutdown();
        self.jobs.shutdown().await?;
        info!("✓ Backup scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::MemoryTarget;
    use crate::config::AppConfig;
    use crate::store::LOG_FILE_NAME;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn fast_settings() -> BackupSettings {
        BackupSettings {
            interval: Duration::from_secs(3600),
            upload_timeout: Duration::from_millis(200),
            retry: RetryConfig::new(3, Duration::from_millis(10)),
        }
    }

    fn create_registry(names: &[&str]) -> (Arc<AppRegistry>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = AppRegistry::new(temp_dir.path());
        for name in names {
            let dir = temp_dir.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            File::create(dir.join(LOG_FILE_NAME)).unwrap();
            registry
                .register(AppConfig {
                    name: name.to_string(),
                    data_dir: name.to_string(),
                    admin_twitter_user: "kjk".to_string(),
                    upload_secret: "secret".to_string(),
                    languages: Some(vec!["fr".to_string()]),
                    ..Default::default()
                })
                .unwrap();
            registry.load(name).unwrap();
        }
        (Arc::new(registry), temp_dir)
    }

    fn add_string(registry: &AppRegistry, app: &str, text: &str) {
        let store = registry.resolve(app).unwrap().store().unwrap();
        store.add_string(text, "kjk").unwrap();
    }

    // ==================== run_once Tests ====================

    #[tokio::test]
    async fn test_run_once_uploads_each_app() {
        let (registry, _temp_dir) = create_registry(&["sumatra", "other"]);
        add_string(&registry, "sumatra", "Open");
        let target = Arc::new(MemoryTarget::new());
        let scheduler = BackupScheduler::new(registry.clone(), target.clone(), fast_settings());

        let report = scheduler.run_once().await;
        assert_eq!(report.uploaded, vec!["sumatra", "other"]);
        assert!(report.failed.is_empty());

        let objects = target.objects();
        assert_eq!(objects.len(), 2);
        assert!(objects[0].0.starts_with("sumatra/"));
        assert!(objects[0].0.ends_with(".log"));
        let expected = registry
            .resolve("sumatra")
            .unwrap()
            .store()
            .unwrap()
            .snapshot()
            .unwrap();
        assert_eq!(objects[0].1, expected.bytes);
    }

    #[tokio::test]
    async fn test_run_once_skips_unchanged() {
        let (registry, _temp_dir) = create_registry(&["sumatra"]);
        let target = Arc::new(MemoryTarget::new());
        let scheduler = BackupScheduler::new(registry.clone(), target.clone(), fast_settings());

        scheduler.run_once().await;
        let report = scheduler.run_once().await;
        assert_eq!(report.unchanged, vec!["sumatra"]);
        assert_eq!(target.objects().len(), 1);

        add_string(&registry, "sumatra", "Open");
        let report = scheduler.run_once().await;
        assert_eq!(report.uploaded, vec!["sumatra"]);
        assert_eq!(target.objects().len(), 2);
    }

    #[tokio::test]
    async fn test_run_once_retries_transient_failures() {
        let (registry, _temp_dir) = create_registry(&["sumatra"]);
        let target = Arc::new(MemoryTarget::new());
        target.fail_next(2);
        let scheduler = BackupScheduler::new(registry, target.clone(), fast_settings());

        let report = scheduler.run_once().await;
        assert_eq!(report.uploaded, vec!["sumatra"]);
        assert_eq!(target.attempts(), 3);
    }

    #[tokio::test]
    async fn test_rejected_upload_is_not_retried() {
        let (registry, _temp_dir) = create_registry(&["sumatra"]);
        let target = Arc::new(MemoryTarget::new());
        target.reject_with(Some(403));
        let scheduler = BackupScheduler::new(registry, target.clone(), fast_settings());

        let report = scheduler.run_once().await;
        assert_eq!(report.failed, vec!["sumatra"]);
        assert_eq!(target.attempts(), 1);

        // A failed upload is tried again on the next run
        target.reject_with(None);
        let report = scheduler.run_once().await;
        assert_eq!(report.uploaded, vec!["sumatra"]);
    }

    #[tokio::test]
    async fn test_upload_timeout() {
        let (registry, _temp_dir) = create_registry(&["sumatra"]);
        let target = Arc::new(MemoryTarget::new());
        target.set_delay(Some(Duration::from_secs(5)));
        let mut settings = fast_settings();
        settings.upload_timeout = Duration::from_millis(20);
        settings.retry = RetryConfig::new(2, Duration::from_millis(5));
        let scheduler = BackupScheduler::new(registry, target.clone(), settings);

        let report = scheduler.run_once().await;
        assert_eq!(report.failed, vec!["sumatra"]);
        assert_eq!(target.attempts(), 2);
        assert!(target.objects().is_empty());
    }

    // ==================== Shutdown Tests ====================

    #[tokio::test]
    async fn test_shutdown_abandons_in_flight_upload() {
        let (registry, _temp_dir) = create_registry(&["sumatra", "other"]);
        let target = Arc::new(MemoryTarget::new());
        target.set_delay(Some(Duration::from_secs(5)));
        let mut settings = fast_settings();
        settings.upload_timeout = Duration::from_secs(10);
        let scheduler = Arc::new(BackupScheduler::new(registry, target.clone(), settings));

        let run = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.request_shutdown();

        let report = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("run stops promptly")
            .unwrap();
        assert!(report.cancelled);
        assert!(report.uploaded.is_empty());
        assert_eq!(target.attempts(), 1);
    }

    #[tokio::test]
    async fn test_no_runs_after_shutdown() {
        let (registry, _temp_dir) = create_registry(&["sumatra"]);
        let target = Arc::new(MemoryTarget::new());
        let scheduler = BackupScheduler::new(registry, target.clone(), fast_settings());

        scheduler.request_shutdown();
        let report = scheduler.run_once().await;
        assert!(report.cancelled);
        assert_eq!(target.attempts(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_runs_on_interval() {
        let (registry, _temp_dir) = create_registry(&["sumatra"]);
        let target = Arc::new(MemoryTarget::new());
        let mut settings = fast_settings();
        settings.interval = Duration::from_secs(1);
        let scheduler = Arc::new(BackupScheduler::new(registry, target.clone(), settings));

        let handle = scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.shutdown().await.unwrap();

        assert_eq!(target.objects().len(), 1);
        assert!(target.attempts() >= 1);
    }
}
