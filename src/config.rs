use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Static configuration of a single translation app.
///
/// Field names follow the JSON config file (`"Name"`, `"DataDir"`, ...).
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AppConfig {
    pub name: String,
    /// Website of the application (display only)
    #[serde(default)]
    pub url: String,
    /// Directory under the data dir holding this app's translation log
    pub data_dir: String,
    /// Twitter user name of the admin
    pub admin_twitter_user: String,
    #[serde(default)]
    pub admin_twitter_user2: Option<String>,
    /// Shared secret protecting the string upload API
    pub upload_secret: String,
    /// Target languages; defaults to the whole language catalog
    #[serde(default)]
    pub languages: Option<Vec<String>>,
}

/// Where backups are shipped.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct BackupTargetConfig {
    /// Base URL of an HTTP object store accepting `PUT <url>/<key>`
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer token sent with HTTP uploads
    #[serde(default)]
    pub token: Option<String>,
    /// Local or mounted directory to copy snapshots into
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Key prefix for every uploaded snapshot
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_upload_timeout_secs() -> u64 {
    60
}

impl BackupTargetConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Contents of the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileConfig {
    #[serde(default)]
    pub apps: Vec<AppConfig>,
    #[serde(default)]
    pub backup: Option<BackupTargetConfig>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed reading config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed parsing config file {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub http_addr: String,
    pub production: bool,
    /// Request header carrying the user name set by an authenticating proxy
    pub identity_header: Option<String>,

    // Storage
    pub data_dir: PathBuf,
    pub apps: Vec<AppConfig>,

    // Backup
    pub no_backup: bool,
    pub backup_interval: Duration,
    pub backup: Option<BackupTargetConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config_path = PathBuf::from(
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string()),
        );
        let file = FileConfig::load(&config_path)?;

        Ok(Self {
            // Server
            http_addr: std::env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:5001".to_string()),
            production: env_flag("PRODUCTION"),
            identity_header: std::env::var("IDENTITY_HEADER")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            // Storage
            data_dir: PathBuf::from(
                std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ),
            apps: file.apps,

            // Backup
            no_backup: env_flag("NO_BACKUP"),
            backup_interval: Duration::from_secs(
                std::env::var("BACKUP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600),
            ),
            backup: file.backup,
        })
    }

    /// Backups run only in production, when not disabled, with a target set.
    pub fn backup_enabled(&self) -> bool {
        if self.no_backup {
            info!("Backups disabled because NO_BACKUP is set");
            return false;
        }
        if !self.production {
            info!("Backups disabled because not in production");
            return false;
        }
        match &self.backup {
            None => {
                info!("Backups disabled because Backup is not defined in the config file");
                false
            }
            Some(target) if target.url.is_none() && target.directory.is_none() => {
                info!("Backups disabled because Backup has neither Url nor Directory");
                false
            }
            Some(_) => true,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "Apps": [
            {
                "Name": "SumatraPDF",
                "Url": "https://www.sumatrapdfreader.org",
                "DataDir": "sumatrapdf",
                "AdminTwitterUser": "kjk",
                "AdminTwitterUser2": "zeniko",
                "UploadSecret": "secret"
            },
            {
                "Name": "Other",
                "DataDir": "other",
                "AdminTwitterUser": "kjk",
                "UploadSecret": "s2",
                "Languages": ["de", "fr"]
            }
        ],
        "Backup": { "Url": "https://backup.example.com", "Token": "t", "Prefix": "apptranslator" }
    }"#;

    fn write_config(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    fn clear_env() {
        for name in [
            "CONFIG_PATH",
            "HTTP_ADDR",
            "PRODUCTION",
            "DATA_DIR",
            "NO_BACKUP",
            "BACKUP_INTERVAL_SECS",
            "IDENTITY_HEADER",
        ] {
            std::env::remove_var(name);
        }
    }

    // ==================== File Config Tests ====================

    #[test]
    fn test_file_config_parses_apps() {
        let temp_dir = TempDir::new().unwrap();
        let file = FileConfig::load(&write_config(&temp_dir)).unwrap();

        assert_eq!(file.apps.len(), 2);
        let sumatra = &file.apps[0];
        assert_eq!(sumatra.name, "SumatraPDF");
        assert_eq!(sumatra.admin_twitter_user2.as_deref(), Some("zeniko"));
        assert!(sumatra.languages.is_none());
        assert_eq!(
            file.apps[1].languages,
            Some(vec!["de".to_string(), "fr".to_string()])
        );
        assert_eq!(file.apps[1].url, "");

        let backup = file.backup.unwrap();
        assert_eq!(backup.prefix, "apptranslator");
        assert_eq!(backup.upload_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_file_config_missing_file() {
        let err = FileConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("Failed reading config file"));
    }

    #[test]
    fn test_file_config_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }

    // ==================== Environment Tests ====================

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("CONFIG_PATH", write_config(&temp_dir));

        let config = Config::from_env().unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:5001");
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.backup_interval, Duration::from_secs(3600));
        assert!(!config.production);
        assert!(config.identity_header.is_none());
        assert_eq!(config.apps.len(), 2);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("CONFIG_PATH", write_config(&temp_dir));
        std::env::set_var("HTTP_ADDR", "127.0.0.1:8080");
        std::env::set_var("DATA_DIR", "/srv/data");
        std::env::set_var("PRODUCTION", "true");
        std::env::set_var("BACKUP_INTERVAL_SECS", "60");
        std::env::set_var("IDENTITY_HEADER", "X-Remote-User");

        let config = Config::from_env().unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:8080");
        assert_eq!(config.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.backup_interval, Duration::from_secs(60));
        assert!(config.production);
        assert_eq!(config.identity_header.as_deref(), Some("X-Remote-User"));
        assert!(config.backup_enabled());
        clear_env();
    }

    // ==================== Backup Gating Tests ====================

    fn config_with_backup(backup: Option<BackupTargetConfig>) -> Config {
        Config {
            http_addr: "127.0.0.1:0".to_string(),
            production: true,
            identity_header: None,
            data_dir: PathBuf::from("data"),
            apps: Vec::new(),
            no_backup: false,
            backup_interval: Duration::from_secs(3600),
            backup,
        }
    }

    #[test]
    fn test_backup_disabled_without_target() {
        assert!(!config_with_backup(None).backup_enabled());
        assert!(!config_with_backup(Some(BackupTargetConfig::default())).backup_enabled());
    }

    #[test]
    fn test_backup_disabled_outside_production() {
        let mut config = config_with_backup(Some(BackupTargetConfig {
            directory: Some(PathBuf::from("/backups")),
            ..Default::default()
        }));
        assert!(config.backup_enabled());
        config.production = false;
        assert!(!config.backup_enabled());
    }

    #[test]
    fn test_backup_disabled_by_flag() {
        let mut config = config_with_backup(Some(BackupTargetConfig {
            url: Some("https://backup.example.com".to_string()),
            ..Default::default()
        }));
        config.no_backup = true;
        assert!(!config.backup_enabled());
    }
}
