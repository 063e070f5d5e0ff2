//! Registry of translation apps.
//!
//! Built once at startup: every configured app is registered, then loaded
//! from its log. After that the registry is shared read-only behind an `Arc`.

use anyhow::Context;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{Result, StoreError};
use crate::i18n::LanguageCatalog;
use crate::store::{TranslationStore, LOG_FILE_NAME};

/// A registered app and, once loaded, its store.
#[derive(Debug)]
pub struct App {
    config: AppConfig,
    languages: Vec<String>,
    log_path: PathBuf,
    store: Option<Arc<TranslationStore>>,
}

impl App {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn admins(&self) -> Vec<&str> {
        std::iter::once(self.config.admin_twitter_user.as_str())
            .chain(self.config.admin_twitter_user2.as_deref())
            .filter(|admin| !admin.is_empty())
            .collect()
    }

    pub fn is_admin(&self, user: &str) -> bool {
        !user.is_empty() && self.admins().contains(&user)
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Result<&Arc<TranslationStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::NotLoaded(self.config.name.clone()))
    }
}

#[derive(Debug)]
pub struct AppRegistry {
    data_dir: PathBuf,
    apps: Vec<App>,
}

impl AppRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            apps: Vec::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Validate and add an app. It still has to be [`load`](Self::load)ed.
    pub fn register(&mut self, mut config: AppConfig) -> Result<&App> {
        config.name = config.name.trim().to_string();
        if let Some(field) = invalid_field(&config) {
            return Err(StoreError::InvalidConfiguration { field });
        }
        if self.find(&config.name).is_some() {
            return Err(StoreError::AlreadyRegistered(config.name));
        }

        let languages = config
            .languages
            .clone()
            .unwrap_or_else(|| LanguageCatalog::get().codes());
        let log_path = self.data_dir.join(&config.data_dir).join(LOG_FILE_NAME);
        // One writer per log file.
        if let Some(owner) = self.apps.iter().find(|app| same_file(&app.log_path, &log_path)) {
            warn!(
                "App {} would share {} with app {}",
                config.name,
                log_path.display(),
                owner.name()
            );
            return Err(StoreError::InvalidConfiguration { field: "DataDir" });
        }

        info!(
            "Registered app {} ({} languages, log {})",
            config.name,
            languages.len(),
            log_path.display()
        );
        self.apps.push(App {
            config,
            languages,
            log_path,
            store: None,
        });
        Ok(&self.apps[self.apps.len() - 1])
    }

    /// Open an app's log and build its index.
    ///
    /// The log file must already exist; an empty file is fine.
    pub fn load(&mut self, name: &str) -> Result<&App> {
        let app = self
            .apps
            .iter_mut()
            .find(|app| app.config.name == name)
            .ok_or_else(|| StoreError::NamespaceNotFound(name.to_string()))?;

        let store = TranslationStore::open(&app.config.name, &app.log_path, app.languages.clone())?;
        app.store = Some(Arc::new(store));
        Ok(app)
    }

    pub fn resolve(&self, name: &str) -> Result<&App> {
        self.find(name)
            .ok_or_else(|| StoreError::NamespaceNotFound(name.to_string()))
    }

    /// Apps in registration order.
    pub fn apps(&self) -> &[App] {
        &self.apps
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    fn find(&self, name: &str) -> Option<&App> {
        self.apps.iter().find(|app| app.config.name == name)
    }

    /// Register and load every configured app, stopping at the first failure.
    pub fn open_all(data_dir: impl Into<PathBuf>, apps: &[AppConfig]) -> anyhow::Result<Self> {
        let mut registry = Self::new(data_dir);
        for config in apps {
            let name = registry
                .register(config.clone())
                .with_context(|| format!("Failed to register app {:?}", config.name))?
                .name()
                .to_string();
            registry
                .load(&name)
                .with_context(|| format!("Failed to load app {}", name))?;
        }
        Ok(registry)
    }
}

/// First required field that is missing or invalid.
fn invalid_field(config: &AppConfig) -> Option<&'static str> {
    if config.name.is_empty() {
        return Some("Name");
    }
    if config.data_dir.trim().is_empty() {
        return Some("DataDir");
    }
    if config.admin_twitter_user.trim().is_empty() {
        return Some("AdminTwitterUser");
    }
    if config.upload_secret.is_empty() {
        return Some("UploadSecret");
    }
    if let Some(languages) = &config.languages {
        let catalog = LanguageCatalog::get();
        let unique: HashSet<&str> = languages.iter().map(String::as_str).collect();
        if languages.is_empty()
            || unique.len() != languages.len()
            || !languages.iter().all(|code| catalog.contains(code))
        {
            return Some("Languages");
        }
    }
    None
}

/// Compare paths ignoring `.` segments and trailing separators.
fn same_file(a: &Path, b: &Path) -> bool {
    significant_components(a).eq(significant_components(b))
}

fn significant_components(path: &Path) -> impl Iterator<Item = Component<'_>> {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
}
