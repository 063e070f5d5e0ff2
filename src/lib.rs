pub mod api;
pub mod backup;
pub mod config;
pub mod error;
pub mod i18n;
pub mod registry;
pub mod retry;
pub mod security;
pub mod store;
