//! Language support for translation apps.
//!
//! - `catalog`: the static set of target languages and their names
//! - `validator`: checks that flag translations needing review

mod catalog;
mod validator;

pub use catalog::{LanguageCatalog, LanguageConfig};
pub use validator::{TranslationValidator, ValidationReport};
