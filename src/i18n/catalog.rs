//! Language catalog: every language an app can be translated into.
//!
//! The catalog is static and immutable. It is built once, lazily, behind a
//! `OnceLock`. Apps target either the whole catalog or a configured subset.

use std::sync::OnceLock;

/// A language that translations can target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    /// Language code used in the log and the API (e.g., "fr", "pt-BR")
    pub code: &'static str,

    /// English name of the language (e.g., "French")
    pub name: &'static str,
}

/// Catalog of supported target languages.
pub struct LanguageCatalog {
    languages: Vec<LanguageConfig>,
}

static CATALOG: OnceLock<LanguageCatalog> = OnceLock::new();

impl LanguageCatalog {
    /// Get the global catalog instance.
    pub fn get() -> &'static LanguageCatalog {
        CATALOG.get_or_init(|| LanguageCatalog {
            languages: default_languages(),
        })
    }

    /// Get a language by its code.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get_by_code(code).is_some()
    }

    /// All language codes, in catalog order.
    pub fn codes(&self) -> Vec<String> {
        self.languages.iter().map(|lang| lang.code.to_string()).collect()
    }

    pub fn list_all(&self) -> &[LanguageConfig] {
        &self.languages
    }
}

fn default_languages() -> Vec<LanguageConfig> {
    const LANGUAGES: &[(&str, &str)] = &[
        ("af", "Afrikaans"),
        ("ar", "Arabic"),
        ("az", "Azerbaijani"),
        ("be", "Belarusian"),
        ("bg", "Bulgarian"),
        ("bn", "Bengali"),
        ("bs", "Bosnian"),
        ("ca", "Catalan"),
        ("cs", "Czech"),
        ("cy", "Welsh"),
        ("da", "Danish"),
        ("de", "German"),
        ("el", "Greek"),
        ("eo", "Esperanto"),
        ("es", "Spanish"),
        ("et", "Estonian"),
        ("eu", "Basque"),
        ("fa", "Persian"),
        ("fi", "Finnish"),
        ("fr", "French"),
        ("ga", "Irish"),
        ("gl", "Galician"),
        ("he", "Hebrew"),
        ("hi", "Hindi"),
        ("hr", "Croatian"),
        ("hu", "Hungarian"),
        ("hy", "Armenian"),
        ("id", "Indonesian"),
        ("it", "Italian"),
        ("ja", "Japanese"),
        ("ka", "Georgian"),
        ("kk", "Kazakh"),
        ("ko", "Korean"),
        ("ku", "Kurdish"),
        ("lt", "Lithuanian"),
        ("lv", "Latvian"),
        ("mk", "Macedonian"),
        ("ml", "Malayalam"),
        ("ms", "Malay"),
        ("nl", "Dutch"),
        ("nn", "Norwegian Nynorsk"),
        ("no", "Norwegian"),
        ("pl", "Polish"),
        ("pt", "Portuguese - Portugal"),
        ("pt-BR", "Portuguese - Brazil"),
        ("ro", "Romanian"),
        ("ru", "Russian"),
        ("si", "Sinhala"),
        ("sk", "Slovak"),
        ("sl", "Slovenian"),
        ("sq", "Albanian"),
        ("sr", "Serbian"),
        ("sv", "Swedish"),
        ("ta", "Tamil"),
        ("th", "Thai"),
        ("tr", "Turkish"),
        ("uk", "Ukrainian"),
        ("uz", "Uzbek"),
        ("vi", "Vietnamese"),
        ("zh-CN", "Chinese Simplified"),
        ("zh-TW", "Chinese Traditional"),
    ];

    LANGUAGES
        .iter()
        .map(|&(code, name)| LanguageConfig { code, name })
        .collect()
}
