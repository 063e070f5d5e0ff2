//! Translation quality checks.
//!
//! Flags translations that are likely to break the application that ships
//! them: dropped format placeholders, lost menu accelerators, mangled URLs,
//! or text that was never translated at all.

use regex::Regex;
use std::sync::OnceLock;

/// Validation report containing errors and warnings about a translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Critical errors that indicate translation issues
    pub errors: Vec<String>,

    /// Non-critical warnings about potential issues
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Create a new empty validation report
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Check if the report has any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check if the report is clean (no errors or warnings)
    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Validator for translation quality.
pub struct TranslationValidator;

static PRINTF_REGEX: OnceLock<Regex> = OnceLock::new();
static BRACE_REGEX: OnceLock<Regex> = OnceLock::new();
static URL_REGEX: OnceLock<Regex> = OnceLock::new();

impl TranslationValidator {
    /// Compare a translation against its source string.
    ///
    /// This function checks that:
    /// - the text was actually translated
    /// - printf placeholders (`%s`, `%1$d`, ...) are preserved
    /// - brace placeholders (`{0}`, `{name}`) are preserved
    /// - URLs are preserved
    /// - a `&` menu accelerator is kept when the source has one
    pub fn validate(original: &str, translated: &str) -> ValidationReport {
        let mut report = ValidationReport::new();

        if original == translated && original.chars().any(char::is_alphabetic) {
            report
                .warnings
                .push("Translation is identical to the source text".to_string());
        }

        let orig_printf = Self::extract_printf(original);
        let trans_printf = Self::extract_printf(translated);
        if orig_printf != trans_printf {
            report.warnings.push(format!(
                "Placeholder mismatch: original has {:?}, translation has {:?}",
                orig_printf, trans_printf
            ));
        }

        let orig_braces = Self::extract_braces(original);
        let trans_braces = Self::extract_braces(translated);
        if orig_braces != trans_braces {
            report.warnings.push(format!(
                "Placeholder mismatch: original has {:?}, translation has {:?}",
                orig_braces, trans_braces
            ));
        }

        let orig_urls = Self::extract_urls(original);
        let trans_urls = Self::extract_urls(translated);
        if orig_urls != trans_urls {
            report.warnings.push(format!(
                "URL mismatch: original has {} URLs, translation has {} URLs",
                orig_urls.len(),
                trans_urls.len()
            ));
        }

        let orig_accel = Self::count_accelerators(original);
        let trans_accel = Self::count_accelerators(translated);
        if orig_accel != trans_accel {
            report.warnings.push(format!(
                "Accelerator mismatch: original has {}, translation has {}",
                orig_accel, trans_accel
            ));
        }

        report
    }

    /// Extract printf-style placeholders, sorted (translations may reorder them).
    fn extract_printf(text: &str) -> Vec<String> {
        let regex = PRINTF_REGEX.get_or_init(|| {
            Regex::new(r"%(?:\d+\$)?[-+ #0]*\d*(?:\.\d+)?[sdiufxXcp]")
                .expect("printf placeholder regex is valid")
        });

        let without_escapes = text.replace("%%", "");
        let mut found: Vec<String> = regex
            .find_iter(&without_escapes)
            .map(|m| m.as_str().to_string())
            .collect();
        found.sort();
        found
    }

    /// Extract `{...}` placeholders, sorted.
    fn extract_braces(text: &str) -> Vec<String> {
        let regex = BRACE_REGEX.get_or_init(|| {
            Regex::new(r"\{[A-Za-z0-9_]*\}").expect("brace placeholder regex is valid")
        });

        let mut found: Vec<String> = regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        found.sort();
        found
    }

    /// Extract all URLs from text
    fn extract_urls(text: &str) -> Vec<String> {
        let regex = URL_REGEX
            .get_or_init(|| Regex::new(r"https?://[^\s)\]]+").expect("URL regex is valid"));

        regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Count `&x` accelerators; `&&` is a literal ampersand.
    fn count_accelerators(text: &str) -> usize {
        let mut count = 0;
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '&' {
                continue;
            }
            match chars.peek() {
                Some('&') => {
                    chars.next();
                }
                Some(next) if !next.is_whitespace() => count += 1,
                _ => {}
            }
        }
        count
    }
}
