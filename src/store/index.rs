//! In-memory state derived from the translation log.
//!
//! [`TranslationIndex`] is a pure function of the records applied to it: the
//! same records in the same order always produce an equal index. Aggregate
//! counters are maintained incrementally by [`TranslationIndex::apply`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::record::{EditRecord, RecordPayload, StringId};
use crate::i18n::{LanguageCatalog, TranslationValidator};

/// Number of translation edits kept for the "recent edits" listing.
pub const RECENT_EDITS_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StringState {
    Active,
    Deleted,
}

/// Current translation of one string in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub text: String,
    pub editor: String,
    pub modified: DateTime<Utc>,
}

/// A source string and its current translations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringEntry {
    pub id: StringId,
    pub text: String,
    pub created: DateTime<Utc>,
    pub creator: String,
    pub state: StringState,
    pub translations: BTreeMap<String, Translation>,
}

impl StringEntry {
    pub fn is_active(&self) -> bool {
        self.state == StringState::Active
    }
}

/// One applied translation edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edit {
    pub sequence: u64,
    pub string_id: StringId,
    pub lang: String,
    pub text: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// Translation progress of one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub translated: usize,
    pub untranslated: usize,
    pub edits: usize,
}

/// A translation flagged for a second look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewItem {
    pub string_id: StringId,
    pub source: String,
    pub translation: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationIndex {
    languages: Vec<String>,
    strings: HashMap<StringId, StringEntry>,
    order: Vec<StringId>,
    active_count: usize,
    untranslated_count: usize,
    translated_per_lang: HashMap<String, usize>,
    edits_count: usize,
    lang_edits: HashMap<String, usize>,
    contributors: HashMap<String, usize>,
    recent: VecDeque<Edit>,
    last_sequence: u64,
}

impl TranslationIndex {
    /// Empty index targeting `languages`.
    pub fn new(languages: Vec<String>) -> Self {
        Self {
            languages,
            strings: HashMap::new(),
            order: Vec::new(),
            active_count: 0,
            untranslated_count: 0,
            translated_per_lang: HashMap::new(),
            edits_count: 0,
            lang_edits: HashMap::new(),
            contributors: HashMap::new(),
            recent: VecDeque::with_capacity(RECENT_EDITS_LIMIT),
            last_sequence: 0,
        }
    }

    fn is_configured(&self, lang: &str) -> bool {
        self.languages.iter().any(|l| l == lang)
    }

    fn has_configured_translation(&self, entry: &StringEntry) -> bool {
        entry.translations.keys().any(|lang| self.is_configured(lang))
    }

    /// Apply one record. Returns `true` when live state changed.
    ///
    /// Records that cannot take effect (adding a known id, translating or
    /// deleting an absent or deleted string) still count as edits but leave
    /// the strings untouched, which keeps replay idempotent under duplicates.
    pub fn apply(&mut self, record: &EditRecord) -> bool {
        self.edits_count += 1;
        self.last_sequence = record.sequence;

        match &record.payload {
            RecordPayload::StringAdded { id, text } => {
                if self.strings.contains_key(id) {
                    return false;
                }
                self.strings.insert(
                    id.clone(),
                    StringEntry {
                        id: id.clone(),
                        text: text.clone(),
                        created: record.timestamp,
                        creator: record.actor.clone(),
                        state: StringState::Active,
                        translations: BTreeMap::new(),
                    },
                );
                self.order.push(id.clone());
                self.active_count += 1;
                self.untranslated_count += 1;
                true
            }
            RecordPayload::TranslationSet { id, lang, text } => {
                let configured = self.is_configured(lang);
                let (was_untranslated, is_new_lang) = match self.strings.get(id) {
                    Some(entry) if entry.is_active() => (
                        !self.has_configured_translation(entry),
                        !entry.translations.contains_key(lang),
                    ),
                    _ => return false,
                };

                if let Some(entry) = self.strings.get_mut(id) {
                    entry.translations.insert(
                        lang.clone(),
                        Translation {
                            text: text.clone(),
                            editor: record.actor.clone(),
                            modified: record.timestamp,
                        },
                    );
                }

                if configured && is_new_lang {
                    *self.translated_per_lang.entry(lang.clone()).or_insert(0) += 1;
                    if was_untranslated {
                        self.untranslated_count -= 1;
                    }
                }
                *self.lang_edits.entry(lang.clone()).or_insert(0) += 1;
                *self.contributors.entry(record.actor.clone()).or_insert(0) += 1;

                if self.recent.len() == RECENT_EDITS_LIMIT {
                    self.recent.pop_front();
                }
                self.recent.push_back(Edit {
                    sequence: record.sequence,
                    string_id: id.clone(),
                    lang: lang.clone(),
                    text: text.clone(),
                    actor: record.actor.clone(),
                    timestamp: record.timestamp,
                });
                true
            }
            RecordPayload::StringDeleted { id } => {
                let configured_langs: Vec<String> = match self.strings.get(id) {
                    Some(entry) if entry.is_active() => entry
                        .translations
                        .keys()
                        .filter(|lang| self.is_configured(lang))
                        .cloned()
                        .collect(),
                    _ => return false,
                };

                if let Some(entry) = self.strings.get_mut(id) {
                    entry.state = StringState::Deleted;
                }
                self.active_count -= 1;
                if configured_langs.is_empty() {
                    self.untranslated_count -= 1;
                }
                for lang in configured_langs {
                    if let Some(count) = self.translated_per_lang.get_mut(&lang) {
                        *count -= 1;
                    }
                }
                true
            }
        }
    }

    // ==================== Aggregates ====================

    pub fn strings_count(&self) -> usize {
        self.active_count
    }

    /// Active strings without a translation in any configured language.
    pub fn untranslated_count(&self) -> usize {
        self.untranslated_count
    }

    /// Active strings without a translation in `lang`.
    pub fn untranslated_count_for(&self, lang: &str) -> usize {
        self.active_count - self.translated_count_for(lang)
    }

    pub fn translated_count_for(&self, lang: &str) -> usize {
        self.translated_per_lang.get(lang).copied().unwrap_or(0)
    }

    /// Number of records applied, of every kind.
    pub fn edits_count(&self) -> usize {
        self.edits_count
    }

    pub fn lang_edits_count(&self, lang: &str) -> usize {
        self.lang_edits.get(lang).copied().unwrap_or(0)
    }

    pub fn languages_count(&self) -> usize {
        self.languages.len()
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    // ==================== Lookups ====================

    /// Entry for `id` in any state.
    pub fn get(&self, id: &StringId) -> Option<&StringEntry> {
        self.strings.get(id)
    }

    pub fn is_active(&self, id: &StringId) -> bool {
        self.strings.get(id).is_some_and(StringEntry::is_active)
    }

    /// Active strings in creation order.
    pub fn active_strings(&self) -> impl Iterator<Item = &StringEntry> {
        self.order
            .iter()
            .filter_map(|id| self.strings.get(id))
            .filter(|entry| entry.is_active())
    }

    pub fn translation(&self, id: &StringId, lang: &str) -> Option<&Translation> {
        self.strings
            .get(id)
            .filter(|entry| entry.is_active())
            .and_then(|entry| entry.translations.get(lang))
    }

    pub fn untranslated_strings(&self, lang: &str) -> Vec<&StringEntry> {
        self.active_strings()
            .filter(|entry| !entry.translations.contains_key(lang))
            .collect()
    }

    /// Current translations of `lang`, in string creation order.
    pub fn translations_for(&self, lang: &str) -> Vec<(&StringEntry, &Translation)> {
        self.active_strings()
            .filter_map(|entry| entry.translations.get(lang).map(|t| (entry, t)))
            .collect()
    }

    /// Translations in `lang` that look suspicious next to their source.
    pub fn strings_needing_review(&self, lang: &str) -> Vec<ReviewItem> {
        self.translations_for(lang)
            .into_iter()
            .filter_map(|(entry, translation)| {
                let report = TranslationValidator::validate(&entry.text, &translation.text);
                if report.is_clean() {
                    return None;
                }
                Some(ReviewItem {
                    string_id: entry.id.clone(),
                    source: entry.text.clone(),
                    translation: translation.text.clone(),
                    reasons: report.warnings,
                })
            })
            .collect()
    }

    /// Most recent translation edits, newest first.
    pub fn recent_edits(&self, limit: usize) -> Vec<Edit> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    /// Translation edit counts per actor, most active first.
    pub fn contributors(&self) -> Vec<(String, usize)> {
        let mut contributors: Vec<(String, usize)> = self
            .contributors
            .iter()
            .map(|(actor, count)| (actor.clone(), *count))
            .collect();
        contributors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        contributors
    }

    /// Per-language progress, most untranslated first.
    pub fn language_infos(&self) -> Vec<LanguageInfo> {
        let catalog = LanguageCatalog::get();
        let mut infos: Vec<LanguageInfo> = self
            .languages
            .iter()
            .map(|code| LanguageInfo {
                code: code.clone(),
                name: catalog
                    .get_by_code(code)
                    .map_or_else(|| code.clone(), |lang| lang.name.to_string()),
                translated: self.translated_count_for(code),
                untranslated: self.untranslated_count_for(code),
                edits: self.lang_edits_count(code),
            })
            .collect();
        infos.sort_by(|a, b| {
            b.untranslated
                .cmp(&a.untranslated)
                .then_with(|| a.code.cmp(&b.code))
        });
        infos
    }

    /// Minimal record set that rebuilds the live strings and translations.
    ///
    /// Deleted strings and superseded translations are dropped; the survivors
    /// keep their timestamps and actors and are renumbered from 1.
    pub fn compacted_records(&self) -> Vec<EditRecord> {
        let mut records = Vec::new();
        for entry in self.active_strings() {
            records.push(EditRecord {
                sequence: records.len() as u64 + 1,
                timestamp: entry.created,
                actor: entry.creator.clone(),
                payload: RecordPayload::StringAdded {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                },
            });
            for (lang, translation) in &entry.translations {
                records.push(EditRecord {
                    sequence: records.len() as u64 + 1,
                    timestamp: translation.modified,
                    actor: translation.editor.clone(),
                    payload: RecordPayload::TranslationSet {
                        id: entry.id.clone(),
                        lang: lang.clone(),
                        text: translation.text.clone(),
                    },
                });
            }
        }
        records
    }
}
