//! Per-app translation store.
//!
//! A [`TranslationStore`] pairs the durable [`LogStore`] with the derived
//! [`TranslationIndex`]. Every mutation runs inside the writer mutex:
//! build the record, append it durably, apply it to the index. Readers only
//! take the index read lock and never see a half-applied record.

mod codec;
mod index;
mod log;
mod record;

pub use codec::{decode, encode, DecodeError, HEADER};
pub use index::{
    Edit, LanguageInfo, ReviewItem, StringEntry, StringState, Translation, TranslationIndex,
    RECENT_EDITS_LIMIT,
};
pub use log::{LogReader, LogSnapshot, LogStore, PendingSnapshot, LOG_FILE_NAME};
pub use record::{normalize_text, EditRecord, RecordPayload, StringId};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

/// Outcome of syncing the full list of source strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Strings in the upload whose text belongs to a deleted entry.
    pub skipped_deleted: Vec<StringId>,
}

/// Result of a compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub records_before: u64,
    pub records_after: u64,
}

#[derive(Debug)]
pub struct TranslationStore {
    name: String,
    writer: Mutex<LogStore>,
    index: RwLock<TranslationIndex>,
}

impl TranslationStore {
    /// Open the log at `path` and rebuild the index from it.
    ///
    /// Fails if the file is missing or any record is corrupt.
    pub fn open(name: &str, path: impl AsRef<Path>, languages: Vec<String>) -> Result<Self> {
        let mut log = LogStore::open(path)?;
        let index = replay_into(&mut log, TranslationIndex::new(languages))?;
        info!(
            "Loaded {}: {} strings, {} edits, last sequence {}",
            name,
            index.strings_count(),
            index.edits_count(),
            log.last_sequence()
        );
        Ok(Self {
            name: name.to_string(),
            writer: Mutex::new(log),
            index: RwLock::new(index),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared read access to the index for multi-field queries.
    pub fn read(&self) -> RwLockReadGuard<'_, TranslationIndex> {
        self.index.read()
    }

    // ==================== Mutations ====================

    /// Add a source string, returning its id. Adding active text again is a no-op.
    pub fn add_string(&self, text: &str, actor: &str) -> Result<StringId> {
        let text = normalize_text(text);
        if text.is_empty() {
            return Err(StoreError::InvalidInput("string text is empty".to_string()));
        }
        let id = StringId::for_text(&text);

        let mut log = self.writer.lock();
        match self.index.read().get(&id) {
            Some(entry) if entry.is_active() => return Ok(id),
            Some(_) => return Err(StoreError::StringDeleted(id)),
            None => {}
        }
        self.commit(
            &mut log,
            actor,
            RecordPayload::StringAdded {
                id: id.clone(),
                text,
            },
        )?;
        Ok(id)
    }

    /// Set the translation of an active string. Last writer wins.
    pub fn set_translation(&self, id: &StringId, lang: &str, text: &str, actor: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(StoreError::InvalidInput("translation text is empty".to_string()));
        }

        let mut log = self.writer.lock();
        {
            let index = self.index.read();
            if !index.languages().iter().any(|l| l == lang) {
                return Err(StoreError::InvalidInput(format!(
                    "language {:?} is not enabled for {}",
                    lang, self.name
                )));
            }
            if !index.is_active(id) {
                return Err(StoreError::UnknownString(id.clone()));
            }
        }
        self.commit(
            &mut log,
            actor,
            RecordPayload::TranslationSet {
                id: id.clone(),
                lang: lang.to_string(),
                text: text.to_string(),
            },
        )?;
        Ok(())
    }

    /// Mark a string deleted. Deleting an already-deleted string is a no-op.
    pub fn delete_string(&self, id: &StringId, actor: &str) -> Result<()> {
        let mut log = self.writer.lock();
        match self.index.read().get(id) {
            None => return Err(StoreError::UnknownString(id.clone())),
            Some(entry) if !entry.is_active() => return Ok(()),
            Some(_) => {}
        }
        self.commit(&mut log, actor, RecordPayload::StringDeleted { id: id.clone() })?;
        Ok(())
    }

    /// Make the active strings equal the uploaded list.
    ///
    /// Missing strings are added, active strings absent from the list are
    /// deleted. Text of previously deleted strings is reported, not revived.
    pub fn sync_strings(&self, texts: &[String], actor: &str) -> Result<SyncReport> {
        let wanted: Vec<(StringId, String)> = texts
            .iter()
            .map(|t| normalize_text(t))
            .filter(|t| !t.is_empty())
            .map(|t| (StringId::for_text(&t), t))
            .collect();

        let mut report = SyncReport::default();
        let mut log = self.writer.lock();

        let (to_add, to_delete) = {
            let index = self.index.read();
            let mut to_add = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for (id, text) in &wanted {
                if !seen.insert(id.clone()) {
                    continue;
                }
                match index.get(id) {
                    Some(entry) if entry.is_active() => report.unchanged += 1,
                    Some(_) => report.skipped_deleted.push(id.clone()),
                    None => to_add.push((id.clone(), text.clone())),
                }
            }
            let to_delete: Vec<StringId> = index
                .active_strings()
                .filter(|entry| !seen.contains(&entry.id))
                .map(|entry| entry.id.clone())
                .collect();
            (to_add, to_delete)
        };

        for (id, text) in to_add {
            self.commit(&mut log, actor, RecordPayload::StringAdded { id, text })?;
            report.added += 1;
        }
        for id in to_delete {
            self.commit(&mut log, actor, RecordPayload::StringDeleted { id })?;
            report.deleted += 1;
        }

        info!(
            "Synced strings for {}: {} added, {} deleted, {} unchanged",
            self.name, report.added, report.deleted, report.unchanged
        );
        Ok(report)
    }

    /// Append and apply one record. Caller holds the writer lock.
    fn commit(&self, log: &mut LogStore, actor: &str, payload: RecordPayload) -> Result<u64> {
        let record = EditRecord::new(log.next_sequence(), actor, payload);
        let sequence = log.append(&record)?;
        self.index.write().apply(&record);
        debug!("{}: committed record {}", self.name, sequence);
        Ok(sequence)
    }

    // ==================== Aggregates ====================

    pub fn strings_count(&self) -> usize {
        self.index.read().strings_count()
    }

    pub fn untranslated_count(&self) -> usize {
        self.index.read().untranslated_count()
    }

    pub fn untranslated_count_for(&self, lang: &str) -> usize {
        self.index.read().untranslated_count_for(lang)
    }

    pub fn edits_count(&self) -> usize {
        self.index.read().edits_count()
    }

    pub fn lang_edits_count(&self, lang: &str) -> usize {
        self.index.read().lang_edits_count(lang)
    }

    pub fn languages_count(&self) -> usize {
        self.index.read().languages_count()
    }

    // ==================== Maintenance ====================

    /// Discard the index and replay the log from the beginning.
    pub fn rebuild(&self) -> Result<()> {
        let mut log = self.writer.lock();
        let languages = self.index.read().languages().to_vec();
        let rebuilt = replay_into(&mut log, TranslationIndex::new(languages))?;
        *self.index.write() = rebuilt;
        Ok(())
    }

    /// Consistent copy of the committed log, for backups.
    ///
    /// The writer lock is held only while the committed length is captured;
    /// the bytes are read afterwards.
    pub fn snapshot(&self) -> Result<LogSnapshot> {
        let pending = self.writer.lock().begin_snapshot()?;
        pending.read()
    }

    /// Rewrite the log to the minimal records that rebuild the live state.
    ///
    /// Writers are blocked for the duration; readers keep using the old index
    /// until the rewritten log has been replayed.
    pub fn compact(&self) -> Result<CompactionReport> {
        let mut log = self.writer.lock();
        let (records, languages, records_before) = {
            let index = self.index.read();
            (
                index.compacted_records(),
                index.languages().to_vec(),
                log.last_sequence(),
            )
        };

        log.rewrite(&records)?;
        let rebuilt = replay_into(&mut log, TranslationIndex::new(languages))?;
        *self.index.write() = rebuilt;

        let report = CompactionReport {
            records_before,
            records_after: log.last_sequence(),
        };
        info!(
            "Compacted {}: {} -> {} records",
            self.name, report.records_before, report.records_after
        );
        Ok(report)
    }
}

/// Replay every record of `log` into `index` and position the log after it.
fn replay_into(log: &mut LogStore, mut index: TranslationIndex) -> Result<TranslationIndex> {
    let mut reader = log.replay()?;
    for record in reader.by_ref() {
        index.apply(&record?);
    }
    log.resume_after(reader.last_sequence());
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    // ==================== Helper Functions ====================

    fn languages() -> Vec<String> {
        vec!["de".to_string(), "fr".to_string()]
    }

    fn create_test_store() -> (TranslationStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join(LOG_FILE_NAME);
        File::create(&path).expect("Failed to create log file");
        let store = TranslationStore::open("sumatra", &path, languages()).expect("open");
        (store, temp_dir)
    }

    fn reopen(temp_dir: &TempDir) -> TranslationStore {
        TranslationStore::open("sumatra", temp_dir.path().join(LOG_FILE_NAME), languages())
            .expect("reopen")
    }

    // ==================== add_string Tests ====================

    #[test]
    fn test_add_string_is_idempotent() {
        let (store, _temp_dir) = create_test_store();
        let first = store.add_string("Hello", "kjk").unwrap();
        let second = store.add_string("  Hello\r\n", "someone").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.strings_count(), 1);
        assert_eq!(store.edits_count(), 1);
    }

    #[test]
    fn test_add_empty_string_rejected() {
        let (store, _temp_dir) = create_test_store();
        assert!(matches!(
            store.add_string("   ", "kjk"),
            Err(StoreError::InvalidInput(_))
        ));
        assert_eq!(store.edits_count(), 0);
    }

    #[test]
    fn test_add_deleted_string_rejected() {
        let (store, _temp_dir) = create_test_store();
        let id = store.add_string("Hello", "kjk").unwrap();
        store.delete_string(&id, "kjk").unwrap();
        assert!(matches!(
            store.add_string("Hello", "kjk"),
            Err(StoreError::StringDeleted(deleted)) if deleted == id
        ));
    }

    // ==================== set_translation Tests ====================

    #[test]
    fn test_set_translation_unknown_string() {
        let (store, _temp_dir) = create_test_store();
        let id = StringId::for_text("Nope");
        assert!(matches!(
            store.set_translation(&id, "fr", "Non", "kjk"),
            Err(StoreError::UnknownString(_))
        ));
    }

    #[test]
    fn test_set_translation_rejects_unconfigured_language() {
        let (store, _temp_dir) = create_test_store();
        let id = store.add_string("Hello", "kjk").unwrap();
        assert!(matches!(
            store.set_translation(&id, "xx", "??", "kjk"),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            store.set_translation(&id, "fr", "  ", "kjk"),
            Err(StoreError::InvalidInput(_))
        ));
        assert_eq!(store.edits_count(), 1);
    }

    #[test]
    fn test_set_translation_last_writer_wins() {
        let (store, _temp_dir) = create_test_store();
        let id = store.add_string("Hello", "kjk").unwrap();
        store.set_translation(&id, "fr", "Salut", "a").unwrap();
        store.set_translation(&id, "fr", "Bonjour", "b").unwrap();

        let index = store.read();
        let translation = index.translation(&id, "fr").unwrap();
        assert_eq!(translation.text, "Bonjour");
        assert_eq!(translation.editor, "b");
        assert_eq!(index.lang_edits_count("fr"), 2);
    }

    // ==================== delete_string Tests ====================

    #[test]
    fn test_delete_terminality() {
        let (store, _temp_dir) = create_test_store();
        let id = store.add_string("Hello", "kjk").unwrap();
        store.delete_string(&id, "kjk").unwrap();

        assert!(matches!(
            store.set_translation(&id, "fr", "Bonjour", "kjk"),
            Err(StoreError::UnknownString(_))
        ));
        let edits = store.edits_count();
        store.delete_string(&id, "kjk").unwrap();
        assert_eq!(store.edits_count(), edits);
    }

    #[test]
    fn test_delete_unknown_string() {
        let (store, _temp_dir) = create_test_store();
        assert!(matches!(
            store.delete_string(&StringId::for_text("Nope"), "kjk"),
            Err(StoreError::UnknownString(_))
        ));
    }

    // ==================== sync_strings Tests ====================

    #[test]
    fn test_sync_strings_adds_and_deletes() {
        let (store, _temp_dir) = create_test_store();
        store.add_string("Old", "kjk").unwrap();
        store.add_string("Kept", "kjk").unwrap();

        let report = store
            .sync_strings(
                &["Kept".to_string(), "New".to_string(), "New".to_string()],
                "kjk",
            )
            .unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(store.strings_count(), 2);
        assert!(!store.read().is_active(&StringId::for_text("Old")));
    }

    #[test]
    fn test_sync_strings_reports_deleted_text() {
        let (store, _temp_dir) = create_test_store();
        let id = store.add_string("Gone", "kjk").unwrap();
        store.delete_string(&id, "kjk").unwrap();

        let report = store.sync_strings(&["Gone".to_string()], "kjk").unwrap();
        assert_eq!(report.skipped_deleted, vec![id]);
        assert_eq!(store.strings_count(), 0);
    }

    // ==================== Persistence Tests ====================

    #[test]
    fn test_reopen_restores_counts() {
        let (store, temp_dir) = create_test_store();
        let hello = store.add_string("Hello", "kjk").unwrap();
        store.set_translation(&hello, "fr", "Bonjour", "kjk").unwrap();
        store.add_string("Bye", "kjk").unwrap();
        drop(store);

        let store = reopen(&temp_dir);
        assert_eq!(store.strings_count(), 2);
        assert_eq!(store.untranslated_count_for("fr"), 1);
        assert_eq!(store.edits_count(), 3);

        let id = store.add_string("Third", "kjk").unwrap();
        assert_eq!(store.read().last_sequence(), 4);
        assert!(store.read().is_active(&id));
    }

    #[test]
    fn test_rebuild_produces_equal_index() {
        let (store, _temp_dir) = create_test_store();
        let hello = store.add_string("Hello", "kjk").unwrap();
        store.set_translation(&hello, "de", "Hallo", "kjk").unwrap();
        let bye = store.add_string("Bye", "kjk").unwrap();
        store.delete_string(&bye, "kjk").unwrap();

        let before = store.read().clone();
        store.rebuild().unwrap();
        assert_eq!(*store.read(), before);
        store.rebuild().unwrap();
        assert_eq!(*store.read(), before);
    }

    #[test]
    fn test_open_fails_on_corrupt_log() {
        let (store, temp_dir) = create_test_store();
        store.add_string("Hello", "kjk").unwrap();
        drop(store);

        let path = temp_dir.path().join(LOG_FILE_NAME);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"not a record\n").unwrap();

        let err = TranslationStore::open("sumatra", &path, languages()).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
    }

    // ==================== Compaction Tests ====================

    #[test]
    fn test_compact_preserves_live_state() {
        let (store, temp_dir) = create_test_store();
        let hello = store.add_string("Hello", "kjk").unwrap();
        store.set_translation(&hello, "fr", "Salut", "kjk").unwrap();
        store.set_translation(&hello, "fr", "Bonjour", "kjk").unwrap();
        let bye = store.add_string("Bye", "kjk").unwrap();
        store.delete_string(&bye, "kjk").unwrap();

        let report = store.compact().unwrap();
        assert_eq!(report.records_before, 5);
        assert_eq!(report.records_after, 2);
        assert_eq!(store.strings_count(), 1);
        assert_eq!(
            store.read().translation(&hello, "fr").unwrap().text,
            "Bonjour"
        );

        store.add_string("After", "kjk").unwrap();
        drop(store);
        let store = reopen(&temp_dir);
        assert_eq!(store.strings_count(), 2);
        assert_eq!(store.read().last_sequence(), 3);
    }

    // ==================== Concurrency Tests ====================

    #[test]
    fn test_concurrent_writers_serialize() {
        let (store, _temp_dir) = create_test_store();
        let store = Arc::new(store);
        let id = store.add_string("Hello", "kjk").unwrap();

        let handles: Vec<_> = ["Bonjour", "Salut"]
            .iter()
            .map(|text| {
                let store = Arc::clone(&store);
                let id = id.clone();
                let text = text.to_string();
                std::thread::spawn(move || store.set_translation(&id, "fr", &text, "t"))
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread").expect("set_translation");
        }

        let records = store.snapshot().unwrap().records().unwrap();
        let translations: Vec<&EditRecord> = records
            .iter()
            .filter(|r| matches!(r.payload, RecordPayload::TranslationSet { .. }))
            .collect();
        assert_eq!(translations.len(), 2);
        let last = match &translations[1].payload {
            RecordPayload::TranslationSet { text, .. } => text.clone(),
            _ => unreachable!(),
        };
        assert_eq!(store.read().translation(&id, "fr").unwrap().text, last);
    }

    #[test]
    fn test_snapshot_during_appends_has_whole_records() {
        let (store, _temp_dir) = create_test_store();
        let store = Arc::new(store);

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..200 {
                    store.add_string(&format!("String {}", i), "kjk").unwrap();
                }
            })
        };

        for _ in 0..20 {
            let snapshot = store.snapshot().unwrap();
            assert!(snapshot.bytes.ends_with(b"\n"));
            let records = snapshot.records().unwrap();
            assert_eq!(records.len() as u64, snapshot.last_sequence);
        }
        writer.join().unwrap();
        assert_eq!(store.snapshot().unwrap().last_sequence, 200);
    }

    #[test]
    fn test_readers_see_whole_records() {
        let (store, _temp_dir) = create_test_store();
        let store = Arc::new(store);

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..100 {
                    let id = store.add_string(&format!("S{}", i), "kjk").unwrap();
                    store.set_translation(&id, "fr", "x", "kjk").unwrap();
                }
            })
        };

        for _ in 0..200 {
            let index = store.read();
            let translated = index.translated_count_for("fr");
            assert!(index.strings_count() == translated || index.strings_count() == translated + 1);
            assert_eq!(index.edits_count() as u64, index.last_sequence());
        }
        writer.join().unwrap();
    }
}
