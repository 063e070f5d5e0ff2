//! Durable, append-only translation log.
//!
//! One file per app. The file starts with [`codec::HEADER`] and holds one
//! encoded [`EditRecord`] per line. Appends are fsynced before they are
//! acknowledged; a failed append truncates the file back to the last
//! committed record so a torn line never survives.

use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::codec;
use super::record::EditRecord;
use crate::error::{Result, StoreError};

/// Name of the log file inside an app's data directory.
pub const LOG_FILE_NAME: &str = "translations.log";

/// Single-writer handle on one app's log file.
///
/// Mutating methods take `&mut self`; the owning store keeps the handle behind
/// a mutex so appends are totally ordered.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    file: File,
    committed_len: u64,
    last_sequence: u64,
}

impl LogStore {
    /// Open an existing log file. Missing files are an error, never created.
    ///
    /// An empty file is accepted and receives the format header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(StoreError::StorageMissing(path));
        }

        let mut file = OpenOptions::new().read(true).append(true).open(&path)?;
        let mut committed_len = file.metadata()?.len();
        if committed_len == 0 {
            let header = format!("{}\n", codec::HEADER);
            file.write_all(header.as_bytes())?;
            file.sync_data()?;
            committed_len = header.len() as u64;
            info!("Initialized empty translation log {}", path.display());
        }

        Ok(Self {
            path,
            file,
            committed_len,
            last_sequence: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number of the last committed record (0 for an empty log).
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn next_sequence(&self) -> u64 {
        self.last_sequence + 1
    }

    /// Byte length of the log up to the end of the last committed record.
    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    /// Read the log from the beginning. Each call starts from a fresh handle.
    pub fn replay(&self) -> Result<LogReader<BufReader<File>>> {
        let file = File::open(&self.path)?;
        Ok(LogReader::new(BufReader::new(file)))
    }

    /// Record where replay ended so the next append continues the sequence.
    pub(crate) fn resume_after(&mut self, sequence: u64) {
        self.last_sequence = sequence;
    }

    /// Durably append a record and return its sequence number.
    pub fn append(&mut self, record: &EditRecord) -> Result<u64> {
        if record.sequence <= self.last_sequence {
            return Err(StoreError::InvalidInput(format!(
                "sequence {} does not follow {}",
                record.sequence, self.last_sequence
            )));
        }

        let mut line = codec::encode(record);
        line.push('\n');

        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            if let Err(truncate_err) = self.file.set_len(self.committed_len) {
                error!(
                    "Failed to truncate torn record in {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(e.into());
        }

        self.committed_len += line.len() as u64;
        self.last_sequence = record.sequence;
        Ok(record.sequence)
    }

    /// Capture the committed prefix of the log.
    ///
    /// Cheap: opens a read handle and records the committed length. The bytes
    /// are read later by [`PendingSnapshot::read`], which can run without the
    /// writer lock because the committed prefix is never rewritten in place.
    pub fn begin_snapshot(&self) -> Result<PendingSnapshot> {
        Ok(PendingSnapshot {
            file: File::open(&self.path)?,
            len: self.committed_len,
            last_sequence: self.last_sequence,
        })
    }

    /// Capture and read a snapshot in one step.
    pub fn snapshot(&self) -> Result<LogSnapshot> {
        self.begin_snapshot()?.read()
    }

    /// Atomically replace the log with `records`.
    ///
    /// The new content is written to a sibling temp file, synced, and renamed
    /// over the log. Until the rename the old file stays intact.
    pub fn rewrite(&mut self, records: &[EditRecord]) -> Result<()> {
        let tmp_path = self.path.with_extension("log.compact");
        let mut content = String::new();
        content.push_str(codec::HEADER);
        content.push('\n');
        for record in records {
            content.push_str(&codec::encode(record));
            content.push('\n');
        }

        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(content.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            File::open(dir)?.sync_all()?;
        }

        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.committed_len = content.len() as u64;
        self.last_sequence = records.last().map_or(0, |r| r.sequence);
        Ok(())
    }
}

/// A snapshot whose extent is fixed but whose bytes are not read yet.
#[derive(Debug)]
pub struct PendingSnapshot {
    file: File,
    len: u64,
    last_sequence: u64,
}

impl PendingSnapshot {
    pub fn read(self) -> Result<LogSnapshot> {
        let mut bytes = Vec::with_capacity(self.len as usize);
        self.file.take(self.len).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < self.len {
            return Err(StoreError::corrupt(
                bytes.len() as u64,
                "log shorter than its committed length",
            ));
        }
        Ok(LogSnapshot {
            bytes,
            last_sequence: self.last_sequence,
        })
    }
}

/// Point-in-time copy of a log, always ending on a record boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSnapshot {
    pub bytes: Vec<u8>,
    pub last_sequence: u64,
}

impl LogSnapshot {
    /// Hex SHA-256 of the snapshot bytes.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// Decode every record in the snapshot.
    pub fn records(&self) -> Result<Vec<EditRecord>> {
        LogReader::new(Cursor::new(self.bytes.as_slice())).collect()
    }
}

/// Lazy, finite reader over an encoded log.
///
/// Yields records in file order. The first undecodable line produces
/// [`StoreError::CorruptRecord`] with its byte offset, after which the reader
/// is exhausted. Nothing is ever skipped.
#[derive(Debug)]
pub struct LogReader<R> {
    reader: R,
    offset: u64,
    last_sequence: u64,
    header_checked: bool,
    done: bool,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            last_sequence: 0,
            header_checked: false,
            done: false,
        }
    }

    /// Sequence number of the last record yielded so far.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    fn fail(&mut self, offset: u64, reason: impl Into<String>) -> Option<Result<EditRecord>> {
        self.done = true;
        Some(Err(StoreError::corrupt(offset, reason)))
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<EditRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let start = self.offset;
            let mut buf = Vec::new();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => self.offset += n as u64,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }

            if buf.pop() != Some(b'\n') {
                return self.fail(start, "truncated record (missing line terminator)");
            }
            let line = match String::from_utf8(buf) {
                Ok(line) => line,
                Err(_) => return self.fail(start, "invalid UTF-8"),
            };

            if !self.header_checked {
                if let Err(e) = codec::check_header(&line) {
                    return self.fail(start, e.to_string());
                }
                self.header_checked = true;
                continue;
            }

            let record = match codec::decode(&line) {
                Ok(record) => record,
                Err(e) => return self.fail(start, e.to_string()),
            };
            if record.sequence <= self.last_sequence {
                let reason = format!(
                    "sequence {} does not follow {}",
                    record.sequence, self.last_sequence
                );
                return self.fail(start, reason);
            }
            self.last_sequence = record.sequence;
            return Some(Ok(record));
        }
    }
}
