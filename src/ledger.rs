use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-folder record file, one downloaded message id per line.
pub const RECORD_FILE: &str = ".downloaded_ids.txt";

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The record file exists but cannot be read; membership cannot be
    /// trusted, so the sync pass for this folder must abort.
    #[error("ledger record {path} is unreadable: {source}")]
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Appending a freshly downloaded id failed. The id stays out of the
    /// in-memory set so disk and memory keep agreeing; the message will be
    /// re-attempted on the next run.
    #[error("failed to append to ledger record {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Durable per-folder set of message ids whose media has already been
/// downloaded. An id is in the ledger iff a media file for it was
/// successfully written to the folder at some prior point.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    ids: HashSet<i64>,
}

impl Ledger {
    /// Loads the record for `folder`, creating an empty ledger when no
    /// record file exists yet. Lines that do not parse as an integer id are
    /// skipped; an unreadable file is fatal.
    pub fn load(folder: &Path) -> Result<Self, LedgerError> {
        let path = folder.join(RECORD_FILE);
        let mut ids = HashSet::new();
        match File::open(&path) {
            Ok(file) => {
                for line in BufReader::new(file).lines() {
                    let line = line.map_err(|source| LedgerError::Unavailable {
                        path: path.clone(),
                        source,
                    })?;
                    if let Ok(id) = line.trim().parse::<i64>() {
                        ids.insert(id);
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(LedgerError::Unavailable { path, source }),
        }
        Ok(Self { path, ids })
    }

    pub fn contains(&self, message_id: i64) -> bool {
        self.ids.contains(&message_id)
    }

    /// Copy of the current membership, taken by the planner at the start of
    /// a pass so the ledger stays free for appends while the pass runs.
    pub fn snapshot(&self) -> HashSet<i64> {
        self.ids.clone()
    }

    /// Records `message_id` as downloaded. Idempotent; the append is flushed
    /// to disk before the in-memory set is updated, so a crash can never
    /// silently forget a completed download.
    pub fn record(&mut self, message_id: i64) -> Result<(), LedgerError> {
        if self.ids.contains(&message_id) {
            return Ok(());
        }
        self.append(message_id)
            .map_err(|source| LedgerError::WriteFailed {
                path: self.path.clone(),
                source,
            })?;
        self.ids.insert(message_id);
        Ok(())
    }

    fn append(&self, message_id: i64) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{message_id}")?;
        file.sync_data()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_record_file_bootstraps_empty() {
        let temp = tempdir().expect("tempdir");
        let ledger = Ledger::load(temp.path()).expect("load");
        assert!(ledger.is_empty());
        assert!(!temp.path().join(RECORD_FILE).exists());
    }

    #[test]
    fn recorded_ids_survive_reload() {
        let temp = tempdir().expect("tempdir");
        let mut ledger = Ledger::load(temp.path()).expect("load");
        ledger.record(42).expect("record");
        ledger.record(7).expect("record");

        let reloaded = Ledger::load(temp.path()).expect("reload");
        assert!(reloaded.contains(42));
        assert!(reloaded.contains(7));
        assert!(!reloaded.contains(8));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn record_is_idempotent() {
        let temp = tempdir().expect("tempdir");
        let mut ledger = Ledger::load(temp.path()).expect("load");
        ledger.record(5).expect("record");
        ledger.record(5).expect("record again");
        assert_eq!(ledger.len(), 1);

        let raw = std::fs::read_to_string(temp.path().join(RECORD_FILE)).expect("read");
        assert_eq!(raw.lines().count(), 1);
    }

    #[test]
    fn junk_lines_are_skipped() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join(RECORD_FILE), "12\nnot-a-number\n\n34\n")
            .expect("seed record");
        let ledger = Ledger::load(temp.path()).expect("load");
        assert!(ledger.contains(12));
        assert!(ledger.contains(34));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn unreadable_record_is_reported() {
        let temp = tempdir().expect("tempdir");
        // A directory in place of the record file makes every read fail.
        std::fs::create_dir(temp.path().join(RECORD_FILE)).expect("mkdir");
        let err = Ledger::load(temp.path()).expect_err("load must fail");
        assert!(matches!(err, LedgerError::Unavailable { .. }));
    }
}
