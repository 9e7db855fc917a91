use oddsim_core::{Error, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of reading a log from disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Replay {
    pub entries: usize,
    /// Complete lines that failed to parse
    pub skipped: usize,
    /// Byte length up to the end of the last newline-terminated line
    pub valid_len: u64,
}

/// Append-only JSON-lines log of accepted writes
///
/// Each entry goes to the file in a single write and is `fdatasync`ed before
/// `append` returns, so a caller may publish the write once the append
/// succeeds. A failed append is rolled back to the previous length.
pub struct WriteAheadLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl WriteAheadLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Replay the log at `path` into `apply`, cut off any torn tail, then open it
    /// for appending
    pub fn recover<T, P, F>(path: P, apply: F) -> Result<(Self, Replay)>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
        F: FnMut(T),
    {
        let path = path.as_ref();
        let replay = Self::replay(path, apply)?;
        let wal = Self::open(path)?;
        {
            let file = wal.file.lock();
            let len = file.metadata()?.len();
            if len > replay.valid_len {
                warn!(
                    path = %path.display(),
                    dropped_bytes = len - replay.valid_len,
                    "truncating torn WAL tail"
                );
                file.set_len(replay.valid_len)?;
                file.sync_all()?;
            }
        }
        Ok((wal, replay))
    }

    /// Append one entry and sync it to disk
    pub fn append<T: Serialize>(&self, entry: &T) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        let before = file.metadata()?.len();
        let written = file.write_all(&line).and_then(|_| file.sync_data());
        if let Err(e) = written {
            if let Err(rollback) = file.set_len(before) {
                warn!(path = %self.path.display(), "WAL rollback failed: {}", rollback);
            }
            return Err(Error::Store(format!(
                "WAL append to {} failed: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }

    /// Drop every entry; called once the entries are covered by a snapshot
    pub fn truncate(&self) -> Result<()> {
        let file = self.file.lock();
        file.set_len(0)?;
        file.sync_all()?;
        Ok(())
    }

    /// Stream every entry of the log at `path` into `apply`
    ///
    /// A missing file is an empty log. Complete lines that fail to parse are
    /// skipped with a warning. A final line without a newline was never
    /// acknowledged and is left out of `valid_len`.
    pub fn replay<T, P, F>(path: P, mut apply: F) -> Result<Replay>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
        F: FnMut(T),
    {
        let path = path.as_ref();
        let mut replay = Replay::default();
        if !path.exists() {
            return Ok(replay);
        }

        let mut reader = BufReader::new(File::open(path)?);
        let mut line = Vec::new();
        let mut lineno = 0usize;
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            lineno += 1;
            if line.last() != Some(&b'\n') {
                warn!(path = %path.display(), line = lineno, bytes = read, "ignoring torn WAL tail");
                break;
            }
            replay.valid_len += read as u64;

            let body = &line[..line.len() - 1];
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice(body) {
                Ok(entry) => {
                    apply(entry);
                    replay.entries += 1;
                }
                Err(e) => {
                    replay.skipped += 1;
                    warn!(
                        path = %path.display(),
                        line = lineno,
                        "skipping unreadable WAL entry: {}",
                        e
                    );
                }
            }
        }
        if replay.entries > 0 {
            info!(path = %path.display(), entries = replay.entries, "replayed write-ahead log");
        }
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Entry {
        id: String,
        value: f64,
    }

    fn entry(id: &str, value: f64) -> Entry {
        Entry {
            id: id.to_string(),
            value,
        }
    }

    fn read_all(path: &Path) -> (Vec<Entry>, Replay) {
        let mut entries = Vec::new();
        let replay = WriteAheadLog::replay(path, |e: Entry| entries.push(e)).unwrap();
        (entries, replay)
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&entry("a", 1.5)).unwrap();
        wal.append(&entry("b", 2.5)).unwrap();

        let (entries, replay) = read_all(&path);
        assert_eq!(entries, vec![entry("a", 1.5), entry("b", 2.5)]);
        assert_eq!(replay.entries, 2);
        assert_eq!(replay.valid_len, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_replay_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let (entries, replay) = read_all(&dir.path().join("none.wal"));
        assert!(entries.is_empty());
        assert_eq!(replay, Replay::default());
    }

    #[test]
    fn test_replay_skips_torn_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn.wal");
        let wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&entry("a", 1.5)).unwrap();
        drop(wal);
        let good_len = std::fs::metadata(&path).unwrap().len();

        append_raw(&path, b"{\"id\":\"b\",\"val");

        let (entries, replay) = read_all(&path);
        assert_eq!(entries, vec![entry("a", 1.5)]);
        assert_eq!(replay.valid_len, good_len);
    }

    #[test]
    fn test_replay_skips_garbled_complete_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbled.wal");
        let wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&entry("a", 1.5)).unwrap();
        append_raw(&path, b"not json\n");
        wal.append(&entry("b", 2.5)).unwrap();

        let (entries, replay) = read_all(&path);
        assert_eq!(entries, vec![entry("a", 1.5), entry("b", 2.5)]);
        assert_eq!(replay.skipped, 1);
    }

    #[test]
    fn test_recover_cuts_torn_tail_before_appending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recover.wal");
        WriteAheadLog::open(&path).unwrap().append(&entry("a", 1.5)).unwrap();
        append_raw(&path, b"{\"id\":\"torn\",\"va");

        let mut recovered = Vec::new();
        let (wal, replay) = WriteAheadLog::recover(&path, |e: Entry| recovered.push(e)).unwrap();
        assert_eq!(recovered, vec![entry("a", 1.5)]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), replay.valid_len);

        wal.append(&entry("b", 2.5)).unwrap();
        let (entries, replay) = read_all(&path);
        assert_eq!(entries, vec![entry("a", 1.5), entry("b", 2.5)]);
        assert_eq!(replay.skipped, 0);
    }

    #[test]
    fn test_failed_append_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("failed.wal");
        std::fs::write(&path, b"").unwrap();

        // A read-only handle makes the write itself fail
        let wal = WriteAheadLog {
            file: Mutex::new(File::open(&path).unwrap()),
            path: path.clone(),
        };
        let err = wal.append(&entry("rejected", 1.0)).unwrap_err();
        assert!(matches!(err, Error::Store(_)));

        *wal.file.lock() = OpenOptions::new().append(true).open(&path).unwrap();
        wal.append(&entry("b", 2.5)).unwrap();

        let (entries, replay) = read_all(&path);
        assert_eq!(entries, vec![entry("b", 2.5)]);
        assert_eq!(replay.skipped, 0);
    }

    #[test]
    fn test_truncate_then_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.wal");
        let wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&entry("a", 1.5)).unwrap();
        wal.truncate().unwrap();
        wal.append(&entry("b", 2.5)).unwrap();

        let (entries, _) = read_all(&path);
        assert_eq!(entries, vec![entry("b", 2.5)]);
    }
}
