/// Append-only run history
///
/// One JSON object per line. Each append is flushed and fsynced before it
/// returns, and appends are serialized by a mutex so line order equals
/// completion order. Ids are monotonic and continue across restarts.
use crate::config::types::{ExecutionStatus, Language, Result, SandboxError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A completed run as recorded on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub caller_id: String,
    pub language: Language,
    pub code: String,
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
}

/// Entry contents before the ledger assigns an id and timestamp.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub caller_id: String,
    pub language: Language,
    pub code: String,
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
}

struct LedgerWriter {
    file: File,
    next_id: u64,
    /// A failed append could not be rolled back; close its line first.
    needs_repair: bool,
}

impl LedgerWriter {
    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        if self.needs_repair {
            terminate_torn_line(&mut self.file)?;
            self.needs_repair = false;
        }

        let previous_len = self.file.metadata()?.len();
        let written = self
            .file
            .write_all(line)
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            self.discard_partial(previous_len);
            return Err(e);
        }
        Ok(())
    }

    /// Cut the file back to `len` after a failed write.
    fn discard_partial(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len).and_then(|_| self.file.sync_data()) {
            log::warn!("Failed to roll back partial ledger write: {}", e);
            self.needs_repair = true;
        }
    }
}

pub struct RunLedger {
    path: PathBuf,
    writer: Mutex<LedgerWriter>,
}

impl RunLedger {
    /// Open (or create) the ledger file and recover the next id.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SandboxError::Ledger(format!("Failed to create ledger directory: {}", e))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| {
                SandboxError::Ledger(format!("Failed to open ledger {}: {}", path.display(), e))
            })?;
        terminate_torn_line(&mut file)
            .map_err(|e| SandboxError::Ledger(format!("Failed to repair ledger: {}", e)))?;

        let entries = read_entries(&path)?;
        let next_id = entries.iter().map(|e| e.id).max().map_or(1, |max| max + 1);
        log::debug!(
            "Ledger {} opened with {} entries, next id {}",
            path.display(),
            entries.len(),
            next_id
        );

        Ok(Self {
            path,
            writer: Mutex::new(LedgerWriter {
                file,
                next_id,
                needs_repair: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one entry and return it with its assigned id.
    pub fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SandboxError::Ledger("ledger lock poisoned".to_string()))?;

        let entry = LedgerEntry {
            id: writer.next_id,
            caller_id: entry.caller_id,
            language: entry.language,
            code: entry.code,
            stdout: entry.stdout,
            stderr: entry.stderr,
            status: entry.status,
            created_at: Utc::now(),
        };

        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| SandboxError::Ledger(format!("Failed to encode entry: {}", e)))?;
        line.push(b'\n');

        writer
            .write_line(&line)
            .map_err(|e| SandboxError::Ledger(format!("Failed to write ledger: {}", e)))?;

        writer.next_id += 1;
        Ok(entry)
    }

    /// Up to `limit` entries for `caller_id`, newest first.
    pub fn recent(&self, caller_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        // Hold the lock so a concurrent append is never read half-written.
        let _writer = self
            .writer
            .lock()
            .map_err(|_| SandboxError::Ledger("ledger lock poisoned".to_string()))?;

        let mut entries: Vec<LedgerEntry> = read_entries(&self.path)?
            .into_iter()
            .filter(|e| e.caller_id == caller_id)
            .collect();
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn len(&self) -> Result<usize> {
        let _writer = self
            .writer
            .lock()
            .map_err(|_| SandboxError::Ledger("ledger lock poisoned".to_string()))?;
        Ok(read_entries(&self.path)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// A crash mid-append can leave a final line without its newline; close it
/// so the next entry starts on a line of its own.
fn terminate_torn_line(file: &mut File) -> std::io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};

    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        log::warn!("Ledger ends with a partial line; terminating it");
        file.write_all(b"\n")?;
        file.sync_data()?;
    }
    Ok(())
}

fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(SandboxError::Ledger(format!(
                "Failed to read ledger {}: {}",
                path.display(),
                e
            )))
        }
    };

    // Lines are raw bytes: a torn write can cut a multi-byte character.
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut line = Vec::new();
    let mut number = 0usize;
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| SandboxError::Ledger(format!("Failed to read ledger: {}", e)))?;
        if read == 0 {
            break;
        }
        number += 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<LedgerEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => log::warn!(
                "Skipping unreadable ledger line {} in {}: {}",
                number,
                path.display(),
                e
            ),
        }
    }
    Ok(entries)
}
