use crate::cert::metadata::SignedCertificateRecord;
use crate::utils::errors::{Result, ZcertError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Durable, append-only store of issuance records keyed by serial.
///
/// Implementations must reject a second record for a serial that is already
/// present.
pub trait RecordStore: Send + Sync {
    /// Highest serial ever persisted, `None` if the store is empty
    fn highest_serial(&self) -> Result<Option<i64>>;

    /// Durably append one record
    fn append(&self, record: &SignedCertificateRecord) -> Result<()>;

    /// All records ordered by serial
    fn list(&self) -> Result<Vec<SignedCertificateRecord>>;
}

/// Records kept one JSON object per line. Each append is fsynced before returning.
pub struct JsonlRecordStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

struct StoreState {
    serials: BTreeSet<i64>,
    // byte length covered by complete records; anything past it is a torn append
    good_len: u64,
}

impl JsonlRecordStore {
    /// Open (or create) the store at `path`.
    ///
    /// A torn final line left by a crash mid-append is dropped from the file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            File::create(&path)?;
            tracing::info!("created record store at {}", path.display());
        }

        let (records, good_len) = read_records(&path)?;
        let file_len = fs::metadata(&path)?.len();
        if good_len < file_len {
            tracing::warn!(
                "ignoring torn record at end of {} ({} bytes)",
                path.display(),
                file_len - good_len
            );
            OpenOptions::new().write(true).open(&path)?.set_len(good_len)?;
        }

        let serials = records.iter().map(|r| r.serial).collect();
        tracing::debug!("loaded {} records from {}", records.len(), path.display());

        Ok(Self {
            path,
            state: Mutex::new(StoreState { serials, good_len }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonlRecordStore {
    fn highest_serial(&self) -> Result<Option<i64>> {
        Ok(self.state.lock().serials.last().copied())
    }

    fn append(&self, record: &SignedCertificateRecord) -> Result<()> {
        let mut state = self.state.lock();
        if state.serials.contains(&record.serial) {
            return Err(ZcertError::Storage(format!(
                "a record for serial {} already exists",
                record.serial
            )));
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().write(true).open(&self.path).map_err(|e| {
            ZcertError::Storage(format!("cannot open {}: {e}", self.path.display()))
        })?;

        let file_len = file.metadata()?.len();
        if file_len != state.good_len {
            tracing::warn!(
                "dropping {} bytes of torn record at end of {}",
                file_len.saturating_sub(state.good_len),
                self.path.display()
            );
            file.set_len(state.good_len)?;
        }

        let written = file
            .seek(SeekFrom::Start(state.good_len))
            .and_then(|_| file.write_all(&line))
            .and_then(|_| file.sync_all());
        if let Err(e) = written {
            // leave no partial line behind for the next append to land on
            if let Err(repair) = file.set_len(state.good_len) {
                tracing::error!(
                    "cannot truncate torn record in {}: {repair}",
                    self.path.display()
                );
            }
            return Err(ZcertError::Storage(format!(
                "cannot write record for serial {} to {}: {e}",
                record.serial,
                self.path.display()
            )));
        }

        state.good_len += line.len() as u64;
        state.serials.insert(record.serial);
        tracing::trace!("appended record for serial {}", record.serial);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SignedCertificateRecord>> {
        let (mut records, _) = read_records(&self.path)?;
        records.sort_by_key(|r| r.serial);
        Ok(records)
    }
}

/// Parse every complete line; returns the records and the byte length they span
fn read_records(path: &Path) -> Result<(Vec<SignedCertificateRecord>, u64)> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut line_no = 0usize;

    while offset < data.len() {
        line_no += 1;
        let rest = &data[offset..];
        let Some(newline) = rest.iter().position(|b| *b == b'\n') else {
            // unterminated tail: only a crash mid-append produces this
            return Ok((records, offset as u64));
        };

        let line = &rest[..newline];
        offset += newline + 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let record = serde_json::from_slice(line).map_err(|e| {
            ZcertError::Storage(format!(
                "corrupt record on line {line_no} of {}: {e}",
                path.display()
            ))
        })?;
        records.push(record);
    }

    Ok((records, offset as u64))
}

/// Volatile store, for tests and dry runs
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<i64, SignedCertificateRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn highest_serial(&self) -> Result<Option<i64>> {
        Ok(self.records.lock().keys().next_back().copied())
    }

    fn append(&self, record: &SignedCertificateRecord) -> Result<()> {
        let mut records = self.records.lock();
        if records.contains_key(&record.serial) {
            return Err(ZcertError::Storage(format!(
                "a record for serial {} already exists",
                record.serial
            )));
        }
        records.insert(record.serial, record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<SignedCertificateRecord>> {
        Ok(self.records.lock().values().cloned().collect())
    }
}
