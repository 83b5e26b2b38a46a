use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::entry::{EntryDraft, HeadRef, LedgerEntry, Subject};
use crate::error::LedgerError;
use crate::memory::{read_lock, write_lock};
use crate::state::LedgerState;
use crate::traits::{LedgerReader, LedgerWriter};

/// Record framing: 4 bytes length + 4 bytes CRC32, little-endian.
const HEADER_SIZE: usize = 8;

/// Configuration for the file-backed ledger.
#[derive(Clone, Debug)]
pub struct LedgerFileConfig {
    /// `fsync` after every append. On by default: this is the system's
    /// record of record.
    pub sync_on_append: bool,
}

impl Default for LedgerFileConfig {
    fn default() -> Self {
        Self {
            sync_on_append: true,
        }
    }
}

struct SegmentWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Ledger persisted to a single append-only segment file.
///
/// On-disk format, per entry:
/// ```text
/// [4 bytes: record length (little-endian u32)]
/// [4 bytes: CRC32 of record (little-endian u32)]
/// [N bytes: bincode-serialized LedgerEntry]
/// ```
///
/// On open the file is read front-to-back into memory and the hash chain is
/// verified. A torn write at the tail (truncated header or record) is
/// discarded; a CRC or chain failure anywhere before the tail is an
/// integrity violation and the ledger refuses to open.
pub struct FileLedger {
    path: PathBuf,
    inner: RwLock<LedgerState>,
    segment: Mutex<SegmentWriter>,
    halted: AtomicBool,
    config: LedgerFileConfig,
}

impl FileLedger {
    /// Open (or create) the ledger segment at the given path.
    pub fn open(path: &Path, config: LedgerFileConfig) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (entries, valid_len) = recover(path)?;
        let state = LedgerState::from_entries(entries);
        state.verify()?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        // Drop any torn tail so new records start at a clean boundary.
        if file.metadata()?.len() > valid_len {
            warn!(valid_len, "discarding torn tail record");
            file.set_len(valid_len)?;
        }
        file.seek(io::SeekFrom::End(0))?;
        let writer = BufWriter::new(file);

        debug!(path = %path.display(), entries = state.len(), "ledger segment opened");
        Ok(Self {
            path: path.to_path_buf(),
            inner: RwLock::new(state),
            segment: Mutex::new(SegmentWriter {
                writer,
                offset: valid_len,
            }),
            halted: AtomicBool::new(false),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_inner(
        &self,
        expected_head: Option<Option<HeadRef>>,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(LedgerError::Halted);
        }
        if drafts.is_empty() {
            return Ok(vec![]);
        }

        let mut state = write_lock(&self.inner)?;
        if let Some(expected) = expected_head {
            state.check_head(expected)?;
        }

        let sealed = state.seal_drafts(drafts)?;

        // Persist before the in-memory tail advances; one write for the
        // whole batch so a crash cannot leave it half-applied mid-record.
        let mut frame = Vec::new();
        for entry in &sealed {
            let record =
                bincode::serialize(entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;
            frame.extend_from_slice(&(record.len() as u32).to_le_bytes());
            frame.extend_from_slice(&crc32fast::hash(&record).to_le_bytes());
            frame.extend_from_slice(&record);
        }

        {
            let mut segment = self
                .segment
                .lock()
                .map_err(|_| LedgerError::IntegrityViolation {
                    seq: 0,
                    reason: "segment lock poisoned".into(),
                })?;
            if let Err(e) = write_frame(&mut segment.writer, &frame, self.config.sync_on_append) {
                // Partial frame bytes may already be on disk. Wind the
                // segment back to the last committed record so a later
                // successful append cannot land after the torn bytes.
                warn!(error = %e, offset = segment.offset, "append write failed; rewinding segment");
                if let Err(re) = rewind_segment(&self.path, &mut segment) {
                    warn!(error = %re, "segment rewind failed; halting ledger");
                    self.halted.store(true, Ordering::SeqCst);
                }
                return Err(e.into());
            }
            segment.offset += frame.len() as u64;
        }

        state.commit(&sealed);
        debug!(
            first_seq = sealed[0].seq,
            count = sealed.len(),
            tail = %hemo_crypto::short_hex(&sealed[sealed.len() - 1].hash),
            "ledger append persisted"
        );
        Ok(sealed)
    }
}

fn write_frame(writer: &mut BufWriter<File>, frame: &[u8], sync: bool) -> io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    if sync {
        writer.get_ref().sync_all()?;
    }
    Ok(())
}

/// Truncate the segment back to the last committed record after a failed
/// write. The old writer is replaced before the truncation so anything
/// left in its buffer cannot be flushed past the new end of file.
fn rewind_segment(path: &Path, segment: &mut SegmentWriter) -> io::Result<()> {
    segment.writer = BufWriter::new(OpenOptions::new().read(true).write(true).open(path)?);
    let file = segment.writer.get_mut();
    file.set_len(segment.offset)?;
    file.seek(io::SeekFrom::End(0))?;
    Ok(())
}

/// Read every complete, checksummed record from the segment.
///
/// Returns the entries and the byte length of the valid prefix. A short
/// tail stops recovery; a CRC or decode failure on a complete record is an
/// integrity violation.
fn recover(path: &Path) -> Result<(Vec<LedgerEntry>, u64), LedgerError> {
    let mut data = Vec::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut data)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((vec![], 0)),
        Err(e) => return Err(e.into()),
    }

    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset + HEADER_SIZE <= data.len() {
        let mut header = [0u8; 4];
        header.copy_from_slice(&data[offset..offset + 4]);
        let length = u32::from_le_bytes(header) as usize;
        header.copy_from_slice(&data[offset + 4..offset + 8]);
        let expected_crc = u32::from_le_bytes(header);

        let record_start = offset + HEADER_SIZE;
        let record_end = record_start + length;
        if length == 0 || record_end > data.len() {
            warn!(offset, length, "truncated tail record; stopping recovery");
            break;
        }

        let record = &data[record_start..record_end];
        let actual_crc = crc32fast::hash(record);
        if actual_crc != expected_crc {
            return Err(LedgerError::IntegrityViolation {
                seq: (entries.len() + 1) as u64,
                reason: format!(
                    "CRC mismatch at offset {offset}: expected {expected_crc:#010x}, got {actual_crc:#010x}"
                ),
            });
        }

        let entry: LedgerEntry = bincode::deserialize(record).map_err(|e| {
            LedgerError::IntegrityViolation {
                seq: (entries.len() + 1) as u64,
                reason: format!("undecodable record: {e}"),
            }
        })?;
        entries.push(entry);
        offset = record_end;
    }

    debug!(recovered = entries.len(), "ledger recovery complete");
    Ok((entries, offset as u64))
}

impl LedgerWriter for FileLedger {
    fn append(&self, draft: EntryDraft) -> Result<LedgerEntry, LedgerError> {
        let mut sealed = self.append_inner(None, vec![draft])?;
        Ok(sealed.remove(0))
    }

    fn append_batch(&self, drafts: Vec<EntryDraft>) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.append_inner(None, drafts)
    }

    fn append_batch_at(
        &self,
        expected_head: Option<HeadRef>,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.append_inner(Some(expected_head), drafts)
    }
}

impl LedgerReader for FileLedger {
    fn head(&self) -> Result<Option<HeadRef>, LedgerError> {
        Ok(read_lock(&self.inner)?.head())
    }

    fn len(&self) -> Result<u64, LedgerError> {
        Ok(read_lock(&self.inner)?.len())
    }

    fn entry(&self, seq: u64) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.entry(seq))
    }

    fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.entries().to_vec())
    }

    fn read_since(&self, seq: u64) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_since(seq))
    }

    fn read_subject(&self, subject: &Subject) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_subject(subject))
    }

    fn read_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_between(from, to))
    }

    fn read_by_actor(&self, actor_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_by_actor(actor_id))
    }

    fn read_recent(&self, n: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(read_lock(&self.inner)?.read_recent(n))
    }

    fn verify_chain(&self) -> Result<(), LedgerError> {
        let result = read_lock(&self.inner)?.verify();
        if let Err(LedgerError::IntegrityViolation { seq, reason }) = &result {
            warn!(seq, reason = %reason, "chain verification failed; halting ledger");
            self.halted.store(true, Ordering::SeqCst);
        }
        result
    }
}
