use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use atlas_types::Deployment;

use crate::error::{HistoryError, HistoryResult};

/// Flush/sync strategy for the journal.
#[derive(Clone, Debug)]
pub enum SyncMode {
    /// `fsync` after every write (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    OsDefault,
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::OsDefault
    }
}

/// Configuration for the deployment journal.
#[derive(Clone, Debug, Default)]
pub struct JournalConfig {
    /// Sync/flush strategy.
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Internal mutable state for the journal writer.
struct JournalWriter {
    writer: BufWriter<File>,
    /// Current write offset in the journal file.
    offset: u64,
}

/// Crash-recoverable, append-only journal of recorded deployments.
///
/// Each record is a full deployment (entity plus audit), framed with a length
/// prefix and a CRC32 checksum:
///
/// ```text
/// [4 bytes: record length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (JSON-serialized Deployment)]
/// ```
///
/// Payloads are JSON rather than a binary encoding because entities carry
/// free-form JSON metadata, which only a self-describing format can decode.
///
/// On recovery the file is read front-to-back; records that fail the CRC
/// check are skipped (they represent incomplete/torn writes from a crash).
/// The journal is never truncated: deployment history is permanent, and the
/// active-pointer index is rebuilt by replaying the recovered records rather
/// than persisted.
pub struct DeploymentJournal {
    /// Path to the journal file.
    path: PathBuf,
    /// Writer state behind a mutex for thread safety.
    writer: Mutex<JournalWriter>,
    /// Configuration.
    config: JournalConfig,
}

impl DeploymentJournal {
    /// Open (or create) a journal file at the given path.
    pub fn open(path: &Path, config: JournalConfig) -> HistoryResult<Self> {
        // Ensure parent directory exists.
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offset = file.metadata()?.len();
        let writer = BufWriter::new(file);

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter { writer, offset }),
            config,
        })
    }

    /// Append a deployment record. Returns the byte offset of the record.
    pub fn append(&self, deployment: &Deployment) -> HistoryResult<u64> {
        let payload = serde_json::to_vec(deployment)
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;

        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().expect("journal mutex poisoned");
        let record_offset = w.offset;

        // Write header: [length: u32 LE] [crc: u32 LE]
        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        // Write payload
        w.writer.write_all(&payload)?;

        // Sync if configured for every write.
        if matches!(self.config.sync_mode, SyncMode::EveryWrite) {
            w.writer.flush()?;
            w.writer.get_ref().sync_all()?;
        } else {
            w.writer.flush()?;
        }

        w.offset += HEADER_SIZE as u64 + payload.len() as u64;

        debug!(
            offset = record_offset,
            len = payload.len(),
            entity = %deployment.entity_id().short_hex(),
            "journal append"
        );
        Ok(record_offset)
    }

    /// Recover all valid records from the journal.
    ///
    /// Reads the file front-to-back. Records that fail CRC validation are
    /// logged and skipped (they represent torn writes from a crash).
    pub fn recover(&self) -> HistoryResult<Vec<Deployment>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            // Read header
            let mut header_buf = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length =
                u32::from_le_bytes([header_buf[0], header_buf[1], header_buf[2], header_buf[3]]);
            let expected_crc =
                u32::from_le_bytes([header_buf[4], header_buf[5], header_buf[6], header_buf[7]]);

            // Validate length
            if length == 0 || (offset + HEADER_SIZE as u64 + length as u64) > file_len {
                warn!(
                    offset,
                    length, file_len, "invalid journal record length; stopping recovery"
                );
                break;
            }

            // Read payload
            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal record; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            // CRC check
            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping record"
                );
                offset += HEADER_SIZE as u64 + length as u64;
                continue;
            }

            // Deserialize
            match serde_json::from_slice::<Deployment>(&payload) {
                Ok(deployment) => {
                    records.push(deployment);
                }
                Err(e) => {
                    warn!(offset, error = %e, "failed to decode journal record; skipping");
                }
            }

            offset += HEADER_SIZE as u64 + length as u64;
        }

        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("journal mutex poisoned").offset
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
