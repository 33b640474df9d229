//! Document journal.
//!
//! Every committed mutation is appended as one framed record:
//!
//! ```text
//! | magic "FDJ1" (4) | payload length u32 LE (4) | CBOR payload | CRC32 LE (4) |
//! ```
//!
//! The CRC covers the header and the payload. On replay, an incomplete
//! record at the very end of the log is a torn write from a crash and is
//! cut off; any other damage is reported as corruption.

use crate::document::{Document, DocumentId};
use crate::error::{CoreError, CoreResult};
use facetdb_storage::JournalBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Magic bytes opening every record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"FDJ1";

/// magic (4) + length (4)
const HEADER_SIZE: usize = 8;

const CRC_SIZE: usize = 4;

/// A journaled mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// A document was created or replaced; carries the full new version.
    Put {
        /// Entity the document belongs to.
        entity: String,
        /// The document after the mutation.
        document: Document,
    },
    /// A document was deleted.
    Delete {
        /// Entity the document belonged to.
        entity: String,
        /// Identifier of the deleted document.
        id: DocumentId,
    },
}

impl JournalRecord {
    /// Encodes the record into a framed byte buffer.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload).map_err(|e| CoreError::codec(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::codec("journal record larger than 4 GiB"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&JOURNAL_MAGIC);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }
}

/// Outcome of decoding a journal buffer.
#[derive(Debug, Default)]
pub struct Replay {
    /// Records in append order.
    pub records: Vec<JournalRecord>,
    /// Length of the valid prefix.
    pub valid_len: u64,
    /// Bytes discarded from a torn tail.
    pub torn_bytes: u64,
}

/// Decodes a whole journal buffer.
pub fn decode_all(data: &[u8]) -> CoreResult<Replay> {
    let mut replay = Replay::default();
    let mut pos = 0usize;

    while pos < data.len() {
        let rest = &data[pos..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(pos as u64, "bad magic"));
        }
        let len = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < total {
            break;
        }

        let body = &rest[..HEADER_SIZE + len];
        let crc_bytes = &rest[HEADER_SIZE + len..total];
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = compute_crc32(body);
        if stored != computed {
            // A damaged last record is indistinguishable from a torn write.
            if pos + total == data.len() {
                break;
            }
            return Err(CoreError::journal_corruption(
                pos as u64,
                format!("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}"),
            ));
        }

        let record: JournalRecord = ciborium::from_reader(&body[HEADER_SIZE..])
            .map_err(|e| CoreError::journal_corruption(pos as u64, e.to_string()))?;
        replay.records.push(record);
        pos += total;
    }

    replay.valid_len = pos as u64;
    replay.torn_bytes = (data.len() - pos) as u64;
    Ok(replay)
}

/// The journal: record framing over a [`JournalBackend`].
pub struct Journal {
    backend: Box<dyn JournalBackend>,
    sync_on_write: bool,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

impl Journal {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn JournalBackend>, sync_on_write: bool) -> Self {
        Self {
            backend,
            sync_on_write,
        }
    }

    /// Appends one record, syncing if configured.
    pub fn append(&mut self, record: &JournalRecord) -> CoreResult<u64> {
        let frame = record.encode()?;
        let offset = self.backend.append(&frame)?;
        if self.sync_on_write {
            self.backend.sync()?;
        }
        Ok(offset)
    }

    /// Reads every record, cutting off a torn tail.
    pub fn replay(&mut self) -> CoreResult<Vec<JournalRecord>> {
        let data = self.backend.read_all()?;
        let replay = decode_all(&data)?;
        if replay.torn_bytes > 0 {
            warn!(
                offset = replay.valid_len,
                bytes = replay.torn_bytes,
                "discarding torn journal tail"
            );
            self.backend.truncate(replay.valid_len)?;
        }
        debug!(records = replay.records.len(), "journal replayed");
        Ok(replay.records)
    }

    /// Rewrites the journal to hold exactly `records`.
    pub fn compact<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a JournalRecord>,
    ) -> CoreResult<u64> {
        let mut data = Vec::new();
        for record in records {
            data.extend_from_slice(&record.encode()?);
        }
        self.backend.replace(&data)?;
        Ok(data.len() as u64)
    }

    /// Returns the current size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
