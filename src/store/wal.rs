//! TID Write-Ahead Log
//!
//! Binary append-only log of store mutations. Every entry carries a CRC32 of
//! its payload; payloads are bincode-encoded.
//!
//! # Header Layout (20 bytes)
//!
//! ```text
//! ┌────────────┬───────────┬────────────────────────────────────┐
//! │ seq_id     │ 8 bytes   │ Monotonic sequence across restarts │
//! │ checksum   │ 4 bytes   │ CRC32 of payload                   │
//! │ payload_len│ 4 bytes   │ Payload size                       │
//! │ entry_type │ 1 byte    │ Put / Delete / Clear               │
//! │ version    │ 1 byte    │ Payload format version             │
//! │ reserved   │ 2 bytes   │ Zero                               │
//! └────────────┴───────────┴────────────────────────────────────┘
//! ```

use crc32fast::Hasher;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

/// WAL header size in bytes
pub const WAL_HEADER_SIZE: usize = 20;

/// Upper bound for one payload; a larger length in a header means corruption
pub const MAX_PAYLOAD_LEN: u32 = 1024 * 1024;

const PAYLOAD_VERSION: u8 = 1;

// ============================================================
// HEADER
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalHeader {
    pub seq_id: u64,
    pub checksum: u32,
    pub payload_len: u32,
    pub entry_type: u8,
    pub version: u8,
}

impl WalHeader {
    pub fn new(entry_type: WalEntryType, seq_id: u64, payload: &[u8]) -> Self {
        Self {
            seq_id,
            checksum: crc32_checksum(payload),
            payload_len: payload.len() as u32,
            entry_type: entry_type as u8,
            version: PAYLOAD_VERSION,
        }
    }

    pub fn to_bytes(&self) -> [u8; WAL_HEADER_SIZE] {
        let mut buf = [0u8; WAL_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.seq_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[16] = self.entry_type;
        buf[17] = self.version;
        buf
    }

    pub fn from_bytes(buf: &[u8; WAL_HEADER_SIZE]) -> Self {
        Self {
            seq_id: u64::from_le_bytes([
                buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
            ]),
            checksum: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            payload_len: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            entry_type: buf[16],
            version: buf[17],
        }
    }

    pub fn verify_checksum(&self, payload: &[u8]) -> bool {
        self.checksum == crc32_checksum(payload)
    }
}

// ============================================================
// ENTRY TYPES
// ============================================================

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalEntryType {
    /// Payload: bincode `UnitRecord`
    Put = 1,
    /// Payload: bincode `Tid`
    Delete = 2,
    /// Empty payload
    Clear = 3,
}

impl TryFrom<u8> for WalEntryType {
    type Error = io::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Put),
            2 => Ok(Self::Delete),
            3 => Ok(Self::Clear),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown WalEntryType: {}", value),
            )),
        }
    }
}

#[inline]
pub fn crc32_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

// ============================================================
// WRITER
// ============================================================

/// Append-only WAL writer over any `Write`
pub struct WalWriter<W: Write> {
    writer: W,
    next_seq: u64,
}

impl<W: Write> WalWriter<W> {
    pub fn new(writer: W, start_seq: u64) -> Self {
        Self {
            writer,
            next_seq: start_seq,
        }
    }

    /// Write an entry, returning its seq_id. Not flushed.
    pub fn write_entry(&mut self, entry_type: WalEntryType, payload: &[u8]) -> io::Result<u64> {
        if payload.len() as u64 > MAX_PAYLOAD_LEN as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("WAL payload too large: {} bytes", payload.len()),
            ));
        }

        let seq_id = self.next_seq;
        let header = WalHeader::new(entry_type, seq_id, payload);
        self.writer.write_all(&header.to_bytes())?;
        self.writer.write_all(payload)?;
        self.next_seq += 1;

        Ok(seq_id)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

/// File-backed WAL used by the TID store
///
/// `commit` flushes the buffer and, when `sync_on_write` is set, forces the
/// data to disk before returning.
pub struct TidWal {
    inner: WalWriter<BufWriter<File>>,
    sync_on_write: bool,
}

impl TidWal {
    pub fn open(path: &Path, start_seq: u64, sync_on_write: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: WalWriter::new(BufWriter::with_capacity(64 * 1024, file), start_seq),
            sync_on_write,
        })
    }

    pub fn append(&mut self, entry_type: WalEntryType, payload: &[u8]) -> io::Result<u64> {
        self.inner.write_entry(entry_type, payload)
    }

    pub fn commit(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        if self.sync_on_write {
            self.inner.get_ref().get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Drop every entry (after a snapshot captured them)
    pub fn truncate(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        let file = self.inner.get_mut().get_mut();
        file.set_len(0)?;
        file.sync_all()
    }

    pub fn next_seq(&self) -> u64 {
        self.inner.next_seq()
    }

    /// Last assigned seq_id
    pub fn current_seq(&self) -> u64 {
        self.inner.next_seq().saturating_sub(1)
    }
}

// ============================================================
// READER
// ============================================================

#[derive(Debug)]
pub struct WalEntry {
    pub header: WalHeader,
    pub payload: Vec<u8>,
}

/// WAL reader
///
/// A partially written final entry (crash during append) reads as end of log;
/// `valid_len` then tells the caller where to truncate. A checksum mismatch on
/// a complete entry is an error.
pub struct WalReader<R: Read> {
    reader: R,
    valid_len: u64,
    torn_tail: bool,
}

impl<R: Read> WalReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            valid_len: 0,
            torn_tail: false,
        }
    }

    /// Read the next entry, returns None at EOF or at a torn tail
    pub fn read_entry(&mut self) -> io::Result<Option<WalEntry>> {
        let mut header_buf = [0u8; WAL_HEADER_SIZE];
        let read = read_full(&mut self.reader, &mut header_buf)?;
        if read == 0 {
            return Ok(None);
        }
        if read < WAL_HEADER_SIZE {
            self.torn_tail = true;
            return Ok(None);
        }

        let header = WalHeader::from_bytes(&header_buf);
        if header.payload_len > MAX_PAYLOAD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "payload length {} exceeds limit at seq_id={}",
                    header.payload_len, header.seq_id
                ),
            ));
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        let read = read_full(&mut self.reader, &mut payload)?;
        if read < payload.len() {
            self.torn_tail = true;
            return Ok(None);
        }

        if !header.verify_checksum(&payload) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "CRC32 checksum mismatch at seq_id={}, expected={}, got={}",
                    header.seq_id,
                    header.checksum,
                    crc32_checksum(&payload)
                ),
            ));
        }

        self.valid_len += (WAL_HEADER_SIZE + payload.len()) as u64;
        Ok(Some(WalEntry { header, payload }))
    }

    /// Bytes covered by complete, verified entries
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// True if reading stopped at a partially written entry
    pub fn torn_tail(&self) -> bool {
        self.torn_tail
    }
}

/// Like `read_exact`, but reports how many bytes were read before EOF
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ============================================================
// TESTS
// ============================================================
