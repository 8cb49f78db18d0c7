// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Write-ahead log for atomic accumulator transitions.
//!
//! This is the durability layer beneath the chain. Every transition is
//! logged as a Begin entry (element digest + pre/post accumulator values)
//! BEFORE the in-memory state moves, and sealed with a Commit entry after.
//! Every write is fsync'd before the call returns. No truncation or
//! rewriting of committed bytes, ever.
//!
//! # File Format
//! ```text
//! [FileHeader: 16 bytes][Entry][Entry][Entry]...
//! ```
//!
//! FileHeader:
//! - magic: b"SCRW"
//! - version: u32 (1)
//! - value_len: u32 (accumulator value width for this identity)
//! - reserved: u32 (0)
//!
//! Entry:
//! - kind: u8 (1 = Begin, 2 = Commit)
//! - sequence: u64
//! - payload_len: u32
//! - checksum: u64 (CRC64 over kind || sequence || payload_len || payload)
//! - payload: Begin = element(32) || pre_value || post_value, Commit = empty
//!
//! All integers little-endian. The format is stable: any later process can
//! audit the file without the live accumulator.

use crate::errors::{ChainError, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use crc64fast::Digest;
use scar_kernel::accumulator::{ElementDigest, DIGEST_LEN};
use scar_kernel::record::ScarRecord;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const WAL_MAGIC: [u8; 4] = *b"SCRW";
pub const WAL_VERSION: u32 = 1;

const FILE_HEADER_LEN: usize = 16;
const ENTRY_HEADER_LEN: usize = 1 + 8 + 4 + 8;

const KIND_BEGIN: u8 = 1;
const KIND_COMMIT: u8 = 2;

/// One raw log entry, as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalEntry {
    Begin {
        sequence: u64,
        element: ElementDigest,
        pre_value: Vec<u8>,
        post_value: Vec<u8>,
    },
    Commit {
        sequence: u64,
    },
}

/// Receipt for a durably appended Begin entry. `mark_complete` consumes it
/// by reference so replay code can re-issue markers for recovered records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogHandle {
    sequence: u64,
}

impl LogHandle {
    pub(crate) fn for_sequence(sequence: u64) -> Self {
        Self { sequence }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

fn entry_checksum(kind: u8, sequence: u64, payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(&[kind]);
    digest.write(&sequence.to_le_bytes());
    digest.write(&(payload.len() as u32).to_le_bytes());
    digest.write(payload);
    digest.sum64()
}

fn encode_entry(kind: u8, sequence: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENTRY_HEADER_LEN + payload.len());
    buf.write_u8(kind).expect("vec write is infallible");
    buf.write_u64::<LittleEndian>(sequence)
        .expect("vec write is infallible");
    buf.write_u32::<LittleEndian>(payload.len() as u32)
        .expect("vec write is infallible");
    buf.write_u64::<LittleEndian>(entry_checksum(kind, sequence, payload))
        .expect("vec write is infallible");
    buf.extend_from_slice(payload);
    buf
}

/// Append-only log writer plus the completion bookkeeping needed to keep
/// `mark_complete` idempotent within a process lifetime.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: BufWriter<File>,
    value_len: usize,
    last_sequence: u64,
    completed: BTreeSet<u64>,
}

impl Wal {
    /// Open or create the log, returning the writer and every entry already
    /// on disk (in file order).
    ///
    /// A torn tail (a partial entry from a crash mid-append) is trimmed
    /// here: nothing was promised for it, and appending after garbage would
    /// wreck the framing. A complete entry that fails its checksum is NOT
    /// a torn tail; that is corruption and fails the open.
    pub fn open(path: impl AsRef<Path>, value_len: usize) -> Result<(Self, Vec<WalEntry>)> {
        let path = path.as_ref().to_path_buf();

        let file_exists = path.exists()
            && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let mut entries = Vec::new();
        if file_exists {
            let (scanned, clean_len) = scan_entries(&path, value_len)?;
            entries = scanned;

            let actual_len = fs::metadata(&path)?.len();
            if clean_len < actual_len {
                tracing::warn!(
                    "trimming {} torn byte(s) at log tail",
                    actual_len - clean_len
                );
                let file = OpenOptions::new().write(true).open(&path)?;
                file.set_len(clean_len)?;
                file.sync_data()?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut wal = Self {
            path,
            file: BufWriter::new(file),
            value_len,
            last_sequence: 0,
            completed: BTreeSet::new(),
        };

        if !file_exists {
            wal.write_file_header()?;
        }

        for entry in &entries {
            match entry {
                WalEntry::Begin { sequence, .. } => {
                    wal.last_sequence = wal.last_sequence.max(*sequence);
                }
                WalEntry::Commit { sequence } => {
                    wal.completed.insert(*sequence);
                }
            }
        }

        Ok((wal, entries))
    }

    fn write_file_header(&mut self) -> Result<()> {
        let mut buf = Vec::with_capacity(FILE_HEADER_LEN);
        buf.extend_from_slice(&WAL_MAGIC);
        buf.write_u32::<LittleEndian>(WAL_VERSION)
            .expect("vec write is infallible");
        buf.write_u32::<LittleEndian>(self.value_len as u32)
            .expect("vec write is infallible");
        buf.write_u32::<LittleEndian>(0)
            .expect("vec write is infallible");

        self.file.write_all(&buf)?;
        self.sync()?;
        Ok(())
    }

    /// Durably persist the intent to apply one accumulator transition.
    ///
    /// Only returns after write + fsync; if this errors, nothing may be
    /// applied and the whole operation is retryable.
    pub fn append(&mut self, record: &ScarRecord) -> Result<LogHandle> {
        if record.pre_value.len() != self.value_len || record.post_value.len() != self.value_len {
            return Err(ChainError::InvalidOperation(
                "record value width does not match the log's group parameters",
            ));
        }

        let mut payload = Vec::with_capacity(DIGEST_LEN + 2 * self.value_len);
        payload.extend_from_slice(record.element.as_bytes());
        payload.extend_from_slice(&record.pre_value);
        payload.extend_from_slice(&record.post_value);

        let buf = encode_entry(KIND_BEGIN, record.sequence, &payload);
        self.file.write_all(&buf)?;
        self.sync()?;

        self.last_sequence = record.sequence;
        Ok(LogHandle::for_sequence(record.sequence))
    }

    /// Durably record that the transition behind `handle` has been applied.
    ///
    /// Idempotent: a second call for the same handle is a no-op, not an
    /// error, and writes nothing.
    pub fn mark_complete(&mut self, handle: &LogHandle) -> Result<()> {
        if self.completed.contains(&handle.sequence) {
            return Ok(());
        }

        let buf = encode_entry(KIND_COMMIT, handle.sequence, &[]);
        self.file.write_all(&buf)?;
        self.sync()?;

        self.completed.insert(handle.sequence);
        Ok(())
    }

    pub fn is_complete(&self, sequence: u64) -> bool {
        self.completed.contains(&sequence)
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        Ok(())
    }
}

enum ScanItem {
    Entry(WalEntry),
    End,
    Torn,
}

/// Fill `buf` from the reader. Distinguishes a clean end (zero bytes
/// available) from a torn tail (some bytes, then EOF).
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Option<bool>> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Ok(Some(false));
        }
        filled += n;
    }
    Ok(Some(true))
}

fn read_entry<R: Read>(reader: &mut R, value_len: usize) -> Result<ScanItem> {
    let mut header = [0u8; ENTRY_HEADER_LEN];
    match fill_or_eof(reader, &mut header)? {
        None => return Ok(ScanItem::End),
        Some(false) => return Ok(ScanItem::Torn),
        Some(true) => {}
    }

    let kind = header[0];
    let sequence = u64::from_le_bytes(header[1..9].try_into().unwrap());
    let payload_len = u32::from_le_bytes(header[9..13].try_into().unwrap()) as usize;
    let checksum = u64::from_le_bytes(header[13..21].try_into().unwrap());

    let expected_len = match kind {
        KIND_BEGIN => DIGEST_LEN + 2 * value_len,
        KIND_COMMIT => 0,
        other => {
            return Err(ChainError::CorruptLog(format!(
                "unknown entry kind {other} at sequence {sequence}"
            )))
        }
    };
    if payload_len != expected_len {
        return Err(ChainError::CorruptLog(format!(
            "entry at sequence {sequence} declares {payload_len} payload bytes, expected {expected_len}"
        )));
    }

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        match fill_or_eof(reader, &mut payload)? {
            Some(true) => {}
            _ => return Ok(ScanItem::Torn),
        }
    }

    let found = entry_checksum(kind, sequence, &payload);
    if found != checksum {
        return Err(ChainError::CorruptLog(format!(
            "checksum mismatch at sequence {sequence}: expected {checksum:#018x}, found {found:#018x}"
        )));
    }

    let entry = match kind {
        KIND_BEGIN => {
            let element = ElementDigest::from_bytes(&payload[..DIGEST_LEN])?;
            WalEntry::Begin {
                sequence,
                element,
                pre_value: payload[DIGEST_LEN..DIGEST_LEN + value_len].to_vec(),
                post_value: payload[DIGEST_LEN + value_len..].to_vec(),
            }
        }
        _ => WalEntry::Commit { sequence },
    };
    Ok(ScanItem::Entry(entry))
}

fn validate_file_header<R: Read>(reader: &mut R, value_len: usize) -> Result<()> {
    let mut header = [0u8; FILE_HEADER_LEN];
    reader
        .read_exact(&mut header)
        .map_err(|_| ChainError::CorruptLog("file too short for header".to_string()))?;

    if header[0..4] != WAL_MAGIC {
        return Err(ChainError::CorruptLog("bad magic bytes".to_string()));
    }
    let version = u32::from_le_bytes(header[4..8].try_into().unwrap());
    if version != WAL_VERSION {
        return Err(ChainError::CorruptLog(format!(
            "unsupported log version {version}"
        )));
    }
    let header_value_len = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
    if header_value_len != value_len {
        return Err(ChainError::CorruptLog(format!(
            "log was written for {header_value_len}-byte values, expected {value_len}"
        )));
    }
    Ok(())
}

fn scan_entries(path: &Path, value_len: usize) -> Result<(Vec<WalEntry>, u64)> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    validate_file_header(&mut reader, value_len)?;

    let mut entries = Vec::new();
    let mut clean_len = FILE_HEADER_LEN as u64;
    loop {
        match read_entry(&mut reader, value_len)? {
            ScanItem::Entry(entry) => {
                let payload_len = match &entry {
                    WalEntry::Begin { .. } => DIGEST_LEN + 2 * value_len,
                    WalEntry::Commit { .. } => 0,
                };
                clean_len += (ENTRY_HEADER_LEN + payload_len) as u64;
                entries.push(entry);
            }
            ScanItem::End => break,
            ScanItem::Torn => {
                tracing::warn!("ignoring incomplete entry at end of log");
                break;
            }
        }
    }
    Ok((entries, clean_len))
}

/// Read every entry for audit. Works without the live accumulator and
/// without write access; a torn tail is dropped with a warning.
pub fn read_entries(path: impl AsRef<Path>, value_len: usize) -> Result<Vec<WalEntry>> {
    let (entries, _clean_len) = scan_entries(path.as_ref(), value_len)?;
    Ok(entries)
}

/// Best-effort audit read: stops at the first unreadable entry instead of
/// failing, so a frozen chain's intact prefix stays inspectable.
pub fn read_entries_lossy(path: impl AsRef<Path>, value_len: usize) -> Vec<WalEntry> {
    let file = match File::open(path.as_ref()) {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!("audit read failed to open log: {err}");
            return Vec::new();
        }
    };
    let mut reader = BufReader::new(file);
    if let Err(err) = validate_file_header(&mut reader, value_len) {
        tracing::warn!("audit read stopped at header: {err}");
        return Vec::new();
    }

    let mut entries = Vec::new();
    loop {
        match read_entry(&mut reader, value_len) {
            Ok(ScanItem::Entry(entry)) => entries.push(entry),
            Ok(ScanItem::End) | Ok(ScanItem::Torn) => break,
            Err(err) => {
                tracing::warn!("audit read stopped at damaged entry: {err}");
                break;
            }
        }
    }
    entries
}
