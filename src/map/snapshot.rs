//! On-disk image of a [`ChangeMap`].
//!
//! Layout (little endian):
//!
//! | offset | size | field                                        |
//! |--------|------|----------------------------------------------|
//! | 0      | 8    | magic `PBKTRMAP`                             |
//! | 8      | 4    | format version                               |
//! | 12     | 4    | reserved, zero                               |
//! | 16     | 8    | slot count                                   |
//! | 24     | 8    | initialization LSN                           |
//! | 32     | 4    | CRC-32C of bytes 0..32 and the slot array    |
//! | 36     | 8*N  | slots                                        |
//!
//! Anything that does not decode to exactly this shape is reported as
//! [`Error::CorruptMap`].

use std::io::{self, Read, Write};

use crate::map::block::Lsn;
use crate::map::change_map::{ChangeMap, MAX_SLOTS, SLOT_SIZE};
use crate::{Error, Result};

const MAP_MAGIC: &[u8; 8] = b"PBKTRMAP";
const MAP_VERSION: u32 = 1;
/// Bytes covered by the checksum before the slot array.
const HEADER_PREFIX_SIZE: usize = 32;
pub const MAP_HEADER_SIZE: usize = HEADER_PREFIX_SIZE + 4;
/// Slots encoded or decoded per I/O call.
const SLOT_CHUNK: usize = 8192;

fn corrupt(reason: impl Into<String>) -> anyhow::Error {
    Error::CorruptMap {
        reason: reason.into(),
    }
    .into()
}

/// Fill `buf` completely; `Ok(false)` on a clean or partial EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

impl ChangeMap {
    /// Serialize the header and slot array to `writer`.
    ///
    /// Slots are copied out first so that the checksum matches the bytes
    /// written even while other threads keep marking.
    pub fn snapshot<W: Write>(&self, writer: &mut W) -> Result<()> {
        let slots = self.slot_values();

        let mut header = [0u8; MAP_HEADER_SIZE];
        header[..8].copy_from_slice(MAP_MAGIC);
        header[8..12].copy_from_slice(&MAP_VERSION.to_le_bytes());
        header[16..24].copy_from_slice(&(slots.len() as u64).to_le_bytes());
        header[24..32].copy_from_slice(&self.init_lsn().0.to_le_bytes());

        let mut crc = crc32c::crc32c(&header[..HEADER_PREFIX_SIZE]);
        let mut buf = Vec::with_capacity(SLOT_CHUNK * SLOT_SIZE as usize);
        for chunk in slots.chunks(SLOT_CHUNK) {
            buf.clear();
            for value in chunk {
                buf.extend_from_slice(&value.to_le_bytes());
            }
            crc = crc32c::crc32c_append(crc, &buf);
        }
        header[32..36].copy_from_slice(&crc.to_le_bytes());

        writer.write_all(&header)?;
        for chunk in slots.chunks(SLOT_CHUNK) {
            buf.clear();
            for value in chunk {
                buf.extend_from_slice(&value.to_le_bytes());
            }
            writer.write_all(&buf)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Decode a map previously written by [`ChangeMap::snapshot`].
    pub fn restore<R: Read>(mut reader: R) -> Result<Self> {
        let mut header = [0u8; MAP_HEADER_SIZE];
        if !read_full(&mut reader, &mut header)? {
            return Err(corrupt("short header"));
        }
        if &header[..8] != MAP_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != MAP_VERSION {
            return Err(corrupt(format!("unsupported version {version}")));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&header[16..24]);
        let slot_count = u64::from_le_bytes(word);
        if slot_count == 0 || slot_count > MAX_SLOTS {
            return Err(corrupt(format!("slot count {slot_count} out of range")));
        }
        word.copy_from_slice(&header[24..32]);
        let init_lsn = Lsn(u64::from_le_bytes(word));
        let stored_crc = u32::from_le_bytes([header[32], header[33], header[34], header[35]]);

        let mut crc = crc32c::crc32c(&header[..HEADER_PREFIX_SIZE]);
        // Grow with the data actually read: a damaged slot count must not
        // trigger a huge allocation before the short read is noticed.
        let mut slots: Vec<u64> = Vec::new();
        let mut buf = vec![0u8; SLOT_CHUNK * SLOT_SIZE as usize];
        let mut remaining = slot_count;
        while remaining > 0 {
            let n = remaining.min(SLOT_CHUNK as u64) as usize;
            let bytes = &mut buf[..n * SLOT_SIZE as usize];
            if !read_full(&mut reader, bytes)? {
                return Err(corrupt(format!(
                    "short slot array: expected {slot_count} slots"
                )));
            }
            crc = crc32c::crc32c_append(crc, bytes);
            slots.extend(bytes.chunks_exact(SLOT_SIZE as usize).map(|raw| {
                let mut word = [0u8; 8];
                word.copy_from_slice(raw);
                u64::from_le_bytes(word)
            }));
            remaining -= n as u64;
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(corrupt("trailing data after slot array"));
        }
        if crc != stored_crc {
            return Err(corrupt(format!(
                "checksum mismatch: stored {stored_crc:#010x}, computed {crc:#010x}"
            )));
        }

        Ok(ChangeMap::from_parts(slots, init_lsn))
    }
}
