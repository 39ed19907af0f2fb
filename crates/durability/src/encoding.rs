//! WAL record encoding and decoding
//!
//! ## Record Format
//!
//! ```text
//! [length: u32][type: u8][payload: bytes][crc32: u32]
//! ```
//!
//! - **length**: size of type + payload + crc (NOT including length itself)
//! - **type**: record type tag (1 = Commit)
//! - **payload**: MessagePack-serialized [`WalRecord`]
//! - **crc32**: CRC32 over \[type\]\[payload\]
//!
//! All integers are little-endian.

use crate::wal::{WalError, WalRecord};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::io::Cursor;

/// Committed transaction batch
pub const TYPE_COMMIT: u8 = 1;

/// Smallest valid value of the length field: type(1) + crc(4)
const MIN_RECORD_LEN: usize = 5;

fn checksum(type_tag: u8, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[type_tag]);
    hasher.update(payload);
    hasher.finalize()
}

/// Encode a record to bytes ready for appending
pub fn encode_record(record: &WalRecord) -> Result<Vec<u8>, WalError> {
    let payload =
        rmp_serde::to_vec(record).map_err(|e| WalError::Serialization(e.to_string()))?;
    let total_len = 1 + payload.len() + 4;

    let mut buf = Vec::with_capacity(4 + total_len);
    buf.write_u32::<LittleEndian>(total_len as u32)?;
    buf.write_u8(TYPE_COMMIT)?;
    buf.extend_from_slice(&payload);
    buf.write_u32::<LittleEndian>(checksum(TYPE_COMMIT, &payload))?;
    Ok(buf)
}

/// Decode one record from the front of `buf`
///
/// Returns the record and the number of bytes consumed. `offset` is the
/// file offset of `buf[0]`, used only in error messages.
pub fn decode_record(buf: &[u8], offset: u64) -> Result<(WalRecord, usize), WalError> {
    let mut cursor = Cursor::new(buf);

    let total_len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| WalError::Incomplete { offset })? as usize;
    if total_len < MIN_RECORD_LEN {
        return Err(WalError::Corruption {
            offset,
            reason: format!("invalid record length {}", total_len),
        });
    }
    if buf.len() < 4 + total_len {
        return Err(WalError::Incomplete { offset });
    }

    let type_tag = buf[4];
    let payload = &buf[5..4 + total_len - 4];
    let mut crc_bytes = &buf[4 + total_len - 4..4 + total_len];
    let expected = crc_bytes.read_u32::<LittleEndian>()?;
    let actual = checksum(type_tag, payload);
    if actual != expected {
        return Err(WalError::Corruption {
            offset,
            reason: format!("CRC mismatch: expected {:08x}, got {:08x}", expected, actual),
        });
    }
    if type_tag != TYPE_COMMIT {
        return Err(WalError::Corruption {
            offset,
            reason: format!("unknown record type {}", type_tag),
        });
    }

    let record: WalRecord = rmp_serde::from_slice(payload).map_err(|e| WalError::Corruption {
        offset,
        reason: format!("deserialization failed: {}", e),
    })?;
    Ok((record, 4 + total_len))
}
