//! WAL entry types and frame serialization

use crate::{Document, Result, VellumError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Logical operation recorded in the WAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalOp {
    /// Document insert
    Insert,
    /// Filtered update
    Update,
    /// Filtered delete
    Delete,
}

/// A single WAL entry. Sequence numbers are assigned by the writer and
/// strictly increase; timestamps are unix nanoseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Sequence number
    pub seq: i64,
    /// Creation timestamp (unix nanos)
    pub ts: i64,
    /// Operation
    pub op: WalOp,
    /// Database name
    pub db: String,
    /// Collection name
    pub coll: String,
    /// Inserted document (insert only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
    /// Match filter (update/delete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Document>,
    /// Update operators (update only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,
    /// Whether the operation applies to every match
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub multi: bool,
}

impl WalEntry {
    /// Create an insert entry (sequence assigned on append)
    pub fn insert(db: &str, coll: &str, doc: Document) -> Self {
        Self {
            seq: 0,
            ts: 0,
            op: WalOp::Insert,
            db: db.to_string(),
            coll: coll.to_string(),
            doc: Some(doc),
            filter: None,
            update: None,
            multi: false,
        }
    }

    /// Create an update entry
    pub fn update(db: &str, coll: &str, filter: Document, update: Document, multi: bool) -> Self {
        Self {
            seq: 0,
            ts: 0,
            op: WalOp::Update,
            db: db.to_string(),
            coll: coll.to_string(),
            doc: None,
            filter: Some(filter),
            update: Some(update),
            multi,
        }
    }

    /// Create a delete entry
    pub fn delete(db: &str, coll: &str, filter: Document, multi: bool) -> Self {
        Self {
            seq: 0,
            ts: 0,
            op: WalOp::Delete,
            db: db.to_string(),
            coll: coll.to_string(),
            doc: None,
            filter: Some(filter),
            update: None,
            multi,
        }
    }

    /// Serialize the entry as an on-disk frame
    ///
    /// Format:
    /// - 4 bytes: JSON length (little endian)
    /// - N bytes: UTF-8 JSON
    /// - 4 bytes: CRC32 of the JSON bytes
    /// - 1 byte: newline
    pub fn serialize_with_checksum(&self) -> Result<Bytes> {
        let json =
            serde_json::to_vec(self).map_err(|e| VellumError::InvalidFormat(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(json.len() + 9);
        buf.put_u32_le(json.len() as u32);
        buf.put_slice(&json);
        buf.put_u32_le(crc32fast::hash(&json));
        buf.put_u8(b'\n');
        Ok(buf.freeze())
    }

    /// Deserialize an entry from bytes, validating its checksum.
    /// Returns the entry and the number of bytes consumed.
    pub fn deserialize_with_checksum(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(VellumError::InvalidFormat("Entry too short".into()));
        }

        let mut cursor = std::io::Cursor::new(data);
        let len = cursor.get_u32_le() as usize;
        if data.len() < 4 + len + 4 {
            return Err(VellumError::InvalidFormat("Incomplete entry".into()));
        }

        let json = &data[4..4 + len];
        let expected =
            u32::from_le_bytes(data[4 + len..4 + len + 4].try_into().unwrap_or([0; 4]));
        let actual = crc32fast::hash(json);
        if expected != actual {
            return Err(VellumError::ChecksumMismatch { expected, actual });
        }

        let entry: WalEntry =
            serde_json::from_slice(json).map_err(|e| VellumError::Corruption(e.to_string()))?;

        // Trailing newline, when present
        let mut consumed = 4 + len + 4;
        if data.get(consumed) == Some(&b'\n') {
            consumed += 1;
        }

        Ok((entry, consumed))
    }
}
