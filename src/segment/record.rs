//! Segment record types and frame serialization

use crate::{Document, Result, VellumError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Segment record type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Document insert
    Insert = 0,
    /// Document update (re-append, newer wins on read)
    Update = 1,
    /// Document delete
    Delete = 2,
    /// Deletion marker without payload
    Tombstone = 3,
}

impl TryFrom<u8> for RecordType {
    type Error = VellumError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordType::Insert),
            1 => Ok(RecordType::Update),
            2 => Ok(RecordType::Delete),
            3 => Ok(RecordType::Tombstone),
            _ => Err(VellumError::InvalidFormat(format!(
                "Invalid record type: {}",
                value
            ))),
        }
    }
}

impl RecordType {
    /// Whether this record carries a live document version
    pub fn is_write(self) -> bool {
        matches!(self, RecordType::Insert | RecordType::Update)
    }
}

/// A single framed record in a segment file
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    /// Record type
    pub record_type: RecordType,
    /// Document id the record applies to
    pub doc_id: String,
    /// Document payload (absent for tombstones)
    pub doc: Option<Document>,
}

impl SegmentRecord {
    /// Create an insert record
    pub fn insert(doc_id: impl Into<String>, doc: Document) -> Self {
        Self {
            record_type: RecordType::Insert,
            doc_id: doc_id.into(),
            doc: Some(doc),
        }
    }

    /// Create an update record
    pub fn update(doc_id: impl Into<String>, doc: Document) -> Self {
        Self {
            record_type: RecordType::Update,
            doc_id: doc_id.into(),
            doc: Some(doc),
        }
    }

    /// Create a tombstone record
    pub fn tombstone(doc_id: impl Into<String>) -> Self {
        Self {
            record_type: RecordType::Tombstone,
            doc_id: doc_id.into(),
            doc: None,
        }
    }

    /// Serialize the record with length prefix and CRC checksum
    ///
    /// Format:
    /// - 4 bytes: frame length (excluding this field)
    /// - 1 byte: record type
    /// - 2 bytes: doc id length
    /// - N bytes: doc id
    /// - 4 bytes: payload length
    /// - N bytes: payload (UTF-8 JSON)
    /// - 4 bytes: CRC32 of everything after the length prefix (except itself)
    pub fn serialize_with_checksum(&self) -> Result<Bytes> {
        let data = match &self.doc {
            Some(doc) => serde_json::to_vec(doc)
                .map_err(|e| VellumError::InvalidFormat(e.to_string()))?,
            None => Vec::new(),
        };

        let mut buf = BytesMut::new();

        // Reserve space for length prefix
        buf.put_u32_le(0);

        // Record type
        buf.put_u8(self.record_type as u8);

        // Doc id
        buf.put_u16_le(self.doc_id.len() as u16);
        buf.put_slice(self.doc_id.as_bytes());

        // Payload
        buf.put_u32_le(data.len() as u32);
        buf.put_slice(&data);

        // Checksum over the payload (excluding length prefix)
        let checksum = crc32fast::hash(&buf[4..]);
        buf.put_u32_le(checksum);

        // Back-patch the frame length
        let len = (buf.len() - 4) as u32;
        buf[0..4].copy_from_slice(&len.to_le_bytes());

        Ok(buf.freeze())
    }

    /// Deserialize a record from bytes, validating its checksum.
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize_with_checksum(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(VellumError::InvalidFormat("Record too short".into()));
        }

        let mut cursor = std::io::Cursor::new(data);
        let len = cursor.get_u32_le() as usize;
        if len < 9 {
            // type(1) + id len(2) + payload len(4) + crc(4) is the minimum
            return Err(VellumError::InvalidFormat("Record frame too small".into()));
        }
        if data.len() < 4 + len {
            return Err(VellumError::InvalidFormat("Incomplete record".into()));
        }

        let frame = &data[4..4 + len];
        let payload = &frame[..len - 4];

        // Validate checksum
        let expected = u32::from_le_bytes(frame[len - 4..].try_into().unwrap_or([0; 4]));
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(VellumError::ChecksumMismatch { expected, actual });
        }

        let mut cursor = std::io::Cursor::new(payload);
        let record_type = RecordType::try_from(cursor.get_u8())?;

        let id_len = cursor.get_u16_le() as usize;
        let pos = cursor.position() as usize;
        if pos + id_len > payload.len() {
            return Err(VellumError::InvalidFormat("Record id overrun".into()));
        }
        let doc_id = String::from_utf8(payload[pos..pos + id_len].to_vec())
            .map_err(|e| VellumError::InvalidFormat(e.to_string()))?;
        cursor.set_position((pos + id_len) as u64);

        let data_len = cursor.get_u32_le() as usize;
        let pos = cursor.position() as usize;
        if pos + data_len > payload.len() {
            return Err(VellumError::InvalidFormat("Record payload overrun".into()));
        }
        let doc = if data_len > 0 {
            Some(
                serde_json::from_slice(&payload[pos..pos + data_len])
                    .map_err(|e| VellumError::Corruption(e.to_string()))?,
            )
        } else {
            None
        };

        Ok((
            SegmentRecord {
                record_type,
                doc_id,
                doc,
            },
            4 + len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_record_serialization() {
        let rec = SegmentRecord::insert("doc1", doc(json!({"name": "alice", "age": 30})));
        let bytes = rec.serialize_with_checksum().unwrap();

        let (back, consumed) = SegmentRecord::deserialize_with_checksum(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(back.record_type, RecordType::Insert);
        assert_eq!(back.doc_id, "doc1");
        assert_eq!(back.doc, rec.doc);
    }

    #[test]
    fn test_tombstone_has_no_payload() {
        let rec = SegmentRecord::tombstone("doc1");
        let bytes = rec.serialize_with_checksum().unwrap();

        let (back, _) = SegmentRecord::deserialize_with_checksum(&bytes).unwrap();
        assert_eq!(back.record_type, RecordType::Tombstone);
        assert!(back.doc.is_none());
    }

    #[test]
    fn test_checksum_validation() {
        let rec = SegmentRecord::insert("doc1", doc(json!({"v": 1})));
        let mut bytes = rec.serialize_with_checksum().unwrap().to_vec();

        // Corrupt a payload byte
        bytes[10] ^= 0xFF;

        let result = SegmentRecord::deserialize_with_checksum(&bytes);
        assert!(matches!(
            result,
            Err(VellumError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_frame() {
        let rec = SegmentRecord::insert("doc1", doc(json!({"v": 1})));
        let bytes = rec.serialize_with_checksum().unwrap();

        let result = SegmentRecord::deserialize_with_checksum(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(VellumError::InvalidFormat(_))));
    }
}
