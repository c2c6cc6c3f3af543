//! Single append-only segment file

use super::{
    segment_file_name, SegmentRecord, SEGMENT_HEADER_LEN, SEGMENT_MAGIC, SEGMENT_VERSION,
};
use crate::{Result, VellumError};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// A single segment file holding framed document records.
///
/// The writer takes the exclusive lock; readers take the shared lock and
/// scan a snapshot of the file contents.
pub struct Segment {
    id: u64,
    path: PathBuf,
    inner: RwLock<SegmentInner>,
}

struct SegmentInner {
    file: File,
    size: u64,
    doc_count: u32,
    sealed: bool,
}

impl Segment {
    /// Create a fresh segment file with an empty header
    pub fn create(dir: &Path, id: u64) -> Result<Self> {
        let path = dir.join(segment_file_name(id));
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; SEGMENT_HEADER_LEN as usize];
        header[0..4].copy_from_slice(&SEGMENT_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&SEGMENT_VERSION.to_le_bytes());
        // doc_count and reserved stay zero
        file.write_all(&header)?;

        Ok(Self {
            id,
            path,
            inner: RwLock::new(SegmentInner {
                file,
                size: SEGMENT_HEADER_LEN,
                doc_count: 0,
                sealed: false,
            }),
        })
    }

    /// Open an existing segment file, validating its header
    pub fn open(path: PathBuf, id: u64) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; SEGMENT_HEADER_LEN as usize];
        file.read_exact(&mut header)?;

        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap_or_default());
        if magic != SEGMENT_MAGIC {
            return Err(VellumError::Corruption(format!(
                "Invalid segment magic in {:?}",
                path
            )));
        }
        let version = u32::from_le_bytes(header[4..8].try_into().unwrap_or_default());
        if version != SEGMENT_VERSION {
            return Err(VellumError::InvalidFormat(format!(
                "Unsupported segment version {} in {:?}",
                version, path
            )));
        }
        let doc_count = u32::from_le_bytes(header[8..12].try_into().unwrap_or_default());
        let size = file.metadata()?.len();

        Ok(Self {
            id,
            path,
            inner: RwLock::new(SegmentInner {
                file,
                size,
                doc_count,
                sealed: false,
            }),
        })
    }

    /// Segment id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Segment file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file size in bytes
    pub fn size(&self) -> u64 {
        self.inner.read().size
    }

    /// Number of records appended
    pub fn doc_count(&self) -> u32 {
        self.inner.read().doc_count
    }

    /// Whether the segment is sealed (read-only)
    pub fn sealed(&self) -> bool {
        self.inner.read().sealed
    }

    /// Append a record: frame it, write it at the end of the file, bump the
    /// header doc count, and fsync. The record is on stable storage when
    /// this returns.
    pub fn append(&self, record: &SegmentRecord) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.sealed {
            return Err(VellumError::Validation("segment is sealed".into()));
        }

        let frame = record.serialize_with_checksum()?;

        let offset = inner.file.seek(SeekFrom::End(0))?;
        inner.file.write_all(&frame)?;

        // Update the doc count in the header
        let doc_count = inner.doc_count + 1;
        inner.file.seek(SeekFrom::Start(8))?;
        inner.file.write_all(&doc_count.to_le_bytes())?;

        inner.file.sync_all()?;

        inner.doc_count = doc_count;
        inner.size = offset + frame.len() as u64;
        Ok(())
    }

    /// Read every record in order. A checksum mismatch or truncated frame
    /// terminates the scan; the partial tail is discarded, not reported.
    pub fn read_all(&self) -> Result<Vec<SegmentRecord>> {
        let inner = self.inner.read();
        let data = std::fs::read(&self.path)?;
        drop(inner);

        if data.len() < SEGMENT_HEADER_LEN as usize {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut offset = SEGMENT_HEADER_LEN as usize;
        while offset < data.len() {
            match SegmentRecord::deserialize_with_checksum(&data[offset..]) {
                Ok((record, consumed)) => {
                    records.push(record);
                    offset += consumed;
                }
                Err(e) => {
                    warn!(
                        "Bad record at offset {} in {:?}, truncating scan: {}",
                        offset, self.path, e
                    );
                    break;
                }
            }
        }
        Ok(records)
    }

    /// Mark the segment read-only and flush it to disk
    pub fn seal(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.sealed = true;
        inner.file.sync_all()?;
        Ok(())
    }

    /// Flush to disk; the handle itself is released on drop
    pub fn close(&self) -> Result<()> {
        let inner = self.inner.write();
        inner.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::RecordType;
    use crate::Document;
    use serde_json::json;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn doc(v: serde_json::Value) -> Document {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_append_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let seg = Segment::create(dir.path(), 0).unwrap();

        for i in 0..100 {
            let d = doc(json!({"_id": format!("doc{}", i), "name": format!("user{}", i), "age": 20 + i}));
            seg.append(&SegmentRecord::insert(format!("doc{}", i), d))
                .unwrap();
        }

        assert_eq!(seg.doc_count(), 100);

        let records = seg.read_all().unwrap();
        assert_eq!(records.len(), 100);
        assert_eq!(records[0].doc_id, "doc0");
        assert_eq!(
            records[0].doc.as_ref().unwrap().get("name").unwrap().as_str(),
            Some("user0")
        );
    }

    #[test]
    fn test_reopen_preserves_header() {
        let dir = TempDir::new().unwrap();
        let path;
        {
            let seg = Segment::create(dir.path(), 3).unwrap();
            seg.append(&SegmentRecord::insert("a", doc(json!({"v": 1}))))
                .unwrap();
            path = seg.path().to_path_buf();
        }

        let seg = Segment::open(path, 3).unwrap();
        assert_eq!(seg.doc_count(), 1);
        assert_eq!(seg.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_sealed_append_fails() {
        let dir = TempDir::new().unwrap();
        let seg = Segment::create(dir.path(), 0).unwrap();
        seg.seal().unwrap();

        let err = seg
            .append(&SegmentRecord::insert("a", doc(json!({"v": 1}))))
            .unwrap_err();
        assert!(matches!(err, VellumError::Validation(_)));
    }

    #[test]
    fn test_corrupt_record_truncates_scan() {
        let dir = TempDir::new().unwrap();
        let seg = Segment::create(dir.path(), 0).unwrap();
        for i in 0..10 {
            seg.append(&SegmentRecord::insert(
                format!("doc{}", i),
                doc(json!({"i": i})),
            ))
            .unwrap();
        }

        // Flip one byte in the middle of the file (record 5 area)
        let path = seg.path().to_path_buf();
        drop(seg);
        let mut data = std::fs::read(&path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        let seg = Segment::open(path, 0).unwrap();
        let records = seg.read_all().unwrap();
        assert!(records.len() < 10);
        // prefix before the corruption is intact
        for (i, rec) in records.iter().enumerate() {
            assert_eq!(rec.doc_id, format!("doc{}", i));
            assert_eq!(rec.record_type, RecordType::Insert);
        }
    }

    #[test]
    fn test_truncated_tail_ignored() {
        let dir = TempDir::new().unwrap();
        let seg = Segment::create(dir.path(), 0).unwrap();
        for i in 0..5 {
            seg.append(&SegmentRecord::insert(
                format!("doc{}", i),
                doc(json!({"i": i})),
            ))
            .unwrap();
        }
        let path = seg.path().to_path_buf();
        drop(seg);

        // Append a dangling half-frame
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[42u8, 0, 0, 0, 1, 2, 3]).unwrap();
        drop(f);

        let seg = Segment::open(path, 0).unwrap();
        assert_eq!(seg.read_all().unwrap().len(), 5);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000000.seg");
        std::fs::write(&path, vec![0u8; 32]).unwrap();
        assert!(matches!(
            Segment::open(path, 0),
            Err(VellumError::Corruption(_))
        ));
    }
}
