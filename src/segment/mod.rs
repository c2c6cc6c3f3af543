//! Append-only segment storage
//!
//! Documents live in per-collection segment files: framed, CRC-checked
//! records appended to the single active segment. Sealed segments are
//! immutable and are only removed by compaction.

mod file;
mod manager;
mod record;

pub use file::Segment;
pub use manager::{SegmentInfo, SegmentManager, SegmentStats};
pub use record::{RecordType, SegmentRecord};

/// Segment file magic number
pub const SEGMENT_MAGIC: u32 = 0x5653_4547; // "VSEG"

/// Segment file format version
pub const SEGMENT_VERSION: u32 = 1;

/// Segment header length: magic(4) + version(4) + doc_count(4) + reserved(4)
pub const SEGMENT_HEADER_LEN: u64 = 16;

/// File name for a segment id (`000042.seg`)
pub fn segment_file_name(id: u64) -> String {
    format!("{:06}.seg", id)
}
