//! Segment manager: the per-collection ordered set of segment files
//!
//! Owns the single active (appendable) segment and the sealed ones before
//! it. Reads materialize the live document set by folding records in
//! segment order with last-writer-wins semantics; tombstones remove ids.

use super::{segment_file_name, RecordType, Segment, SegmentRecord};
use crate::{config, Document, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manages the ordered segment files of one collection
pub struct SegmentManager {
    dir: PathBuf,
    segment_size: u64,
    inner: Mutex<ManagerInner>,
}

struct ManagerInner {
    /// Segments in replay order; the last one is the active segment
    segments: Vec<Segment>,
    next_id: u64,
}

impl SegmentManager {
    /// Open the `segments/` directory under a collection, loading existing
    /// segment files in numeric order. Only the highest-numbered segment may
    /// stay appendable; everything before it is sealed.
    pub fn open(collection_dir: &Path) -> Result<Self> {
        Self::open_with_segment_size(collection_dir, config::SEGMENT_SIZE_LIMIT)
    }

    /// Open with an explicit segment size cap
    pub fn open_with_segment_size(collection_dir: &Path, segment_size: u64) -> Result<Self> {
        let dir = collection_dir.join("segments");
        fs::create_dir_all(&dir)?;

        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(id) = name
                    .strip_suffix(".seg")
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();

        let mut segments = Vec::with_capacity(ids.len());
        let mut next_id = 0;
        for id in ids {
            next_id = id + 1;
            let path = dir.join(segment_file_name(id));
            match Segment::open(path.clone(), id) {
                Ok(seg) => segments.push(seg),
                Err(e) => {
                    warn!("Skipping unreadable segment {:?}: {}", path, e);
                }
            }
        }

        // Seal everything except the last segment
        let last = segments.len().saturating_sub(1);
        for seg in segments.iter().take(last) {
            seg.seal()?;
        }

        // The last segment stays active only while below the size cap
        let needs_fresh = match segments.last() {
            Some(seg) if seg.size() < segment_size => false,
            Some(seg) => {
                seg.seal()?;
                true
            }
            None => true,
        };
        if needs_fresh {
            segments.push(Segment::create(&dir, next_id)?);
            next_id += 1;
        }

        debug!("Opened {} segment(s) in {:?}", segments.len(), dir);

        Ok(Self {
            dir,
            segment_size,
            inner: Mutex::new(ManagerInner { segments, next_id }),
        })
    }

    /// Append an insert record for a document
    pub fn append_insert(&self, doc_id: &str, doc: &Document) -> Result<()> {
        self.append(SegmentRecord::insert(doc_id, doc.clone()))
    }

    /// Append an update record (newer version wins during reads)
    pub fn append_update(&self, doc_id: &str, doc: &Document) -> Result<()> {
        self.append(SegmentRecord::update(doc_id, doc.clone()))
    }

    /// Append a tombstone for a document
    pub fn delete(&self, doc_id: &str) -> Result<()> {
        self.append(SegmentRecord::tombstone(doc_id))
    }

    fn append(&self, record: SegmentRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        let active = self.roll_if_full(&mut inner)?;
        inner.segments[active].append(&record)
    }

    /// Seal a full active segment and open its successor. Returns the
    /// index of the active segment (always the last one).
    fn roll_if_full(&self, inner: &mut ManagerInner) -> Result<usize> {
        let full = inner
            .segments
            .last()
            .map(|seg| seg.size() >= self.segment_size)
            .unwrap_or(true);
        if full {
            if let Some(active) = inner.segments.last() {
                active.seal()?;
            }
            let seg = Segment::create(&self.dir, inner.next_id)?;
            inner.segments.push(seg);
            inner.next_id += 1;
        }
        Ok(inner.segments.len() - 1)
    }

    /// Materialize the live document set: fold every record across segments
    /// in order, last writer wins, tombstoned ids removed. Iteration order
    /// of the result is unspecified.
    pub fn read_all(&self) -> Result<Vec<Document>> {
        let inner = self.inner.lock();
        let map = Self::fold(&inner.segments)?;
        Ok(map.into_values().collect())
    }

    fn fold(segments: &[Segment]) -> Result<HashMap<String, Document>> {
        let mut map = HashMap::new();
        for seg in segments {
            for record in seg.read_all()? {
                match record.record_type {
                    RecordType::Insert | RecordType::Update => {
                        if let Some(doc) = record.doc {
                            map.insert(record.doc_id, doc);
                        }
                    }
                    RecordType::Delete | RecordType::Tombstone => {
                        map.remove(&record.doc_id);
                    }
                }
            }
        }
        Ok(map)
    }

    /// Number of segment files
    pub fn segment_count(&self) -> usize {
        self.inner.lock().segments.len()
    }

    /// Rewrite all segments into a single sealed segment holding only live
    /// documents, followed by a fresh active segment. Old files are
    /// unlinked. No-op when there is at most one segment.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.segments.len() <= 1 {
            return Ok(());
        }

        // Seal the active segment so the fold covers everything, then merge
        if let Some(active) = inner.segments.last() {
            active.seal()?;
        }
        let live = Self::fold(&inner.segments)?;

        let compacted = Segment::create(&self.dir, inner.next_id)?;
        inner.next_id += 1;
        for (doc_id, doc) in &live {
            if let Err(e) = compacted.append(&SegmentRecord::insert(doc_id, doc.clone())) {
                compacted.close()?;
                let _ = fs::remove_file(compacted.path());
                return Err(e);
            }
        }
        compacted.seal()?;

        let active = Segment::create(&self.dir, inner.next_id)?;
        inner.next_id += 1;

        // Unlink the merged inputs
        for seg in &inner.segments {
            seg.close()?;
            if let Err(e) = fs::remove_file(seg.path()) {
                warn!("Failed to remove old segment {:?}: {}", seg.path(), e);
            }
        }

        info!(
            "Compacted {} segment(s) into {:?} ({} live docs)",
            inner.segments.len(),
            compacted.path(),
            live.len()
        );

        inner.segments = vec![compacted, active];
        Ok(())
    }

    /// Flush and release all segment files
    pub fn close(&self) -> Result<()> {
        let inner = self.inner.lock();
        for seg in &inner.segments {
            seg.close()?;
        }
        Ok(())
    }

    /// Segment statistics for this collection
    pub fn stats(&self) -> SegmentStats {
        let inner = self.inner.lock();
        let segments: Vec<SegmentInfo> = inner
            .segments
            .iter()
            .map(|seg| SegmentInfo {
                id: seg.id(),
                size: seg.size(),
                doc_count: seg.doc_count(),
                sealed: seg.sealed(),
            })
            .collect();

        SegmentStats {
            segment_count: segments.len(),
            total_size: segments.iter().map(|s| s.size).sum(),
            total_docs: segments.iter().map(|s| s.doc_count as usize).sum(),
            segments,
        }
    }
}

/// Statistics for one segment file
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub id: u64,
    pub size: u64,
    pub doc_count: u32,
    pub sealed: bool,
}

/// Statistics for a collection's segment set
#[derive(Debug, Clone)]
pub struct SegmentStats {
    pub segment_count: usize,
    pub total_size: u64,
    pub total_docs: usize,
    pub segments: Vec<SegmentInfo>,
}
