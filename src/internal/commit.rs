//! The epoch commit: the indivisible end-of-batch step.
//!
//! Runs on the single thread that brought the batch's participant count to
//! zero, with the batcher mutex held, so nothing can enter the region while
//! words are half flipped.

use crate::internal::{segment::Segment, table::SegmentTable, word::WordRef};
use std::{mem, sync::Arc};

/// Aggregated effects of every committed transaction of one batch.
pub struct CommitSet {
    pub written: Vec<WordRef>,
    pub publishes: Vec<Arc<Segment>>,
    pub frees: Vec<usize>,
}

impl CommitSet {
    pub fn new() -> Self {
        CommitSet {
            written: Vec::new(),
            publishes: Vec::new(),
            frees: Vec::new(),
        }
    }

    pub fn merge(&mut self, mut other: CommitSet) {
        self.written.append(&mut other.written);
        self.publishes.append(&mut other.publishes);
        self.frees.append(&mut other.frees);
    }

    pub fn take(&mut self) -> CommitSet {
        mem::replace(self, CommitSet::new())
    }
}

/// Applies one batch's effects:
///
/// 1. committed frees leave the segment table (a free that targets a
///    same-batch allocation cancels the pending publication instead, so such
///    a segment is never observable),
/// 2. committed allocations are published,
/// 3. every written word flips its read-version bit and releases its access
///    token, which atomically exposes the batch's writes to the next batch.
pub fn epoch_commit(set: CommitSet, table: &SegmentTable) {
    let CommitSet {
        written,
        mut publishes,
        frees,
    } = set;

    for base in frees {
        match publishes.iter().position(|seg| seg.base() == base) {
            Some(i) => {
                // allocated and freed in the same batch: never published
                let _ = publishes.swap_remove(i);
            }
            None => table.unpublish(base),
        }
    }

    for seg in &publishes {
        table.publish(seg);
    }

    for w in &written {
        let ctrl = w.control();
        ctrl.flip_read_version();
        ctrl.release();
    }
}
