//! The segment table: user address space of a region.
//!
//! Two maps under one readers-writer lock: every live word address resolves
//! to its slot, and every live segment base records its byte length. The
//! access path (read/write/free validation) takes the lock shared; structural
//! mutation happens only when a region is constructed and at epoch commit,
//! when a single thread publishes committed allocations and unpublishes
//! committed frees.

use crate::internal::{
    rwlock::TableLock,
    segment::Segment,
    word::WordRef,
};
use fxhash::FxHashMap;
use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

#[derive(Default)]
struct Maps {
    words: FxHashMap<usize, WordRef>,
    sizes: FxHashMap<usize, usize>,
}

pub struct SegmentTable {
    maps: TableLock<Maps>,
}

impl SegmentTable {
    pub fn new() -> Self {
        SegmentTable {
            maps: TableLock::new(Maps::default()),
        }
    }

    /// Resolves a word address to its slot, if the address is live.
    #[inline]
    pub fn resolve(&self, addr: usize) -> Option<WordRef> {
        self.maps.read().words.get(&addr).cloned()
    }

    /// Byte length of the segment with the given base, if that base is live.
    #[inline]
    pub fn segment_len(&self, base: usize) -> Option<usize> {
        self.maps.read().sizes.get(&base).copied()
    }

    /// Makes every word of `seg` resolvable. Called for the initial segment
    /// at region construction and for committed allocations at epoch commit.
    pub fn publish(&self, seg: &Arc<Segment>) {
        let mut maps = self.maps.write();
        let align = seg.align();
        let prev = maps.sizes.insert(seg.base(), seg.len());
        debug_assert!(prev.is_none(), "republishing a live segment base");
        for word in 0..seg.words() {
            let addr = seg.base() + word * align;
            let prev = maps.words.insert(
                addr,
                WordRef {
                    seg: Arc::clone(seg),
                    word,
                },
            );
            debug_assert!(prev.is_none(), "publishing an address that is already live");
        }
    }

    /// Removes a segment from the address space. A base that is no longer
    /// present is ignored: two transactions of one batch may both have freed
    /// the same segment, and the second removal has nothing left to do.
    pub fn unpublish(&self, base: usize) {
        let mut maps = self.maps.write();
        let seg = match maps.words.get(&base) {
            Some(w) => Arc::clone(&w.seg),
            None => return,
        };
        debug_assert_eq!(seg.base(), base, "unpublishing a non-base address");
        let len = maps.sizes.remove(&base);
        debug_assert!(len.is_some(), "live words without a recorded segment length");
        for word in 0..seg.words() {
            let removed = maps.words.remove(&(base + word * seg.align()));
            debug_assert!(removed.is_some(), "partially published segment");
        }
    }

    /// Number of live words.
    #[cfg(test)]
    pub fn word_count(&self) -> usize {
        self.maps.read().words.len()
    }
}

impl Debug for SegmentTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let maps = self.maps.read();
        f.debug_struct("SegmentTable")
            .field("segments", &maps.sizes.len())
            .field("words", &maps.words.len())
            .finish()
    }
}
