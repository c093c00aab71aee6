//! Per-transaction context and the word protocol.
//!
//! A `TxCtx` records everything a transaction may have to undo or publish:
//! the words it owns for writing, the segments it allocated (private until
//! commit), and the bases it wants freed at the epoch boundary. The word
//! protocol itself is three small operations: a read that never blocks, a
//! write that claims ownership with a single CAS, and the abort cleanup that
//! hands every owned word back.

use crate::internal::{
    commit::CommitSet,
    segment::Segment,
    word::{WordRef, UNOWNED},
};
use std::{mem, sync::Arc};

pub struct TxCtx {
    id: u64,
    read_only: bool,
    owned: Vec<WordRef>,
    first_allocs: Vec<Arc<Segment>>,
    frees: Vec<usize>,
}

impl TxCtx {
    pub fn new(id: u64, read_only: bool) -> Self {
        debug_assert_ne!(id, UNOWNED, "transaction ids start at 1");
        TxCtx {
            id,
            read_only,
            owned: Vec::new(),
            first_allocs: Vec::new(),
            frees: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Reads one word into `dst`. Returns `false` when the word is owned by
    /// another transaction, which dooms the caller.
    ///
    /// Read-only transactions copy the committed copy unconditionally: the
    /// committed copy never mutates during a batch, so these reads are
    /// wait-free and always consistent with the last epoch.
    #[inline]
    pub fn read_word(&self, w: &WordRef, dst: &mut [u8]) -> bool {
        if self.read_only {
            unsafe { w.load_committed(dst) };
            return true;
        }
        let owner = w.control().owner();
        if owner == self.id {
            // our own pending write
            unsafe { w.load_scratch(dst) };
            true
        } else if owner == UNOWNED {
            unsafe { w.load_committed(dst) };
            true
        } else {
            false
        }
    }

    /// Writes `src` into one word's scratch copy, claiming the word if this
    /// transaction does not own it yet. Returns `false` when another
    /// transaction owns the word; the losing CAS is never retried.
    #[inline]
    pub fn write_word(&mut self, w: &WordRef, src: &[u8]) -> bool {
        debug_assert!(!self.read_only, "write protocol used by a read-only transaction");
        match w.control().try_claim(self.id) {
            Ok(()) => {
                unsafe { w.store_scratch(src) };
                self.owned.push(w.clone());
                true
            }
            Err(observed) if observed == self.id => {
                // idempotent re-write of a word we already own
                unsafe { w.store_scratch(src) };
                true
            }
            Err(_) => false,
        }
    }

    /// Resolves an address against this transaction's private allocations.
    #[inline]
    pub fn resolve_private(&self, addr: usize) -> Option<WordRef> {
        for seg in &self.first_allocs {
            if seg.contains(addr) {
                return Some(WordRef {
                    seg: Arc::clone(seg),
                    word: (addr - seg.base()) / seg.align(),
                });
            }
        }
        None
    }

    #[inline]
    pub fn record_alloc(&mut self, seg: Arc<Segment>) {
        self.first_allocs.push(seg);
    }

    #[inline]
    pub fn record_free(&mut self, base: usize) {
        self.frees.push(base);
    }

    /// Whether `base` is one of this transaction's own allocations.
    #[inline]
    pub fn owns_alloc(&self, base: usize) -> bool {
        self.first_allocs.iter().any(|seg| seg.base() == base)
    }

    /// Abort cleanup: give every owned word back and discard private
    /// segments. Dropping the last handle to an unpublished segment releases
    /// its storage.
    pub fn rollback(&mut self) {
        for w in self.owned.drain(..) {
            w.control().release();
        }
        self.first_allocs.clear();
        self.frees.clear();
    }

    /// Hands the transaction's effects to the batcher for the epoch commit.
    /// Read-only transactions always produce an empty set.
    pub fn take_effects(&mut self) -> CommitSet {
        debug_assert!(
            !self.read_only
                || (self.owned.is_empty() && self.first_allocs.is_empty() && self.frees.is_empty()),
            "read-only transaction accumulated effects"
        );
        CommitSet {
            written: mem::replace(&mut self.owned, Vec::new()),
            publishes: mem::replace(&mut self.first_allocs, Vec::new()),
            frees: mem::replace(&mut self.frees, Vec::new()),
        }
    }
}
