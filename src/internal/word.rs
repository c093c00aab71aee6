//! Per-word control state and slot references.
//!
//! Every addressable word of a region owns two payload copies living in its
//! segment's buffer plus a [`WordControl`]: the atomic `access` token that
//! makes one transaction the word's exclusive writer for the duration of a
//! batch, and the read-version bit selecting which payload copy is the
//! committed one. Flipping that bit is the whole per-word commit.

use crate::internal::segment::Segment;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{
            AtomicBool, AtomicU64,
            Ordering::{Acquire, Relaxed, Release},
        },
        Arc,
    },
};

/// The `access` value meaning "no transaction owns this word".
///
/// Transaction ids are minted starting at 1, so the sentinel can never
/// collide with a real owner.
pub const UNOWNED: u64 = 0;

/// Control state of a single word slot.
pub struct WordControl {
    access: AtomicU64,
    read_version: AtomicBool,
}

impl WordControl {
    pub fn new() -> Self {
        WordControl {
            access: AtomicU64::new(UNOWNED),
            read_version: AtomicBool::new(false),
        }
    }

    /// Current owner of the word, or [`UNOWNED`].
    #[inline]
    pub fn owner(&self) -> u64 {
        self.access.load(Acquire)
    }

    /// Attempts to make `id` the exclusive writer of this word for the
    /// current batch. On failure returns the owner that was observed; the
    /// caller never retries a losing CAS (contention is resolved by aborting
    /// and re-running in a later batch).
    #[inline]
    pub fn try_claim(&self, id: u64) -> Result<(), u64> {
        debug_assert_ne!(id, UNOWNED, "claiming a word with the unowned sentinel");
        match self.access.compare_exchange(UNOWNED, id, Acquire, Acquire) {
            Ok(_) => Ok(()),
            Err(observed) => Err(observed),
        }
    }

    /// Gives the word back. Called on abort by the owner, and at epoch commit
    /// for every written word.
    #[inline]
    pub fn release(&self) {
        debug_assert_ne!(
            self.access.load(Relaxed),
            UNOWNED,
            "releasing a word nobody owns"
        );
        self.access.store(UNOWNED, Release);
    }

    /// Which payload copy is the committed one.
    #[inline]
    pub fn read_version(&self) -> bool {
        self.read_version.load(Acquire)
    }

    /// Publishes the write copy as the new read copy.
    ///
    /// Only the single epoch-committing thread calls this, with the batcher
    /// mutex held, so the load/store pair cannot race another flip.
    #[inline]
    pub fn flip_read_version(&self) {
        let current = self.read_version.load(Relaxed);
        self.read_version.store(!current, Release);
    }
}

impl Debug for WordControl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordControl")
            .field("access", &self.access.load(Relaxed))
            .field("read_version", &self.read_version.load(Relaxed))
            .finish()
    }
}

/// A handle to one word slot: the owning segment plus the word's index.
///
/// Transactions and the batcher's commit set carry these instead of borrows;
/// the `Arc` keeps the segment's storage alive until the last list referring
/// to it is drained, and exclusivity of the word *contents* is expressed by
/// the access token, not by memory ownership.
#[derive(Clone)]
pub struct WordRef {
    pub seg: Arc<Segment>,
    pub word: usize,
}

impl WordRef {
    #[inline]
    pub fn control(&self) -> &WordControl {
        self.seg.control(self.word)
    }

    /// Copies the committed (read) copy into `dst`.
    ///
    /// Safety: the read copy never mutates during a batch and the
    /// read-version bit only flips at the epoch boundary, so this is safe to
    /// call from any live transaction of the current batch.
    #[inline]
    pub unsafe fn load_committed(&self, dst: &mut [u8]) {
        let version = self.control().read_version();
        self.seg.copy_out(self.word, version, dst);
    }

    /// Copies the scratch (write) copy into `dst`.
    ///
    /// Safety: caller must be the transaction currently holding the word's
    /// access token; nobody else reads or writes the scratch copy.
    #[inline]
    pub unsafe fn load_scratch(&self, dst: &mut [u8]) {
        let version = self.control().read_version();
        self.seg.copy_out(self.word, !version, dst);
    }

    /// Overwrites the scratch (write) copy with `src`.
    ///
    /// Safety: same requirement as [`load_scratch`]: the caller holds the
    /// word's access token.
    ///
    /// [`load_scratch`]: WordRef::load_scratch
    #[inline]
    pub unsafe fn store_scratch(&self, src: &[u8]) {
        let version = self.control().read_version();
        self.seg.copy_in(self.word, !version, src);
    }
}

impl Debug for WordRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordRef")
            .field("base", &self.seg.base())
            .field("word", &self.word)
            .finish()
    }
}
