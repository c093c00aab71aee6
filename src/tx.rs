//! Transactions and their error type.
//!
//! A [`Transaction`] is a handle into one batch of its region. Reads and
//! writes move whole aligned words between the shared region and private
//! buffers; allocations stay private until commit and frees are deferred to
//! the epoch boundary. Any ownership conflict tears the transaction down on
//! the spot: the failed operation returns [`Error::Conflict`] *after* every
//! owned word has been handed back and the batch has been left.

use crate::{
    internal::{
        batcher::Outcome,
        segment::Segment,
        txn::TxCtx,
        word::WordRef,
    },
    region::Region,
    stats,
};
use std::{
    error,
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

/// Why a transactional operation failed.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Error {
    /// The operation lost a word to another transaction of the same batch
    /// (or touched an address that is not resolvable). The transaction has
    /// been torn down; every further operation on it returns `Conflict`
    /// again, and [`Transaction::commit`] returns `false`.
    Conflict,
    /// The backing allocation for [`Transaction::alloc`] failed. The
    /// transaction is still live and may continue.
    OutOfMemory,
    /// The allocation could not be given an address (the region's address
    /// space is exhausted). The transaction has been torn down.
    AllocRejected,
}

impl Debug for Error {
    #[cold]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Error::Conflict => "Conflict",
            Error::OutOfMemory => "OutOfMemory",
            Error::AllocRejected => "AllocRejected",
        };
        f.pad(name)
    }
}

impl Display for Error {
    #[cold]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Conflict => "transaction aborted by a word ownership conflict",
            Error::OutOfMemory => "transactional allocation failed for lack of memory",
            Error::AllocRejected => "transactional allocation could not be addressed",
        };
        f.pad(msg)
    }
}

impl error::Error for Error {}

/// A transaction on a [`Region`].
///
/// Created by [`Region::begin`] (or the [`Region::rw`]/[`Region::read`]
/// runners). Dropping a live transaction aborts it; the cleanup is identical
/// to the conflict path.
///
/// # Examples
///
/// ```
/// use memtx::Region;
///
/// let region = Region::new(16, 8).unwrap();
/// let start = region.start();
///
/// let mut tx = region.begin(false);
/// tx.write(&1u64.to_ne_bytes(), start).unwrap();
/// assert!(tx.commit());
///
/// let mut buf = [0u8; 8];
/// let mut tx = region.begin(true);
/// tx.read(start, &mut buf).unwrap();
/// assert!(tx.commit());
/// assert_eq!(u64::from_ne_bytes(buf), 1);
/// ```
pub struct Transaction<'r> {
    region: &'r Region,
    cx: TxCtx,
    live: bool,
}

impl<'r> Transaction<'r> {
    pub(crate) fn new(region: &'r Region, cx: TxCtx) -> Self {
        Transaction {
            region,
            cx,
            live: true,
        }
    }

    /// Whether this transaction was begun read-only.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.cx.read_only()
    }

    /// Copies `dst.len()` bytes out of the shared region, starting at word
    /// address `src`, into the private buffer `dst`.
    ///
    /// `dst.len()` must be a positive multiple of the region alignment and
    /// `src` must be aligned; violating either is a caller bug and panics.
    ///
    /// Read-only transactions always see the state installed by the last
    /// epoch commit before they began. A read-write transaction reads its
    /// own pending writes, and aborts when it touches a word owned by
    /// another transaction.
    pub fn read(&mut self, src: usize, dst: &mut [u8]) -> Result<(), Error> {
        self.check_live()?;
        let align = self.region.align();
        assert!(
            !dst.is_empty() && dst.len() % align == 0,
            "read length must be a positive multiple of the region alignment"
        );
        assert_eq!(src % align, 0, "read address must be word aligned");
        for (i, chunk) in dst.chunks_exact_mut(align).enumerate() {
            let addr = src + i * align;
            let w = match self.resolve(addr) {
                Some(w) => w,
                None => return Err(self.abort(Error::Conflict)),
            };
            if !self.cx.read_word(&w, chunk) {
                return Err(self.abort(Error::Conflict));
            }
        }
        Ok(())
    }

    /// Copies the private buffer `src` into the shared region at word
    /// address `dst`, claiming each word for this transaction.
    ///
    /// The first write to a word wins it for the whole batch; a transaction
    /// that loses the claim aborts immediately. The CAS is never retried;
    /// contention resolves through the next batch.
    pub fn write(&mut self, src: &[u8], dst: usize) -> Result<(), Error> {
        self.check_live()?;
        assert!(
            !self.cx.read_only(),
            "write issued by a read-only transaction"
        );
        let align = self.region.align();
        assert!(
            !src.is_empty() && src.len() % align == 0,
            "write length must be a positive multiple of the region alignment"
        );
        assert_eq!(dst % align, 0, "write address must be word aligned");
        for (i, chunk) in src.chunks_exact(align).enumerate() {
            let addr = dst + i * align;
            let w = match self.resolve(addr) {
                Some(w) => w,
                None => return Err(self.abort(Error::Conflict)),
            };
            if !self.cx.write_word(&w, chunk) {
                return Err(self.abort(Error::Conflict));
            }
        }
        Ok(())
    }

    /// Allocates a fresh zero-filled segment of `size` bytes and returns its
    /// base address. The segment stays private to this transaction until
    /// commit publishes it; on abort it is released with the transaction.
    ///
    /// `size` must be a positive multiple of the region alignment.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when the backing allocation fails; the
    /// transaction survives and may continue. [`Error::AllocRejected`] when
    /// the region has run out of address space; the transaction is torn
    /// down.
    pub fn alloc(&mut self, size: usize) -> Result<usize, Error> {
        self.check_live()?;
        assert!(
            !self.cx.read_only(),
            "alloc issued by a read-only transaction"
        );
        let align = self.region.align();
        assert!(
            size > 0 && size % align == 0,
            "allocation size must be a positive multiple of the region alignment"
        );
        if Segment::layout(size, align).is_none() {
            stats::alloc_failures();
            return Err(Error::OutOfMemory);
        }
        let base = match self.region.reserve_base(size) {
            Some(base) => base,
            None => return Err(self.abort(Error::AllocRejected)),
        };
        let seg = match Segment::new(base, size, align) {
            Some(seg) => seg,
            None => {
                stats::alloc_failures();
                return Err(Error::OutOfMemory);
            }
        };
        self.cx.record_alloc(Arc::new(seg));
        stats::allocs();
        Ok(base)
    }

    /// Marks the segment based at `base` for deallocation. Nothing is
    /// released before the epoch commit of this transaction's batch; until
    /// then the segment stays readable.
    ///
    /// `base` must be an address returned by a prior [`alloc`]; freeing the
    /// initial segment is a caller bug and panics. A base that is no longer
    /// resolvable (for instance already freed by a committed transaction)
    /// aborts the transaction.
    ///
    /// [`alloc`]: Transaction::alloc
    pub fn free(&mut self, base: usize) -> Result<(), Error> {
        self.check_live()?;
        assert!(
            !self.cx.read_only(),
            "free issued by a read-only transaction"
        );
        assert_ne!(
            base,
            self.region.start(),
            "the initial segment cannot be freed"
        );
        let resolvable =
            self.cx.owns_alloc(base) || self.region.table().segment_len(base).is_some();
        if !resolvable {
            return Err(self.abort(Error::Conflict));
        }
        self.cx.record_free(base);
        stats::frees();
        Ok(())
    }

    /// Ends the transaction. Returns `true` iff it committed; the effects
    /// become visible to other transactions at the epoch commit of this
    /// batch, all at once.
    ///
    /// A transaction that was already torn down by a conflict returns
    /// `false`.
    pub fn commit(mut self) -> bool {
        if !self.live {
            return false;
        }
        self.live = false;
        let effects = self.cx.take_effects();
        self.region
            .batcher()
            .leave(Outcome::Committed(effects), self.region.table());
        if self.cx.read_only() {
            stats::read_commits();
        } else {
            stats::commits();
        }
        true
    }

    /// Resolution order matters: a transaction sees its own unpublished
    /// allocations before consulting the shared table.
    fn resolve(&self, addr: usize) -> Option<WordRef> {
        if let Some(w) = self.cx.resolve_private(addr) {
            return Some(w);
        }
        self.region.table().resolve(addr)
    }

    fn check_live(&self) -> Result<(), Error> {
        if self.live {
            Ok(())
        } else {
            Err(Error::Conflict)
        }
    }

    #[cold]
    fn abort(&mut self, err: Error) -> Error {
        debug_assert!(self.live, "aborting a dead transaction");
        self.live = false;
        self.cx.rollback();
        self.region
            .batcher()
            .leave(Outcome::Aborted, self.region.table());
        stats::conflicts();
        err
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.live {
            let _ = self.abort(Error::Conflict);
        }
    }
}

impl Debug for Transaction<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.cx.id())
            .field("read_only", &self.cx.read_only())
            .field("live", &self.live)
            .finish()
    }
}
