//! Shared memory regions.

use crate::{
    internal::{batcher::Batcher, segment::Segment, table::SegmentTable, txn::TxCtx},
    stats,
    tx::{Error, Transaction},
};
use crossbeam_utils::CachePadded;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering::Relaxed},
        Arc,
    },
};

/// A fixed-alignment shared memory region mutated through transactions.
///
/// A region owns its segments, their word slots, and the batcher that
/// serializes transactions into epochs. It is `Sync`: threads share it by
/// reference and each calls [`begin`] (or the [`rw`]/[`read`] runners) to
/// get a private [`Transaction`] handle. Addresses handed out by
/// [`start`] and [`Transaction::alloc`] are opaque word addresses in the
/// region's private address space; only ever dereference them through
/// transactional reads and writes.
///
/// # Examples
///
/// ```
/// use memtx::Region;
///
/// let region = Region::new(32, 8).unwrap();
/// let counter = region.start();
///
/// let added = region.rw(|tx| {
///     let mut buf = [0u8; 8];
///     tx.read(counter, &mut buf)?;
///     let value = u64::from_ne_bytes(buf) + 1;
///     tx.write(&value.to_ne_bytes(), counter)?;
///     Ok(value)
/// });
/// assert_eq!(added.unwrap(), 1);
/// ```
///
/// [`begin`]: Region::begin
/// [`rw`]: Region::rw
/// [`read`]: Region::read
/// [`start`]: Region::start
pub struct Region {
    size: usize,
    align: usize,
    start: usize,
    table: SegmentTable,
    batcher: Batcher,
    tran_counter: CachePadded<AtomicU64>,
    next_base: CachePadded<AtomicUsize>,
}

impl Region {
    /// Creates a region with one non-freeable initial segment of `size`
    /// bytes, every word zeroed.
    ///
    /// `align` must be a power of two and `size` a positive multiple of it;
    /// violations panic. Returns [`Error::OutOfMemory`] when the initial
    /// segment cannot be allocated.
    pub fn new(size: usize, align: usize) -> Result<Region, Error> {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        assert!(
            size > 0 && size % align == 0,
            "region size must be a positive multiple of the alignment"
        );
        // Base 0 is never handed out: the unowned access token and null-ish
        // user sentinels must stay distinguishable from real addresses.
        let start = align;
        let seg = Segment::new(start, size, align).ok_or(Error::OutOfMemory)?;
        let table = SegmentTable::new();
        // Construction-time publication: no transaction can exist yet, so
        // this is the one publish that happens outside an epoch commit.
        table.publish(&Arc::new(seg));
        Ok(Region {
            size,
            align,
            start,
            table,
            batcher: Batcher::new(),
            tran_counter: CachePadded::new(AtomicU64::new(0)),
            next_base: CachePadded::new(AtomicUsize::new(start + size)),
        })
    }

    /// Word address of the initial segment's first word.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Byte size of the initial segment.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment of every access on this region.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Begins a transaction, joining the current batch. Read-write
    /// transactions block while the batch is draining after an abort;
    /// read-only transactions are always admitted.
    pub fn begin(&self, read_only: bool) -> Transaction<'_> {
        // ids start at 1; 0 is the unowned access-token sentinel
        let id = self.tran_counter.fetch_add(1, Relaxed) + 1;
        self.batcher.enter(read_only);
        stats::begins();
        Transaction::new(self, TxCtx::new(id, read_only))
    }

    /// Runs `f` inside read-write transactions until one commits.
    ///
    /// A conflict tears the transaction down and `f` is re-run in a fresh
    /// one. The protocol itself never retries, so the caller-side loop
    /// lives here. [`Error::OutOfMemory`] and [`Error::AllocRejected`]
    /// propagate to the caller instead of retrying.
    pub fn rw<O>(
        &self,
        mut f: impl FnMut(&mut Transaction<'_>) -> Result<O, Error>,
    ) -> Result<O, Error> {
        loop {
            let mut tx = self.begin(false);
            match f(&mut tx) {
                Ok(out) => {
                    if tx.commit() {
                        return Ok(out);
                    }
                }
                Err(Error::Conflict) => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs `f` inside one read-only transaction. Read-only transactions
    /// observe the snapshot installed by the last epoch commit before they
    /// began and never lose ownership races, so there is nothing to retry:
    /// the only failure is touching an unresolvable address, which is
    /// deterministic and propagates.
    pub fn read<O>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<O, Error>,
    ) -> Result<O, Error> {
        let mut tx = self.begin(true);
        let out = f(&mut tx)?;
        let _committed = tx.commit();
        debug_assert!(_committed, "a surviving read-only transaction always commits");
        Ok(out)
    }

    #[inline]
    pub(crate) fn table(&self) -> &SegmentTable {
        &self.table
    }

    #[inline]
    pub(crate) fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    /// Reserves `len` bytes of fresh address space for a new segment.
    /// Freed bases are never reused.
    pub(crate) fn reserve_base(&self, len: usize) -> Option<usize> {
        self.next_base
            .fetch_update(Relaxed, Relaxed, |base| base.checked_add(len))
            .ok()
    }
}

impl Debug for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("start", &self.start)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("batcher", &self.batcher)
            .finish()
    }
}
