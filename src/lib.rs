//! A word-granular software transactional memory region.
//!
//! `memtx` exposes a fixed-alignment shared memory region that threads
//! mutate through transactions: grouped reads, writes, allocations and
//! frees that either commit atomically or leave no trace. Transactions are
//! admitted in batches; within a batch writers race for per-word ownership
//! with a single compare-and-swap, and the batch's effects are published all
//! at once when its last participant leaves (each written word flips a
//! read-version bit selecting which of its two payload copies is the
//! committed one).
//!
//! # Examples
//!
//! Creating a region and transferring between two words:
//!
//! ```
//! use memtx::Region;
//!
//! let region = Region::new(16, 8).unwrap();
//! let accounts = region.start();
//!
//! // deposit 100 into the first account
//! region.rw(|tx| tx.write(&100u64.to_ne_bytes(), accounts))?;
//!
//! // move 40 across
//! region.rw(|tx| {
//!     let mut buf = [0u8; 8];
//!     tx.read(accounts, &mut buf)?;
//!     let from = u64::from_ne_bytes(buf) - 40;
//!     tx.read(accounts + 8, &mut buf)?;
//!     let to = u64::from_ne_bytes(buf) + 40;
//!     tx.write(&from.to_ne_bytes(), accounts)?;
//!     tx.write(&to.to_ne_bytes(), accounts + 8)?;
//!     Ok(())
//! })?;
//!
//! let total = region.read(|tx| {
//!     let mut a = [0u8; 8];
//!     let mut b = [0u8; 8];
//!     tx.read(accounts, &mut a)?;
//!     tx.read(accounts + 8, &mut b)?;
//!     Ok(u64::from_ne_bytes(a) + u64::from_ne_bytes(b))
//! })?;
//! assert_eq!(total, 100);
//! # Ok::<(), memtx::Error>(())
//! ```
//!
//! # Guarantees
//!
//! * Reads of a read-only transaction are wait-free and observe exactly the
//!   state installed by the last epoch commit before it began.
//! * At most one transaction owns a word per batch; the loser of the
//!   ownership race is torn down immediately and cleanly.
//! * Commits of one batch become visible to the next batch atomically:
//!   there is no torn publication.
//! * An aborting writer closes the current batch, so it cannot be starved
//!   forever by luckier writers.
//!
//! The library never retries internally and never blocks except when a
//! read-write transaction begins while the current batch drains.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(unused_lifetimes)]
#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]

mod internal;
mod region;
pub mod stats;
pub mod tx;

pub use region::Region;
pub use tx::{Error, Transaction};
