//! Statistics collection. Enabled with `--features stats`.
//!
//! The recorders below always compile; without the feature they are no-ops
//! the optimizer removes, so call sites never need to be gated.

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

macro_rules! stats {
    ($($(#[$attr:meta])* $name:ident),* $(,)*) => {
        struct Counters {
            $($name: AtomicU64),*
        }

        static COUNTERS: Counters = Counters {
            $($name: AtomicU64::new(0)),*
        };

        /// A snapshot of the counters accumulated since process start.
        #[derive(Copy, Clone, Default, Debug)]
        pub struct Stats {
            $($(#[$attr])* pub $name: u64),*
        }

        /// Reads every counter. All zeros unless the `stats` feature is on.
        pub fn snapshot() -> Stats {
            Stats {
                $($name: COUNTERS.$name.load(Relaxed)),*
            }
        }

        $(
            #[inline]
            pub(crate) fn $name() {
                if cfg!(feature = "stats") {
                    let _ = COUNTERS.$name.fetch_add(1, Relaxed);
                }
            }
        )*
    };
}

stats! {
    /// Transactions started.
    begins,
    /// Read-write transactions committed.
    commits,
    /// Read-only transactions committed.
    read_commits,
    /// Transactions torn down by an ownership conflict.
    conflicts,
    /// Batches closed by an epoch commit.
    batches,
    /// Segments allocated transactionally.
    allocs,
    /// Allocations that failed for lack of backing memory.
    alloc_failures,
    /// Segments enqueued for freeing.
    frees,
}
