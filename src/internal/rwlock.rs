//! A cheap spinning readers-writer lock for the segment table.
//!
//! Address resolution takes this lock in shared mode on every transactional
//! access; exclusive mode is only taken at epoch commit (publish/unpublish),
//! which runs on a single thread per batch. Readers pay one atomic RMW, and
//! writers are first come first served.

use crossbeam_utils::Backoff;
use lock_api::GuardNoSend;
use std::{
    mem,
    sync::atomic::{
        AtomicUsize,
        Ordering::{Acquire, Relaxed, Release},
    },
};

const WRITE_BIT: usize = 1 << (mem::size_of::<usize>() * 8 - 1);
const READ_MASK: usize = !WRITE_BIT;

#[inline]
const fn write_locked(val: usize) -> bool {
    val & WRITE_BIT != 0
}

#[inline]
const fn shared_locked(val: usize) -> bool {
    val & READ_MASK != 0
}

/// Raw lock state: a reader count with the write bit stored in the sign bit.
#[derive(Debug)]
pub struct RawTableLock {
    state: AtomicUsize,
}

unsafe impl lock_api::RawRwLock for RawTableLock {
    const INIT: RawTableLock = RawTableLock {
        state: AtomicUsize::new(0),
    };

    type GuardMarker = GuardNoSend;

    #[inline]
    fn lock_shared(&self) {
        if write_locked(self.state.fetch_add(1, Acquire)) {
            self.lock_shared_slow();
        }
    }

    #[inline]
    fn try_lock_shared(&self) -> bool {
        let current = self.state.load(Relaxed);
        !write_locked(current)
            && self
                .state
                .compare_exchange(current, current + 1, Acquire, Relaxed)
                .is_ok()
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        let _prev = self.state.fetch_sub(1, Release);
        debug_assert!(
            shared_locked(_prev),
            "attempt to shared-unlock an unlocked `RawTableLock`"
        );
    }

    #[inline]
    fn lock_exclusive(&self) {
        if self
            .state
            .compare_exchange_weak(0, WRITE_BIT, Acquire, Relaxed)
            .is_err()
        {
            self.lock_exclusive_slow();
        }
    }

    #[inline]
    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITE_BIT, Acquire, Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        let _prev = self.state.fetch_and(READ_MASK, Release);
        debug_assert!(
            write_locked(_prev),
            "attempt to exclusive-unlock an unlocked `RawTableLock`"
        );
    }
}

impl RawTableLock {
    #[cold]
    #[inline(never)]
    fn lock_shared_slow(&self) {
        // Undo the optimistic increment, then wait out the writer.
        self.state.fetch_sub(1, Relaxed);

        let backoff = Backoff::new();
        loop {
            backoff.snooze();
            let current = self.state.load(Relaxed);
            if !write_locked(current)
                && self
                    .state
                    .compare_exchange_weak(current, current + 1, Acquire, Relaxed)
                    .is_ok()
            {
                break;
            }
        }
    }

    #[cold]
    #[inline(never)]
    fn lock_exclusive_slow(&self) {
        let backoff = Backoff::new();
        // Claim the write bit first so new readers queue behind us.
        let mut current = self.state.load(Relaxed);
        loop {
            if !write_locked(current) {
                match self.state.compare_exchange_weak(
                    current,
                    current | WRITE_BIT,
                    Acquire,
                    Relaxed,
                ) {
                    Ok(prev) => {
                        current = prev | WRITE_BIT;
                        break;
                    }
                    Err(observed) => current = observed,
                }
            } else {
                backoff.snooze();
                current = self.state.load(Relaxed);
            }
        }
        // Wait for in-flight readers to drain.
        while shared_locked(current) {
            backoff.snooze();
            current = self.state.load(Acquire);
        }
    }
}

pub type TableLock<T> = lock_api::RwLock<RawTableLock, T>;
