//! Admission control: the batcher.
//!
//! Transactions run in non-overlapping batches. Entering is cheap while the
//! batch is open; once any writer aborts, the batch starts draining and new
//! read-write transactions block on the condition variable until the epoch
//! turns over (read-only transactions are admitted regardless, they cannot
//! contend). The last participant to leave runs the epoch commit while still
//! holding the mutex, which is what makes the commit invisible to entrants:
//! nobody can join a batch while words are half flipped.

use crate::{
    internal::{
        commit::{epoch_commit, CommitSet},
        table::SegmentTable,
    },
    stats,
};
use parking_lot::{Condvar, Mutex};
use std::fmt::{self, Debug, Formatter};

/// How a transaction leaves its batch.
pub enum Outcome {
    /// Committed; its effects join the batch's commit set.
    Committed(CommitSet),
    /// Aborted; the batch is asked to drain so the loser is not starved by
    /// writers that keep winning the word CAS.
    Aborted,
}

struct BatchState {
    /// Live participants of the current batch.
    remaining: usize,
    /// Read-write entrants currently blocked on the condition variable.
    blocked: usize,
    /// Drain flag: set by an abort, cleared by the epoch commit.
    waiting: bool,
    commit_set: CommitSet,
}

pub struct Batcher {
    state: Mutex<BatchState>,
    newcomers: Condvar,
}

impl Batcher {
    pub fn new() -> Self {
        Batcher {
            state: Mutex::new(BatchState {
                remaining: 0,
                blocked: 0,
                waiting: false,
                commit_set: CommitSet::new(),
            }),
            newcomers: Condvar::new(),
        }
    }

    /// Admits a transaction. This is the library's only suspension point:
    /// a read-write transaction blocks while the current batch drains.
    pub fn enter(&self, read_only: bool) {
        let mut state = self.state.lock();
        if !read_only {
            while state.waiting {
                state.blocked += 1;
                self.newcomers.wait(&mut state);
                state.blocked -= 1;
            }
        }
        state.remaining += 1;
    }

    /// Removes a participant. The leaver that empties the batch runs the
    /// epoch commit and then releases everyone blocked on the next batch.
    pub fn leave(&self, outcome: Outcome, table: &SegmentTable) {
        let mut state = self.state.lock();
        match outcome {
            Outcome::Committed(effects) => state.commit_set.merge(effects),
            Outcome::Aborted => state.waiting = true,
        }
        debug_assert!(state.remaining > 0, "leaving an empty batch");
        state.remaining -= 1;
        if state.remaining == 0 {
            let set = state.commit_set.take();
            epoch_commit(set, table);
            stats::batches();
            state.waiting = false;
            if state.blocked > 0 {
                self.newcomers.notify_all();
            }
        }
    }
}

impl Debug for Batcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Batcher")
            .field("remaining", &state.remaining)
            .field("blocked", &state.blocked)
            .field("waiting", &state.waiting)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::internal::{segment::Segment, word::UNOWNED};
    use std::sync::Arc;

    #[test]
    fn last_leaver_commits_the_batch() {
        let table = SegmentTable::new();
        let seg = Arc::new(Segment::new(8, 8, 8).unwrap());
        table.publish(&seg);
        let batcher = Batcher::new();

        batcher.enter(false);
        batcher.enter(false);

        let w = table.resolve(8).unwrap();
        assert!(w.control().try_claim(1).is_ok());
        unsafe { w.store_scratch(&[9; 8]) };
        let mut set = CommitSet::new();
        set.written.push(w.clone());

        batcher.leave(Outcome::Committed(set), &table);
        // batch still open: the write is unpublished and the word still owned
        assert_eq!(w.control().owner(), 1);
        assert!(!w.control().read_version());

        batcher.leave(Outcome::Committed(CommitSet::new()), &table);
        assert_eq!(w.control().owner(), UNOWNED);
        assert!(w.control().read_version());
    }

    #[test]
    fn abort_drains_then_reopens() {
        let table = SegmentTable::new();
        let batcher = Batcher::new();
        batcher.enter(false);
        batcher.leave(Outcome::Aborted, &table);
        // the drain ended with the batch, so a writer may enter again
        // without blocking
        batcher.enter(false);
        batcher.leave(Outcome::Committed(CommitSet::new()), &table);
    }
}
