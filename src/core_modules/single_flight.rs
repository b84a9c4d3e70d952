// THEORY:
// `SingleFlight` is the admission-control primitive shared by both coordinators.
// At most one operation of a kind may be in progress; anything that arrives
// while one is running is turned away rather than queued. Under load this keeps
// latency bounded: the next frame is always fresh, never the tail of a backlog.
//
// The busy flag is the only state touched from more than one thread (the
// submitting thread and the completing worker). Check-and-set happens inside a
// single critical section so two submitters can never both see "idle".

use std::sync::{Mutex, MutexGuard, PoisonError};

/// What happened to a piece of work handed to a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted and handed to the worker.
    Dispatched,
    /// Turned away because an earlier operation is still in flight.
    Dropped,
    /// Refused because the coordinator is not ready; a failure event was emitted.
    Rejected,
    /// Nothing to do (empty batch); no state was touched.
    Ignored,
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: Mutex<bool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the flight if it is free. Returns `false` when already busy.
    pub fn try_begin(&self) -> bool {
        let mut busy = self.lock();
        if *busy {
            return false;
        }
        *busy = true;
        true
    }

    /// Releases the flight so the next submission is admitted.
    pub fn finish(&self) {
        *self.lock() = false;
    }

    pub fn is_busy(&self) -> bool {
        *self.lock()
    }

    // A panic while holding the flag cannot leave it half-written, so a poisoned
    // lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
