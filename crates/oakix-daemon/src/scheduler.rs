//! Single-flight job dispatch.
//!
//! At most one convergence job per identity is scheduled-or-running at any
//! moment. A submission that finds the slot occupied is coalesced: dropped
//! silently, on the grounds that the occupying run (or the next trigger) will
//! observe the same store state. Submissions are never queued.
//!
//! Known race, accepted: a change landing after the running job has read the
//! tree but before its slot frees is coalesced into nothing and waits for the
//! next trigger.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use thiserror::Error;
use tracing::debug;

/// Identity of a convergence job: the pair of roots it reconciles.
///
/// Two components with different roots schedule independently; repeated
/// triggers for the same pair coalesce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobIdentity {
    /// Definitions root.
    pub definitions_path: String,
    /// Catalog root.
    pub indexes_path: String,
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ensure-index [ {} ~> {} ]",
            self.definitions_path, self.indexes_path
        )
    }
}

/// What became of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The job occupies the slot and will run.
    Scheduled,
    /// The slot was occupied; the submission was dropped.
    Coalesced,
}

/// Scheduling failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScheduleError {
    /// The worker thread could not be spawned. The slot is freed again.
    #[error("failed to spawn worker for {identity}: {source}")]
    Spawn {
        /// Job that could not be started.
        identity: JobIdentity,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },
}

/// Dispatch boundary, so tests can observe admissions without real threads.
pub trait JobScheduler: Send + Sync {
    /// Submits `job` for immediate execution under single-flight admission.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] when the job was admitted but could not be
    /// started.
    fn schedule_now(
        &self,
        identity: JobIdentity,
        job: Box<dyn FnOnce() + Send>,
    ) -> Result<Admission, ScheduleError>;

    /// `true` while a job for `identity` is scheduled or running.
    fn is_occupied(&self, identity: &JobIdentity) -> bool;
}

/// Frees the identity's slot when the run ends, panicked or not.
struct SlotGuard {
    occupied: Arc<Mutex<HashSet<JobIdentity>>>,
    identity: JobIdentity,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut occupied = self
            .occupied
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        occupied.remove(&self.identity);
    }
}

/// Thread-per-run scheduler with a shared occupancy set.
#[derive(Clone, Default)]
pub struct ThreadScheduler {
    occupied: Arc<Mutex<HashSet<JobIdentity>>>,
}

impl ThreadScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobScheduler for ThreadScheduler {
    fn schedule_now(
        &self,
        identity: JobIdentity,
        job: Box<dyn FnOnce() + Send>,
    ) -> Result<Admission, ScheduleError> {
        {
            let mut occupied = self
                .occupied
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !occupied.insert(identity.clone()) {
                debug!(job = %identity, "job already in flight; coalescing trigger");
                return Ok(Admission::Coalesced);
            }
        }

        let guard = SlotGuard {
            occupied: Arc::clone(&self.occupied),
            identity: identity.clone(),
        };
        let spawned = thread::Builder::new()
            .name("oakix-ensure-worker".to_string())
            .spawn(move || {
                let _slot = guard;
                job();
            });
        match spawned {
            Ok(_) => {
                debug!(job = %identity, "job scheduled");
                Ok(Admission::Scheduled)
            }
            // The unspawned closure is dropped with the guard inside, so the
            // slot is already free again.
            Err(source) => Err(ScheduleError::Spawn { identity, source }),
        }
    }

    fn is_occupied(&self, identity: &JobIdentity) -> bool {
        self.occupied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identity)
    }
}
