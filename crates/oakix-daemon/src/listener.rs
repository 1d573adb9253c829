//! Change listener: turns event batches into convergence triggers.

use std::sync::Arc;

use oakix_core::{ChangeCallback, ChangeEvent, ConvergenceJob, ConvergenceReport};
use tracing::{debug, info, warn};

use crate::scheduler::{Admission, JobIdentity, JobScheduler};

/// Bridges store observation to the scheduler.
///
/// Event payloads only prove that something under the definitions root
/// changed; the triggered job re-reads the whole tree, so a batch of any size
/// collapses into a single trigger.
pub struct EnsureIndexListener {
    identity: JobIdentity,
    job: Arc<ConvergenceJob>,
    scheduler: Arc<dyn JobScheduler>,
}

impl EnsureIndexListener {
    /// Creates a listener that dispatches `job` through `scheduler`.
    pub fn new(
        identity: JobIdentity,
        job: Arc<ConvergenceJob>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        Self {
            identity,
            job,
            scheduler,
        }
    }

    /// Submits one run. Used for the initial pass at start and by every
    /// event batch thereafter.
    pub fn trigger(&self) {
        let job = Arc::clone(&self.job);
        let identity = self.identity.clone();
        let submitted = self.scheduler.schedule_now(
            self.identity.clone(),
            Box::new(move || match job.run() {
                Ok(report) => log_report(&identity, &report),
                Err(error) => {
                    warn!(job = %identity, %error, "convergence run aborted");
                }
            }),
        );
        match submitted {
            Ok(Admission::Scheduled | Admission::Coalesced) => {}
            Err(error) => {
                // Dropping the trigger is safe: the definitions are still
                // there and the next change or restart picks them up.
                warn!(job = %self.identity, %error, "could not dispatch convergence job");
            }
        }
    }
}

fn log_report(identity: &JobIdentity, report: &ConvergenceReport) {
    if report.is_clean() {
        info!(
            job = %identity,
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "convergence run complete"
        );
    } else {
        warn!(
            job = %identity,
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "convergence run complete with failures"
        );
    }
}

impl ChangeCallback for EnsureIndexListener {
    fn on_events(&self, batch: &[ChangeEvent]) {
        if batch.is_empty() {
            return;
        }
        for event in batch {
            debug!(kind = event.kind.label(), path = %event.path, "definition change observed");
        }
        self.trigger();
    }
}
