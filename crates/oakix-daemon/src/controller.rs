//! Component lifecycle: wires the watcher, scheduler and convergence job.
//!
//! `start` validates the configuration, probes the store's capabilities,
//! registers the definition observer and fires the initial convergence pass.
//! The returned handle owns the watch session; dropping or stopping it tears
//! the watcher down before the session, so no trigger can fire against a
//! closed session.
//!
//! Only a configuration error is fatal. A store without an index catalog, or
//! a failed observer registration, yields a started-but-degraded handle that
//! watches nothing; the condition is logged and visible through
//! [`EnsureIndexHandle::is_watching`].

use std::sync::Arc;

use oakix_core::store::StoreError;
use oakix_core::{
    ConfigError, ConvergenceJob, EnsureConfig, EventKinds, StoreSession, SubscriptionId, TreeStore,
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::listener::EnsureIndexListener;
use crate::scheduler::{JobIdentity, JobScheduler, ThreadScheduler};

/// Fatal start failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StartError {
    /// The configuration did not validate.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// An unstarted ensure-index component.
pub struct EnsureIndex {
    store: Arc<dyn TreeStore>,
    config: EnsureConfig,
    scheduler: Arc<dyn JobScheduler>,
}

/// Watch session plus the subscription registered through it.
struct Watch {
    session: Box<dyn StoreSession>,
    subscription: SubscriptionId,
}

impl EnsureIndex {
    /// Binds a component to a store and a configuration, dispatching through
    /// a fresh [`ThreadScheduler`]. Nothing happens until
    /// [`start`](Self::start).
    pub fn new(store: Arc<dyn TreeStore>, config: EnsureConfig) -> Self {
        Self::with_scheduler(store, config, Arc::new(ThreadScheduler::new()))
    }

    /// Like [`new`](Self::new) with an explicit scheduler, so several
    /// components can share one admission set, or tests can substitute a
    /// fake.
    pub fn with_scheduler(
        store: Arc<dyn TreeStore>,
        config: EnsureConfig,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        Self {
            store,
            config,
            scheduler,
        }
    }

    /// Starts the component.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] only for an invalid configuration. Runtime
    /// trouble (missing catalog capability, failed observer registration)
    /// degrades the handle instead.
    pub fn start(self) -> Result<EnsureIndexHandle, StartError> {
        self.config.validate()?;

        let identity = JobIdentity {
            definitions_path: self.config.definitions_path.clone(),
            indexes_path: self.config.indexes_path.clone(),
        };
        let scheduler = Arc::clone(&self.scheduler);
        let job = Arc::new(ConvergenceJob::new(
            Arc::clone(&self.store),
            self.config.credentials,
            self.config.definitions_path.clone(),
            self.config.indexes_path.clone(),
        ));
        let listener = Arc::new(EnsureIndexListener::new(
            identity.clone(),
            job,
            Arc::clone(&scheduler),
        ));

        if !self.store.capabilities().oak_indexing {
            warn!(
                job = %identity,
                "store reports no index catalog; cowardly refusing to ensure indexes"
            );
            return Ok(EnsureIndexHandle {
                identity,
                scheduler,
                watch: None,
            });
        }

        let watch = match self.open_watch(Arc::clone(&listener)) {
            Ok(watch) => Some(watch),
            Err(err) => {
                error!(
                    job = %identity,
                    error = %err,
                    "could not register definition observer; starting degraded"
                );
                None
            }
        };

        // Definitions deployed before this component started must converge
        // too, and a watcher only reports future changes.
        listener.trigger();

        info!(job = %identity, watching = watch.is_some(), "ensure-index component started");
        Ok(EnsureIndexHandle {
            identity,
            scheduler,
            watch,
        })
    }

    fn open_watch(&self, listener: Arc<EnsureIndexListener>) -> Result<Watch, StoreError> {
        let mut session = self.store.open_session(self.config.credentials)?;
        let subscription = session.register_observer(
            &self.config.definitions_path,
            EventKinds::all(),
            true,
            listener,
        )?;
        Ok(Watch {
            session,
            subscription,
        })
    }
}

/// A running component. Stopping (or dropping) it releases the watcher, then
/// the session.
pub struct EnsureIndexHandle {
    identity: JobIdentity,
    scheduler: Arc<dyn JobScheduler>,
    watch: Option<Watch>,
}

impl EnsureIndexHandle {
    /// `false` when the component started degraded and observes nothing.
    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// `true` while a convergence run is scheduled or running.
    pub fn is_converging(&self) -> bool {
        self.scheduler.is_occupied(&self.identity)
    }

    /// Stops the component. Equivalent to dropping the handle, but explicit
    /// at call sites that care about ordering.
    pub fn stop(self) {
        // Drop does the work.
    }

    fn release(&mut self) {
        let Some(mut watch) = self.watch.take() else {
            return;
        };
        // Watcher before session: once the subscription is gone no further
        // trigger can arrive, and only then is the session closed.
        if let Err(error) = watch.session.unregister_observer(watch.subscription) {
            warn!(job = %self.identity, %error, "failed to unregister definition observer");
        }
        drop(watch.session);
        info!(job = %self.identity, "ensure-index component stopped");
    }
}

impl Drop for EnsureIndexHandle {
    fn drop(&mut self) {
        self.release();
    }
}
