//! oakix-daemon - Ensured Index Reconciler Runtime
//!
//! Runtime half of the reconciler: the change listener that folds observed
//! definition edits into triggers, the single-flight scheduler that runs at
//! most one convergence job per root pair, and the component lifecycle that
//! wires both onto a store.
//!
//! # Modules
//!
//! - [`scheduler`]: Job identity, single-flight admission, the thread-per-run
//!   scheduler
//! - [`listener`]: `ChangeCallback` implementation turning event batches into
//!   convergence triggers
//! - [`controller`]: `EnsureIndex` component and its start/stop handle

pub mod controller;
pub mod listener;
pub mod scheduler;

pub use controller::{EnsureIndex, EnsureIndexHandle, StartError};
pub use listener::EnsureIndexListener;
pub use scheduler::{Admission, JobIdentity, JobScheduler, ScheduleError, ThreadScheduler};
