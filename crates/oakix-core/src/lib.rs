//! oakix-core - Ensured Index Reconciler Core Library
//!
//! This library provides the data model and convergence engine for keeping a
//! set of declared index definitions continuously synchronized onto a live
//! index catalog inside a hierarchical store. The desired state lives under a
//! definitions subtree; the actual state is the index catalog. A convergence
//! pass walks the definitions, compares content fingerprints against the
//! fingerprint recorded on each corresponding index, and applies only the
//! deltas (create or update; unchanged definitions are skipped).
//!
//! # Modules
//!
//! - [`tree`]: Node data model (`NodeData`, `PropertyValue`) and the node-type
//!   and property-name constants shared across the workspace
//! - [`path`]: Helpers over `/`-separated absolute store paths
//! - [`events`]: Change events and the registration kind mask
//! - [`store`]: The store boundary (`TreeStore`, `StoreSession`) plus the
//!   in-memory backend with asynchronous change-event dispatch
//! - [`fingerprint`]: Deterministic, key-order-independent content fingerprint
//!   over a definition subtree
//! - [`convergence`]: The convergence job and its report
//! - [`config`]: Component configuration with fail-closed validation

pub mod config;
pub mod convergence;
pub mod events;
pub mod fingerprint;
pub mod path;
pub mod store;
pub mod tree;

pub use config::{ConfigError, EnsureConfig, DEFAULT_OAK_INDEXES_PATH};
pub use convergence::{ApplyAction, AppliedIndex, ConvergenceJob, ConvergenceReport, FailedDefinition};
pub use events::{ChangeEvent, EventKind, EventKinds};
pub use fingerprint::{fingerprint, DefinitionContent, Fingerprint};
pub use store::memory::MemoryStore;
pub use store::{
    ChangeCallback, Credentials, StoreCapabilities, StoreError, StoreSession, SubscriptionId,
    TreeStore,
};
pub use tree::{NodeData, PropertyValue};
