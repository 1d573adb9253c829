//! The store boundary.
//!
//! The reconciler only needs four things from the hierarchical store: open a
//! session under a credential mode, read a subtree, write nodes, and observe
//! changes under a path scope. Everything else (persistence, versioning,
//! access control) stays behind these traits.
//!
//! Observation is session-scoped: subscriptions are registered through a
//! session and share its lifetime. Closing (dropping) a session tears down
//! any subscriptions still registered through it, so a subscription can never
//! outlive the session it was built on.

pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{ChangeEvent, EventKinds};
use crate::tree::{NodeData, PropertyValue};

/// Credential mode for a store session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Credentials {
    /// Service identity with the rights granted to this component.
    #[default]
    Service,
    /// Administrative session for stores whose index catalog rejects service
    /// writes.
    Admin,
}

/// What the host store supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Whether the store exposes an index catalog this component may manage.
    pub oak_indexing: bool,
}

/// Opaque handle identifying a registered observation subscription.
pub type SubscriptionId = u64;

/// Callback receiving change-event batches.
///
/// Delivery happens on a dispatch thread owned by the store, asynchronously
/// with respect to the mutating session. Implementations must not assume any
/// particular thread and must tolerate event kinds they do not care about.
pub trait ChangeCallback: Send + Sync {
    /// Invoked once per delivered batch. Batches are never empty.
    fn on_events(&self, batch: &[ChangeEvent]);
}

/// An open session against the store.
///
/// Sessions are single-owner and closed by dropping them. Write operations
/// take effect immediately and produce change events for observers.
pub trait StoreSession: Send {
    /// Reads a node, or `None` if no node exists at `path`.
    fn node(&self, path: &str) -> Result<Option<NodeData>, StoreError>;

    /// Returns the names of the children of `path`, sorted, so tree walks are
    /// deterministic.
    fn children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Creates a node. The parent must exist; the path must be vacant.
    fn create_node(&mut self, path: &str, data: NodeData) -> Result<(), StoreError>;

    /// Replaces the property mapping of an existing node. The node type is
    /// left untouched.
    fn set_properties(
        &mut self,
        path: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError>;

    /// Removes a node and its subtree.
    fn remove_node(&mut self, path: &str) -> Result<(), StoreError>;

    /// Registers a change callback scoped to `scope` (and, when `deep`, its
    /// whole subtree), filtered by `kinds`. The subscription shares this
    /// session's lifetime.
    fn register_observer(
        &mut self,
        scope: &str,
        kinds: EventKinds,
        deep: bool,
        callback: Arc<dyn ChangeCallback>,
    ) -> Result<SubscriptionId, StoreError>;

    /// Removes a subscription previously registered through this session.
    fn unregister_observer(&mut self, id: SubscriptionId) -> Result<(), StoreError>;
}

/// A hierarchical store able to hand out sessions.
pub trait TreeStore: Send + Sync {
    /// Opens a fresh session under the given credential mode.
    fn open_session(&self, credentials: Credentials) -> Result<Box<dyn StoreSession>, StoreError>;

    /// Capability probe, checked once at component start.
    fn capabilities(&self) -> StoreCapabilities;
}

/// Store-level failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Read or write addressed a path with no node.
    #[error("no node at {path}")]
    NoSuchNode {
        /// The missing path.
        path: String,
    },

    /// Create addressed an occupied path.
    #[error("node already exists at {path}")]
    NodeExists {
        /// The occupied path.
        path: String,
    },

    /// Create addressed a path whose parent does not exist.
    #[error("no parent node for {path}")]
    NoParent {
        /// The orphan path.
        path: String,
    },

    /// A path failed well-formedness checks.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The session was already closed.
    #[error("session is closed")]
    SessionClosed,

    /// Unregister addressed an unknown subscription.
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    /// Opening a session was refused for the given credential mode.
    #[error("session denied for {credentials:?}: {reason}")]
    SessionDenied {
        /// The refused credential mode.
        credentials: Credentials,
        /// Why the store refused.
        reason: String,
    },

    /// Backend-specific failure.
    #[error("store backend failure: {0}")]
    Backend(String),
}
