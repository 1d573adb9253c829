//! In-memory tree store with asynchronous change-event dispatch.
//!
//! Nodes live in a `BTreeMap` keyed by absolute path, which keeps subtree
//! enumeration ordered and deterministic. Every subscription owns a dedicated
//! dispatch thread fed through a channel, so callbacks run asynchronously
//! with respect to the mutating session and a slow callback never blocks a
//! writer. All events produced by one write operation form one batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::events::{ChangeEvent, EventKind, EventKinds};
use crate::path;
use crate::store::{
    ChangeCallback, Credentials, StoreCapabilities, StoreError, StoreSession, SubscriptionId,
    TreeStore,
};
use crate::tree::{NodeData, PropertyValue};

/// Node type of the pre-seeded root node.
const NT_ROOT: &str = "rep:root";

struct Subscription {
    scope: String,
    kinds: EventKinds,
    deep: bool,
    tx: Sender<Vec<ChangeEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    fn matches(&self, event: &ChangeEvent) -> bool {
        if !self.kinds.intersects(event.kind.mask()) {
            return false;
        }
        if self.deep {
            path::in_scope(&self.scope, &event.path)
        } else {
            path::parent(&event.path) == Some(self.scope.as_str()) || event.path == self.scope
        }
    }
}

struct Inner {
    nodes: BTreeMap<String, NodeData>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    next_subscription: SubscriptionId,
    mutations: u64,
}

/// The in-memory store backend.
///
/// Cloning is shallow: clones share the same tree and subscriptions.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    capabilities: StoreCapabilities,
}

impl MemoryStore {
    /// Creates a store with an index catalog capability and a seeded root
    /// node.
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities { oak_indexing: true })
    }

    /// Creates a store advertising the given capabilities.
    pub fn with_capabilities(capabilities: StoreCapabilities) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), NodeData::new(NT_ROOT));
        Self {
            inner: Arc::new(Mutex::new(Inner {
                nodes,
                subscriptions: HashMap::new(),
                next_subscription: 1,
                mutations: 0,
            })),
            capabilities,
        }
    }

    /// Creates a store that does not support index management, for exercising
    /// the capability-check path.
    pub fn without_index_catalog() -> Self {
        Self::with_capabilities(StoreCapabilities { oak_indexing: false })
    }

    /// Number of successful write operations since creation. Unchanged
    /// content produces no writes, which makes this counter the cheapest
    /// idempotence probe available to tests and diagnostics.
    pub fn mutation_count(&self) -> u64 {
        lock(&self.inner).mutations
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore for MemoryStore {
    fn open_session(&self, credentials: Credentials) -> Result<Box<dyn StoreSession>, StoreError> {
        debug!(?credentials, "opening in-memory store session");
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
            subscriptions: Vec::new(),
        }))
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }
}

// Mutex poisoning only happens when a writer panicked mid-operation; the tree
// itself is still structurally sound, so recover the guard instead of
// propagating the poison to every later session.
fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn check_path(p: &str) -> Result<(), StoreError> {
    if path::is_absolute(p) {
        Ok(())
    } else {
        Err(StoreError::InvalidPath {
            path: p.to_string(),
            reason: "store paths must be absolute without a trailing slash",
        })
    }
}

struct MemorySession {
    inner: Arc<Mutex<Inner>>,
    subscriptions: Vec<SubscriptionId>,
}

impl MemorySession {
    /// Delivers `events` to every matching subscription as one batch per
    /// subscription. Senders are collected under the lock; the sends happen
    /// after it is released so a full pipeline never blocks the tree.
    fn dispatch(guard: MutexGuard<'_, Inner>, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        let mut outbound: Vec<(Sender<Vec<ChangeEvent>>, Vec<ChangeEvent>)> = Vec::new();
        for subscription in guard.subscriptions.values() {
            let batch: Vec<ChangeEvent> = events
                .iter()
                .filter(|event| subscription.matches(event))
                .cloned()
                .collect();
            if !batch.is_empty() {
                outbound.push((subscription.tx.clone(), batch));
            }
        }
        drop(guard);
        for (tx, batch) in outbound {
            if tx.send(batch).is_err() {
                warn!("observation dispatcher gone; dropping event batch");
            }
        }
    }

    fn unregister(inner: &Arc<Mutex<Inner>>, id: SubscriptionId) -> Result<(), StoreError> {
        let mut subscription = {
            let mut guard = lock(inner);
            guard
                .subscriptions
                .remove(&id)
                .ok_or(StoreError::UnknownSubscription(id))?
        };
        // Dropping the entry drops its sender, which ends the dispatch
        // thread; join it outside the lock so teardown is deterministic.
        let worker = subscription.worker.take();
        drop(subscription);
        if let Some(worker) = worker {
            let _ = worker.join();
        }
        Ok(())
    }
}

impl StoreSession for MemorySession {
    fn node(&self, p: &str) -> Result<Option<NodeData>, StoreError> {
        check_path(p)?;
        Ok(lock(&self.inner).nodes.get(p).cloned())
    }

    fn children(&self, p: &str) -> Result<Vec<String>, StoreError> {
        check_path(p)?;
        let guard = lock(&self.inner);
        if !guard.nodes.contains_key(p) {
            return Err(StoreError::NoSuchNode { path: p.to_string() });
        }
        // BTreeMap range over the subtree; keep direct children only.
        let names = guard
            .nodes
            .range(format!("{p}/")..)
            .take_while(|(candidate, _)| path::in_scope(p, candidate))
            .filter_map(|(candidate, _)| {
                let rel = path::relative(p, candidate)?;
                if rel.contains('/') || rel.is_empty() {
                    None
                } else {
                    Some(rel.to_string())
                }
            })
            .collect();
        Ok(names)
    }

    fn create_node(&mut self, p: &str, data: NodeData) -> Result<(), StoreError> {
        check_path(p)?;
        let mut guard = lock(&self.inner);
        if guard.nodes.contains_key(p) {
            return Err(StoreError::NodeExists { path: p.to_string() });
        }
        let parent = path::parent(p).ok_or_else(|| StoreError::InvalidPath {
            path: p.to_string(),
            reason: "cannot create the root node",
        })?;
        if !guard.nodes.contains_key(parent) {
            return Err(StoreError::NoParent { path: p.to_string() });
        }

        let mut events = vec![ChangeEvent::now(EventKind::NodeAdded, p)];
        for _ in data.properties.keys() {
            events.push(ChangeEvent::now(EventKind::PropertyAdded, p));
        }
        guard.nodes.insert(p.to_string(), data);
        guard.mutations += 1;
        Self::dispatch(guard, events);
        Ok(())
    }

    fn set_properties(
        &mut self,
        p: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError> {
        check_path(p)?;
        let mut guard = lock(&self.inner);
        let Some(existing) = guard.nodes.get(p) else {
            return Err(StoreError::NoSuchNode { path: p.to_string() });
        };

        let mut events = Vec::new();
        for (key, value) in &properties {
            match existing.properties.get(key) {
                None => events.push(ChangeEvent::now(EventKind::PropertyAdded, p)),
                Some(old) if old != value => {
                    events.push(ChangeEvent::now(EventKind::PropertyChanged, p));
                }
                Some(_) => {}
            }
        }
        for key in existing.properties.keys() {
            if !properties.contains_key(key) {
                events.push(ChangeEvent::now(EventKind::PropertyRemoved, p));
            }
        }
        if events.is_empty() {
            // Identical mapping: not a mutation, no events.
            return Ok(());
        }

        if let Some(node) = guard.nodes.get_mut(p) {
            node.properties = properties;
        }
        guard.mutations += 1;
        Self::dispatch(guard, events);
        Ok(())
    }

    fn remove_node(&mut self, p: &str) -> Result<(), StoreError> {
        check_path(p)?;
        if p == "/" {
            return Err(StoreError::InvalidPath {
                path: p.to_string(),
                reason: "cannot remove the root node",
            });
        }
        let mut guard = lock(&self.inner);
        if !guard.nodes.contains_key(p) {
            return Err(StoreError::NoSuchNode { path: p.to_string() });
        }
        // Keys starting with "{p}/" are contiguous in the map; the node
        // itself is not (siblings like "{p}-old" sort in between).
        let mut doomed: Vec<String> = guard
            .nodes
            .range(format!("{p}/")..)
            .take_while(|(candidate, _)| candidate.starts_with(&format!("{p}/")))
            .map(|(candidate, _)| candidate.clone())
            .collect();
        doomed.push(p.to_string());
        for candidate in &doomed {
            guard.nodes.remove(candidate);
        }
        guard.mutations += 1;
        let events = vec![ChangeEvent::now(EventKind::NodeRemoved, p)];
        Self::dispatch(guard, events);
        Ok(())
    }

    fn register_observer(
        &mut self,
        scope: &str,
        kinds: EventKinds,
        deep: bool,
        callback: Arc<dyn ChangeCallback>,
    ) -> Result<SubscriptionId, StoreError> {
        check_path(scope)?;
        let (tx, rx) = mpsc::channel::<Vec<ChangeEvent>>();
        let mut guard = lock(&self.inner);
        let id = guard.next_subscription;
        guard.next_subscription += 1;

        let worker = std::thread::Builder::new()
            .name(format!("oakix-observe-{id}"))
            .spawn(move || {
                while let Ok(batch) = rx.recv() {
                    callback.on_events(&batch);
                }
            })
            .map_err(|error| StoreError::Backend(format!("observation thread spawn: {error}")))?;

        guard.subscriptions.insert(
            id,
            Subscription {
                scope: scope.to_string(),
                kinds,
                deep,
                tx,
                worker: Some(worker),
            },
        );
        drop(guard);
        self.subscriptions.push(id);
        debug!(subscription = id, scope, "registered change observer");
        Ok(id)
    }

    fn unregister_observer(&mut self, id: SubscriptionId) -> Result<(), StoreError> {
        if let Some(position) = self.subscriptions.iter().position(|known| *known == id) {
            self.subscriptions.swap_remove(position);
        }
        Self::unregister(&self.inner, id)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        // Subscriptions share the session's lifetime: closing the session
        // tears down whatever is still registered through it.
        for id in std::mem::take(&mut self.subscriptions) {
            if let Err(error) = Self::unregister(&self.inner, id) {
                debug!(subscription = id, %error, "subscription already gone at session close");
            }
        }
    }
}
