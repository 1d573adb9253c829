//! End-to-end convergence scenarios against the in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;

use oakix_core::store::{StoreCapabilities, StoreSession};
use oakix_core::tree::{NT_OAK_UNSTRUCTURED, NT_QUERY_INDEX_DEFINITION, PN_ENSURED_FINGERPRINT};
use oakix_core::{
    ApplyAction, ChangeCallback, ConvergenceJob, Credentials, EventKinds, MemoryStore, NodeData,
    PropertyValue, StoreError, SubscriptionId, TreeStore,
};

fn definition(marker: &str) -> NodeData {
    NodeData::new(NT_OAK_UNSTRUCTURED)
        .with_property("type", "property")
        .with_property("propertyNames", marker)
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    let mut session = store.open_session(Credentials::Service).unwrap();
    session.create_node("/defs", NodeData::new("nt:folder")).unwrap();
    session
        .create_node("/oak:index", NodeData::new("nt:folder"))
        .unwrap();
    store
}

fn job(store: Arc<dyn TreeStore>) -> ConvergenceJob {
    ConvergenceJob::new(store, Credentials::Service, "/defs", "/oak:index")
}

#[test]
fn create_then_converge_then_targeted_update() {
    let store = seeded_store();
    let mut session = store.open_session(Credentials::Service).unwrap();
    session.create_node("/defs/a", definition("first")).unwrap();
    session.create_node("/defs/b", definition("second")).unwrap();

    // First pass creates both indexes.
    let job = job(Arc::new(store.clone()));
    let report = job.run().unwrap();
    assert_eq!(report.applied.len(), 2);
    assert!(report
        .applied
        .iter()
        .all(|applied| applied.action == ApplyAction::Created));

    let probe = store.open_session(Credentials::Service).unwrap();
    let index_a = probe.node("/oak:index/a").unwrap().unwrap();
    let index_b = probe.node("/oak:index/b").unwrap().unwrap();
    assert_eq!(index_a.node_type, NT_QUERY_INDEX_DEFINITION);
    assert_eq!(index_b.node_type, NT_QUERY_INDEX_DEFINITION);
    drop(probe);

    // Second pass over unchanged definitions performs zero writes.
    let before = store.mutation_count();
    let report = job.run().unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(store.mutation_count(), before);

    // Editing one definition updates only its index.
    let mut props = session.node("/defs/a").unwrap().unwrap().properties;
    props.insert(
        "propertyNames".to_string(),
        PropertyValue::from("first-edited"),
    );
    session.set_properties("/defs/a", props).unwrap();

    let old_b_fingerprint = store
        .open_session(Credentials::Service)
        .unwrap()
        .node("/oak:index/b")
        .unwrap()
        .unwrap()
        .property(PN_ENSURED_FINGERPRINT)
        .cloned();

    let report = job.run().unwrap();
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].path, "/defs/a");
    assert_eq!(report.applied[0].action, ApplyAction::Updated);
    assert_eq!(report.skipped, vec!["/defs/b"]);

    let probe = store.open_session(Credentials::Service).unwrap();
    let index_a = probe.node("/oak:index/a").unwrap().unwrap();
    assert_eq!(
        index_a.property("propertyNames"),
        Some(&PropertyValue::from("first-edited"))
    );
    let index_b = probe.node("/oak:index/b").unwrap().unwrap();
    assert_eq!(
        index_b.property(PN_ENSURED_FINGERPRINT).cloned(),
        old_b_fingerprint
    );
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

/// Store wrapper whose sessions refuse writes under one poisoned path.
#[derive(Clone)]
struct FaultyStore {
    inner: MemoryStore,
    poisoned: &'static str,
}

struct FaultySession {
    inner: Box<dyn StoreSession>,
    poisoned: &'static str,
}

impl TreeStore for FaultyStore {
    fn open_session(&self, credentials: Credentials) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(FaultySession {
            inner: self.inner.open_session(credentials)?,
            poisoned: self.poisoned,
        }))
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }
}

impl StoreSession for FaultySession {
    fn node(&self, path: &str) -> Result<Option<NodeData>, StoreError> {
        self.inner.node(path)
    }

    fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        self.inner.children(path)
    }

    fn create_node(&mut self, path: &str, data: NodeData) -> Result<(), StoreError> {
        if path.starts_with(self.poisoned) {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }
        self.inner.create_node(path, data)
    }

    fn set_properties(
        &mut self,
        path: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError> {
        if path.starts_with(self.poisoned) {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }
        self.inner.set_properties(path, properties)
    }

    fn remove_node(&mut self, path: &str) -> Result<(), StoreError> {
        self.inner.remove_node(path)
    }

    fn register_observer(
        &mut self,
        scope: &str,
        kinds: EventKinds,
        deep: bool,
        callback: Arc<dyn ChangeCallback>,
    ) -> Result<SubscriptionId, StoreError> {
        self.inner.register_observer(scope, kinds, deep, callback)
    }

    fn unregister_observer(&mut self, id: SubscriptionId) -> Result<(), StoreError> {
        self.inner.unregister_observer(id)
    }
}

#[test]
fn one_failing_definition_does_not_stop_the_pass() {
    let store = seeded_store();
    let mut session = store.open_session(Credentials::Service).unwrap();
    session.create_node("/defs/alpha", definition("a")).unwrap();
    session.create_node("/defs/beta", definition("b")).unwrap();
    session.create_node("/defs/gamma", definition("c")).unwrap();
    drop(session);

    let faulty = FaultyStore {
        inner: store.clone(),
        poisoned: "/oak:index/beta",
    };
    let report = job(Arc::new(faulty)).run().unwrap();

    assert_eq!(report.applied.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, "/defs/beta");
    assert!(report.failed[0].error.contains("simulated write failure"));

    // Siblings before and after the failure both landed.
    let probe = store.open_session(Credentials::Service).unwrap();
    assert!(probe.node("/oak:index/alpha").unwrap().is_some());
    assert!(probe.node("/oak:index/beta").unwrap().is_none());
    assert!(probe.node("/oak:index/gamma").unwrap().is_some());
}

#[test]
fn report_serializes_for_logging() {
    let store = seeded_store();
    let mut session = store.open_session(Credentials::Service).unwrap();
    session.create_node("/defs/a", definition("x")).unwrap();
    drop(session);

    let report = job(Arc::new(store)).run().unwrap();
    let rendered = serde_json::to_string(&report).unwrap();
    assert!(rendered.contains("\"created\""));
    assert!(rendered.contains("/defs/a"));
}
