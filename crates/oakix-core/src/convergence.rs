//! The convergence job: make the index catalog match the definitions tree.
//!
//! A run enumerates definition nodes under the definitions root in
//! deterministic pre-order, maps each one positionally into the index catalog
//! (same relative path under the indexes root), and decides per definition:
//! create the index if it is missing, overwrite it if the recorded
//! fingerprint differs from the freshly computed one, or skip it when the
//! fingerprints match. Re-applying an index is assumed expensive (it may
//! trigger a full rebuild in the host store), so the fingerprint comparison
//! is the load-bearing cost guard.
//!
//! One failing definition never aborts the pass: the failure is recorded in
//! the report and the walk continues. The job opens its own session per run
//! and never mutates the definitions tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::fingerprint::{fingerprint, DefinitionContent, Fingerprint};
use crate::path;
use crate::store::{Credentials, StoreError, StoreSession, TreeStore};
use crate::tree::{
    NodeData, PropertyValue, INTERNAL_PROPERTIES, NT_OAK_UNSTRUCTURED, NT_QUERY_INDEX_DEFINITION,
    PN_ENSURED_FINGERPRINT,
};

/// How an applied definition reached the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    /// No corresponding index existed; one was created.
    Created,
    /// The recorded fingerprint differed; the index was overwritten.
    Updated,
}

/// One applied definition in a [`ConvergenceReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedIndex {
    /// Definition path.
    pub path: String,
    /// What was done.
    pub action: ApplyAction,
}

/// One failed definition in a [`ConvergenceReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDefinition {
    /// Definition path.
    pub path: String,
    /// Rendered failure.
    pub error: String,
}

/// Outcome of one convergence pass, by definition path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvergenceReport {
    /// Definitions whose index was created or updated.
    pub applied: Vec<AppliedIndex>,
    /// Definitions requiring no write (fingerprint match or `ignore` flag).
    pub skipped: Vec<String>,
    /// Definitions whose apply step failed; the pass continued past them.
    pub failed: Vec<FailedDefinition>,
}

impl ConvergenceReport {
    /// `true` when no definition failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total definitions visited.
    pub fn total(&self) -> usize {
        self.applied.len() + self.skipped.len() + self.failed.len()
    }
}

/// Per-definition outcome, before it is folded into the report.
enum Outcome {
    Created,
    Updated,
    UpToDate,
    Ignored,
}

/// A convergence job bound to one (definitions root, indexes root) pair.
///
/// The job is cheap to construct and re-runnable; every [`run`](Self::run)
/// opens a fresh session and re-reads current state.
pub struct ConvergenceJob {
    store: Arc<dyn TreeStore>,
    credentials: Credentials,
    definitions_path: String,
    indexes_path: String,
}

impl ConvergenceJob {
    /// Creates a job for the given roots.
    pub fn new(
        store: Arc<dyn TreeStore>,
        credentials: Credentials,
        definitions_path: impl Into<String>,
        indexes_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            credentials,
            definitions_path: definitions_path.into(),
            indexes_path: indexes_path.into(),
        }
    }

    /// Runs one convergence pass.
    ///
    /// # Errors
    ///
    /// Only failures that invalidate the whole pass are returned: opening the
    /// session, or an unreadable definitions root. Everything per-definition
    /// lands in the report instead.
    pub fn run(&self) -> Result<ConvergenceReport, StoreError> {
        info!(
            definitions = %self.definitions_path,
            indexes = %self.indexes_path,
            "starting convergence pass"
        );
        let mut boxed = self.store.open_session(self.credentials)?;
        let session = boxed.as_mut();

        let definitions = self.collect_definitions(&*session)?;
        debug!(count = definitions.len(), "definitions enumerated");

        let mut report = ConvergenceReport::default();
        for def_path in definitions {
            match self.ensure_one(&mut *session, &def_path) {
                Ok(Outcome::Created) => {
                    info!(path = %def_path, "index created");
                    report.applied.push(AppliedIndex {
                        path: def_path,
                        action: ApplyAction::Created,
                    });
                }
                Ok(Outcome::Updated) => {
                    info!(path = %def_path, "index definition changed; index updated");
                    report.applied.push(AppliedIndex {
                        path: def_path,
                        action: ApplyAction::Updated,
                    });
                }
                Ok(Outcome::UpToDate) => {
                    debug!(path = %def_path, "fingerprint unchanged; skipping");
                    report.skipped.push(def_path);
                }
                Ok(Outcome::Ignored) => {
                    debug!(path = %def_path, "definition marked ignore; skipping");
                    report.skipped.push(def_path);
                }
                Err(error) => {
                    warn!(path = %def_path, %error, "failed to ensure index definition");
                    report.failed.push(FailedDefinition {
                        path: def_path,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "convergence pass finished"
        );
        Ok(report)
    }

    /// Enumerates definition paths under the definitions root in pre-order
    /// with sorted siblings. Structural nodes are walked through; a
    /// definition node terminates descent (its subtree is content, not more
    /// definitions).
    fn collect_definitions(&self, session: &dyn StoreSession) -> Result<Vec<String>, StoreError> {
        let mut found = Vec::new();
        let mut pending = vec![self.definitions_path.clone()];
        while let Some(current) = pending.pop() {
            let is_root = current == self.definitions_path;
            let Some(data) = session.node(&current)? else {
                if is_root {
                    return Err(StoreError::NoSuchNode { path: current });
                }
                // Raced with a concurrent edit; the next pass will see it.
                continue;
            };
            if !is_root && data.is_definition() {
                found.push(current);
                continue;
            }
            let mut children = session.children(&current)?;
            children.reverse();
            for name in children {
                pending.push(path::join(&current, &name));
            }
        }
        Ok(found)
    }

    fn ensure_one(
        &self,
        session: &mut dyn StoreSession,
        def_path: &str,
    ) -> Result<Outcome, StoreError> {
        let data = session.node(def_path)?.ok_or_else(|| StoreError::NoSuchNode {
            path: def_path.to_string(),
        })?;
        if data.is_ignored() {
            return Ok(Outcome::Ignored);
        }

        let content = read_content(&*session, def_path)?;
        let fresh = fingerprint(&content);

        let rel = path::relative(&self.definitions_path, def_path).ok_or_else(|| {
            StoreError::InvalidPath {
                path: def_path.to_string(),
                reason: "definition is outside the definitions root",
            }
        })?;
        let target = path::join(&self.indexes_path, rel);

        let existing = session.node(&target)?;
        let recorded = existing
            .as_ref()
            .and_then(|node| node.property(PN_ENSURED_FINGERPRINT))
            .and_then(PropertyValue::as_str)
            .and_then(Fingerprint::from_hex);

        if existing.is_none() {
            self.apply(session, def_path, &target, &content, &fresh, false)?;
            Ok(Outcome::Created)
        } else if recorded == Some(fresh) {
            Ok(Outcome::UpToDate)
        } else {
            self.apply(session, def_path, &target, &content, &fresh, true)?;
            Ok(Outcome::Updated)
        }
    }

    /// Writes the definition onto the catalog node at `target` and records
    /// the fingerprint. Bookkeeping stays on the actual side; the definition
    /// itself is never touched.
    fn apply(
        &self,
        session: &mut dyn StoreSession,
        def_path: &str,
        target: &str,
        content: &DefinitionContent,
        fresh: &Fingerprint,
        exists: bool,
    ) -> Result<(), StoreError> {
        let mut properties = content.properties.clone();
        properties.insert(
            PN_ENSURED_FINGERPRINT.to_string(),
            PropertyValue::String(fresh.to_hex()),
        );

        if exists {
            session.set_properties(target, properties)?;
        } else {
            ensure_ancestors(session, target)?;
            session.create_node(
                target,
                NodeData {
                    node_type: NT_QUERY_INDEX_DEFINITION.to_string(),
                    properties,
                },
            )?;
        }
        copy_children(session, def_path, target)
    }
}

/// Reads the effective content of a definition subtree: all properties except
/// the reconciler-internal ones, plus the recursive content of the children.
fn read_content(
    session: &dyn StoreSession,
    node_path: &str,
) -> Result<DefinitionContent, StoreError> {
    let data = session.node(node_path)?.ok_or_else(|| StoreError::NoSuchNode {
        path: node_path.to_string(),
    })?;
    let mut content = DefinitionContent::new();
    content.properties = data
        .properties
        .into_iter()
        .filter(|(name, _)| !INTERNAL_PROPERTIES.contains(&name.as_str()))
        .collect();
    for name in session.children(node_path)? {
        let child = read_content(session, &path::join(node_path, &name))?;
        content.children.insert(name, child);
    }
    Ok(content)
}

/// Creates missing structural ancestors of `target`.
fn ensure_ancestors(session: &mut dyn StoreSession, target: &str) -> Result<(), StoreError> {
    let Some(parent) = path::parent(target) else {
        return Ok(());
    };
    if session.node(parent)?.is_some() {
        return Ok(());
    }
    ensure_ancestors(session, parent)?;
    session.create_node(parent, NodeData::new(NT_OAK_UNSTRUCTURED))
}

/// Recursively mirrors the configuration children of a definition onto the
/// catalog node. Existing catalog children are overwritten in place; stale
/// extras are left alone (index removal is out of scope).
fn copy_children(
    session: &mut dyn StoreSession,
    source: &str,
    target: &str,
) -> Result<(), StoreError> {
    for name in session.children(source)? {
        let source_child = path::join(source, &name);
        let target_child = path::join(target, &name);
        let Some(child) = session.node(&source_child)? else {
            continue;
        };
        let properties: BTreeMap<String, PropertyValue> = child
            .properties
            .iter()
            .filter(|(prop, _)| !INTERNAL_PROPERTIES.contains(&prop.as_str()))
            .map(|(prop, value)| (prop.clone(), value.clone()))
            .collect();
        if session.node(&target_child)?.is_some() {
            session.set_properties(&target_child, properties)?;
        } else {
            session.create_node(
                &target_child,
                NodeData {
                    node_type: child.node_type,
                    properties,
                },
            )?;
        }
        copy_children(session, &source_child, &target_child)?;
    }
    Ok(())
}
