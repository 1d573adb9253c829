//! Node data model for the hierarchical store.
//!
//! A node is a node type plus a mapping of property name to property value.
//! Property ordering is irrelevant; the mapping uses a `BTreeMap` so every
//! consumer (fingerprinting, the in-memory store, tests) observes one
//! canonical order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Node type marking a node as an ensure definition.
pub const NT_OAK_UNSTRUCTURED: &str = "oak:Unstructured";

/// Node type assigned to index nodes created in the index catalog.
pub const NT_QUERY_INDEX_DEFINITION: &str = "oak:QueryIndexDefinition";

/// Bookkeeping property on an actual index recording the definition
/// fingerprint in effect when the index was last applied.
pub const PN_ENSURED_FINGERPRINT: &str = "ensured-fingerprint";

/// Optional boolean property on a definition; when `true` the definition is
/// skipped entirely by convergence.
pub const PN_IGNORE: &str = "ignore";

/// Properties that steer the reconciler itself. They are excluded from
/// fingerprint input and never copied onto an actual index.
pub const INTERNAL_PROPERTIES: [&str; 2] = [PN_ENSURED_FINGERPRINT, PN_IGNORE];

/// A property value. The variant set mirrors what index definitions actually
/// carry: scalars plus multi-valued strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Strings(Vec<String>),
}

impl PropertyValue {
    /// Returns the string payload if this is a [`PropertyValue::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload if this is a [`PropertyValue::Bool`].
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        Self::Strings(value)
    }
}

/// The content of a single store node: its node type and property mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Node type discriminator.
    pub node_type: String,

    /// Property name to property value. Keys are unique; ordering carries no
    /// meaning.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl NodeData {
    /// Creates an empty node of the given type.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property insertion.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// A definition node is distinguished from structural nodes by its node
    /// type.
    pub fn is_definition(&self) -> bool {
        self.node_type == NT_OAK_UNSTRUCTURED
    }

    /// Returns `true` if the definition opted out of convergence.
    pub fn is_ignored(&self) -> bool {
        matches!(self.properties.get(PN_IGNORE), Some(PropertyValue::Bool(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_discriminator() {
        let def = NodeData::new(NT_OAK_UNSTRUCTURED);
        let folder = NodeData::new("nt:folder");
        assert!(def.is_definition());
        assert!(!folder.is_definition());
    }

    #[test]
    fn ignore_flag_requires_true_bool() {
        let ignored = NodeData::new(NT_OAK_UNSTRUCTURED).with_property(PN_IGNORE, true);
        let enabled = NodeData::new(NT_OAK_UNSTRUCTURED).with_property(PN_IGNORE, false);
        let stringly = NodeData::new(NT_OAK_UNSTRUCTURED).with_property(PN_IGNORE, "true");
        assert!(ignored.is_ignored());
        assert!(!enabled.is_ignored());
        assert!(!stringly.is_ignored());
    }

    #[test]
    fn builder_overwrites_duplicate_keys() {
        let node = NodeData::new(NT_OAK_UNSTRUCTURED)
            .with_property("type", "lucene")
            .with_property("type", "property");
        assert_eq!(node.property("type"), Some(&PropertyValue::from("property")));
        assert_eq!(node.properties.len(), 1);
    }

    #[test]
    fn property_value_json_shapes() {
        let json = serde_json::to_string(&PropertyValue::Strings(vec![
            "jcr:title".to_string(),
            "jcr:text".to_string(),
        ]))
        .unwrap();
        assert_eq!(json, r#"["jcr:title","jcr:text"]"#);

        let back: PropertyValue = serde_json::from_str("42").unwrap();
        assert_eq!(back, PropertyValue::Long(42));
    }
}
