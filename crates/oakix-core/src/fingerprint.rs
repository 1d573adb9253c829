//! Content fingerprinting for ensure definitions.
//!
//! A fingerprint is a SHA-256 digest over a canonical encoding of a
//! definition's effective content: its property mapping plus, recursively,
//! the content of its child nodes. The encoding is length-prefixed and walks
//! `BTreeMap`s, so it is independent of property insertion order and of any
//! serialization framework. Two distinguishable content trees collide only
//! with negligible probability; re-reading identical content always yields
//! the same digest, which is what makes the skip decision idempotent.
//!
//! The digest input starts with a versioned domain string. Bump the version
//! if the encoding ever changes, so stale recorded fingerprints read as
//! "different" and force one re-apply instead of silently comparing across
//! encodings.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::tree::PropertyValue;

/// Domain-separation prefix mixed into every fingerprint.
const FINGERPRINT_DOMAIN: &[u8] = b"oakix:fingerprint:v1";

/// Value-encoding tags. Distinct tags keep e.g. `Long(1)` and `Bool(true)`
/// from encoding identically.
const TAG_BOOL: u8 = 0;
const TAG_LONG: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_STRINGS: u8 = 4;

/// A 256-bit content fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Renders the canonical lowercase-hex text form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the canonical text form. Returns `None` for anything that is
    /// not exactly 64 hex characters.
    pub fn from_hex(text: &str) -> Option<Self> {
        let bytes = hex::decode(text).ok()?;
        let digest: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(digest))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// The effective content of one definition: its property mapping and the
/// recursive content of its children. Node types and reconciler-internal
/// properties are not part of the content; callers strip them before
/// fingerprinting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionContent {
    /// Property name to value.
    pub properties: BTreeMap<String, PropertyValue>,

    /// Child name to child content.
    pub children: BTreeMap<String, DefinitionContent>,
}

impl DefinitionContent {
    /// Creates empty content.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style property insertion.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Builder-style child insertion.
    #[must_use]
    pub fn with_child(mut self, name: impl Into<String>, child: DefinitionContent) -> Self {
        self.children.insert(name.into(), child);
        self
    }
}

/// Computes the fingerprint of a definition's content.
///
/// Pure function of the supplied content: no paths, no timestamps, no store
/// access.
pub fn fingerprint(content: &DefinitionContent) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hash_content(&mut hasher, content);
    Fingerprint(hasher.finalize().into())
}

fn hash_content(hasher: &mut Sha256, content: &DefinitionContent) {
    hash_len(hasher, content.properties.len());
    for (name, value) in &content.properties {
        hash_str(hasher, name);
        hash_value(hasher, value);
    }
    hash_len(hasher, content.children.len());
    for (name, child) in &content.children {
        hash_str(hasher, name);
        hash_content(hasher, child);
    }
}

fn hash_value(hasher: &mut Sha256, value: &PropertyValue) {
    match value {
        PropertyValue::Bool(b) => {
            hasher.update([TAG_BOOL, u8::from(*b)]);
        }
        PropertyValue::Long(n) => {
            hasher.update([TAG_LONG]);
            hasher.update(n.to_be_bytes());
        }
        PropertyValue::Double(d) => {
            hasher.update([TAG_DOUBLE]);
            hasher.update(d.to_bits().to_be_bytes());
        }
        PropertyValue::String(s) => {
            hasher.update([TAG_STRING]);
            hash_str(hasher, s);
        }
        PropertyValue::Strings(items) => {
            hasher.update([TAG_STRINGS]);
            hash_len(hasher, items.len());
            for item in items {
                hash_str(hasher, item);
            }
        }
    }
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hash_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn hash_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_be_bytes());
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn lucene_content() -> DefinitionContent {
        DefinitionContent::new()
            .with_property("type", "lucene")
            .with_property("async", "async")
            .with_property("reindexCount", 3_i64)
            .with_child(
                "indexRules",
                DefinitionContent::new().with_child(
                    "nt:base",
                    DefinitionContent::new().with_property(
                        "includedPaths",
                        vec!["/content".to_string(), "/apps".to_string()],
                    ),
                ),
            )
    }

    #[test]
    fn identical_content_identical_fingerprint() {
        assert_eq!(fingerprint(&lucene_content()), fingerprint(&lucene_content()));
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let forward = DefinitionContent::new()
            .with_property("alpha", "1")
            .with_property("beta", "2");
        let reverse = DefinitionContent::new()
            .with_property("beta", "2")
            .with_property("alpha", "1");
        assert_eq!(fingerprint(&forward), fingerprint(&reverse));
    }

    #[test]
    fn any_property_change_changes_the_fingerprint() {
        let base = lucene_content();
        let changed_value = lucene_content().with_property("type", "property");
        let added = lucene_content().with_property("extra", true);
        assert_ne!(fingerprint(&base), fingerprint(&changed_value));
        assert_ne!(fingerprint(&base), fingerprint(&added));
    }

    #[test]
    fn child_content_participates() {
        let base = lucene_content();
        let deeper = lucene_content().with_child(
            "indexRules",
            DefinitionContent::new().with_child(
                "nt:base",
                DefinitionContent::new()
                    .with_property("includedPaths", vec!["/content".to_string()]),
            ),
        );
        assert_ne!(fingerprint(&base), fingerprint(&deeper));
    }

    #[test]
    fn value_type_is_part_of_the_content() {
        let as_long = DefinitionContent::new().with_property("v", 1_i64);
        let as_bool = DefinitionContent::new().with_property("v", true);
        let as_string = DefinitionContent::new().with_property("v", "1");
        assert_ne!(fingerprint(&as_long), fingerprint(&as_bool));
        assert_ne!(fingerprint(&as_long), fingerprint(&as_string));
    }

    #[test]
    fn list_boundaries_do_not_collide() {
        // ["ab"] vs ["a", "b"] must hash differently.
        let joined = DefinitionContent::new().with_property("v", vec!["ab".to_string()]);
        let split = DefinitionContent::new()
            .with_property("v", vec!["a".to_string(), "b".to_string()]);
        assert_ne!(fingerprint(&joined), fingerprint(&split));
    }

    #[test]
    fn hex_round_trip() {
        let fp = fingerprint(&lucene_content());
        let text = fp.to_hex();
        assert_eq!(text.len(), 64);
        assert_eq!(Fingerprint::from_hex(&text), Some(fp));
        assert_eq!(Fingerprint::from_hex("not-hex"), None);
        assert_eq!(Fingerprint::from_hex("abcd"), None);
    }

    fn arb_value() -> impl Strategy<Value = PropertyValue> {
        prop_oneof![
            any::<bool>().prop_map(PropertyValue::Bool),
            any::<i64>().prop_map(PropertyValue::Long),
            "[a-z/:]{0,12}".prop_map(PropertyValue::String),
            proptest::collection::vec("[a-z]{0,6}", 0..4).prop_map(PropertyValue::Strings),
        ]
    }

    fn arb_properties() -> impl Strategy<Value = Vec<(String, PropertyValue)>> {
        proptest::collection::vec(("[a-z:]{1,10}", arb_value()), 0..8)
    }

    proptest! {
        #[test]
        fn fingerprint_is_stable_under_insertion_order(entries in arb_properties()) {
            // Duplicate keys would make forward and reverse insertion keep
            // different winners; drop them first.
            let mut seen = std::collections::HashSet::new();
            let entries: Vec<_> = entries
                .into_iter()
                .filter(|(name, _)| seen.insert(name.clone()))
                .collect();
            let forward = DefinitionContent {
                properties: entries.iter().cloned().collect(),
                children: BTreeMap::new(),
            };
            let reverse = DefinitionContent {
                properties: entries.iter().rev().cloned().collect(),
                children: BTreeMap::new(),
            };
            prop_assert_eq!(fingerprint(&forward), fingerprint(&reverse));
        }

        #[test]
        fn changing_one_value_changes_the_fingerprint(
            entries in arb_properties(),
            replacement in arb_value(),
        ) {
            let base = DefinitionContent {
                properties: entries.clone().into_iter().collect(),
                children: BTreeMap::new(),
            };
            if let Some((name, original)) = base.properties.iter().next() {
                prop_assume!(*original != replacement);
                let mut mutated = base.clone();
                mutated.properties.insert(name.clone(), replacement);
                prop_assert_ne!(fingerprint(&base), fingerprint(&mutated));
            }
        }
    }
}
