//! Change events emitted by the store's observation facility.
//!
//! Events are transient: they are produced by a mutating session, delivered
//! in batches to registered callbacks, and never persisted. Registration
//! filters by a path scope and an [`EventKinds`] mask.

use std::time::SystemTime;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Registration mask selecting which event kinds a subscription receives.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventKinds: u8 {
        const NODE_ADDED = 1;
        const NODE_REMOVED = 1 << 1;
        const NODE_MOVED = 1 << 2;
        const PROPERTY_ADDED = 1 << 3;
        const PROPERTY_CHANGED = 1 << 4;
        const PROPERTY_REMOVED = 1 << 5;
    }
}

/// The kind of a single change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeAdded,
    NodeRemoved,
    NodeMoved,
    PropertyAdded,
    PropertyChanged,
    PropertyRemoved,
}

impl EventKind {
    /// The mask bit selecting this kind.
    pub const fn mask(self) -> EventKinds {
        match self {
            Self::NodeAdded => EventKinds::NODE_ADDED,
            Self::NodeRemoved => EventKinds::NODE_REMOVED,
            Self::NodeMoved => EventKinds::NODE_MOVED,
            Self::PropertyAdded => EventKinds::PROPERTY_ADDED,
            Self::PropertyChanged => EventKinds::PROPERTY_CHANGED,
            Self::PropertyRemoved => EventKinds::PROPERTY_REMOVED,
        }
    }

    /// Stable label for diagnostics.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NodeAdded => "NODE_ADDED",
            Self::NodeRemoved => "NODE_REMOVED",
            Self::NodeMoved => "NODE_MOVED",
            Self::PropertyAdded => "PROPERTY_ADDED",
            Self::PropertyChanged => "PROPERTY_CHANGED",
            Self::PropertyRemoved => "PROPERTY_REMOVED",
        }
    }
}

/// An immutable change record delivered to observation callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: EventKind,

    /// Absolute path of the affected node (the owning node for property
    /// events).
    pub path: String,

    /// Wall-clock time the event was handed to the dispatcher.
    pub delivered_at: SystemTime,
}

impl ChangeEvent {
    /// Creates an event stamped with the current time.
    pub fn now(kind: EventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            delivered_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_distinct_mask_bit() {
        let kinds = [
            EventKind::NodeAdded,
            EventKind::NodeRemoved,
            EventKind::NodeMoved,
            EventKind::PropertyAdded,
            EventKind::PropertyChanged,
            EventKind::PropertyRemoved,
        ];
        let mut seen = EventKinds::empty();
        for kind in kinds {
            assert!(!seen.intersects(kind.mask()), "duplicate bit for {kind:?}");
            seen |= kind.mask();
        }
        assert_eq!(seen, EventKinds::all());
    }

    #[test]
    fn labels_match_kind_names() {
        assert_eq!(EventKind::NodeAdded.label(), "NODE_ADDED");
        assert_eq!(EventKind::PropertyChanged.label(), "PROPERTY_CHANGED");
    }
}
