//! Process-scoped identifiers for scene nodes.
//! IDs are plain monotonic u64 values handed out by an `IdAllocator`. 0 = nil and is never issued.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Defines a monotonic ID type.
macro_rules! define_id {
    ($type_name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $type_name(pub u64);

        impl $type_name {
            #[inline]
            pub const fn nil() -> Self {
                Self(0)
            }

            #[inline]
            pub const fn as_u64(self) -> u64 {
                self.0
            }

            #[inline]
            pub const fn from_u64(value: u64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn is_nil(self) -> bool {
                self.0 == 0
            }
        }

        impl Default for $type_name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Debug for $type_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($type_name), "({})"), self.0)
            }
        }

        impl fmt::Display for $type_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    NodeId,
    "Node ID, allocated by the node registry when a node is constructed. Unique per registry."
);

/// A scene is identified by the node id of its root node.
pub type SceneId = NodeId;

/// Locked monotonic counter issuing node ids. One per registry.
#[derive(Debug)]
pub struct IdAllocator {
    last: AtomicU64,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns the next id. Never returns nil.
    #[inline]
    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.last.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// The most recently issued id (nil before the first call).
    #[inline]
    pub fn last(&self) -> NodeId {
        NodeId(self.last.load(Ordering::Acquire))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
