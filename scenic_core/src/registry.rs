//! Node registry.
//!
//! Holds a weak reference to every live node by id, a name → ids multimap
//! (insertion order per name) and the frame subscriptions of update/event
//! nodes. Nodes insert themselves on construction and remove themselves when
//! their last handle drops.
//!
//! The registry never takes a node lock. Lookups clone the weak references
//! under the registry lock and upgrade them after releasing it, so a handle
//! dropped during a lookup can unregister without deadlocking.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use indexmap::IndexMap;
use log::error;
use rustc_hash::FxHashMap;
use scenic_ids::{IdAllocator, NodeId, SceneId};
use smallvec::SmallVec;

use crate::node::{Node, NodeRef};

#[derive(Default)]
struct RegistryMaps {
    by_id: IndexMap<NodeId, Weak<Node>>,
    by_name: FxHashMap<String, SmallVec<[NodeId; 2]>>,
    update: IndexMap<NodeId, Weak<Node>>,
    event: IndexMap<NodeId, Weak<Node>>,
}

#[derive(Default)]
pub struct NodeRegistry {
    ids: IdAllocator,
    maps: Mutex<RegistryMaps>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn maps(&self) -> MutexGuard<'_, RegistryMaps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next node id. Never nil.
    #[inline]
    pub fn next_id(&self) -> NodeId {
        self.ids.next_node_id()
    }

    pub(crate) fn register(&self, node: &NodeRef) {
        let id = node.id();
        let caps = node.capabilities();
        let weak = std::sync::Arc::downgrade(node);

        let mut maps = self.maps();
        if caps.update {
            maps.update.insert(id, weak.clone());
        }
        if caps.event {
            maps.event.insert(id, weak.clone());
        }
        maps.by_id.insert(id, weak);
    }

    /// Release callback: runs from the node's `Drop`.
    pub(crate) fn unregister(&self, id: NodeId, name: &str) {
        let mut maps = self.maps();
        maps.by_id.shift_remove(&id);
        maps.update.shift_remove(&id);
        maps.event.shift_remove(&id);
        remove_name(&mut maps.by_name, name, id);
    }

    /// Moves `id` from `old_name` to `new_name`. An empty old name skips the
    /// removal, an empty new name skips the insertion.
    pub fn change_registered_node(&self, id: NodeId, old_name: &str, new_name: &str) {
        let mut maps = self.maps();
        if !old_name.is_empty() {
            remove_name(&mut maps.by_name, old_name, id);
        }
        if !new_name.is_empty() {
            maps.by_name.entry(new_name.to_string()).or_default().push(id);
        }
    }

    // -------------------- Lookup --------------------

    pub fn node(&self, id: NodeId) -> Option<NodeRef> {
        let weak = self.maps().by_id.get(&id).cloned();
        weak.and_then(|w| w.upgrade())
    }

    fn candidates(&self, name: &str) -> SmallVec<[Weak<Node>; 2]> {
        let maps = self.maps();
        let Some(ids) = maps.by_name.get(name) else {
            return SmallVec::new();
        };
        ids.iter()
            .filter_map(|id| maps.by_id.get(id).cloned())
            .collect()
    }

    /// First node registered under `name`.
    pub fn node_by_name(&self, name: &str) -> Option<NodeRef> {
        self.candidates(name).iter().find_map(Weak::upgrade)
    }

    /// First node named `name` that was loaded from `filename`.
    pub fn node_in_file(&self, name: &str, filename: &Path) -> Option<NodeRef> {
        self.candidates(name)
            .iter()
            .filter_map(Weak::upgrade)
            .find(|n| n.environment().filename() == filename)
    }

    /// First node named `name` that belongs to scene `scene`.
    pub fn node_in_scene(&self, name: &str, scene: SceneId) -> Option<NodeRef> {
        self.candidates(name)
            .iter()
            .filter_map(Weak::upgrade)
            .find(|n| n.environment().scene_id() == scene)
    }

    /// All nodes named `name`, in registration order.
    pub fn nodes(&self, name: &str) -> Vec<NodeRef> {
        self.candidates(name)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.maps().by_id.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.maps().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        let maps = self.maps();
        maps.by_id.is_empty() && maps.by_name.is_empty()
    }

    // -------------------- Frame subscriptions --------------------

    /// Live update subscribers, optionally only those loaded by `library`.
    pub fn update_subscribers(&self, library: Option<&str>) -> Vec<NodeRef> {
        let weak: Vec<Weak<Node>> = self.maps().update.values().cloned().collect();
        weak.iter()
            .filter_map(Weak::upgrade)
            .filter(|n| library.is_none_or(|lib| n.environment().library() == lib))
            .collect()
    }

    pub fn event_subscribers(&self) -> Vec<NodeRef> {
        let weak: Vec<Weak<Node>> = self.maps().event.values().cloned().collect();
        weak.iter().filter_map(Weak::upgrade).collect()
    }
}

fn remove_name(by_name: &mut FxHashMap<String, SmallVec<[NodeId; 2]>>, name: &str, id: NodeId) {
    if name.is_empty() {
        return;
    }
    let Some(ids) = by_name.get_mut(name) else {
        return;
    };
    if let Some(pos) = ids.iter().position(|i| *i == id) {
        ids.remove(pos);
    }
    if ids.is_empty() {
        by_name.remove(name);
    }
}

impl Drop for NodeRegistry {
    fn drop(&mut self) {
        let maps = self.maps.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !maps.by_id.is_empty() || !maps.by_name.is_empty() {
            error!(
                "node registry destroyed with {} id entries and {} name entries",
                maps.by_id.len(),
                maps.by_name.len()
            );
            if !std::thread::panicking() {
                debug_assert!(maps.by_id.is_empty(), "node registry leaked entries");
            }
        }
    }
}
