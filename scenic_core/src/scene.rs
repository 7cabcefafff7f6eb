//! Scene roots.
//!
//! A scene is a grouping node whose environment names itself as the scene, plus
//! the document-level data (profile, META entries) and the timestamp its values
//! were parsed with. The scene id is the root node's id.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use scenic_ids::{SceneId, Timestamp};

use crate::environment::{Environment, RenderContext};
use crate::error::Result;
use crate::field::MultiNode;
use crate::grouping::{self, Grouping};
use crate::node::{Node, NodeRef};
use crate::registry::NodeRegistry;
use crate::routing::Route;
use crate::specification::SpecificationTable;

pub const SCENE_TYPE: &str = "Scene";

pub type SceneRef = Arc<Scene>;

#[derive(Debug)]
pub struct Scene {
    root: NodeRef,
    profile: Option<String>,
    meta: IndexMap<String, String>,
    timestamp: Timestamp,
}

impl Scene {
    pub fn new(
        registry: Arc<NodeRegistry>,
        specifications: Arc<SpecificationTable>,
        render_context: Option<Arc<dyn RenderContext>>,
        library: impl Into<Arc<str>>,
        filename: impl Into<PathBuf>,
        timestamp: Timestamp,
    ) -> Self {
        let id = registry.next_id();
        let spec = specifications.get_or_init(SCENE_TYPE, grouping::register_fields);
        let environment = Arc::new(Environment::new(
            registry,
            specifications,
            render_context,
            library,
            filename,
            id,
        ));
        let root = Node::create_with_id(id, environment, spec, Box::new(Grouping));
        Self {
            root,
            profile: None,
            meta: IndexMap::new(),
            timestamp,
        }
    }

    #[inline]
    pub fn id(&self) -> SceneId {
        self.root.id()
    }

    #[inline]
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// The environment every node of this scene is created with.
    #[inline]
    pub fn environment(&self) -> &Arc<Environment> {
        self.root.environment()
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn children(&self) -> Vec<NodeRef> {
        self.root
            .values::<Option<NodeRef>>(grouping::CHILDREN)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Replaces the top-level nodes, stamped with the scene timestamp.
    pub fn set_children(&self, children: Vec<NodeRef>) -> Result<()> {
        let value = MultiNode::with_timestamp(children.into_iter().map(Some).collect(), self.timestamp);
        self.root.set_field(grouping::CHILDREN, &value)
    }

    pub fn initialize(&self) {
        self.root.initialize(self.timestamp);
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn set_profile(&mut self, profile: impl Into<String>) {
        self.profile = Some(profile.into());
    }

    pub fn meta(&self) -> &IndexMap<String, String> {
        &self.meta
    }

    pub fn insert_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    /// First node named `name` in this scene.
    pub fn find(&self, name: &str) -> Option<NodeRef> {
        self.environment().registry().node_in_scene(name, self.id())
    }

    /// Every node reachable from the root through NODE fields, depth-first
    /// pre-order, each once. The root itself is not included.
    pub fn nodes(&self) -> Vec<NodeRef> {
        let mut seen = FxHashSet::default();
        seen.insert(self.id());
        let mut out = Vec::new();
        let mut stack: Vec<NodeRef> = self.root.referenced_nodes();
        stack.reverse();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id()) {
                continue;
            }
            let mut referenced = node.referenced_nodes();
            referenced.reverse();
            stack.extend(referenced);
            out.push(node);
        }
        out
    }

    /// Every ROUTE leaving a node of this scene, as (source, output field, route).
    pub fn routes(&self) -> Vec<(NodeRef, String, Route)> {
        let mut out = Vec::new();
        for node in std::iter::once(self.root.clone()).chain(self.nodes()) {
            for (field, route) in node.connections() {
                out.push((node.clone(), field, route));
            }
        }
        out
    }
}
