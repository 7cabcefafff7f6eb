//! Shared fixtures for unit tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use scenic_ids::NodeId;

use crate::environment::{Environment, RenderContext, RenderObject};
use crate::field::{MultiNode, SingleFloat, SingleVector3};
use crate::grouping;
use crate::node::{Node, NodeRef, PlainNode};
use crate::registry::NodeRegistry;
use crate::specification::{Access, SpecificationTable};

pub(crate) fn environment() -> Arc<Environment> {
    Arc::new(Environment::new(
        Arc::new(NodeRegistry::new()),
        Arc::new(SpecificationTable::new()),
        None,
        "test",
        PathBuf::from("test.wrl"),
        NodeId::nil(),
    ))
}

/// A field-less node of `type_name`.
pub(crate) fn plain(env: &Arc<Environment>, type_name: &str) -> NodeRef {
    let spec = env.specifications().get_or_init(type_name, |_| {});
    Node::create(env, spec, PlainNode)
}

/// `value` (GET|SET), `input` (SET), `output` (GET), `inert` (NONE).
pub(crate) fn probe(env: &Arc<Environment>) -> NodeRef {
    let spec = env.specifications().get_or_init("Probe", |spec| {
        spec.register_field("value", SingleFloat::default(), Access::GET_SET)
            .register_field("input", SingleFloat::default(), Access::SET)
            .register_field("output", SingleFloat::default(), Access::GET)
            .register_field("inert", SingleFloat::default(), Access::NONE)
            .register_field("position", SingleVector3::default(), Access::GET_SET)
            .register_field("link", MultiNode::default(), Access::GET_SET);
    });
    Node::create(env, spec, PlainNode)
}

pub(crate) fn group(env: &Arc<Environment>) -> NodeRef {
    let spec = env
        .specifications()
        .get_or_init("Group", grouping::register_fields);
    Node::create(env, spec, grouping::Grouping)
}

/// Records attach/detach calls as (parent node, child node) pairs.
#[derive(Default)]
pub(crate) struct RecordingContext {
    pub(crate) attached: Mutex<Vec<(NodeId, NodeId)>>,
    pub(crate) detached: Mutex<Vec<(NodeId, NodeId)>>,
}

fn node_of(object: &RenderObject) -> NodeId {
    object.downcast_ref::<NodeId>().copied().unwrap_or_default()
}

impl RenderContext for RecordingContext {
    fn create_object(&self, _node_type: &str, node: NodeId) -> Option<RenderObject> {
        Some(Arc::new(node))
    }

    fn attach(&self, parent: &RenderObject, child: &RenderObject) {
        self.attached
            .lock()
            .unwrap()
            .push((node_of(parent), node_of(child)));
    }

    fn detach(&self, parent: &RenderObject, child: &RenderObject) {
        self.detached
            .lock()
            .unwrap()
            .push((node_of(parent), node_of(child)));
    }
}
