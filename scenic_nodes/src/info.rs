use std::sync::Arc;

use scenic_core::{Access, Environment, MultiString, Node, NodeRef, PlainNode, SingleString};

/// Document title and free-form notes. Both fields are fixed once parsed.
pub struct WorldInfo;

impl WorldInfo {
    pub const TYPE: &'static str = "WorldInfo";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("title", SingleString::default(), Access::NONE)
                .register_field("info", MultiString::default(), Access::NONE);
        });
        Node::create(environment, spec, PlainNode)
    }
}
