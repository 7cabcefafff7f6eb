//! Geometry and appearance data nodes.
//!
//! These carry no behaviour of their own; a rendering backend reads their
//! fields when it builds objects.

use std::sync::Arc;

use glam::Vec3;
use scenic_core::{
    Access, Color, Environment, Node, NodeRef, PlainNode, SingleColor, SingleFloat, SingleNode,
    SingleVector3,
};

pub struct Shape;

impl Shape {
    pub const TYPE: &'static str = "Shape";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("appearance", SingleNode::default(), Access::GET_SET)
                .register_field("geometry", SingleNode::default(), Access::GET_SET);
        });
        Node::create(environment, spec, PlainNode)
    }
}

pub struct Appearance;

impl Appearance {
    pub const TYPE: &'static str = "Appearance";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("material", SingleNode::default(), Access::GET_SET);
        });
        Node::create(environment, spec, PlainNode)
    }
}

pub struct Material;

impl Material {
    pub const TYPE: &'static str = "Material";

    pub const DIFFUSE_COLOR: Color = Color::rgb(0.8, 0.8, 0.8);

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("diffuseColor", SingleColor::new(Self::DIFFUSE_COLOR), Access::GET_SET)
                .register_field("emissiveColor", SingleColor::default(), Access::GET_SET)
                .register_field("specularColor", SingleColor::default(), Access::GET_SET)
                .register_field("ambientIntensity", SingleFloat::new(0.2), Access::GET_SET)
                .register_field("shininess", SingleFloat::new(0.2), Access::GET_SET)
                .register_field("transparency", SingleFloat::default(), Access::GET_SET);
        });
        Node::create(environment, spec, PlainNode)
    }
}

/// The `Box` geometry. Its size is fixed once parsed.
pub struct BoxGeometry;

impl BoxGeometry {
    pub const TYPE: &'static str = "Box";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("size", SingleVector3::new(Vec3::splat(2.0)), Access::NONE);
        });
        Node::create(environment, spec, PlainNode)
    }
}
