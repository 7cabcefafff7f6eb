//! `Group` and `Transform`.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use scenic_core::grouping::{self, Grouping};
use scenic_core::{
    Access, Environment, Field, Node, NodeBehavior, NodeContext, NodeRef, Result, Rotation,
    SingleRotation, SingleVector3, Timestamp,
};

pub struct Group;

impl Group {
    pub const TYPE: &'static str = "Group";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment
            .specifications()
            .get_or_init(Self::TYPE, grouping::register_fields);
        Node::create(environment, spec, Grouping)
    }
}

/// A group placing its children with translation, rotation about `center`,
/// and scale.
pub struct Transform;

impl Transform {
    pub const TYPE: &'static str = "Transform";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            grouping::register_fields(spec);
            spec.register_field("translation", SingleVector3::default(), Access::GET_SET)
                .register_field("rotation", SingleRotation::default(), Access::GET_SET)
                .register_field("scale", SingleVector3::new(Vec3::ONE), Access::GET_SET)
                .register_field("center", SingleVector3::default(), Access::GET_SET);
        });
        Node::create(environment, spec, TransformBehavior)
    }

    /// Local-to-parent matrix: `T * C * R * S * -C`.
    pub fn matrix(node: &Node) -> Result<Mat4> {
        let translation = node.value::<Vec3>("translation")?;
        let rotation = node.value::<Rotation>("rotation")?;
        let scale = node.value::<Vec3>("scale")?;
        let center = node.value::<Vec3>("center")?;
        Ok(Mat4::from_translation(translation + center)
            * Mat4::from_quat(rotation.to_quat())
            * Mat4::from_scale(scale)
            * Mat4::from_translation(-center))
    }
}

struct TransformBehavior;

impl NodeBehavior for TransformBehavior {
    fn on_adopt(&self, ctx: &mut NodeContext<'_>) {
        grouping::adopt(ctx);
    }

    fn on_initialize(&self, ctx: &mut NodeContext<'_>, timestamp: Timestamp) {
        grouping::initialize(ctx, timestamp);
    }

    fn on_field_changing(&self, ctx: &mut NodeContext<'_>, name: &str, value: &dyn Field) -> bool {
        grouping::field_changing(ctx, name, value).unwrap_or_else(|| ctx.assign(name, value))
    }

    fn on_destroy(&self, node: &Node) {
        grouping::destroy(node);
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use scenic_core::{MultiNode, NodeFactory};

    use super::*;
    use crate::Catalog;
    use crate::testing;

    #[test]
    fn transform_matrix() {
        let env = testing::environment();
        let node = Transform::create(&env);
        assert_eq!(Transform::matrix(&node).unwrap(), Mat4::IDENTITY);

        node.set_field("translation", &SingleVector3::new(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        node.set_field("scale", &SingleVector3::new(Vec3::splat(2.0)))
            .unwrap();
        let rotation = Rotation::from_axis_angle(Vec3::Z, FRAC_PI_2).unwrap();
        node.set_field("rotation", &SingleRotation::new(rotation)).unwrap();

        let p = Transform::matrix(&node).unwrap().transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 4.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn transform_groups_children() {
        let env = testing::environment();
        let parent = Transform::create(&env);
        let child = Catalog.create_node("Shape", &env).unwrap();
        parent
            .init_field("children", &MultiNode::new(vec![Some(child.clone())]))
            .unwrap();
        parent.initialize(Timestamp::new(0.0));
        assert_eq!(child.parents(), [(parent.id(), 1)]);

        parent
            .set_field("removeChildren", &MultiNode::new(vec![Some(child.clone())]))
            .unwrap();
        assert!(child.parents().is_empty());
        assert!(parent.values::<Option<NodeRef>>("children").unwrap().is_empty());
    }

    #[test]
    fn group_rejects_itself_as_child() {
        let env = testing::environment();
        let group = Group::create(&env);
        group.initialize(Timestamp::new(0.0));
        group
            .set_field("addChildren", &MultiNode::new(vec![Some(group.clone())]))
            .unwrap();
        assert!(group.values::<Option<NodeRef>>("children").unwrap().is_empty());
    }
}
