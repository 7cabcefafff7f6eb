use std::sync::Arc;

use scenic_core::{Access, DynamicNode, Environment, MultiString, Node, NodeRef};

/// Holds user-declared fields. Executing `url` is left to the host.
pub struct Script;

impl Script {
    pub const TYPE: &'static str = "Script";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("url", MultiString::default(), Access::GET_SET);
        });
        Node::create(environment, spec, DynamicNode)
    }
}

#[cfg(test)]
mod tests {
    use scenic_core::{SingleFloat, SingleTime};

    use super::*;
    use crate::testing;

    #[test]
    fn dynamic_fields_route_like_static_ones() {
        let env = testing::environment();
        let source = Script::create(&env);
        let target = Script::create(&env);
        assert!(source.is_dynamic());

        source.add_field("speed", &SingleFloat::new(1.0)).unwrap();
        target.add_field("speed", &SingleFloat::default()).unwrap();
        target.add_field("started", &SingleTime::default()).unwrap();
        assert!(source.add_connection("speed", target.id(), "speed"));

        source.set_field("speed", &SingleFloat::new(3.5)).unwrap();
        assert_eq!(target.value::<f32>("speed").unwrap(), 3.5);
        assert_eq!(target.dynamic_field_names(), ["speed", "started"]);
    }
}
