use std::sync::Arc;

use scenic_core::{
    Access, Environment, Field, Node, NodeBehavior, NodeContext, NodeRef, SingleBool,
};

/// Splits a boolean event: `set_boolean` TRUE emits `inputTrue`, FALSE emits
/// `inputFalse`, and either emits the negation on `inputNegate`.
pub struct BooleanFilter;

impl BooleanFilter {
    pub const TYPE: &'static str = "BooleanFilter";

    pub fn create(environment: &Arc<Environment>) -> NodeRef {
        let spec = environment.specifications().get_or_init(Self::TYPE, |spec| {
            spec.register_field("set_boolean", SingleBool::default(), Access::SET_EXPLICIT)
                .register_field("inputTrue", SingleBool::default(), Access::GET)
                .register_field("inputFalse", SingleBool::default(), Access::GET)
                .register_field("inputNegate", SingleBool::default(), Access::GET);
        });
        Node::create(environment, spec, FilterBehavior)
    }
}

struct FilterBehavior;

impl NodeBehavior for FilterBehavior {
    fn on_field_changing(&self, ctx: &mut NodeContext<'_>, name: &str, value: &dyn Field) -> bool {
        if name != "set_boolean" {
            return ctx.assign(name, value);
        }
        let Some(input) = value.try_cast::<SingleBool>() else {
            return false;
        };
        let (b, timestamp) = (*input.value(), input.timestamp());
        let output = if b { "inputTrue" } else { "inputFalse" };
        ctx.emit(output, &SingleBool::with_timestamp(true, timestamp))
            && ctx.emit("inputNegate", &SingleBool::with_timestamp(!b, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use scenic_core::{NodeError, SingleInt, Timestamp};

    use super::*;
    use crate::testing;

    #[test]
    fn splits_and_negates() {
        let env = testing::environment();
        let filter = BooleanFilter::create(&env);
        filter
            .set_field("set_boolean", &SingleBool::with_timestamp(false, Timestamp::new(4.0)))
            .unwrap();
        assert!(filter.value::<bool>("inputFalse").unwrap());
        assert!(!filter.value::<bool>("inputTrue").unwrap());
        assert!(filter.value::<bool>("inputNegate").unwrap());
        let negate = filter.get::<SingleBool>("inputNegate").unwrap();
        assert_eq!(negate.timestamp(), Timestamp::new(4.0));

        assert_eq!(
            filter.set_field("set_boolean", &SingleInt::new(1)),
            Err(NodeError::Rejected("set_boolean".into()))
        );
        assert!(matches!(
            filter.set_field("inputTrue", &SingleBool::new(false)),
            Err(NodeError::AccessDenied { .. })
        ));
    }

    #[test]
    fn outputs_are_routed() {
        let env = testing::environment();
        let first = BooleanFilter::create(&env);
        let second = BooleanFilter::create(&env);
        first.add_connection("inputTrue", second.id(), "set_boolean");

        first.set_field("set_boolean", &SingleBool::new(true)).unwrap();
        assert!(second.value::<bool>("inputTrue").unwrap());
        assert!(!second.value::<bool>("inputNegate").unwrap());
    }
}
