//! ROUTE table entries and the per-thread cascade stack.
//!
//! A field change forwards synchronously along its routes. The cascade stack
//! holds every (node, field) currently being set on this thread, so a route
//! that leads back to a pair already being set higher up is skipped instead of
//! recursing forever. Diamonds still deliver once per path.

use std::cell::RefCell;
use std::fmt;

use scenic_ids::NodeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    pub target: NodeId,
    pub field: String,
}

impl Route {
    pub fn new(target: NodeId, field: impl Into<String>) -> Self {
        Self {
            target,
            field: field.into(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.target, self.field)
    }
}

thread_local! {
    static CASCADE: RefCell<Vec<(NodeId, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks (node, field) as being set until dropped.
pub(crate) struct CascadeGuard(());

impl Drop for CascadeGuard {
    fn drop(&mut self) {
        CASCADE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// `None` when (node, field) is already being set on this thread.
pub(crate) fn enter(node: NodeId, field: &str) -> Option<CascadeGuard> {
    CASCADE.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.iter().any(|(id, f)| *id == node && f == field) {
            return None;
        }
        stack.push((node, field.to_string()));
        Some(CascadeGuard(()))
    })
}

/// Current cascade depth on this thread.
pub fn cascade_depth() -> usize {
    CASCADE.with(|stack| stack.borrow().len())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use scenic_ids::Timestamp;

    use super::*;
    use crate::environment::Environment;
    use crate::error::NodeError;
    use crate::field::{Field, SingleFloat, SingleInt};
    use crate::node::{Node, NodeBehavior, NodeContext, NodeRef};
    use crate::specification::Access;
    use crate::testing;

    #[test]
    fn reentry_is_refused_until_guard_drops() {
        let a = NodeId::from_u64(1);
        let outer = enter(a, "translation").unwrap();
        assert!(enter(a, "translation").is_none());

        {
            let _inner = enter(a, "rotation").unwrap();
            assert_eq!(cascade_depth(), 2);
        }
        assert_eq!(cascade_depth(), 1);

        drop(outer);
        assert_eq!(cascade_depth(), 0);
        assert!(enter(a, "translation").is_some());
    }

    #[test]
    fn route_forwards_value_and_timestamp() {
        let env = testing::environment();
        let a = testing::probe(&env);
        let b = testing::probe(&env);
        assert!(a.add_connection("value", b.id(), "input"));

        let ts = Timestamp::new(42.0);
        a.set_field("value", &SingleFloat::with_timestamp(0.25, ts))
            .unwrap();

        let got = b.get::<SingleFloat>("input").unwrap();
        assert_eq!(*got.value(), 0.25);
        assert_eq!(got.timestamp(), ts);
        assert_eq!(cascade_depth(), 0);
    }

    #[test]
    fn add_connection_is_idempotent() {
        let env = testing::environment();
        let a = testing::probe(&env);
        let b = testing::probe(&env);

        assert!(a.add_connection("value", b.id(), "input"));
        assert!(!a.add_connection("value", b.id(), "input"));
        assert!(a.add_connection("value", b.id(), "value"));
        assert_eq!(a.connections().len(), 2);

        assert!(a.remove_connection("value", b.id(), "value"));
        assert!(!a.remove_connection("value", b.id(), "value"));
        assert_eq!(a.connections(), vec![("value".to_string(), Route::new(b.id(), "input"))]);
    }

    #[test]
    fn fields_without_get_do_not_forward() {
        let env = testing::environment();
        let a = testing::probe(&env);
        let b = testing::probe(&env);
        a.add_connection("input", b.id(), "input");

        a.set_field("input", &SingleFloat::new(1.0)).unwrap();
        assert_eq!(b.value::<f32>("input").unwrap(), 0.0);
    }

    #[test]
    fn missing_target_is_skipped() {
        let env = testing::environment();
        let a = testing::probe(&env);
        let b = testing::probe(&env);
        let c = testing::probe(&env);
        let gone = b.id();
        a.add_connection("value", gone, "input");
        a.add_connection("value", c.id(), "input");
        drop(b);

        a.set_field("value", &SingleFloat::new(3.0)).unwrap();
        assert_eq!(c.value::<f32>("input").unwrap(), 3.0);
    }

    #[test]
    fn failing_hop_does_not_abort_fan_out() {
        let env = testing::environment();
        let a = testing::probe(&env);
        let b = testing::probe(&env);
        let c = testing::probe(&env);
        // GET-only target and type-mismatched target both fail
        a.add_connection("value", b.id(), "output");
        a.add_connection("value", b.id(), "position");
        a.add_connection("value", c.id(), "input");

        a.set_field("value", &SingleFloat::new(8.0)).unwrap();
        assert_eq!(b.value::<f32>("output").unwrap(), 0.0);
        assert_eq!(c.value::<f32>("input").unwrap(), 8.0);
    }

    /// Counts `on_field_changed` calls for `value`.
    struct Counter(Arc<AtomicUsize>);

    impl NodeBehavior for Counter {
        fn on_field_changed(&self, _ctx: &mut NodeContext<'_>, name: &str) {
            if name == "value" {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn counter(env: &Arc<Environment>, hits: &Arc<AtomicUsize>) -> NodeRef {
        let spec = env.specifications().get_or_init("Counter", |spec| {
            spec.register_field("value", SingleFloat::default(), Access::GET_SET);
        });
        let node = Node::create(env, spec, Counter(hits.clone()));
        node.initialize(Timestamp::new(0.0));
        node
    }

    #[test]
    fn self_route_notifies_once() {
        let env = testing::environment();
        let hits = Arc::new(AtomicUsize::new(0));
        let a = counter(&env, &hits);
        a.add_connection("value", a.id(), "value");

        a.set_field("value", &SingleFloat::new(4.0)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(a.value::<f32>("value").unwrap(), 4.0);
    }

    #[test]
    fn two_node_loop_terminates() {
        let env = testing::environment();
        let hits = Arc::new(AtomicUsize::new(0));
        let a = counter(&env, &hits);
        let b = counter(&env, &hits);
        a.add_connection("value", b.id(), "value");
        b.add_connection("value", a.id(), "value");

        a.set_field("value", &SingleFloat::new(1.0)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(b.value::<f32>("value").unwrap(), 1.0);
    }

    #[test]
    fn diamond_delivers_once_per_path() {
        let env = testing::environment();
        let hits = Arc::new(AtomicUsize::new(0));
        let top = testing::probe(&env);
        let left = testing::probe(&env);
        let right = testing::probe(&env);
        let bottom = counter(&env, &hits);

        top.add_connection("value", left.id(), "value");
        top.add_connection("value", right.id(), "value");
        left.add_connection("value", bottom.id(), "value");
        right.add_connection("value", bottom.id(), "value");

        top.set_field("value", &SingleFloat::new(2.0)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_field_errors() {
        let env = testing::environment();
        let a = testing::probe(&env);

        assert!(matches!(
            a.set_field("output", &SingleFloat::new(1.0)),
            Err(NodeError::AccessDenied { .. })
        ));
        assert!(matches!(
            a.set_field("inert", &SingleFloat::new(1.0)),
            Err(NodeError::AccessDenied { .. })
        ));
        assert!(matches!(
            a.set_field("value", &SingleInt::new(1)),
            Err(NodeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            a.set_field("nope", &SingleFloat::new(1.0)),
            Err(NodeError::FieldNotFound { .. })
        ));
        assert_eq!(a.value::<f32>("value").unwrap(), 0.0);
    }

    #[test]
    fn emit_bypasses_access_and_forwards() {
        let env = testing::environment();
        let a = testing::probe(&env);
        let b = testing::probe(&env);
        a.add_connection("output", b.id(), "input");

        a.emit_field("output", &SingleFloat::new(6.0)).unwrap();
        assert_eq!(a.value::<f32>("output").unwrap(), 6.0);
        assert_eq!(b.value::<f32>("input").unwrap(), 6.0);
    }

    #[test]
    fn init_field_writes_inert_fields() {
        let env = testing::environment();
        let a = testing::probe(&env);
        a.init_field("inert", &SingleFloat::new(9.0)).unwrap();
        assert_eq!(a.value::<f32>("inert").unwrap(), 9.0);
        assert!(a.init_field("inert", &SingleInt::new(9)).is_err());
        let copy = a.field("inert").unwrap();
        assert!(copy.value_eq(&SingleFloat::new(9.0)));
    }
}
