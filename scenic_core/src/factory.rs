use std::sync::Arc;

use crate::environment::Environment;
use crate::node::NodeRef;

/// Type name → node constructor, supplied by a node catalog.
pub trait NodeFactory: Send + Sync {
    /// `None` for unknown type names.
    fn create_node(&self, type_name: &str, environment: &Arc<Environment>) -> Option<NodeRef>;

    /// Type names this factory can construct, if it can enumerate them.
    fn type_names(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

impl<F> NodeFactory for F
where
    F: Fn(&str, &Arc<Environment>) -> Option<NodeRef> + Send + Sync,
{
    fn create_node(&self, type_name: &str, environment: &Arc<Environment>) -> Option<NodeRef> {
        self(type_name, environment)
    }
}
