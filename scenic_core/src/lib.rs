//! Scene graph core: typed fields, per-type specifications, live nodes with
//! ROUTE propagation, and the node registry.

#![forbid(unsafe_code)]

pub mod control;
pub mod environment;
pub mod error;
pub mod events;
pub mod factory;
pub mod field;
pub mod grouping;
pub mod node;
pub mod registry;
pub mod routing;
pub mod scene;
pub mod specification;

#[cfg(test)]
pub(crate) mod testing;

pub use control::LoadControl;
pub use environment::*;
pub use error::*;
pub use events::*;
pub use factory::*;
pub use field::*;
pub use node::*;
pub use registry::*;
pub use routing::Route;
pub use scene::*;
pub use specification::*;

pub use scenic_ids::{NodeId, SceneId, Timestamp};
