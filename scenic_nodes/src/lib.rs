//! Built-in node catalog.
//!
//! Every node kind registers its specification on first use and is created
//! through `Catalog`, the `NodeFactory` handed to the parser.

#![forbid(unsafe_code)]

pub mod filter;
pub mod grouping;
pub mod info;
pub mod script;
pub mod sensors;
pub mod shape;

use std::sync::Arc;

use scenic_core::{Environment, NodeFactory, NodeRef};

pub use filter::BooleanFilter;
pub use grouping::{Group, Transform};
pub use info::WorldInfo;
pub use script::Script;
pub use sensors::{TimeSensor, TouchSensor};
pub use shape::{Appearance, BoxGeometry, Material, Shape};

type Constructor = fn(&Arc<Environment>) -> NodeRef;

const CATALOG: &[(&str, Constructor)] = &[
    (Group::TYPE, Group::create),
    (Transform::TYPE, Transform::create),
    (Shape::TYPE, Shape::create),
    (Appearance::TYPE, Appearance::create),
    (Material::TYPE, Material::create),
    (BoxGeometry::TYPE, BoxGeometry::create),
    (WorldInfo::TYPE, WorldInfo::create),
    (BooleanFilter::TYPE, BooleanFilter::create),
    (Script::TYPE, Script::create),
    (TimeSensor::TYPE, TimeSensor::create),
    (TouchSensor::TYPE, TouchSensor::create),
];

/// Factory for every built-in node type.
#[derive(Clone, Copy, Debug, Default)]
pub struct Catalog;

impl NodeFactory for Catalog {
    fn create_node(&self, type_name: &str, environment: &Arc<Environment>) -> Option<NodeRef> {
        CATALOG
            .iter()
            .find(|(name, _)| *name == type_name)
            .map(|(_, create)| create(environment))
    }

    fn type_names(&self) -> Vec<&'static str> {
        CATALOG.iter().map(|(name, _)| *name).collect()
    }
}
