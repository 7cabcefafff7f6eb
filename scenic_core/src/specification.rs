//! Per-type field layouts.
//!
//! A `NodeSpecification` is built once per node type name and shared by every
//! instance of that type. Nodes keep their own field values in a `Vec` populated
//! from the specification's templates and indexed through it by name.

use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::field::{Dimension, Field, FieldType};

/// Access rights bitmask. Neither GET nor SET = the field exists but is inert
/// (it can still be written while parsing).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Access(u8);

impl Access {
    pub const NONE: Access = Access(0);
    pub const GET: Access = Access(1);
    pub const SET: Access = Access(1 << 1);
    pub const EXPLICIT_NOTIFICATION: Access = Access(1 << 2);

    pub const GET_SET: Access = Access(Self::GET.0 | Self::SET.0);
    pub const SET_EXPLICIT: Access = Access(Self::SET.0 | Self::EXPLICIT_NOTIFICATION.0);
    pub const ALL: Access = Access(Self::GET_SET.0 | Self::EXPLICIT_NOTIFICATION.0);

    #[inline]
    pub const fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("NONE");
        }
        let mut parts = Vec::with_capacity(3);
        if self.contains(Access::GET) {
            parts.push("GET");
        }
        if self.contains(Access::SET) {
            parts.push("SET");
        }
        if self.contains(Access::EXPLICIT_NOTIFICATION) {
            parts.push("EXPLICIT_NOTIFICATION");
        }
        f.write_str(&parts.join("|"))
    }
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Access({self})")
    }
}

#[derive(Debug)]
pub struct FieldEntry {
    index: usize,
    access: Access,
    template: Box<dyn Field>,
}

impl FieldEntry {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn access(&self) -> Access {
        self.access
    }

    /// The default value every instance starts from.
    #[inline]
    pub fn template(&self) -> &dyn Field {
        self.template.as_ref()
    }

    #[inline]
    pub fn kind(&self) -> (FieldType, Dimension) {
        (self.template.field_type(), self.template.dimension())
    }
}

#[derive(Debug)]
pub struct NodeSpecification {
    type_name: String,
    fields: IndexMap<String, FieldEntry>,
}

impl NodeSpecification {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Appends a field. Registration order is enumeration order.
    ///
    /// # Panics
    /// When `name` is already registered.
    pub fn register_field(&mut self, name: &str, template: impl Field, access: Access) -> &mut Self {
        assert!(
            !self.fields.contains_key(name),
            "{}: field '{name}' registered twice",
            self.type_name
        );
        let index = self.fields.len();
        self.fields.insert(
            name.to_string(),
            FieldEntry {
                index,
                access,
                template: Box::new(template),
            },
        );
        self
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[inline]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    #[inline]
    pub fn entry(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.get(name)
    }

    #[inline]
    pub fn field_access(&self, name: &str) -> Option<Access> {
        self.fields.get(name).map(FieldEntry::access)
    }

    #[inline]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.get(name).map(FieldEntry::index)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FieldEntry)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fresh per-instance storage, one copy of each template in index order.
    pub fn instantiate(&self) -> Vec<Box<dyn Field>> {
        self.fields.values().map(|e| e.template.copy_field()).collect()
    }
}

/// Type name → specification. Each specification is built exactly once, even
/// under concurrent first use.
#[derive(Default)]
pub struct SpecificationTable {
    specs: RwLock<HashMap<String, Arc<NodeSpecification>>>,
}

impl SpecificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<NodeSpecification>> {
        self.specs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
    }

    /// Returns the specification for `type_name`, running `init` under the
    /// write lock if it does not exist yet.
    pub fn get_or_init(
        &self,
        type_name: &str,
        init: impl FnOnce(&mut NodeSpecification),
    ) -> Arc<NodeSpecification> {
        if let Some(spec) = self.get(type_name) {
            return spec;
        }

        let mut specs = self.specs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(spec) = specs.get(type_name) {
            return spec.clone();
        }

        let mut spec = NodeSpecification::new(type_name);
        init(&mut spec);
        log::trace!("specification {type_name}: {} fields", spec.len());

        let spec = Arc::new(spec);
        specs.insert(type_name.to_string(), spec.clone());
        spec
    }

    pub fn type_names(&self) -> Vec<String> {
        let specs = self.specs.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = specs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for SpecificationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecificationTable")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{MultiNode, SingleBool, SingleVector3};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transform_like(spec: &mut NodeSpecification) {
        spec.register_field("translation", SingleVector3::default(), Access::GET_SET)
            .register_field("children", MultiNode::default(), Access::ALL)
            .register_field("bboxCenter", SingleVector3::default(), Access::NONE);
    }

    #[test]
    fn access_bits() {
        assert!(Access::GET_SET.contains(Access::GET));
        assert!(Access::GET_SET.contains(Access::SET));
        assert!(!Access::GET_SET.contains(Access::EXPLICIT_NOTIFICATION));
        assert!(Access::NONE.contains(Access::NONE));
        assert_eq!(Access::GET | Access::SET, Access::GET_SET);
        assert_eq!(Access::ALL.to_string(), "GET|SET|EXPLICIT_NOTIFICATION");
        assert_eq!(Access::NONE.to_string(), "NONE");
    }

    #[test]
    fn registration_order_and_lookup() {
        let mut spec = NodeSpecification::new("Transform");
        transform_like(&mut spec);

        let names: Vec<_> = spec.field_names().collect();
        assert_eq!(names, ["translation", "children", "bboxCenter"]);
        assert_eq!(spec.field_index("children"), Some(1));
        assert_eq!(spec.field_access("bboxCenter"), Some(Access::NONE));
        assert!(!spec.has_field("scale"));
        assert_eq!(
            spec.entry("children").map(FieldEntry::kind),
            Some((FieldType::Node, Dimension::Multi))
        );

        let fields = spec.instantiate();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].field_type(), FieldType::Vector3);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut spec = NodeSpecification::new("Bad");
        spec.register_field("on", SingleBool::default(), Access::GET);
        spec.register_field("on", SingleBool::default(), Access::SET);
    }

    #[test]
    fn table_builds_once() {
        let table = Arc::new(SpecificationTable::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let builds = builds.clone();
                std::thread::spawn(move || {
                    table.get_or_init("Transform", |spec| {
                        builds.fetch_add(1, Ordering::SeqCst);
                        transform_like(spec);
                    })
                })
            })
            .collect();

        let specs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(specs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(table.type_names(), ["Transform"]);
    }
}
