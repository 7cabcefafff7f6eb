//! Live scene nodes.
//!
//! A `Node` owns one field table instantiated from its type's
//! `NodeSpecification`, an optional table of dynamic fields, the ROUTE table for
//! its outputs and the parent counts maintained by grouping nodes. Type-specific
//! behaviour plugs in through `NodeBehavior`.
//!
//! Locking: a node's state lock is always taken before the registry lock, never
//! the other way round, and is released before a change is forwarded along
//! ROUTEs or a child is initialized.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use log::{debug, error, trace, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use scenic_ids::{NodeId, Timestamp};
use smallvec::SmallVec;

use crate::environment::{Environment, RenderObject};
use crate::error::{NodeError, Result};
use crate::events::{KeyEvent, MouseEvent};
use crate::field::{Dimension, Field, FieldType, FieldValue, MultiField, SingleField, TypedField};
use crate::registry::NodeRegistry;
use crate::routing::{self, Route};
use crate::specification::{Access, NodeSpecification};

pub type NodeRef = Arc<Node>;

/// Optional capability records replacing a mixin hierarchy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Fields can be added and removed at runtime.
    pub dynamic: bool,
    /// Receives `pre_update`/`update` every frame.
    pub update: bool,
    /// Receives mouse and key events.
    pub event: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        dynamic: false,
        update: false,
        event: false,
    };

    pub const fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub const fn update(mut self) -> Self {
        self.update = true;
        self
    }

    pub const fn event(mut self) -> Self {
        self.event = true;
        self
    }
}

/// Per-type hooks. Every hook has a no-op default.
pub trait NodeBehavior: Send + Sync + 'static {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Runs once, on first initialization, before any referenced node is
    /// initialized. Parents claim their children here, top-down.
    fn on_adopt(&self, _ctx: &mut NodeContext<'_>) {}

    /// Runs once the node and everything it references are initialized.
    fn on_initialize(&self, _ctx: &mut NodeContext<'_>, _timestamp: Timestamp) {}

    /// Called for fields registered with EXPLICIT_NOTIFICATION. The hook *is*
    /// the mutation: it stores whatever it wants (possibly into other fields)
    /// and returns false to reject the change.
    fn on_field_changing(&self, ctx: &mut NodeContext<'_>, name: &str, value: &dyn Field) -> bool {
        ctx.assign(name, value)
    }

    /// Notification after a plain assignment on an initialized node.
    fn on_field_changed(&self, _ctx: &mut NodeContext<'_>, _name: &str) {}

    /// Runs when the last handle is dropped, before the node leaves the registry.
    fn on_destroy(&self, _node: &Node) {}

    /// May request a later frame timestamp.
    fn on_pre_update(&self, _node: &Node, _timestamp: Timestamp) -> Option<Timestamp> {
        None
    }

    fn on_update(&self, _node: &Node, _timestamp: Timestamp) {}

    fn on_mouse_event(&self, _node: &Node, _event: &MouseEvent) -> bool {
        false
    }

    fn on_key_event(&self, _node: &Node, _event: &KeyEvent) -> bool {
        false
    }
}

/// Behaviour of pure data-container nodes.
#[derive(Debug, Default)]
pub struct PlainNode;

impl NodeBehavior for PlainNode {}

/// Plain-data node that accepts dynamic fields.
#[derive(Debug, Default)]
pub struct DynamicNode;

impl NodeBehavior for DynamicNode {
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.dynamic()
    }
}

pub(crate) struct NodeState {
    name: String,
    fields: Vec<Box<dyn Field>>,
    dynamic: IndexMap<String, Box<dyn Field>>,
    parents: FxHashMap<NodeId, usize>,
    routes: IndexMap<String, SmallVec<[Route; 2]>>,
    initialized: bool,
    initialize_runs: u32,
    render_object: Option<RenderObject>,
}

impl NodeState {
    fn new(fields: Vec<Box<dyn Field>>) -> Self {
        Self {
            name: String::new(),
            fields,
            dynamic: IndexMap::new(),
            parents: FxHashMap::default(),
            routes: IndexMap::new(),
            initialized: false,
            initialize_runs: 0,
            render_object: None,
        }
    }

    fn field(&self, spec: &NodeSpecification, name: &str) -> Option<&dyn Field> {
        match spec.field_index(name) {
            Some(index) => Some(self.fields[index].as_ref()),
            None => self.dynamic.get(name).map(|f| f.as_ref()),
        }
    }

    fn field_mut(&mut self, spec: &NodeSpecification, name: &str) -> Option<&mut (dyn Field + 'static)> {
        match spec.field_index(name) {
            Some(index) => Some(self.fields[index].as_mut()),
            None => self.dynamic.get_mut(name).map(|f| f.as_mut()),
        }
    }

    fn access(&self, spec: &NodeSpecification, name: &str) -> Option<Access> {
        spec.field_access(name)
            .or_else(|| self.dynamic.contains_key(name).then_some(Access::GET_SET))
    }

    fn referenced_nodes(&self) -> Vec<NodeRef> {
        self.fields
            .iter()
            .chain(self.dynamic.values())
            .flat_map(|f| f.referenced_nodes())
            .collect()
    }
}

/// Work a hook queued for after the node's lock is released.
#[derive(Default)]
pub(crate) struct Deferred {
    released: Vec<NodeRef>,
    emitted: SmallVec<[String; 2]>,
}

/// Mutable view of a node's state handed to behaviour hooks while the node's
/// lock is held. Hooks must not call locking `Node` methods on the same node.
pub struct NodeContext<'a> {
    node: &'a Node,
    state: &'a mut NodeState,
    deferred: &'a mut Deferred,
}

impl<'a> NodeContext<'a> {
    #[inline]
    pub fn node(&self) -> &Node {
        self.node
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    #[inline]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.node.environment
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    /// True while the first `on_initialize` runs; false on reinitialization.
    #[inline]
    pub fn is_first_initialization(&self) -> bool {
        self.state.initialize_runs <= 1
    }

    pub fn field(&self, name: &str) -> Result<&dyn Field> {
        self.state
            .field(&self.node.specification, name)
            .ok_or_else(|| self.node.not_found(name))
    }

    pub fn field_mut(&mut self, name: &str) -> Result<&mut dyn Field> {
        let spec = &self.node.specification;
        match self.state.field_mut(spec, name) {
            Some(field) => Ok(field),
            None => Err(self.node.not_found(name)),
        }
    }

    pub fn get<F: TypedField>(&self, name: &str) -> Result<&F> {
        let field = self.field(name)?;
        field.try_cast::<F>().ok_or_else(|| mismatch::<F>(name, field))
    }

    pub fn get_mut<F: TypedField>(&mut self, name: &str) -> Result<&mut F> {
        let field = self.field_mut(name)?;
        let (ty, dim) = (field.field_type(), field.dimension());
        field.try_cast_mut::<F>().ok_or(NodeError::TypeMismatch {
            field: name.to_string(),
            expected: F::TYPE,
            expected_dim: F::DIMENSION,
            found: ty,
            found_dim: dim,
        })
    }

    /// `Field::assign` into `name`. Node references replaced by the assignment
    /// are kept alive until the node's lock is released.
    pub fn assign(&mut self, name: &str, value: &dyn Field) -> bool {
        let spec = &self.node.specification;
        let Some(field) = self.state.field_mut(spec, name) else {
            return false;
        };
        if field.field_type() == FieldType::Node {
            self.deferred.released.extend(field.referenced_nodes());
        }
        field.assign(value)
    }

    /// Keeps `nodes` alive until the node's lock is released.
    pub fn release(&mut self, nodes: impl IntoIterator<Item = NodeRef>) {
        self.deferred.released.extend(nodes);
    }

    /// Assigns an output field and forwards it along its ROUTEs once the
    /// node's lock is released. Returns false when the assignment fails.
    pub fn emit(&mut self, name: &str, value: &dyn Field) -> bool {
        if !self.assign(name, value) {
            return false;
        }
        if !self.deferred.emitted.iter().any(|n| n == name) {
            self.deferred.emitted.push(name.to_string());
        }
        true
    }

    pub fn parents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.state.parents.keys().copied()
    }

    /// This node plus every node reachable upwards through `parents`.
    pub fn ancestor_nodes(&self) -> FxHashSet<NodeId> {
        let mut out = FxHashSet::default();
        out.insert(self.node.id);
        collect_ancestors(
            self.node.environment.registry(),
            self.state.parents.keys().copied().collect(),
            &mut out,
        );
        out
    }

    #[inline]
    pub fn render_object(&self) -> Option<&RenderObject> {
        self.state.render_object.as_ref()
    }

    pub fn set_render_object(&mut self, object: Option<RenderObject>) {
        self.state.render_object = object;
    }

    pub fn referenced_nodes(&self) -> Vec<NodeRef> {
        self.state.referenced_nodes()
    }
}

fn mismatch<F: TypedField>(name: &str, found: &dyn Field) -> NodeError {
    NodeError::TypeMismatch {
        field: name.to_string(),
        expected: F::TYPE,
        expected_dim: F::DIMENSION,
        found: found.field_type(),
        found_dim: found.dimension(),
    }
}

fn collect_ancestors(registry: &NodeRegistry, mut pending: Vec<NodeId>, out: &mut FxHashSet<NodeId>) {
    while let Some(id) = pending.pop() {
        if !out.insert(id) {
            continue;
        }
        if let Some(node) = registry.node(id) {
            pending.extend(node.read().parents.keys().copied());
        }
    }
}

pub struct Node {
    id: NodeId,
    specification: Arc<NodeSpecification>,
    environment: Arc<Environment>,
    capabilities: Capabilities,
    behavior: Box<dyn NodeBehavior>,
    state: RwLock<NodeState>,
}

impl Node {
    /// Creates a node and registers it. The returned handle is one of many
    /// possible shared holders; the node leaves the registry when the last
    /// handle drops.
    pub fn create(
        environment: &Arc<Environment>,
        specification: Arc<NodeSpecification>,
        behavior: impl NodeBehavior,
    ) -> NodeRef {
        let id = environment.registry().next_id();
        Self::create_with_id(id, environment.clone(), specification, Box::new(behavior))
    }

    pub(crate) fn create_with_id(
        id: NodeId,
        environment: Arc<Environment>,
        specification: Arc<NodeSpecification>,
        behavior: Box<dyn NodeBehavior>,
    ) -> NodeRef {
        let capabilities = behavior.capabilities();
        let state = NodeState::new(specification.instantiate());
        let node = Arc::new(Node {
            id,
            specification,
            environment,
            capabilities,
            behavior,
            state: RwLock::new(state),
        });
        node.environment.registry().register(&node);
        trace!("created {} #{}", node.type_name(), id);
        node
    }

    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, NodeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, NodeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(&self, name: &str) -> NodeError {
        NodeError::FieldNotFound {
            node_type: self.type_name().to_string(),
            field: name.to_string(),
        }
    }

    // -------------------- Identity --------------------

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        self.specification.type_name()
    }

    #[inline]
    pub fn specification(&self) -> &Arc<NodeSpecification> {
        &self.specification
    }

    #[inline]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.capabilities.dynamic
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    /// Renames the node. The registry's name index is updated while the
    /// node's lock is held, so both change together.
    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.write();
        if state.name == name {
            return;
        }
        let old = std::mem::replace(&mut state.name, name);
        self.environment
            .registry()
            .change_registered_node(self.id, &old, &state.name);
    }

    /// Unnames the node and resets its NODE fields without running hooks, so
    /// a node abandoned while parsing drops even when it references itself.
    pub fn discard(&self) {
        self.set_name("");
        let released: Vec<NodeRef> = {
            let mut state = self.write();
            let mut released = Vec::new();
            for (_, entry) in self.specification.entries() {
                let field = &mut state.fields[entry.index()];
                if field.field_type() == FieldType::Node {
                    released.extend(field.referenced_nodes());
                    *field = entry.template().copy_field();
                }
            }
            state.dynamic.retain(|_, field| {
                if field.field_type() != FieldType::Node {
                    return true;
                }
                released.extend(field.referenced_nodes());
                false
            });
            released
        };
        drop(released);
    }

    // -------------------- Field access --------------------

    pub fn has_field(&self, name: &str) -> bool {
        self.specification.has_field(name) || self.read().dynamic.contains_key(name)
    }

    pub fn field_access(&self, name: &str) -> Option<Access> {
        self.read().access(&self.specification, name)
    }

    pub fn field_kind(&self, name: &str) -> Option<(FieldType, Dimension)> {
        if let Some(entry) = self.specification.entry(name) {
            return Some(entry.kind());
        }
        self.read()
            .dynamic
            .get(name)
            .map(|f| (f.field_type(), f.dimension()))
    }

    /// A copy of the named field (static first, then dynamic).
    pub fn field(&self, name: &str) -> Result<Box<dyn Field>> {
        self.with_field(name, |f| f.copy_field())
    }

    pub fn with_field<R>(&self, name: &str, f: impl FnOnce(&dyn Field) -> R) -> Result<R> {
        let state = self.read();
        match state.field(&self.specification, name) {
            Some(field) => Ok(f(field)),
            None => Err(self.not_found(name)),
        }
    }

    pub fn get<F: TypedField>(&self, name: &str) -> Result<F> {
        let state = self.read();
        let field = state
            .field(&self.specification, name)
            .ok_or_else(|| self.not_found(name))?;
        field
            .try_cast::<F>()
            .cloned()
            .ok_or_else(|| mismatch::<F>(name, field))
    }

    pub fn value<T: FieldValue>(&self, name: &str) -> Result<T> {
        self.get::<SingleField<T>>(name).map(SingleField::into_value)
    }

    pub fn values<T: FieldValue>(&self, name: &str) -> Result<Vec<T>> {
        self.get::<MultiField<T>>(name).map(MultiField::into_values)
    }

    /// Static field names in registration order, then dynamic ones.
    pub fn field_names(&self) -> Vec<String> {
        let state = self.read();
        self.specification
            .field_names()
            .map(str::to_string)
            .chain(state.dynamic.keys().cloned())
            .collect()
    }

    pub fn dynamic_field_names(&self) -> Vec<String> {
        self.read().dynamic.keys().cloned().collect()
    }

    /// Copies of the dynamic fields, in insertion order.
    pub fn dynamic_fields(&self) -> Vec<(String, Box<dyn Field>)> {
        self.read()
            .dynamic
            .iter()
            .map(|(k, v)| (k.clone(), v.copy_field()))
            .collect()
    }

    /// Adds a copy of `field` under `name`. Fails when the node is not dynamic
    /// or the name exists statically or dynamically.
    pub fn add_field(&self, name: &str, field: &dyn Field) -> Result<()> {
        if !self.capabilities.dynamic {
            return Err(NodeError::NotDynamic(self.type_name().to_string()));
        }
        if self.specification.has_field(name) {
            return Err(NodeError::FieldExists(name.to_string()));
        }
        let mut state = self.write();
        if state.dynamic.contains_key(name) {
            return Err(NodeError::FieldExists(name.to_string()));
        }
        state.dynamic.insert(name.to_string(), field.copy_field());
        Ok(())
    }

    /// Removes a dynamic field and the ROUTEs leaving it.
    pub fn remove_field(&self, name: &str) -> Result<()> {
        if !self.capabilities.dynamic {
            return Err(NodeError::NotDynamic(self.type_name().to_string()));
        }
        let removed = {
            let mut state = self.write();
            let removed = state.dynamic.shift_remove(name);
            if removed.is_some() {
                state.routes.shift_remove(name);
            }
            removed
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(self.not_found(name)),
        }
    }

    /// Maps `set_X` and `X_changed` to `X` when the alias itself is not a field.
    pub fn original_field_name<'n>(&self, name: &'n str) -> &'n str {
        if self.has_field(name) {
            return name;
        }
        if let Some(base) = name.strip_prefix("set_") {
            if self.has_field(base) {
                return base;
            }
        }
        if let Some(base) = name.strip_suffix("_changed") {
            if self.has_field(base) {
                return base;
            }
        }
        name
    }

    // -------------------- Mutation --------------------

    /// Sets a field as an incoming event.
    ///
    /// Requires SET rights. Fields with EXPLICIT_NOTIFICATION go through
    /// `on_field_changing`, all others are assigned and, once initialized,
    /// reported to `on_field_changed`. If the field also has GET rights the new
    /// value is forwarded along every ROUTE leaving it.
    pub fn set_field(&self, name: &str, value: &dyn Field) -> Result<()> {
        let Some(_cascade) = routing::enter(self.id, name) else {
            trace!("{} #{}: '{name}' already set in this cascade", self.type_name(), self.id);
            return Ok(());
        };

        let mut deferred = Deferred::default();
        let forward = {
            let mut state = self.write();
            let access = state
                .access(&self.specification, name)
                .ok_or_else(|| self.not_found(name))?;
            if !access.contains(Access::SET) {
                return Err(NodeError::AccessDenied {
                    field: name.to_string(),
                    required: Access::SET,
                    access,
                });
            }

            let mut ctx = NodeContext {
                node: self,
                state: &mut *state,
                deferred: &mut deferred,
            };
            if access.contains(Access::EXPLICIT_NOTIFICATION) {
                if !self.behavior.on_field_changing(&mut ctx, name, value) {
                    return Err(NodeError::Rejected(name.to_string()));
                }
            } else {
                let field = ctx.field(name)?;
                if !field.same_kind(value) {
                    return Err(type_mismatch(name, field, value));
                }
                ctx.assign(name, value);
                if ctx.is_initialized() {
                    self.behavior.on_field_changed(&mut ctx, name);
                }
            }

            self.pending_routes(&state, name, access)
        };
        self.finish(deferred);

        if let Some((routes, field)) = forward {
            self.forward(name, &routes, field.as_ref());
        }
        Ok(())
    }

    /// Output path for behaviours: stores without access checks or hooks and
    /// forwards along ROUTEs when the field has GET rights.
    pub fn emit_field(&self, name: &str, value: &dyn Field) -> Result<()> {
        let Some(_cascade) = routing::enter(self.id, name) else {
            return Ok(());
        };

        let mut deferred = Deferred::default();
        let forward = {
            let mut state = self.write();
            let access = state
                .access(&self.specification, name)
                .ok_or_else(|| self.not_found(name))?;
            let mut ctx = NodeContext {
                node: self,
                state: &mut *state,
                deferred: &mut deferred,
            };
            let field = ctx.field(name)?;
            if !field.same_kind(value) {
                return Err(type_mismatch(name, field, value));
            }
            ctx.assign(name, value);
            self.pending_routes(&state, name, access)
        };
        self.finish(deferred);

        if let Some((routes, field)) = forward {
            self.forward(name, &routes, field.as_ref());
        }
        Ok(())
    }

    /// Stores a parsed value: no access check, no hooks, no forwarding.
    pub fn init_field(&self, name: &str, value: &dyn Field) -> Result<()> {
        let mut deferred = Deferred::default();
        let mut state = self.write();
        let mut ctx = NodeContext {
            node: self,
            state: &mut *state,
            deferred: &mut deferred,
        };
        let field = ctx.field(name)?;
        if !field.same_kind(value) {
            return Err(type_mismatch(name, field, value));
        }
        ctx.assign(name, value);
        drop(state);
        Ok(())
    }

    fn pending_routes(
        &self,
        state: &NodeState,
        name: &str,
        access: Access,
    ) -> Option<(SmallVec<[Route; 2]>, Box<dyn Field>)> {
        if !access.contains(Access::GET) {
            return None;
        }
        let routes = state.routes.get(name).filter(|r| !r.is_empty())?.clone();
        let field = state.field(&self.specification, name)?.copy_field();
        Some((routes, field))
    }

    /// Drops released references, then forwards fields emitted by a hook.
    fn finish(&self, deferred: Deferred) {
        let Deferred { released, emitted } = deferred;
        drop(released);
        for name in &emitted {
            let Some(_cascade) = routing::enter(self.id, name) else {
                continue;
            };
            let pending = {
                let state = self.read();
                state
                    .access(&self.specification, name)
                    .and_then(|access| self.pending_routes(&state, name, access))
            };
            if let Some((routes, field)) = pending {
                self.forward(name, &routes, field.as_ref());
            }
        }
    }

    fn forward(&self, name: &str, routes: &[Route], value: &dyn Field) {
        let registry = self.environment.registry();
        for route in routes {
            let Some(target) = registry.node(route.target) else {
                debug!(
                    "ROUTE {} #{}.{name} -> {route}: target is gone, dropped",
                    self.type_name(),
                    self.id
                );
                continue;
            };
            if let Err(err) = target.set_field(&route.field, value) {
                warn!(
                    "ROUTE {} #{}.{name} -> {} #{}.{}: {err}",
                    self.type_name(),
                    self.id,
                    target.type_name(),
                    target.id,
                    route.field
                );
            }
        }
    }

    // -------------------- Routes --------------------

    /// Installs a ROUTE. Returns false when the identical route already exists.
    /// No type or access validation happens here.
    pub fn add_connection(&self, output: &str, target: NodeId, target_field: &str) -> bool {
        let mut state = self.write();
        let routes = state.routes.entry(output.to_string()).or_default();
        if routes
            .iter()
            .any(|r| r.target == target && r.field == target_field)
        {
            return false;
        }
        routes.push(Route::new(target, target_field));
        true
    }

    pub fn remove_connection(&self, output: &str, target: NodeId, target_field: &str) -> bool {
        let mut state = self.write();
        let Some(routes) = state.routes.get_mut(output) else {
            return false;
        };
        let before = routes.len();
        routes.retain(|r| !(r.target == target && r.field == target_field));
        before != routes.len()
    }

    /// Every (output field, route) pair in installation order.
    pub fn connections(&self) -> Vec<(String, Route)> {
        let state = self.read();
        state
            .routes
            .iter()
            .flat_map(|(output, routes)| routes.iter().map(move |r| (output.clone(), r.clone())))
            .collect()
    }

    // -------------------- Parents --------------------

    pub fn add_parent(&self, parent: NodeId) {
        *self.write().parents.entry(parent).or_insert(0) += 1;
    }

    pub fn remove_parent(&self, parent: NodeId) -> bool {
        let mut state = self.write();
        let Some(count) = state.parents.get_mut(&parent) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            state.parents.remove(&parent);
        }
        true
    }

    pub fn parents(&self) -> Vec<(NodeId, usize)> {
        let mut parents: Vec<_> = self.read().parents.iter().map(|(k, v)| (*k, *v)).collect();
        parents.sort();
        parents
    }

    /// This node plus every node reachable upwards through `parents`.
    pub fn ancestor_nodes(&self) -> FxHashSet<NodeId> {
        let parents: Vec<NodeId> = self.read().parents.keys().copied().collect();
        let mut out = FxHashSet::default();
        out.insert(self.id);
        collect_ancestors(self.environment.registry(), parents, &mut out);
        out
    }

    // -------------------- Lifecycle --------------------

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.read().initialized
    }

    /// Latches `initialized`, runs `on_adopt`, initializes every node still
    /// referenced depth-first, then runs `on_initialize`. No-op when already
    /// initialized.
    pub fn initialize(&self, timestamp: Timestamp) {
        {
            let mut state = self.write();
            if state.initialized {
                return;
            }
            state.initialized = true;
        }
        self.run_adopt();
        let referenced = self.read().referenced_nodes();
        for node in &referenced {
            node.initialize(timestamp);
        }
        drop(referenced);
        self.run_initialize(timestamp);
    }

    /// Runs `on_initialize` again, e.g. after a structural reload. Falls back
    /// to `initialize` for a node that was never initialized.
    pub fn reinitialize(&self, timestamp: Timestamp) {
        if !self.is_initialized() {
            self.initialize(timestamp);
            return;
        }
        let referenced = self.read().referenced_nodes();
        for node in &referenced {
            node.initialize(timestamp);
        }
        drop(referenced);
        self.run_initialize(timestamp);
    }

    fn run_adopt(&self) {
        let mut deferred = Deferred::default();
        let mut state = self.write();
        let mut ctx = NodeContext {
            node: self,
            state: &mut *state,
            deferred: &mut deferred,
        };
        self.behavior.on_adopt(&mut ctx);
        drop(state);
        self.finish(deferred);
    }

    fn run_initialize(&self, timestamp: Timestamp) {
        let mut deferred = Deferred::default();
        let mut state = self.write();
        state.initialize_runs += 1;
        let mut ctx = NodeContext {
            node: self,
            state: &mut *state,
            deferred: &mut deferred,
        };
        self.behavior.on_initialize(&mut ctx, timestamp);
        drop(state);
        self.finish(deferred);
    }

    pub fn render_object(&self) -> Option<RenderObject> {
        self.read().render_object.clone()
    }

    /// Nodes held by NODE fields, static then dynamic.
    pub fn referenced_nodes(&self) -> Vec<NodeRef> {
        self.read().referenced_nodes()
    }

    // -------------------- Frame hooks --------------------

    pub fn pre_update(&self, timestamp: Timestamp) -> Option<Timestamp> {
        self.behavior.on_pre_update(self, timestamp)
    }

    pub fn update(&self, timestamp: Timestamp) {
        self.behavior.on_update(self, timestamp);
    }

    pub fn mouse_event(&self, event: &MouseEvent) -> bool {
        self.behavior.on_mouse_event(self, event)
    }

    pub fn key_event(&self, event: &KeyEvent) -> bool {
        self.behavior.on_key_event(self, event)
    }
}

fn type_mismatch(name: &str, field: &dyn Field, value: &dyn Field) -> NodeError {
    NodeError::TypeMismatch {
        field: name.to_string(),
        expected: field.field_type(),
        expected_dim: field.dimension(),
        found: value.field_type(),
        found_dim: value.dimension(),
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.behavior.on_destroy(self);

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.parents.is_empty() {
            error!(
                "{} #{} destroyed with {} parent(s) still registered",
                self.specification.type_name(),
                self.id,
                state.parents.len()
            );
            if !std::thread::panicking() {
                debug_assert!(state.parents.is_empty(), "node destroyed with live parents");
            }
        }
        let name = std::mem::take(&mut state.name);
        self.environment.registry().unregister(self.id, &name);
        trace!("destroyed {} #{}", self.specification.type_name(), self.id);
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("id", &self.id).field("type", &self.type_name());
        match self.state.try_read() {
            Ok(state) => s.field("name", &state.name),
            Err(_) => s.field("name", &"<locked>"),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::field::{SingleBool, SingleFloat, SingleInt, SingleString};
    use crate::testing;

    fn script(env: &Arc<Environment>) -> NodeRef {
        let spec = env.specifications().get_or_init("Script", |spec| {
            spec.register_field("url", SingleString::default(), Access::GET_SET);
        });
        Node::create(env, spec, DynamicNode)
    }

    #[test]
    fn dynamic_fields() {
        let env = testing::environment();
        let node = script(&env);

        node.add_field("speed", &SingleFloat::new(2.0)).unwrap();
        node.add_field("count", &SingleInt::new(1)).unwrap();
        assert_eq!(
            node.add_field("url", &SingleString::default()),
            Err(NodeError::FieldExists("url".into()))
        );
        assert_eq!(
            node.add_field("speed", &SingleFloat::default()),
            Err(NodeError::FieldExists("speed".into()))
        );

        assert_eq!(node.field_access("speed"), Some(Access::GET_SET));
        assert_eq!(node.field_names(), ["url", "speed", "count"]);
        assert_eq!(node.value::<f32>("speed").unwrap(), 2.0);

        node.remove_field("speed").unwrap();
        assert!(node.remove_field("speed").is_err());
        assert!(node.remove_field("url").is_err());
        assert_eq!(node.dynamic_field_names(), ["count"]);
        assert_eq!(node.value::<i32>("count").unwrap(), 1);

        node.set_field("count", &SingleInt::new(5)).unwrap();
        assert_eq!(node.value::<i32>("count").unwrap(), 5);
    }

    #[test]
    fn static_nodes_refuse_dynamic_fields() {
        let env = testing::environment();
        let node = testing::probe(&env);
        assert!(matches!(
            node.add_field("extra", &SingleFloat::default()),
            Err(NodeError::NotDynamic(_))
        ));
    }

    #[test]
    fn alias_translation() {
        let env = testing::environment();
        let node = testing::probe(&env);
        assert_eq!(node.original_field_name("set_value"), "value");
        assert_eq!(node.original_field_name("value_changed"), "value");
        assert_eq!(node.original_field_name("value"), "value");
        assert_eq!(node.original_field_name("set_missing"), "set_missing");
    }

    #[test]
    fn typed_access_checks_kind() {
        let env = testing::environment();
        let node = testing::probe(&env);
        assert!(node.get::<SingleFloat>("value").is_ok());
        assert!(matches!(
            node.get::<SingleInt>("value"),
            Err(NodeError::TypeMismatch { .. })
        ));
        assert_eq!(node.field_kind("link"), Some((FieldType::Node, Dimension::Multi)));
        assert!(node.field_kind("missing").is_none());
    }

    /// `set_boolean` writes `inputTrue`, `inputFalse` and `inputNegate`.
    struct Filter;

    impl NodeBehavior for Filter {
        fn on_field_changing(&self, ctx: &mut NodeContext<'_>, name: &str, value: &dyn Field) -> bool {
            if name != "set_boolean" {
                return ctx.assign(name, value);
            }
            let Some(v) = value.try_cast::<SingleBool>() else {
                return false;
            };
            let (b, ts) = (*v.value(), v.timestamp());
            let target = if b { "inputTrue" } else { "inputFalse" };
            let ok = ctx.emit(target, &SingleBool::with_timestamp(true, ts));
            ok && ctx.emit("inputNegate", &SingleBool::with_timestamp(!b, ts))
        }
    }

    fn filter(env: &Arc<Environment>) -> NodeRef {
        let spec = env.specifications().get_or_init("Filter", |spec| {
            spec.register_field("set_boolean", SingleBool::default(), Access::SET_EXPLICIT)
                .register_field("inputTrue", SingleBool::default(), Access::GET)
                .register_field("inputFalse", SingleBool::default(), Access::GET)
                .register_field("inputNegate", SingleBool::default(), Access::GET);
        });
        Node::create(env, spec, Filter)
    }

    #[test]
    fn explicit_notification_hook_is_the_mutation() {
        let env = testing::environment();
        let node = filter(&env);

        node.set_field("set_boolean", &SingleBool::new(true)).unwrap();
        assert!(node.value::<bool>("inputTrue").unwrap());
        assert!(!node.value::<bool>("inputNegate").unwrap());
        // the named field itself is untouched by the generic path
        assert!(!node.value::<bool>("set_boolean").unwrap());

        assert_eq!(
            node.set_field("set_boolean", &SingleInt::new(1)),
            Err(NodeError::Rejected("set_boolean".into()))
        );
    }

    #[test]
    fn emitted_outputs_follow_routes() {
        let env = testing::environment();
        let first = filter(&env);
        let second = filter(&env);
        assert!(first.add_connection("inputNegate", second.id(), "set_boolean"));

        first.set_field("set_boolean", &SingleBool::new(true)).unwrap();
        // first.inputNegate = false reaches second.set_boolean
        assert!(second.value::<bool>("inputFalse").unwrap());
        assert!(second.value::<bool>("inputNegate").unwrap());
        assert!(!second.value::<bool>("inputTrue").unwrap());
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl NodeBehavior for Recorder {
        fn on_initialize(&self, ctx: &mut NodeContext<'_>, _timestamp: Timestamp) {
            self.0.lock().unwrap().push(ctx.name().to_string());
        }
        fn on_field_changed(&self, _ctx: &mut NodeContext<'_>, name: &str) {
            self.0.lock().unwrap().push(format!("changed {name}"));
        }
    }

    fn recorder(env: &Arc<Environment>, log: &Arc<Mutex<Vec<String>>>, name: &str) -> NodeRef {
        let spec = env.specifications().get_or_init("Recorder", |spec| {
            spec.register_field("link", crate::field::MultiNode::default(), Access::GET_SET)
                .register_field("value", SingleFloat::default(), Access::GET_SET);
        });
        let node = Node::create(env, spec, Recorder(log.clone()));
        node.set_name(name);
        node
    }

    #[test]
    fn initialize_children_first_and_once() {
        let env = testing::environment();
        let log = Arc::new(Mutex::new(Vec::new()));
        let top = recorder(&env, &log, "top");
        let leaf = recorder(&env, &log, "leaf");
        top.init_field("link", &crate::field::MultiNode::new(vec![Some(leaf.clone())]))
            .unwrap();

        top.set_field("value", &SingleFloat::new(1.0)).unwrap();
        assert!(log.lock().unwrap().is_empty(), "no notification before initialize");

        top.initialize(Timestamp::new(0.0));
        top.initialize(Timestamp::new(1.0));
        assert_eq!(*log.lock().unwrap(), ["leaf", "top"]);

        top.set_field("value", &SingleFloat::new(2.0)).unwrap();
        top.reinitialize(Timestamp::new(2.0));
        assert_eq!(*log.lock().unwrap(), ["leaf", "top", "changed value", "top"]);
    }

    #[test]
    fn drop_unregisters() {
        let env = testing::environment();
        let node = testing::probe(&env);
        node.set_name("probe");
        let id = node.id();
        assert!(env.registry().node(id).is_some());
        drop(node);
        assert!(env.registry().node(id).is_none());
        assert!(env.registry().node_by_name("probe").is_none());
        assert!(env.registry().is_empty());
    }
}
