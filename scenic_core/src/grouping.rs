//! Children handling shared by the scene root and grouping node types.
//!
//! A grouping node keeps its children in the `children` MFNode field and
//! registers itself as a parent of each child once initialized. Proposed
//! children that are ancestors of the group are dropped with a warning; the
//! rest of the batch is still accepted.

use log::warn;
use scenic_ids::Timestamp;

use crate::field::{Field, MultiNode};
use crate::node::{Node, NodeBehavior, NodeContext, NodeRef};
use crate::specification::{Access, NodeSpecification};

pub const CHILDREN: &str = "children";
pub const ADD_CHILDREN: &str = "addChildren";
pub const REMOVE_CHILDREN: &str = "removeChildren";

pub fn register_fields(spec: &mut NodeSpecification) {
    spec.register_field(CHILDREN, MultiNode::default(), Access::ALL)
        .register_field(ADD_CHILDREN, MultiNode::default(), Access::SET_EXPLICIT)
        .register_field(REMOVE_CHILDREN, MultiNode::default(), Access::SET_EXPLICIT);
}

/// Behaviour of a node that only groups children.
#[derive(Debug, Default)]
pub struct Grouping;

impl NodeBehavior for Grouping {
    fn on_adopt(&self, ctx: &mut NodeContext<'_>) {
        adopt(ctx);
    }

    fn on_initialize(&self, ctx: &mut NodeContext<'_>, timestamp: Timestamp) {
        initialize(ctx, timestamp);
    }

    fn on_field_changing(&self, ctx: &mut NodeContext<'_>, name: &str, value: &dyn Field) -> bool {
        field_changing(ctx, name, value).unwrap_or_else(|| ctx.assign(name, value))
    }

    fn on_destroy(&self, node: &Node) {
        destroy(node);
    }
}

/// Handles `children`/`addChildren`/`removeChildren`. `None` for any other field.
pub fn field_changing(ctx: &mut NodeContext<'_>, name: &str, value: &dyn Field) -> Option<bool> {
    if !matches!(name, CHILDREN | ADD_CHILDREN | REMOVE_CHILDREN) {
        return None;
    }
    let Some(incoming) = value.try_cast::<MultiNode>() else {
        return Some(false);
    };
    let incoming: Vec<NodeRef> = incoming.nodes().cloned().collect();
    let current = children(ctx);

    let next = match name {
        CHILDREN => accept(ctx, incoming),
        ADD_CHILDREN => {
            let fresh = incoming
                .into_iter()
                .filter(|c| !current.iter().any(|n| n.id() == c.id()))
                .collect();
            let mut next = current.clone();
            next.extend(accept(ctx, fresh));
            next
        }
        _ => current
            .iter()
            .filter(|c| !incoming.iter().any(|r| r.id() == c.id()))
            .cloned()
            .collect(),
    };

    replace_children(ctx, current, next, value.timestamp());
    Some(true)
}

/// Registers the node as parent of its children before they initialize, so a
/// cycle is broken at the edge that closes it in document order.
pub fn adopt(ctx: &mut NodeContext<'_>) {
    let current = children(ctx);
    let accepted = accept(ctx, current.clone());
    if accepted.len() != current.len() {
        let timestamp = ctx
            .get::<MultiNode>(CHILDREN)
            .map(|f| f.timestamp())
            .unwrap_or_default();
        store(ctx, current, accepted.clone(), timestamp);
    }
    for child in &accepted {
        child.add_parent(ctx.id());
    }
}

/// Creates the rendering object and, on first initialization, attaches the
/// children's rendering objects to it.
pub fn initialize(ctx: &mut NodeContext<'_>, _timestamp: Timestamp) {
    if ctx.render_object().is_none() {
        let object = ctx
            .environment()
            .render_context()
            .and_then(|rc| rc.create_object(ctx.node().type_name(), ctx.id()));
        ctx.set_render_object(object);
    }
    if !ctx.is_first_initialization() {
        return;
    }
    for child in &children(ctx) {
        attach(ctx, child);
    }
}

/// Unregisters the node from its children. Runs from `on_destroy`.
pub fn destroy(node: &Node) {
    if !node.is_initialized() {
        return;
    }
    let parent_object = node.render_object();
    let render_context = node.environment().render_context();
    let children: Vec<Option<NodeRef>> = node.values(CHILDREN).unwrap_or_default();
    for child in children.iter().flatten() {
        child.remove_parent(node.id());
        if let (Some(rc), Some(parent), Some(object)) =
            (render_context, parent_object.as_ref(), child.render_object())
        {
            rc.detach(parent, &object);
        }
    }
}

fn children(ctx: &NodeContext<'_>) -> Vec<NodeRef> {
    ctx.get::<MultiNode>(CHILDREN)
        .map(|f| f.nodes().cloned().collect())
        .unwrap_or_default()
}

/// Drops every proposed child that is an ancestor of this node.
fn accept(ctx: &mut NodeContext<'_>, proposed: Vec<NodeRef>) -> Vec<NodeRef> {
    if proposed.is_empty() {
        return proposed;
    }
    let ancestors = ctx.ancestor_nodes();
    let (accepted, rejected): (Vec<NodeRef>, Vec<NodeRef>) = proposed
        .into_iter()
        .partition(|child| !ancestors.contains(&child.id()));
    for child in &rejected {
        warn!(
            "{} '{}' (#{}): {} #{} is an ancestor, not added as child",
            ctx.node().type_name(),
            ctx.name(),
            ctx.id(),
            child.type_name(),
            child.id()
        );
    }
    ctx.release(rejected);
    accepted
}

fn link(ctx: &NodeContext<'_>, child: &NodeRef) {
    child.add_parent(ctx.id());
    attach(ctx, child);
}

fn attach(ctx: &NodeContext<'_>, child: &NodeRef) {
    if let (Some(rc), Some(parent), Some(object)) = (
        ctx.environment().render_context(),
        ctx.render_object(),
        child.render_object(),
    ) {
        rc.attach(parent, &object);
    }
}

fn unlink(ctx: &NodeContext<'_>, child: &NodeRef) {
    child.remove_parent(ctx.id());
    if let (Some(rc), Some(parent), Some(object)) = (
        ctx.environment().render_context(),
        ctx.render_object(),
        child.render_object(),
    ) {
        rc.detach(parent, &object);
    }
}

fn replace_children(ctx: &mut NodeContext<'_>, old: Vec<NodeRef>, new: Vec<NodeRef>, timestamp: Timestamp) {
    if ctx.is_initialized() {
        for child in &old {
            unlink(ctx, child);
        }
        for child in &new {
            link(ctx, child);
        }
    }
    store(ctx, old, new, timestamp);
}

fn store(ctx: &mut NodeContext<'_>, old: Vec<NodeRef>, new: Vec<NodeRef>, timestamp: Timestamp) {
    ctx.release(old);
    if let Ok(field) = ctx.get_mut::<MultiNode>(CHILDREN) {
        field.set_values_at(new.into_iter().map(Some).collect(), timestamp);
    }
}
