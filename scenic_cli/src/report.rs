//! Human-readable and JSON views of a loaded scene.

use std::fmt::Write;

use scenic_core::{Node, NodeRef, Scene};
use serde_json::{Map, Value, json};

fn label(node: &Node) -> String {
    let name = node.name();
    if name.is_empty() {
        format!("{} #{}", node.type_name(), node.id())
    } else {
        format!("{name} #{}", node.id())
    }
}

fn fields_json(node: &Node) -> Map<String, Value> {
    node.field_names()
        .into_iter()
        .filter_map(|name| {
            let value = node.with_field(&name, |f| f.to_json()).ok()?;
            Some((name, value))
        })
        .collect()
}

pub fn node_json(node: &NodeRef) -> Value {
    json!({
        "id": node.id().as_u64(),
        "type": node.type_name(),
        "name": node.name(),
        "dynamic": node.dynamic_field_names(),
        "fields": fields_json(node),
    })
}

pub fn scene_json(scene: &Scene) -> Value {
    let routes: Vec<Value> = scene
        .routes()
        .into_iter()
        .map(|(source, field, route)| {
            json!({
                "from": source.id().as_u64(),
                "fromField": field,
                "to": route.target.as_u64(),
                "toField": route.field,
            })
        })
        .collect();
    let meta: Map<String, Value> = scene
        .meta()
        .iter()
        .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
        .collect();
    json!({
        "scene": scene.id().as_u64(),
        "file": scene.environment().filename().display().to_string(),
        "library": scene.environment().library(),
        "profile": scene.profile(),
        "meta": meta,
        "children": scene.children().iter().map(|n| n.id().as_u64()).collect::<Vec<_>>(),
        "nodes": scene.nodes().iter().map(node_json).collect::<Vec<_>>(),
        "routes": routes,
    })
}

/// One block per node in document order, then the routes.
pub fn scene_text(scene: &Scene) -> String {
    let mut out = String::new();
    let env = scene.environment();
    let _ = writeln!(out, "scene #{} ({})", scene.id(), env.filename().display());
    if let Some(profile) = scene.profile() {
        let _ = writeln!(out, "profile {profile}");
    }
    for (key, value) in scene.meta() {
        let _ = writeln!(out, "meta {key:?} {value:?}");
    }

    for node in scene.nodes() {
        let _ = writeln!(out, "\n{}", label(&node));
        let dynamic = node.dynamic_field_names();
        for (name, value) in fields_json(&node) {
            let marker = if dynamic.contains(&name) { "+" } else { " " };
            let _ = writeln!(out, " {marker}{name} = {value}");
        }
    }

    let routes = scene.routes();
    if !routes.is_empty() {
        out.push('\n');
    }
    let registry = env.registry();
    for (source, field, route) in routes {
        let target = registry
            .node(route.target)
            .map(|n| label(&n))
            .unwrap_or_else(|| format!("#{}", route.target));
        let _ = writeln!(out, "ROUTE {}.{field} TO {target}.{}", label(&source), route.field);
    }
    out
}
