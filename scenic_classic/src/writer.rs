//! Serializer back to the classic encoding.
//!
//! Nodes are written depth-first from the scene's top-level children. The
//! first occurrence of a shared node carries a `DEF`, later ones are `USE`.
//! Unnamed nodes that need a name (shared, or the end of a ROUTE) get
//! `<Type>_<id>`. Only fields that differ from their specification default are
//! written; input-only fields are never written. ROUTEs go last.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};
use scenic_core::{
    Access, Color, Dimension, Field, FieldType, FieldValue, MultiField, NodeId, NodeRef, Rotation,
    Route, Scene, SingleField,
};

use crate::header::HeaderKind;

const INDENT: &str = "  ";

/// A value with a classic-encoding spelling.
trait Encode {
    fn encode(&self, out: &mut String);
}

impl Encode for bool {
    fn encode(&self, out: &mut String) {
        out.push_str(if *self { "TRUE" } else { "FALSE" });
    }
}

impl Encode for i32 {
    fn encode(&self, out: &mut String) {
        out.push_str(&self.to_string());
    }
}

impl Encode for f32 {
    fn encode(&self, out: &mut String) {
        out.push_str(&self.to_string());
    }
}

impl Encode for f64 {
    fn encode(&self, out: &mut String) {
        out.push_str(&self.to_string());
    }
}

impl Encode for String {
    fn encode(&self, out: &mut String) {
        out.push('"');
        for c in self.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    }
}

fn encode_floats(values: &[f32], out: &mut String) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        value.encode(out);
    }
}

impl Encode for Color {
    fn encode(&self, out: &mut String) {
        encode_floats(&[self.r, self.g, self.b], out);
    }
}

impl Encode for Rotation {
    fn encode(&self, out: &mut String) {
        encode_floats(&[self.axis.x, self.axis.y, self.axis.z, self.angle], out);
    }
}

impl Encode for Vec2 {
    fn encode(&self, out: &mut String) {
        encode_floats(&self.to_array(), out);
    }
}

impl Encode for Vec3 {
    fn encode(&self, out: &mut String) {
        encode_floats(&self.to_array(), out);
    }
}

impl Encode for Vec4 {
    fn encode(&self, out: &mut String) {
        encode_floats(&self.to_array(), out);
    }
}

// Matrices are stored column-major and written row by row.
impl Encode for Mat3 {
    fn encode(&self, out: &mut String) {
        encode_floats(&self.transpose().to_cols_array(), out);
    }
}

impl Encode for Mat4 {
    fn encode(&self, out: &mut String) {
        encode_floats(&self.transpose().to_cols_array(), out);
    }
}

/// Appends `field` if it holds `T`. Returns false for any other value type.
fn encode_field<T: FieldValue + Encode>(field: &dyn Field, out: &mut String) -> bool {
    if let Some(single) = field.try_cast::<SingleField<T>>() {
        single.value().encode(out);
        return true;
    }
    let Some(multi) = field.try_cast::<MultiField<T>>() else {
        return false;
    };
    if multi.is_empty() {
        out.push_str("[]");
        return true;
    }
    out.push_str("[ ");
    for (i, value) in multi.values().iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        value.encode(out);
    }
    out.push_str(" ]");
    true
}

pub struct Writer {
    header: HeaderKind,
    out: String,
    depth: usize,
    names: FxHashMap<NodeId, String>,
    written: FxHashSet<NodeId>,
}

impl Writer {
    pub fn new(header: HeaderKind) -> Self {
        Self {
            header,
            out: String::new(),
            depth: 0,
            names: FxHashMap::default(),
            written: FxHashSet::default(),
        }
    }

    pub fn write_scene(mut self, scene: &Scene) -> String {
        let scene_id = scene.id();
        let nodes = scene.nodes();
        let routes: Vec<_> = scene
            .routes()
            .into_iter()
            .filter(|(source, _, route)| source.id() != scene_id && route.target != scene_id)
            .collect();
        self.assign_names(scene, &nodes, &routes);

        self.out.push_str(self.header.line());
        self.out.push('\n');
        if self.header.has_x3d_keywords() {
            if let Some(profile) = scene.profile() {
                self.out.push_str(&format!("PROFILE {profile}\n"));
            }
            for (key, value) in scene.meta() {
                self.out.push_str("META ");
                key.encode(&mut self.out);
                self.out.push(' ');
                value.encode(&mut self.out);
                self.out.push('\n');
            }
        }

        for child in scene.children() {
            self.out.push('\n');
            self.write_node(&child);
            self.out.push('\n');
        }

        if !routes.is_empty() {
            self.out.push('\n');
        }
        for (source, field, route) in &routes {
            let (Some(from), Some(to)) = (self.names.get(&source.id()), self.names.get(&route.target))
            else {
                continue;
            };
            self.out
                .push_str(&format!("ROUTE {from}.{field} TO {to}.{}\n", route.field));
        }
        self.out
    }

    /// User names are kept. Unnamed nodes referenced more than once, or used
    /// by a ROUTE, get a generated name.
    fn assign_names(
        &mut self,
        scene: &Scene,
        nodes: &[NodeRef],
        routes: &[(NodeRef, String, Route)],
    ) {
        let mut uses: FxHashMap<NodeId, usize> = FxHashMap::default();
        for node in std::iter::once(scene.root()).chain(nodes) {
            for referenced in node.referenced_nodes() {
                *uses.entry(referenced.id()).or_insert(0) += 1;
            }
        }
        let mut routed = FxHashSet::default();
        for (source, _, route) in routes {
            routed.insert(source.id());
            routed.insert(route.target);
        }

        for node in nodes {
            let id = node.id();
            let name = node.name();
            if !name.is_empty() {
                self.names.insert(id, name);
            } else if uses.get(&id).is_some_and(|n| *n > 1) || routed.contains(&id) {
                self.names.insert(id, format!("{}_{id}", node.type_name()));
            }
        }
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn write_node(&mut self, node: &NodeRef) {
        let id = node.id();
        if !self.written.insert(id) {
            match self.names.get(&id) {
                Some(name) => self.out.push_str(&format!("USE {name}")),
                None => self.out.push_str("NULL"),
            }
            return;
        }
        if let Some(name) = self.names.get(&id) {
            self.out.push_str(&format!("DEF {name} "));
        }
        self.out.push_str(node.type_name());
        self.out.push_str(" {");
        self.depth += 1;

        let mut body = false;
        let spec = node.specification().clone();
        for (name, entry) in spec.entries() {
            let access = entry.access();
            if access.contains(Access::SET) && !access.contains(Access::GET) {
                continue;
            }
            let Ok(field) = node.field(name) else {
                continue;
            };
            if field.value_eq(entry.template()) {
                continue;
            }
            self.newline();
            self.out.push_str(name);
            self.out.push(' ');
            self.write_value(field.as_ref());
            body = true;
        }

        for (name, field) in node.dynamic_fields() {
            let (ty, dimension) = (field.field_type(), field.dimension());
            if ty.is_extended() && !self.header.has_extended_types() {
                warn!(
                    "{} #{id}: dynamic field '{name}' needs an extended header, not written",
                    node.type_name()
                );
                continue;
            }
            self.newline();
            self.out
                .push_str(&format!("{} {name} ", ty.keyword(dimension)));
            self.write_value(field.as_ref());
            body = true;
        }

        self.depth -= 1;
        if body {
            self.newline();
        } else {
            self.out.push(' ');
        }
        self.out.push('}');
    }

    fn write_value(&mut self, field: &dyn Field) {
        let out = &mut self.out;
        let written = match field.field_type() {
            FieldType::Boolean => encode_field::<bool>(field, out),
            FieldType::Int => encode_field::<i32>(field, out),
            FieldType::Float => encode_field::<f32>(field, out),
            FieldType::Time => encode_field::<f64>(field, out),
            FieldType::String => encode_field::<String>(field, out),
            FieldType::Color => encode_field::<Color>(field, out),
            FieldType::Rotation => encode_field::<Rotation>(field, out),
            FieldType::Vector2 => encode_field::<Vec2>(field, out),
            FieldType::Vector3 => encode_field::<Vec3>(field, out),
            FieldType::Vector4 => encode_field::<Vec4>(field, out),
            FieldType::Matrix3 => encode_field::<Mat3>(field, out),
            FieldType::Matrix4 => encode_field::<Mat4>(field, out),
            FieldType::Node => {
                self.write_nodes(field);
                true
            }
            FieldType::Invalid => false,
        };
        if !written {
            warn!("cannot write a {} value", field.field_type());
            self.out.push_str("[]");
        }
    }

    fn write_nodes(&mut self, field: &dyn Field) {
        if field.dimension() == Dimension::Single {
            match field.referenced_nodes().first() {
                Some(node) => self.write_node(node),
                None => self.out.push_str("NULL"),
            }
            return;
        }
        let nodes = field.referenced_nodes();
        if nodes.is_empty() {
            self.out.push_str("[]");
            return;
        }
        self.out.push('[');
        self.depth += 1;
        for node in &nodes {
            self.newline();
            self.write_node(node);
        }
        self.depth -= 1;
        self.newline();
        self.out.push(']');
    }
}

/// Serializes `scene` with `header`.
pub fn write_scene(scene: &Scene, header: HeaderKind) -> String {
    Writer::new(header).write_scene(scene)
}
