use std::fmt;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde_json::{Value as JsonValue, json};

use super::FieldType;
use crate::node::NodeRef;

/// RGBA color, components in [0, 1]. Parsed colors carry alpha 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Each component clamped to [0, 1].
    #[inline]
    pub fn clamped(r: f32, g: f32, b: f32) -> Self {
        Self::rgb(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Axis-angle rotation. The axis is unit length; identity is (0,1,0) / 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotation {
    pub axis: Vec3,
    pub angle: f32,
}

impl Rotation {
    pub const IDENTITY: Rotation = Rotation {
        axis: Vec3::Y,
        angle: 0.0,
    };

    /// Normalizes the axis. `None` when the axis is (near) zero.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Option<Self> {
        axis.try_normalize().map(|axis| Self { axis, angle })
    }

    pub fn to_quat(self) -> glam::Quat {
        glam::Quat::from_axis_angle(self.axis, self.angle)
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A value type storable in a field. `TYPE` fixes the field's type tag.
pub trait FieldValue: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const TYPE: FieldType;

    fn to_json(&self) -> JsonValue;

    fn collect_nodes(&self, _out: &mut Vec<NodeRef>) {}
}

impl FieldValue for bool {
    const TYPE: FieldType = FieldType::Boolean;

    fn to_json(&self) -> JsonValue {
        JsonValue::Bool(*self)
    }
}

impl FieldValue for i32 {
    const TYPE: FieldType = FieldType::Int;

    fn to_json(&self) -> JsonValue {
        JsonValue::from(*self)
    }
}

impl FieldValue for f32 {
    const TYPE: FieldType = FieldType::Float;

    fn to_json(&self) -> JsonValue {
        JsonValue::from(*self)
    }
}

/// TIME values are seconds.
impl FieldValue for f64 {
    const TYPE: FieldType = FieldType::Time;

    fn to_json(&self) -> JsonValue {
        JsonValue::from(*self)
    }
}

impl FieldValue for String {
    const TYPE: FieldType = FieldType::String;

    fn to_json(&self) -> JsonValue {
        JsonValue::String(self.clone())
    }
}

impl FieldValue for Color {
    const TYPE: FieldType = FieldType::Color;

    fn to_json(&self) -> JsonValue {
        json!([self.r, self.g, self.b])
    }
}

impl FieldValue for Rotation {
    const TYPE: FieldType = FieldType::Rotation;

    fn to_json(&self) -> JsonValue {
        json!([self.axis.x, self.axis.y, self.axis.z, self.angle])
    }
}

impl FieldValue for Vec2 {
    const TYPE: FieldType = FieldType::Vector2;

    fn to_json(&self) -> JsonValue {
        json!(self.to_array())
    }
}

impl FieldValue for Vec3 {
    const TYPE: FieldType = FieldType::Vector3;

    fn to_json(&self) -> JsonValue {
        json!(self.to_array())
    }
}

impl FieldValue for Vec4 {
    const TYPE: FieldType = FieldType::Vector4;

    fn to_json(&self) -> JsonValue {
        json!(self.to_array())
    }
}

// Matrices are stored column-major and reported row by row.
impl FieldValue for Mat3 {
    const TYPE: FieldType = FieldType::Matrix3;

    fn to_json(&self) -> JsonValue {
        json!(self.transpose().to_cols_array_2d())
    }
}

impl FieldValue for Mat4 {
    const TYPE: FieldType = FieldType::Matrix4;

    fn to_json(&self) -> JsonValue {
        json!(self.transpose().to_cols_array_2d())
    }
}

impl FieldValue for Option<NodeRef> {
    const TYPE: FieldType = FieldType::Node;

    fn to_json(&self) -> JsonValue {
        match self {
            Some(node) => json!({
                "id": node.id().as_u64(),
                "type": node.type_name(),
                "name": node.name(),
            }),
            None => JsonValue::Null,
        }
    }

    fn collect_nodes(&self, out: &mut Vec<NodeRef>) {
        if let Some(node) = self {
            out.push(node.clone());
        }
    }
}
