//! Typed value containers.
//!
//! Every concrete field is a `SingleField<T>` or `MultiField<T>` over one of the
//! closed set of value types. Generic call sites work through `dyn Field` and
//! `Field::assign`; typed call sites downcast with `cast`/`try_cast`.

mod generic;
mod value;

pub use generic::*;
pub use value::*;

use std::any::Any;
use std::fmt;

use scenic_ids::Timestamp;
use serde_json::Value as JsonValue;

use crate::node::NodeRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    Int,
    Float,
    Time,
    String,
    Color,
    Rotation,
    Vector2,
    Vector3,
    Vector4,
    Matrix3,
    Matrix4,
    Node,
    Invalid,
}

/// 0 = one value, 1 = ordered sequence of values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    Single,
    Multi,
}

impl FieldType {
    pub const ALL: [FieldType; 13] = [
        FieldType::Boolean,
        FieldType::Color,
        FieldType::Float,
        FieldType::Int,
        FieldType::Matrix3,
        FieldType::Matrix4,
        FieldType::Node,
        FieldType::Rotation,
        FieldType::String,
        FieldType::Time,
        FieldType::Vector2,
        FieldType::Vector3,
        FieldType::Vector4,
    ];

    /// Suffix of the classic type keyword (`SF<suffix>` / `MF<suffix>`).
    pub const fn keyword_suffix(self) -> &'static str {
        match self {
            FieldType::Boolean => "Bool",
            FieldType::Int => "Int32",
            FieldType::Float => "Float",
            FieldType::Time => "Time",
            FieldType::String => "String",
            FieldType::Color => "Color",
            FieldType::Rotation => "Rotation",
            FieldType::Vector2 => "Vec2f",
            FieldType::Vector3 => "Vec3f",
            FieldType::Vector4 => "Vec4f",
            FieldType::Matrix3 => "Matrix3f",
            FieldType::Matrix4 => "Matrix4f",
            FieldType::Node => "Node",
            FieldType::Invalid => "Invalid",
        }
    }

    /// The classic encoding keyword, e.g. `SFVec3f` or `MFNode`.
    pub fn keyword(self, dimension: Dimension) -> String {
        let prefix = match dimension {
            Dimension::Single => "SF",
            Dimension::Multi => "MF",
        };
        format!("{prefix}{}", self.keyword_suffix())
    }

    pub fn from_keyword(keyword: &str) -> Option<(FieldType, Dimension)> {
        let dimension = if keyword.starts_with("SF") {
            Dimension::Single
        } else if keyword.starts_with("MF") {
            Dimension::Multi
        } else {
            return None;
        };
        let suffix = &keyword[2..];
        Self::ALL
            .iter()
            .find(|t| t.keyword_suffix() == suffix)
            .map(|t| (*t, dimension))
    }

    /// Types only available in the extended grammar variants.
    #[inline]
    pub const fn is_extended(self) -> bool {
        matches!(
            self,
            FieldType::Vector4 | FieldType::Matrix3 | FieldType::Matrix4
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Boolean => "BOOLEAN",
            FieldType::Int => "INT",
            FieldType::Float => "FLOAT",
            FieldType::Time => "TIME",
            FieldType::String => "STRING",
            FieldType::Color => "COLOR",
            FieldType::Rotation => "ROTATION",
            FieldType::Vector2 => "VECTOR2",
            FieldType::Vector3 => "VECTOR3",
            FieldType::Vector4 => "VECTOR4",
            FieldType::Matrix3 => "MATRIX3",
            FieldType::Matrix4 => "MATRIX4",
            FieldType::Node => "NODE",
            FieldType::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

/// Abstract value holder.
///
/// `field_type` and `dimension` are fixed by the concrete type. `assign` is the
/// only mutation available to untyped call sites: it copies value and timestamp
/// from a field of the same (type, dimension) and returns false otherwise,
/// leaving the receiver untouched.
pub trait Field: Any + Send + Sync + fmt::Debug {
    fn field_type(&self) -> FieldType;
    fn dimension(&self) -> Dimension;

    fn timestamp(&self) -> Timestamp;
    fn set_timestamp(&mut self, timestamp: Timestamp);

    fn copy_field(&self) -> Box<dyn Field>;
    fn assign(&mut self, other: &dyn Field) -> bool;

    /// Value equality; timestamps are ignored.
    fn value_eq(&self, other: &dyn Field) -> bool;

    fn to_json(&self) -> JsonValue;

    /// Nodes held by a NODE field, in order. Empty for every other type.
    fn referenced_nodes(&self) -> Vec<NodeRef>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<'a> dyn Field + 'a {
    #[inline]
    pub fn try_cast<F: Field>(&self) -> Option<&F> {
        self.as_any().downcast_ref::<F>()
    }

    #[inline]
    pub fn try_cast_mut<F: Field>(&mut self) -> Option<&mut F> {
        self.as_any_mut().downcast_mut::<F>()
    }

    /// Checked downcast.
    ///
    /// # Panics
    /// When the field is not an `F`. Callers verify `field_type()` and
    /// `dimension()` first; a wrong cast is a contract violation.
    pub fn cast<F: Field>(&self) -> &F {
        let (ty, dim) = (self.field_type(), self.dimension());
        match self.try_cast::<F>() {
            Some(f) => f,
            None => panic!(
                "invalid field cast from {ty}/{dim:?} to {}",
                std::any::type_name::<F>()
            ),
        }
    }

    /// Mutable variant of [`cast`](#method.cast). Same precondition.
    pub fn cast_mut<F: Field>(&mut self) -> &mut F {
        let (ty, dim) = (self.field_type(), self.dimension());
        match self.try_cast_mut::<F>() {
            Some(f) => f,
            None => panic!(
                "invalid field cast from {ty}/{dim:?} to {}",
                std::any::type_name::<F>()
            ),
        }
    }

    #[inline]
    pub fn same_kind(&self, other: &dyn Field) -> bool {
        self.field_type() == other.field_type() && self.dimension() == other.dimension()
    }
}

impl Clone for Box<dyn Field> {
    fn clone(&self) -> Self {
        self.copy_field()
    }
}

/// Default-valued field for a (type, dimension) pair. `None` for INVALID.
pub fn default_field(ty: FieldType, dimension: Dimension) -> Option<Box<dyn Field>> {
    macro_rules! make {
        ($t:ty) => {
            match dimension {
                Dimension::Single => Box::new(SingleField::<$t>::default()) as Box<dyn Field>,
                Dimension::Multi => Box::new(MultiField::<$t>::default()) as Box<dyn Field>,
            }
        };
    }

    let field = match ty {
        FieldType::Boolean => make!(bool),
        FieldType::Int => make!(i32),
        FieldType::Float => make!(f32),
        FieldType::Time => make!(f64),
        FieldType::String => make!(String),
        FieldType::Color => make!(Color),
        FieldType::Rotation => make!(Rotation),
        FieldType::Vector2 => make!(glam::Vec2),
        FieldType::Vector3 => make!(glam::Vec3),
        FieldType::Vector4 => make!(glam::Vec4),
        FieldType::Matrix3 => make!(glam::Mat3),
        FieldType::Matrix4 => make!(glam::Mat4),
        FieldType::Node => make!(Option<NodeRef>),
        FieldType::Invalid => return None,
    };
    Some(field)
}
