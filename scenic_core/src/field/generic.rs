use std::any::Any;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use scenic_ids::Timestamp;
use serde_json::Value as JsonValue;

use super::{Color, Dimension, Field, FieldType, FieldValue, Rotation};
use crate::node::NodeRef;

/// One value of type `T`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SingleField<T: FieldValue> {
    value: T,
    timestamp: Timestamp,
}

impl<T: FieldValue> SingleField<T> {
    /// A field holding `value` with an unset timestamp (templates, defaults).
    pub fn new(value: T) -> Self {
        Self {
            value,
            timestamp: Timestamp::invalid(),
        }
    }

    pub fn with_timestamp(value: T, timestamp: Timestamp) -> Self {
        Self { value, timestamp }
    }

    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Stores `value` stamped with the current time.
    pub fn set_value(&mut self, value: T) {
        self.set_value_at(value, Timestamp::now());
    }

    /// Stores `value` with a caller-controlled timestamp (replayed data).
    pub fn set_value_at(&mut self, value: T, timestamp: Timestamp) {
        self.value = value;
        self.timestamp = timestamp;
    }
}

/// Ordered sequence of `T`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiField<T: FieldValue> {
    values: Vec<T>,
    timestamp: Timestamp,
}

impl<T: FieldValue> MultiField<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values,
            timestamp: Timestamp::invalid(),
        }
    }

    pub fn with_timestamp(values: Vec<T>, timestamp: Timestamp) -> Self {
        Self { values, timestamp }
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set_values(&mut self, values: Vec<T>) {
        self.set_values_at(values, Timestamp::now());
    }

    pub fn set_values_at(&mut self, values: Vec<T>, timestamp: Timestamp) {
        self.values = values;
        self.timestamp = timestamp;
    }
}

impl<T: FieldValue> Field for SingleField<T> {
    #[inline]
    fn field_type(&self) -> FieldType {
        T::TYPE
    }

    #[inline]
    fn dimension(&self) -> Dimension {
        Dimension::Single
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    fn copy_field(&self) -> Box<dyn Field> {
        Box::new(self.clone())
    }

    fn assign(&mut self, other: &dyn Field) -> bool {
        match other.try_cast::<Self>() {
            Some(other) => {
                self.value = other.value.clone();
                self.timestamp = other.timestamp;
                true
            }
            None => false,
        }
    }

    fn value_eq(&self, other: &dyn Field) -> bool {
        other
            .try_cast::<Self>()
            .is_some_and(|other| other.value == self.value)
    }

    fn to_json(&self) -> JsonValue {
        self.value.to_json()
    }

    fn referenced_nodes(&self) -> Vec<NodeRef> {
        let mut out = Vec::new();
        self.value.collect_nodes(&mut out);
        out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: FieldValue> Field for MultiField<T> {
    #[inline]
    fn field_type(&self) -> FieldType {
        T::TYPE
    }

    #[inline]
    fn dimension(&self) -> Dimension {
        Dimension::Multi
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    fn copy_field(&self) -> Box<dyn Field> {
        Box::new(self.clone())
    }

    fn assign(&mut self, other: &dyn Field) -> bool {
        match other.try_cast::<Self>() {
            Some(other) => {
                self.values.clone_from(&other.values);
                self.timestamp = other.timestamp;
                true
            }
            None => false,
        }
    }

    fn value_eq(&self, other: &dyn Field) -> bool {
        other
            .try_cast::<Self>()
            .is_some_and(|other| other.values == self.values)
    }

    fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.values.iter().map(FieldValue::to_json).collect())
    }

    fn referenced_nodes(&self) -> Vec<NodeRef> {
        let mut out = Vec::new();
        for value in &self.values {
            value.collect_nodes(&mut out);
        }
        out
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Concrete field types whose (type, dimension) is known statically.
pub trait TypedField: Field + Clone {
    const TYPE: FieldType;
    const DIMENSION: Dimension;
}

impl<T: FieldValue> TypedField for SingleField<T> {
    const TYPE: FieldType = T::TYPE;
    const DIMENSION: Dimension = Dimension::Single;
}

impl<T: FieldValue> TypedField for MultiField<T> {
    const TYPE: FieldType = T::TYPE;
    const DIMENSION: Dimension = Dimension::Multi;
}

pub type SingleBool = SingleField<bool>;
pub type SingleInt = SingleField<i32>;
pub type SingleFloat = SingleField<f32>;
pub type SingleTime = SingleField<f64>;
pub type SingleString = SingleField<String>;
pub type SingleColor = SingleField<Color>;
pub type SingleRotation = SingleField<Rotation>;
pub type SingleVector2 = SingleField<Vec2>;
pub type SingleVector3 = SingleField<Vec3>;
pub type SingleVector4 = SingleField<Vec4>;
pub type SingleMatrix3 = SingleField<Mat3>;
pub type SingleMatrix4 = SingleField<Mat4>;
pub type SingleNode = SingleField<Option<NodeRef>>;

pub type MultiBool = MultiField<bool>;
pub type MultiInt = MultiField<i32>;
pub type MultiFloat = MultiField<f32>;
pub type MultiTime = MultiField<f64>;
pub type MultiString = MultiField<String>;
pub type MultiColor = MultiField<Color>;
pub type MultiRotation = MultiField<Rotation>;
pub type MultiVector2 = MultiField<Vec2>;
pub type MultiVector3 = MultiField<Vec3>;
pub type MultiVector4 = MultiField<Vec4>;
pub type MultiMatrix3 = MultiField<Mat3>;
pub type MultiMatrix4 = MultiField<Mat4>;
pub type MultiNode = MultiField<Option<NodeRef>>;

impl MultiNode {
    /// The non-null node references, in order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRef> {
        self.values.iter().flatten()
    }
}
