use thiserror::Error;

use crate::field::{Dimension, FieldType};
use crate::specification::Access;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("{node_type} has no field '{field}'")]
    FieldNotFound { node_type: String, field: String },

    #[error("field '{field}' does not permit {required} (access: {access})")]
    AccessDenied {
        field: String,
        required: Access,
        access: Access,
    },

    #[error("field '{field}' is {expected}/{expected_dim:?}, got {found}/{found_dim:?}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        expected_dim: Dimension,
        found: FieldType,
        found_dim: Dimension,
    },

    #[error("field '{0}' already exists")]
    FieldExists(String),

    #[error("{0} does not support dynamic fields")]
    NotDynamic(String),

    #[error("change of field '{0}' was rejected")]
    Rejected(String),

    #[error("node '{0}' not found")]
    NodeNotFound(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
