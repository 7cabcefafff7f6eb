use std::fmt;
use std::path::PathBuf;

use scenic_core::NodeError;
use thiserror::Error;

/// 1-based source location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const START: Position = Position { line: 1, column: 1 };
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{position}: expected {expected}, got {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: Position,
    },

    #[error("{position}: unexpected end of file")]
    UnexpectedEof { position: Position },

    #[error("{position}: invalid file header \"{found}\"")]
    InvalidHeader { found: String, position: Position },

    #[error("{position}: .{extension} files need the header \"{expected}\", got \"{found}\"")]
    HeaderMismatch {
        extension: String,
        expected: &'static str,
        found: String,
        position: Position,
    },

    #[error("{position}: {node_type} has no field '{field}'")]
    UnknownField {
        node_type: String,
        field: String,
        position: Position,
    },

    #[error("{position}: {source}")]
    Node {
        #[source]
        source: NodeError,
        position: Position,
    },

    #[error("parsing was cancelled")]
    Cancelled,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Where the error was detected, when known.
    pub fn position(&self) -> Option<Position> {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEof { position }
            | ParseError::InvalidHeader { position, .. }
            | ParseError::HeaderMismatch { position, .. }
            | ParseError::UnknownField { position, .. }
            | ParseError::Node { position, .. } => Some(*position),
            ParseError::Cancelled | ParseError::Io { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
