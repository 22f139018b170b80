//! Error handling for the Slarity compiler

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Lexer Errors ====================

    #[error("Unexpected token {ch:?} at {line}:{column}, expecting: {expected}")]
    UnexpectedChar {
        ch: char,
        expected: String,
        line: usize,
        column: usize,
    },

    // ==================== Parser Errors ====================

    #[error("Integer literal out of range: {lexeme}")]
    InvalidNumber { lexeme: String },

    #[error("Operator {op} is missing an operand")]
    MissingOperand { op: String },

    #[error("Cannot assign to {target}")]
    InvalidAssignTarget { target: String },

    #[error("Unbalanced {open} in {context}")]
    UnbalancedBracket { open: &'static str, context: String },

    #[error("Malformed definition of {name}: {reason}")]
    MalformedDefinition { name: String, reason: String },

    #[error("Expected a member name after '.', got {got}")]
    ExpectedMember { got: String },

    // ==================== Type Errors ====================

    /// Fatal: nothing meaningful can be emitted once a type is missing.
    #[error("Cannot resolve class: {name}")]
    UnresolvedClass { name: String },

    #[error("Class {class} has no member {member}")]
    UnknownMember { class: String, member: String },

    #[error("Invalid class summary record: {0}")]
    InvalidRecord(String),

    // ==================== Driver Errors ====================

    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Whether this error must halt the whole run rather than one unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnresolvedClass { .. })
    }

    /// Short stable code used by the JSON report
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnexpectedChar { .. } => "E0001",
            Self::InvalidNumber { .. } => "E0100",
            Self::MissingOperand { .. } => "E0101",
            Self::InvalidAssignTarget { .. } => "E0102",
            Self::UnbalancedBracket { .. } => "E0103",
            Self::MalformedDefinition { .. } => "E0104",
            Self::ExpectedMember { .. } => "E0105",
            Self::UnresolvedClass { .. } => "E0201",
            Self::UnknownMember { .. } => "E0202",
            Self::InvalidRecord(_) => "E0203",
            Self::Io(_) => "E0301",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
