// SPDX-License-Identifier: MIT

//! Typed error handling for installer-rules
//!
//! Definition-time problems are [`ConfigError`]s and abort loading.
//! Evaluation problems never leave the registry: leaf conditions log and
//! read as `false`, and structural faults ([`EvaluationError`]) are turned
//! into a closed gate by the registry.

use thiserror::Error;

/// Top-level error type for installer-rules
#[derive(Debug, Error)]
pub enum RulesError {
    /// Malformed condition specification
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Definition-time errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A condition with this id is already registered
    #[error("Condition '{0}' already registered")]
    DuplicateCondition(String),

    /// A required element is absent or empty
    #[error("Condition '{id}' of type {kind} is missing element '{element}'")]
    MissingElement {
        id: String,
        kind: String,
        element: String,
    },

    /// Combinator with the wrong number of operands
    #[error("Condition '{id}' of type {kind} needs exactly {expected} operand(s), found {found}")]
    WrongChildCount {
        id: String,
        kind: String,
        expected: usize,
        found: usize,
    },

    /// Zero or several of a set of mutually exclusive elements
    #[error("Condition '{id}' needs exactly one of {allowed}, found {found}")]
    AmbiguousContent {
        id: String,
        allowed: String,
        found: usize,
    },

    /// Unknown `type` tag
    #[error("Condition '{id}' has unknown type '{kind}'")]
    UnknownType { id: String, kind: String },

    /// Unknown comparison operator attribute
    #[error("Condition '{id}' has unknown operator '{operator}'")]
    UnknownOperator { id: String, operator: String },

    /// A reference or operand that does not resolve
    #[error("Condition '{id}' refers to unknown condition '{target}'")]
    UnresolvedReference { id: String, target: String },
}

impl ConfigError {
    /// Create a missing element error
    pub fn missing(
        id: impl Into<String>,
        kind: impl Into<String>,
        element: impl Into<String>,
    ) -> Self {
        Self::MissingElement {
            id: id.into(),
            kind: kind.into(),
            element: element.into(),
        }
    }

    /// Create an unresolved reference error
    pub fn unresolved(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            id: id.into(),
            target: target.into(),
        }
    }
}

/// Compact expression errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An operator with nothing after it, or an empty expression
    #[error("Missing operand in expression '{0}'")]
    MissingOperand(String),

    /// An operand that is not a registered condition id
    #[error("Unknown condition '{id}' in expression '{expression}'")]
    UnknownCondition { id: String, expression: String },

    /// More operators than the parser nests
    #[error("Expression of {length} bytes has more than {limit} operators")]
    TooComplex { length: usize, limit: usize },
}

/// Structural faults found while evaluating a condition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// A reference or operand link that does not resolve in the registry
    #[error("Condition '{0}' is not registered")]
    UnresolvedLink(String),
}

/// Symbol resolution failures for dynamic probes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Can't find type {0}")]
    TypeNotFound(String),

    #[error("No such field: {type_name}.{field}")]
    FieldNotFound { type_name: String, field: String },

    #[error("No permission to access field: {type_name}.{field}")]
    AccessDenied { type_name: String, field: String },
}
