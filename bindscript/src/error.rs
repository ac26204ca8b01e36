//! Error types for parsing and evaluation.

use std::borrow::Cow;

use thiserror::Error;

use crate::object::ScriptObject;
use crate::token::Span;
use crate::value::Value;

/// Result type for engine operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Errors raised by the parser and the evaluators.
#[derive(Error, Debug, Clone)]
pub enum ScriptError {
    /// Malformed source text. Parsing stops at the first one.
    #[error("SyntaxError: {message} ({}:{})", .span.line, .span.column)]
    Syntax { message: String, span: Span },
    /// Operation applied to a value of the wrong kind.
    #[error("TypeError: {0}")]
    Type(String),
    /// Write to a name that is bound nowhere.
    #[error("ReferenceError: {0}")]
    Reference(String),
    /// Numeric value or depth out of range.
    #[error("RangeError: {0}")]
    Range(String),
    /// Call to a host primitive the session forbids.
    #[error("NotAllowedError: {0}")]
    NotAllowed(String),
    /// Broken engine invariant.
    #[error("InternalError: {0}")]
    Internal(String),
    /// Value raised by a `throw` statement or a rejected pending result.
    #[error("Uncaught {0}")]
    Thrown(Value),
}

impl ScriptError {
    /// Create a syntax error.
    pub fn syntax<S: Into<String>>(msg: S, span: Span) -> Self {
        ScriptError::Syntax {
            message: msg.into(),
            span,
        }
    }

    /// Create a type error.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        ScriptError::Type(msg.into())
    }

    /// Create a reference error.
    pub fn reference<S: Into<String>>(msg: S) -> Self {
        ScriptError::Reference(msg.into())
    }

    /// Create a range error.
    pub fn range<S: Into<String>>(msg: S) -> Self {
        ScriptError::Range(msg.into())
    }

    /// Create a "not allowed to call" error for a banned host function.
    pub fn not_allowed(function: &str) -> Self {
        ScriptError::NotAllowed(format!("'{}' is not allowed to call", function))
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        ScriptError::Internal(msg.into())
    }

    /// Get error name.
    pub fn name(&self) -> &'static str {
        match self {
            ScriptError::Syntax { .. } => "SyntaxError",
            ScriptError::Type(_) => "TypeError",
            ScriptError::Reference(_) => "ReferenceError",
            ScriptError::Range(_) => "RangeError",
            ScriptError::NotAllowed(_) => "NotAllowedError",
            ScriptError::Internal(_) => "InternalError",
            ScriptError::Thrown(_) => "Error",
        }
    }

    /// Get error message.
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            ScriptError::Syntax { message, .. } => Cow::Borrowed(message),
            ScriptError::Type(msg)
            | ScriptError::Reference(msg)
            | ScriptError::Range(msg)
            | ScriptError::NotAllowed(msg)
            | ScriptError::Internal(msg) => Cow::Borrowed(msg),
            ScriptError::Thrown(value) => Cow::Owned(value.to_display_string()),
        }
    }

    /// Source position, when the error came from the parser.
    pub fn span(&self) -> Option<Span> {
        match self {
            ScriptError::Syntax { span, .. } => Some(*span),
            _ => None,
        }
    }

    /// The value a `catch` clause binds for this error.
    pub fn to_value(&self) -> Value {
        match self {
            ScriptError::Thrown(value) => value.clone(),
            other => {
                let mut object = ScriptObject::new();
                object.set("name", Value::from(other.name()));
                object.set("message", Value::from(other.message().into_owned()));
                Value::object(object)
            }
        }
    }
}
