/*!
 * Script Errors
 * Error kinds raised while parsing or evaluating script code
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a script error; travels across the channel in error markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SyntaxError,
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    AttributeError,
    ImportError,
    IndexError,
    KeyError,
    RecursionError,
    RuntimeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An error raised by script code
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic, Serialize, Deserialize)]
#[error("{kind}: {message}")]
#[diagnostic(code(script::error))]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type ScriptResult<T> = Result<T, ScriptError>;

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>, line: usize, col: usize) -> Self {
        Self::new(
            ErrorKind::SyntaxError,
            format!("{} at {}:{}", message.into(), line, col),
        )
    }

    pub fn name(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message)
    }

    pub fn import(module: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::ImportError,
            format!("cannot import module '{}': {}", module, reason),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ScriptError::name("helper");
        assert_eq!(err.to_string(), "NameError: name 'helper' is not defined");
    }

    #[test]
    fn test_syntax_position() {
        let err = ScriptError::syntax("Unexpected token", 2, 5);
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert!(err.message.ends_with("at 2:5"));
    }
}
