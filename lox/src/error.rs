use std::fmt;

use thiserror::Error;

use crate::token::Span;

#[derive(Debug, Error)]
pub enum LoxError {
    #[error("Could not read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("[line {line}] Error: {message}")]
    Scan {
        message: String,
        line: usize,
        span: Span,
    },

    #[error("[line {line}] Error: {message}")]
    Parse {
        message: String,
        line: usize,
        span: Span,
    },

    #[error("[line {line}] Error: {message}")]
    Resolution {
        message: String,
        line: usize,
        span: Span,
    },

    #[error("{message}\n[line {line}]")]
    Runtime {
        message: String,
        line: usize,
        span: Span,
    },
}

/// Which phase a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Syntax,
    Static,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Io => write!(f, "I/O error"),
            ErrorKind::Syntax => write!(f, "Syntax error"),
            ErrorKind::Static => write!(f, "Resolution error"),
            ErrorKind::Runtime => write!(f, "Runtime error"),
        }
    }
}

impl LoxError {
    pub fn runtime(message: impl Into<String>, line: usize, span: Span) -> Self {
        LoxError::Runtime {
            message: message.into(),
            line,
            span,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LoxError::Io(_) => ErrorKind::Io,
            LoxError::Scan { .. } | LoxError::Parse { .. } => ErrorKind::Syntax,
            LoxError::Resolution { .. } => ErrorKind::Static,
            LoxError::Runtime { .. } => ErrorKind::Runtime,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            LoxError::Io(_) => None,
            LoxError::Scan { line, .. }
            | LoxError::Parse { line, .. }
            | LoxError::Resolution { line, .. }
            | LoxError::Runtime { line, .. } => Some(*line),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            LoxError::Io(_) => None,
            LoxError::Scan { span, .. }
            | LoxError::Parse { span, .. }
            | LoxError::Resolution { span, .. }
            | LoxError::Runtime { span, .. } => Some(span.clone()),
        }
    }

    /// The human-readable message without the location prefix.
    pub fn message(&self) -> String {
        match self {
            LoxError::Io(e) => e.to_string(),
            LoxError::Scan { message, .. }
            | LoxError::Parse { message, .. }
            | LoxError::Resolution { message, .. }
            | LoxError::Runtime { message, .. } => message.clone(),
        }
    }
}

/// A non-fatal diagnostic. Warnings are reported but never stop evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub line: usize,
    pub span: Span,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Warning: {}", self.line, self.message)
    }
}
