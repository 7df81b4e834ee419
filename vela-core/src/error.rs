//! Runtime error kinds and diagnostic rendering.
//!
//! `RuntimeError` covers the fatal kinds that unwind evaluation
//! (`NameError`, `ArityError`, `DomainError`, `RedefinitionError`, and
//! the subset of `TypeError` that unwinds rather than warns —
//! wrong-kind method arguments and map keys). The arithmetic-operator
//! `TypeError` path does *not* unwind: it is reported as a `Diagnostic`
//! and the expression evaluates to `Nil`, handled directly in
//! `interpreter::Interpreter::eval_binary`/`eval_unary`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("[line {line}] undefined name '{name}'")]
    Name { name: String, line: usize },

    #[error("[line {line}] expected {expected} arguments but got {found}")]
    Arity { expected: usize, found: usize, line: usize },

    #[error("[line {line}] {message}")]
    Type { message: String, line: usize },

    #[error("[line {line}] {message}")]
    Domain { message: String, line: usize },

    #[error("[line {line}] '{name}' is already defined in this scope")]
    Redefinition { name: String, line: usize },
}

impl RuntimeError {
    pub fn line(&self) -> usize {
        match self {
            RuntimeError::Name { line, .. }
            | RuntimeError::Arity { line, .. }
            | RuntimeError::Type { line, .. }
            | RuntimeError::Domain { line, .. }
            | RuntimeError::Redefinition { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// A single user-visible diagnostic line: severity, message, and the
/// source line when known, per §7's "user-visible behavior".
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            severity,
            message: message.into(),
            line,
        }
    }

    pub fn render(&self) -> String {
        match self.line {
            Some(line) => format!("{} [line {}] {}", self.severity, line, self.message),
            None => format!("{} {}", self.severity, self.message),
        }
    }

    pub fn emit(&self) {
        match self.severity {
            Severity::Info => tracing::info!("{}", self.render()),
            Severity::Warning => tracing::warn!("{}", self.render()),
            Severity::Error => tracing::error!("{}", self.render()),
        }
    }
}
