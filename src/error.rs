//! Runtime error types (spec §7).
//!
//! Mirrors the teacher's `RuntimeError::{Recoverable, Halt}` split: most
//! faults (type mismatch, out-of-bounds index, unresolved global) are
//! well-formed runtime panics the VM can report and unwind from; a small
//! set of conditions (I/O failure loading a file, corrupt bytecode) halt
//! execution outright rather than trying to keep running.

use std::io;

use thiserror::Error;

use crate::value::Type;

/// Specific cause of a recoverable runtime fault. Surfaced to the host as
/// the message behind `ErrorKind::Runtime`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PanicReason {
    #[error("index {index} out of bounds (length {length})")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("wrong type for operation: expected {expected}, got {actual}")]
    TypeMismatch { expected: &'static str, actual: Type },

    #[error("operand types {lhs} and {rhs} are not comparable")]
    NotComparable { lhs: Type, rhs: Type },

    #[error("global symbol {0:?} has no definition")]
    UnresolvedGlobal(String),

    #[error("attempted to call a value of type {0}, which is not callable")]
    NotCallable(Type),

    #[error("integer division or modulo by zero")]
    DivisionByZero,

    #[error("call stack depth exceeded the nesting limit ({0})")]
    StackOverflow(usize),

    #[error("bitwise operation requires integer operands, got {0}")]
    NotAnInteger(Type),

    #[error("{0}")]
    Custom(String),
}

/// Runtime error description: either a well-formed, reportable panic, or an
/// unrecoverable condition that must halt execution (grounded in the
/// teacher's `RuntimeError`).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Recoverable(#[from] PanicReason),
    #[error("unrecoverable error: {0}")]
    Halt(#[from] io::Error),
}

impl RuntimeError {
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }

    pub const fn must_halt(&self) -> bool {
        matches!(self, Self::Halt(_))
    }

    pub fn panic_reason(&self) -> Option<&PanicReason> {
        match self {
            Self::Recoverable(r) => Some(r),
            Self::Halt(_) => None,
        }
    }
}

/// The coarse error category a [`crate::context::Context`] reports via
/// `geterrtype` (spec §6/§7), mirroring the original's split between
/// compile-time and run-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    /// No error is currently pending.
    #[default]
    None,
    /// The bridge compiler rejected the source text lexically or
    /// grammatically.
    Syntax,
    /// The bridge compiler accepted the grammar but rejected its meaning.
    Semantic,
    /// The VM raised a [`PanicReason`] while executing loaded bytecode.
    Runtime,
    /// Host-level failure unrelated to the guest program: a malformed
    /// object file, an I/O failure loading a source file, and so on.
    Generic,
}

/// The top-level error type threaded through [`crate::context::Context`].
/// Carries a human-readable message and, for runtime errors, the call
/// stack captured at the moment of failure.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct SparklingError {
    pub kind: ErrorKind,
    pub message: String,
    pub backtrace: Option<crate::backtrace::Backtrace>,
}

impl SparklingError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            backtrace: None,
        }
    }

    pub fn with_backtrace(mut self, backtrace: crate::backtrace::Backtrace) -> Self {
        self.backtrace = Some(backtrace);
        self
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Semantic, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, message)
    }

    pub fn runtime(reason: PanicReason, backtrace: crate::backtrace::Backtrace) -> Self {
        Self::new(ErrorKind::Runtime, reason.to_string()).with_backtrace(backtrace)
    }
}

impl From<crate::image::ImageError> for SparklingError {
    fn from(e: crate::image::ImageError) -> Self {
        Self::generic(e.to_string())
    }
}
