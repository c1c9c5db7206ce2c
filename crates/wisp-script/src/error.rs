//! Script-visible exceptions
//!
//! A `Thrown` is a script exception in flight. It is a value, not a Rust
//! error: callbacks raise it through the argument adapter, and it unwinds
//! through the bridge's access operations until a script-side handler (or
//! the top-level error list) absorbs it.

/// Exception flavor, mirroring the two error constructors the bridge
/// exposes to host callbacks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThrownKind {
    /// A plain error
    Error,
    /// A type error
    TypeError,
}

impl std::fmt::Display for ThrownKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThrownKind::Error => f.write_str("Error"),
            ThrownKind::TypeError => f.write_str("TypeError"),
        }
    }
}

/// A script exception in flight
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Thrown {
    /// Exception flavor
    pub kind: ThrownKind,
    /// Human-readable message
    pub message: String,
}

impl Thrown {
    /// Create a plain error
    pub fn error(message: impl Into<String>) -> Self {
        Thrown {
            kind: ThrownKind::Error,
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Thrown {
            kind: ThrownKind::TypeError,
            message: message.into(),
        }
    }
}
