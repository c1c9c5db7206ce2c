//! Bridge error types
//!
//! Host-facing failures are `EngineError`. Script-level failures never
//! appear here: they travel as [`wisp_script::Thrown`] values and end up in
//! the engine's queryable [`ScriptError`] list.

/// Result type for host-facing engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Host-facing engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A session is already running
    #[error("engine is already running")]
    AlreadyRunning,

    /// The operation requires a running session
    #[error("engine is not running")]
    NotRunning,

    /// IO error (script file not found, working directory invalid, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry in the engine's script-error list.
///
/// Collected whenever top-level evaluation, pre-code, or a host-invoked
/// function ends in a thrown script error; queryable and clearable by the
/// host at any time while the session runs.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptError {
    /// Exception message, including the error-kind prefix
    pub message: String,
    /// Script name the error originated from
    pub script: String,
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub column: u32,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.script, self.line, self.column, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = ScriptError {
            message: "Error: boom".to_string(),
            script: "pre-code".to_string(),
            line: 2,
            column: 5,
        };
        assert_eq!(err.to_string(), "pre-code:2:5: Error: boom");
    }
}
