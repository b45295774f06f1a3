//! Error taxonomy shared by every layer of the client.
//!
//! Proxy and extractor errors propagate unchanged. The façade turns "not
//! found" into [`UiTestError::AssertionFailed`] only inside its assertion
//! helpers, and best-effort helpers never return these at all (they report a
//! [`crate::diagnostic::Diagnostic`] instead).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UiTestError>;

#[derive(Error, Debug)]
pub enum UiTestError {
    /// The bridge reported it cannot reach the target application.
    #[error("{target} is not running or not responding. Start it with: {target} -d")]
    TargetNotRunning { target: String },

    #[error("command failed: {reason}")]
    CommandFailed { reason: String },

    #[error("no JSON found in output: {preview}")]
    NoJsonFound { preview: String },

    #[error("failed to parse JSON response: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("{message}")]
    AssertionFailed { message: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{tool} not found. Install with: apt install {tool}")]
    InputToolMissing { tool: String },

    #[error("invalid configuration {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl UiTestError {
    pub fn command_failed(reason: impl Into<String>) -> Self {
        UiTestError::CommandFailed {
            reason: reason.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        UiTestError::AssertionFailed {
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        UiTestError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, UiTestError::AssertionFailed { .. })
    }

    /// Short machine-readable code, used in diagnostics and CLI JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            UiTestError::TargetNotRunning { .. } => "target_not_running",
            UiTestError::CommandFailed { .. } => "command_failed",
            UiTestError::NoJsonFound { .. } => "no_json_found",
            UiTestError::MalformedJson(_) => "malformed_json",
            UiTestError::AssertionFailed { .. } => "assertion_failed",
            UiTestError::NotFound { .. } => "not_found",
            UiTestError::InputToolMissing { .. } => "input_tool_missing",
            UiTestError::InvalidConfig { .. } => "invalid_config",
            UiTestError::Io { .. } => "io",
        }
    }
}
