use serde::Serialize;

use crate::error::UiTestError;

/// Outcome of a best-effort operation (highlighting, capture, dismissal).
///
/// Best-effort helpers always return one of these instead of an error: a
/// failed highlight or screenshot must never mask the failure that triggered
/// it, so callers get `ok: false` plus the reason and decide for themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub ok: bool,
    pub attempts: u32,
    pub error_code: Option<String>,
    pub message: Option<String>,
}

impl Diagnostic {
    pub fn ok(attempts: u32) -> Self {
        Self {
            ok: true,
            attempts,
            error_code: None,
            message: None,
        }
    }

    pub fn ok_with(attempts: u32, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(attempts)
        }
    }

    pub fn failed(attempts: u32, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            attempts,
            error_code: Some(code.into()),
            message: Some(message.into()),
        }
    }

    pub fn from_error(attempts: u32, err: &UiTestError) -> Self {
        Self::failed(attempts, err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_error_keeps_code_and_message() {
        let err = UiTestError::command_failed("uitest command timed out");
        let diag = Diagnostic::from_error(1, &err);
        assert!(!diag.ok);
        assert_eq!(diag.error_code.as_deref(), Some("command_failed"));
        assert_eq!(
            diag.message.as_deref(),
            Some("command failed: uitest command timed out")
        );
    }
}
