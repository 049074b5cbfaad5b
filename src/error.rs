//! Error types for agent operations
//!
//! Every failure an operation can hit is recovered locally and handed back to
//! the caller as an `ActionResult { success: false, message }`. Nothing here is
//! process-fatal.

use crate::agent::actions::ActionResult;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentError {
    #[error("Bot is already connected or connecting")]
    AlreadyActive,

    #[error("Bot is not connected")]
    NotConnected,

    #[error("Cannot restart: Bot connection information not available")]
    NoTargetKnown,

    #[error("{message}")]
    InvalidParameter { message: String },

    #[error("{message}")]
    ActionFailed { message: String },

    #[error("Agent supervisor is not running")]
    SupervisorUnavailable,
}

impl AgentError {
    /// Convert into the structured failure result returned to API callers
    pub fn to_action_result(&self) -> ActionResult {
        ActionResult::failure(sanitize_error_message(&self.to_string()))
    }

    /// Create invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create action failed error
    pub fn action_failed<S: Into<String>>(message: S) -> Self {
        Self::ActionFailed {
            message: message.into(),
        }
    }
}

impl From<crate::session::SessionError> for AgentError {
    fn from(err: crate::session::SessionError) -> Self {
        Self::action_failed(err.to_string())
    }
}

static SECRET_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").ok());

static SENSITIVE_PATH_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+").ok()
});

const MAX_MESSAGE_LEN: usize = 500;

/// Redact credentials and sensitive paths, then cap the length
///
/// Messages may carry text that originated from the game server or the broker,
/// so they are scrubbed before leaving the process.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    if let Some(re) = SECRET_PATTERN.as_ref() {
        sanitized = re.replace_all(&sanitized, "${1}=***").to_string();
    }

    if let Some(re) = SENSITIVE_PATH_PATTERN.as_ref() {
        sanitized = re.replace_all(&sanitized, "/***REDACTED***/").to_string();
    }

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_result_from_error() {
        let result = AgentError::NotConnected.to_action_result();

        assert!(!result.success);
        assert_eq!(result.message, "Bot is not connected");
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(
            AgentError::AlreadyActive.to_string(),
            "Bot is already connected or connecting"
        );
        assert_eq!(
            AgentError::NoTargetKnown.to_string(),
            "Cannot restart: Bot connection information not available"
        );
    }

    #[test]
    fn test_constructors_carry_message_verbatim() {
        let error = AgentError::invalid_parameter("Invalid weather type");
        assert!(matches!(error, AgentError::InvalidParameter { .. }));
        assert_eq!(error.to_string(), "Invalid weather type");

        let error = AgentError::action_failed("No food found in inventory");
        assert!(matches!(error, AgentError::ActionFailed { .. }));
        assert_eq!(error.to_string(), "No food found in inventory");
    }

    #[test]
    fn test_error_message_sanitization() {
        let error =
            AgentError::action_failed("Failed to authenticate: password=secret123 token=abc456");

        let result = error.to_action_result();

        assert!(!result.message.contains("secret123"));
        assert!(!result.message.contains("abc456"));
        assert!(result.message.contains("password=***"));
        assert!(result.message.contains("token=***"));
    }

    #[test]
    fn test_long_message_truncation() {
        let long_message = "x".repeat(600);
        let sanitized = sanitize_error_message(&long_message);

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long_message = "é".repeat(400);
        let sanitized = sanitize_error_message(&long_message);

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_file_path_redaction() {
        let message = "Failed to read /home/user/.ssh/id_rsa and /etc/secrets/api.key";
        let sanitized = sanitize_error_message(message);

        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("/home/user/.ssh/id_rsa"));
    }

    #[test]
    fn test_sanitize_case_insensitive() {
        let message = "PASSWORD=secret123 Token=abc Key=xyz";
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("secret123"));
        assert!(!sanitized.contains("abc"));
        assert!(!sanitized.contains("xyz"));
    }

    #[test]
    fn test_sanitize_exactly_500_chars() {
        let message = "x".repeat(500);
        let sanitized = sanitize_error_message(&message);
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_sanitize_empty_message() {
        assert_eq!(sanitize_error_message(""), "");
    }
}
