//! Error classification and user-facing notices
//!
//! Collaborators (Ollama, SQLite, the prompt hub) give us no structured error
//! contract, so failures are sorted into an `ErrorKind` by case-insensitive
//! substring matching on their message. This is best effort: anything that
//! matches nothing is `Unknown` and keeps the raw message.

use std::fmt;

/// Category of a failure surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    QuotaExceeded,
    AuthenticationFailed,
    NetworkUnavailable,
    ToolkitMisconfigured,
    ParsingFailed,
    QueryExecutionFailed,
    /// Nothing matched; carries the raw message
    Unknown(String),
}

// Checked in order; first match wins.
const ASSEMBLY_RULES: &[(&[&str], Category)] = &[
    (&["429", "quota", "resource exhausted"], Category::Quota),
    (
        &["api_key", "api key", "401", "403", "permission denied"],
        Category::Auth,
    ),
    (&["hub", "connection", "failed to establish"], Category::Network),
    (&["toolkit", "argument"], Category::Toolkit),
];

const TURN_RULES: &[(&[&str], Category)] = &[
    (&["429", "resource", "quota"], Category::Quota),
    (&["api_key", "api key", "400", "401", "403"], Category::Auth),
    (&["parsing"], Category::Parsing),
    (&["operationalerror", "database error"], Category::Query),
];

#[derive(Debug, Clone, Copy)]
enum Category {
    Quota,
    Auth,
    Network,
    Toolkit,
    Parsing,
    Query,
}

impl Category {
    fn into_kind(self) -> ErrorKind {
        match self {
            Category::Quota => ErrorKind::QuotaExceeded,
            Category::Auth => ErrorKind::AuthenticationFailed,
            Category::Network => ErrorKind::NetworkUnavailable,
            Category::Toolkit => ErrorKind::ToolkitMisconfigured,
            Category::Parsing => ErrorKind::ParsingFailed,
            Category::Query => ErrorKind::QueryExecutionFailed,
        }
    }
}

fn classify(message: &str, rules: &[(&[&str], Category)]) -> ErrorKind {
    let lowered = message.to_lowercase();
    rules
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
        .map(|(_, category)| category.into_kind())
        .unwrap_or_else(|| ErrorKind::Unknown(message.to_string()))
}

/// Classify a failure raised while building the agent executor
pub fn classify_assembly_failure(message: &str) -> ErrorKind {
    classify(message, ASSEMBLY_RULES)
}

/// Classify a failure raised while running a chat turn
pub fn classify_turn_failure(message: &str) -> ErrorKind {
    classify(message, TURN_RULES)
}

impl ErrorKind {
    /// Notice shown when the agent could not be built
    pub fn assembly_notice(&self) -> Notice {
        let text = match self {
            ErrorKind::QuotaExceeded => "API quota exceeded. The AI engine is temporarily busy; \
                 wait a minute and try again."
                .to_string(),
            ErrorKind::AuthenticationFailed => "Invalid API key. Authentication failed; check the \
                 key passed with /key and make sure it is active."
                .to_string(),
            ErrorKind::NetworkUnavailable => "Network connection error. Failed to retrieve the agent \
                 prompt template; check your internet connection."
                .to_string(),
            ErrorKind::ToolkitMisconfigured => "Toolkit configuration error. The database tools could \
                 not be extracted; verify the database path."
                .to_string(),
            ErrorKind::ParsingFailed | ErrorKind::QueryExecutionFailed => {
                format!("System initialization failed: {}", self)
            }
            ErrorKind::Unknown(raw) => format!(
                "System initialization failed. An unexpected error occurred while building the \
                 agent engine. Technical details: {}",
                raw
            ),
        };
        Notice::error(text)
    }

    /// Notice shown when a chat turn failed
    pub fn turn_notice(&self) -> Notice {
        let text = match self {
            ErrorKind::QuotaExceeded => {
                "API quota exceeded. Please wait a moment or check your plan.".to_string()
            }
            ErrorKind::AuthenticationFailed => {
                "Invalid API key. Please check the key passed with /key.".to_string()
            }
            ErrorKind::ParsingFailed => {
                "Parsing error. The model response could not be interpreted. Please try again."
                    .to_string()
            }
            ErrorKind::QueryExecutionFailed => {
                "Database error. The generated SQL query failed to execute.".to_string()
            }
            ErrorKind::NetworkUnavailable | ErrorKind::ToolkitMisconfigured => {
                format!("An error occurred: {}", self)
            }
            ErrorKind::Unknown(raw) => format!("An error occurred: {}", raw),
        };
        Notice::error(text)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::QuotaExceeded => write!(f, "quota exceeded"),
            ErrorKind::AuthenticationFailed => write!(f, "authentication failed"),
            ErrorKind::NetworkUnavailable => write!(f, "network unavailable"),
            ErrorKind::ToolkitMisconfigured => write!(f, "toolkit misconfigured"),
            ErrorKind::ParsingFailed => write!(f, "parsing failed"),
            ErrorKind::QueryExecutionFailed => write!(f, "query execution failed"),
            ErrorKind::Unknown(raw) => write!(f, "unknown error: {}", raw),
        }
    }
}

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-visible message produced by a session action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembly_classification() {
        assert_eq!(
            classify_assembly_failure("HTTP 429: Too Many Requests"),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify_assembly_failure("Resource exhausted for project"),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify_assembly_failure("HTTP 403: forbidden"),
            ErrorKind::AuthenticationFailed
        );
        assert_eq!(
            classify_assembly_failure("Failed to establish a new connection"),
            ErrorKind::NetworkUnavailable
        );
        assert_eq!(
            classify_assembly_failure("toolkit binding failed: no tools"),
            ErrorKind::ToolkitMisconfigured
        );
    }

    #[test]
    fn test_unknown_keeps_raw_message() {
        let kind = classify_assembly_failure("Something Odd happened");
        assert_eq!(kind, ErrorKind::Unknown("Something Odd happened".to_string()));
        assert!(kind.assembly_notice().text.contains("Something Odd happened"));
    }

    #[test]
    fn test_first_rule_wins() {
        // quota is checked before authentication
        assert_eq!(
            classify_assembly_failure("quota exceeded for api_key xyz"),
            ErrorKind::QuotaExceeded
        );
    }

    #[test]
    fn test_turn_classification() {
        assert_eq!(
            classify_turn_failure("Model error: HTTP 429: slow down"),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify_turn_failure("You exceeded your current QUOTA"),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify_turn_failure("HTTP 400: API key not valid"),
            ErrorKind::AuthenticationFailed
        );
        assert_eq!(
            classify_turn_failure("Error parsing model response: EOF"),
            ErrorKind::ParsingFailed
        );
        assert_eq!(
            classify_turn_failure("Database error: background task failed"),
            ErrorKind::QueryExecutionFailed
        );
        assert!(matches!(
            classify_turn_failure("boom"),
            ErrorKind::Unknown(_)
        ));
    }

    #[test]
    fn test_notice_levels() {
        assert_eq!(ErrorKind::QuotaExceeded.turn_notice().level, NoticeLevel::Error);
        assert_eq!(Notice::warning("x").level, NoticeLevel::Warning);
        assert_eq!(Notice::success("done").to_string(), "done");
    }
}
