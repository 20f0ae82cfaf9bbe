use thiserror::Error;

use crate::api::types::NodeId;

#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("Store error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Unknown node: {0}")]
    NotFound(NodeId),
    #[error("Invariant violation: {0}")]
    Invariant(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl OutlineError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Errors that come from talking to the graph store. These are logged and
    /// swallowed on the write path; everything else is a caller or setup bug.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Api { .. }
                | Self::Http(_)
                | Self::StoreUnavailable(_)
                | Self::NotFound(_)
                | Self::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OutlineError>;

/// Ready-to-render "sync failed" indicator data
#[derive(Debug, Clone, PartialEq)]
pub struct SyncIssue {
    pub title: String,
    pub message: String,
    pub hint: String,
}

impl SyncIssue {
    pub fn from_error(e: &OutlineError) -> Self {
        match e {
            OutlineError::Api { status, message } => Self::from_api(*status, message),
            OutlineError::NotFound(id) => Self {
                title: "Missing Node".into(),
                message: format!("Node {} no longer exists in the store", id),
                hint: "Reload the page".into(),
            },
            OutlineError::Http(_) | OutlineError::StoreUnavailable(_) => Self {
                title: "Store Unreachable".into(),
                message: truncate(&e.to_string(), 80),
                hint: "Your changes may not have been saved".into(),
            },
            _ => Self {
                title: "Sync Failed".into(),
                message: truncate(&e.to_string(), 80),
                hint: "Your changes may not have been saved".into(),
            },
        }
    }

    fn from_api(status: u16, body: &str) -> Self {
        let extracted_message = extract_json_message(body);

        match status {
            401 | 403 => Self {
                title: "Unauthorized".into(),
                message: "The store rejected the access token".into(),
                hint: "Check store.token in config.toml".into(),
            },
            409 => Self {
                title: "Conflict".into(),
                message: extracted_message.unwrap_or_else(|| "Concurrent edit rejected".into()),
                hint: "Reload the page".into(),
            },
            429 => Self {
                title: "Rate Limited".into(),
                message: extracted_message.unwrap_or_else(|| "Too many requests".into()),
                hint: "Wait a moment and try again".into(),
            },
            _ => Self {
                title: format!("Store Error ({})", status),
                message: extracted_message.unwrap_or_else(|| truncate(body, 200)),
                hint: "Your changes may not have been saved".into(),
            },
        }
    }
}

fn extract_json_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(String::from))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_displays_status_and_message() {
        let err = OutlineError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Store error (500): boom");
    }

    #[test]
    fn invariant_error_displays_message() {
        let err = OutlineError::invariant("index 4 out of range (len 2)");
        assert_eq!(
            err.to_string(),
            "Invariant violation: index 4 out of range (len 2)"
        );
        assert!(!err.is_store_failure());
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OutlineError = io_err.into();
        assert!(matches!(err, OutlineError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn json_error_is_a_store_failure() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: OutlineError = json_err.into();
        assert!(err.is_store_failure());
    }

    #[test]
    fn sync_issue_from_429_extracts_message() {
        let err = OutlineError::Api {
            status: 429,
            message: r#"{"message":"slow down"}"#.into(),
        };
        let issue = SyncIssue::from_error(&err);
        assert_eq!(issue.title, "Rate Limited");
        assert_eq!(issue.message, "slow down");
    }

    #[test]
    fn sync_issue_from_unknown_status_plain_text() {
        let err = OutlineError::Api {
            status: 502,
            message: "bad gateway".into(),
        };
        let issue = SyncIssue::from_error(&err);
        assert_eq!(issue.title, "Store Error (502)");
        assert_eq!(issue.message, "bad gateway");
    }

    #[test]
    fn sync_issue_from_unavailable_truncates() {
        let err = OutlineError::StoreUnavailable("x".repeat(200));
        let issue = SyncIssue::from_error(&err);
        assert_eq!(issue.title, "Store Unreachable");
        assert!(issue.message.ends_with("..."));
        assert!(issue.message.chars().count() <= 83);
    }

    #[test]
    fn sync_issue_from_missing_node() {
        let err = OutlineError::NotFound(NodeId::from("0x9"));
        let issue = SyncIssue::from_error(&err);
        assert_eq!(issue.title, "Missing Node");
        assert!(issue.message.contains("0x9"));
    }
}
