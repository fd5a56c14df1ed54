use serde::{Deserialize, Serialize};

/// Events that can trigger batch state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BatchEvent {
    /// The worker acknowledged receipt of the dispatch payload
    DispatchAccepted,
    /// Every row reached a terminal status
    Finalize { error_rows: usize },
    /// Dispatch failed fatally, with a human-readable reason
    Fail(String),
    Cancel,
    /// Re-enter pending so the unfinished rows can be dispatched again
    Resume,
}

impl BatchEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DispatchAccepted => "dispatch_accepted",
            Self::Finalize { .. } => "finalize",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::Resume => "resume",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
