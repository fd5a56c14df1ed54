use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::status_groups;

/// Batch lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Created, or resumed, and waiting for the worker to acknowledge dispatch
    #[default]
    Pending,
    /// The worker accepted the batch and rows are being generated
    Processing,
    /// Every row finished and none reported an error
    Completed,
    /// Every row finished and at least one reported an error
    CompletedWithErrors,
    /// Dispatch could not be delivered to the worker
    Failed,
    /// Cancelled by the client; rows are left untouched for a later resume
    Cancelled,
}

impl BatchState {
    /// Check if this state ends the lifecycle (absent an explicit resume)
    pub fn is_terminal(&self) -> bool {
        status_groups::FINISHED_STATES.contains(self)
    }

    /// Check if rows of a batch in this state are still expected to complete
    pub fn is_active(&self) -> bool {
        status_groups::ACTIVE_STATES.contains(self)
    }

    pub fn is_resumable(&self) -> bool {
        status_groups::RESUMABLE_STATES.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid batch state: {s}")),
        }
    }
}

/// Row ledger entry states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowState {
    #[default]
    Pending,
    Processing,
    Success,
    Error,
}

impl RowState {
    /// Terminal rows are never rewritten; repeated results for them are no-ops
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid row state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_state_terminal_check() {
        assert!(BatchState::Completed.is_terminal());
        assert!(BatchState::CompletedWithErrors.is_terminal());
        assert!(BatchState::Failed.is_terminal());
        assert!(BatchState::Cancelled.is_terminal());
        assert!(!BatchState::Pending.is_terminal());
        assert!(!BatchState::Processing.is_terminal());
    }

    #[test]
    fn test_resumable_states() {
        assert!(BatchState::Cancelled.is_resumable());
        assert!(BatchState::Failed.is_resumable());
        assert!(!BatchState::Completed.is_resumable());
        assert!(!BatchState::Processing.is_resumable());
    }

    #[test]
    fn test_row_state_terminal_check() {
        assert!(RowState::Success.is_terminal());
        assert!(RowState::Error.is_terminal());
        assert!(!RowState::Pending.is_terminal());
        assert!(!RowState::Processing.is_terminal());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(
            BatchState::CompletedWithErrors.to_string(),
            "completed_with_errors"
        );
        assert_eq!(
            "cancelled".parse::<BatchState>().unwrap(),
            BatchState::Cancelled
        );
        assert!("in_progress".parse::<BatchState>().is_err());

        assert_eq!(RowState::Success.to_string(), "success");
        assert_eq!("error".parse::<RowState>().unwrap(), RowState::Error);
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&BatchState::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed_with_errors\"");

        let parsed: RowState = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(parsed, RowState::Processing);
    }
}
