/// Review states and the action labels derived from transitions
use crate::error::{TrustError, TrustResult};
use serde::{Deserialize, Serialize};

/// State of an account verification request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::UnderReview => "under_review",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> TrustResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(VerificationStatus::Pending),
            "under_review" => Ok(VerificationStatus::UnderReview),
            "approved" => Ok(VerificationStatus::Approved),
            "rejected" => Ok(VerificationStatus::Rejected),
            _ => Err(TrustError::Validation(format!("Invalid verification status: {}", s))),
        }
    }

    /// States that block a new submission by the same user
    pub const ACTIVE: [VerificationStatus; 3] = [
        VerificationStatus::Pending,
        VerificationStatus::UnderReview,
        VerificationStatus::Approved,
    ];

    pub fn blocks_resubmission(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Quoted `ACTIVE` labels for an SQL `IN (...)` clause
    pub fn active_sql_list() -> String {
        Self::ACTIVE
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Label recorded with every verification log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Updated,
    Approved,
    Rejected,
    UnderReview,
    Resubmitted,
}

impl LogAction {
    /// Derive the label from a (previous, new) status pair
    pub fn derive(previous: VerificationStatus, new: VerificationStatus) -> Self {
        if previous == new {
            return LogAction::Updated;
        }

        match new {
            VerificationStatus::Approved => LogAction::Approved,
            VerificationStatus::Rejected => LogAction::Rejected,
            VerificationStatus::UnderReview => LogAction::UnderReview,
            VerificationStatus::Pending => LogAction::Resubmitted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Updated => "updated",
            LogAction::Approved => "approved",
            LogAction::Rejected => "rejected",
            LogAction::UnderReview => "under_review",
            LogAction::Resubmitted => "resubmitted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VerificationStatus::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(VerificationStatus::parse("Under_Review").unwrap(), UnderReview);
        assert_eq!(VerificationStatus::parse("approved").unwrap(), Approved);
        assert!(matches!(
            VerificationStatus::parse("archived"),
            Err(TrustError::Validation(_))
        ));
    }

    #[test]
    fn test_derive_action() {
        assert_eq!(LogAction::derive(Pending, Pending), LogAction::Updated);
        assert_eq!(LogAction::derive(Approved, Approved), LogAction::Updated);
        assert_eq!(LogAction::derive(Pending, Approved), LogAction::Approved);
        assert_eq!(LogAction::derive(UnderReview, Rejected), LogAction::Rejected);
        assert_eq!(LogAction::derive(Pending, UnderReview), LogAction::UnderReview);
        assert_eq!(LogAction::derive(Rejected, Pending), LogAction::Resubmitted);
    }

    #[test]
    fn test_blocks_resubmission() {
        assert!(Pending.blocks_resubmission());
        assert!(UnderReview.blocks_resubmission());
        assert!(Approved.blocks_resubmission());
        assert!(!Rejected.blocks_resubmission());
    }

    #[test]
    fn test_active_sql_list_matches_blocking_states() {
        assert_eq!(
            VerificationStatus::active_sql_list(),
            "'pending', 'under_review', 'approved'"
        );
        for status in [Pending, UnderReview, Approved, Rejected] {
            let quoted = format!("'{}'", status.as_str());
            assert_eq!(
                VerificationStatus::active_sql_list().contains(&quoted),
                status.blocks_resubmission()
            );
        }
    }
}
