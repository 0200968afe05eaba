/// Document verification review workflow
///
/// A user submits an identity document; administrators move the request
/// through `pending -> under_review -> approved | rejected`, and every
/// transition lands in the append-only verification log.

mod status;
mod workflow;

pub use status::{LogAction, VerificationStatus};
pub use workflow::ReviewWorkflow;

use crate::db::verification::AccountVerification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Uploaded document image
#[derive(Debug, Clone)]
pub struct DocumentImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Submission of a new verification request
#[derive(Debug, Clone)]
pub struct SubmitVerification {
    pub verification_type_id: i64,
    pub document_number: String,
    pub document_name: String,
    pub image: Option<DocumentImage>,
}

/// Verification request with its document type
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountVerificationView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub verification: AccountVerification,
    pub verification_type_name: String,
    pub verification_type_description: Option<String>,
}

/// Verification request as listed in the reviewer queue
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequestView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub verification: AccountVerification,
    pub verification_type_name: String,
    pub user_name: String,
    pub user_email: String,
    pub has_image: bool,
}

/// Reviewer decision on a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Query parameters for the log listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub verification_id: Option<i64>,
}

/// Summary returned after a transition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub verification: AccountVerificationView,
    pub log_id: String,
    pub action: String,
    pub previous_status: String,
    pub new_status: String,
    pub action_timestamp: DateTime<Utc>,
}
