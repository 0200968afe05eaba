/// Document verification records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of identity document accepted for verification
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

/// Account verification request, without the image payload
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountVerification {
    pub id: i64,
    pub user_id: String,
    pub verification_type_id: i64,
    pub document_number: String,
    pub document_name: String,
    pub image_mime_type: Option<String>,
    pub status: String,
    pub admin_notes: Option<String>,
    pub reviewed_by_user_id: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Verification log record, one per status transition
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLog {
    pub id: String,
    pub verification_id: i64,
    pub admin_user_id: String,
    pub previous_status: String,
    pub new_status: String,
    pub action: String,
    pub reason: Option<String>,
    pub admin_remarks: Option<String>,
    pub action_timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
