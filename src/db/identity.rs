/// Identity and role records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identity record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_id: i64,
    pub email_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub phone_verified: bool,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Name shown to reviewers and in delivered messages
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

/// Role record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Columns of the identity table that support lookup by value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityColumn {
    Id,
    Email,
    PhoneNumber,
    RoleId,
}

impl IdentityColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityColumn::Id => "id",
            IdentityColumn::Email => "email",
            IdentityColumn::PhoneNumber => "phone_number",
            IdentityColumn::RoleId => "role_id",
        }
    }
}
