/// Refresh token, login audit and contact challenge records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Refresh token record
///
/// Only the SHA-256 digest of the opaque value is stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// Login audit record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempt {
    pub id: String,
    pub user_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub login_timestamp: DateTime<Utc>,
    pub logout_timestamp: Option<DateTime<Utc>>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub attempted_email: Option<String>,
    pub is_active: bool,
}

/// Contact challenge code record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContactVerificationToken {
    pub id: String,
    pub user_id: String,
    pub channel: String,
    pub contact_value: String,
    #[serde(skip_serializing)]
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub attempt_count: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(expires_in: Duration, revoked: bool) -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            token_hash: "hash".to_string(),
            expires_at: now + expires_in,
            revoked,
            revoked_at: None,
            ip_address: None,
            user_agent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_refresh_token_activity() {
        assert!(token(Duration::days(7), false).is_active());
        assert!(!token(Duration::days(7), true).is_active());
        assert!(!token(Duration::seconds(-1), false).is_active());
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let t = token(Duration::days(1), false);
        assert!(t.is_expired_at(t.expires_at));
        assert!(t.is_active_at(t.expires_at - Duration::seconds(1)));
    }
}
