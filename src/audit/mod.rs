/// Append-only audit trail
///
/// Two streams live here: one row per login attempt (and its later logout
/// stamp), and one row per verification status transition. Transition rows
/// are written inside the caller's transaction so a review and its log entry
/// commit or roll back together.
use crate::{
    auth::RequestMeta,
    db::{token::LoginAttempt, verification::VerificationLog},
    error::{TrustError, TrustResult},
    verification::{LogAction, VerificationStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Default page size for the login audit listing
pub const DEFAULT_LOGIN_LIMIT: i64 = 100;

/// Outcome of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failed,
    Error,
}

impl LoginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStatus::Success => "success",
            LoginStatus::Failed => "failed",
            LoginStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> TrustResult<Self> {
        match s.to_lowercase().as_str() {
            "success" => Ok(LoginStatus::Success),
            "failed" => Ok(LoginStatus::Failed),
            "error" => Ok(LoginStatus::Error),
            _ => Err(TrustError::Validation(format!("Invalid login status: {}", s))),
        }
    }
}

/// Login attempt to be recorded
#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    /// `None` when the email did not resolve to an identity
    pub user_id: Option<String>,
    pub status: LoginStatus,
    pub failure_reason: Option<String>,
    pub attempted_email: Option<String>,
    pub meta: RequestMeta,
}

/// Status transition to be appended to the verification log
#[derive(Debug, Clone)]
pub struct NewVerificationLog {
    pub verification_id: i64,
    pub admin_user_id: String,
    pub previous_status: VerificationStatus,
    pub new_status: VerificationStatus,
    pub reason: Option<String>,
    pub admin_remarks: Option<String>,
    pub meta: RequestMeta,
}

/// Verification log entry joined with reviewer and subject details
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLogView {
    pub id: String,
    pub verification_id: i64,
    pub admin_user_id: String,
    pub admin_name: Option<String>,
    pub admin_email: Option<String>,
    pub user_id: Option<String>,
    pub previous_status: String,
    pub new_status: String,
    pub action: String,
    pub reason: Option<String>,
    pub admin_remarks: Option<String>,
    pub action_timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit log over the `login_audit` and `verification_log` tables
#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
}

impl AuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append a login attempt
    pub async fn record_login(&self, attempt: NewLoginAttempt) -> TrustResult<LoginAttempt> {
        let now = Utc::now();
        let row = LoginAttempt {
            id: Uuid::new_v4().to_string(),
            user_id: attempt.user_id.unwrap_or_else(|| Uuid::nil().to_string()),
            ip_address: attempt.meta.ip_or_unknown().to_string(),
            user_agent: attempt.meta.user_agent_or_empty().to_string(),
            login_timestamp: now,
            logout_timestamp: None,
            status: attempt.status.as_str().to_string(),
            failure_reason: attempt.failure_reason,
            attempted_email: attempt.attempted_email,
            // Only successful logins open a session
            is_active: attempt.status == LoginStatus::Success,
        };

        sqlx::query(
            "INSERT INTO login_audit (id, user_id, ip_address, user_agent, login_timestamp,
                                      status, failure_reason, attempted_email, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.ip_address)
        .bind(&row.user_agent)
        .bind(row.login_timestamp)
        .bind(&row.status)
        .bind(&row.failure_reason)
        .bind(&row.attempted_email)
        .bind(row.is_active)
        .execute(&self.db)
        .await?;

        Ok(row)
    }

    /// Stamp the logout time on the user's most recent active login.
    ///
    /// Returns false when there was no open session to close.
    pub async fn close_session(&self, user_id: &str) -> TrustResult<bool> {
        let result = sqlx::query(
            "UPDATE login_audit SET logout_timestamp = ?1, is_active = 0
             WHERE id = (
                 SELECT id FROM login_audit
                 WHERE user_id = ?2 AND status = 'success' AND is_active = 1
                 ORDER BY login_timestamp DESC
                 LIMIT 1
             )",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most recent login attempts, newest first
    pub async fn recent_logins(&self, limit: i64) -> TrustResult<Vec<LoginAttempt>> {
        let limit = if limit <= 0 { DEFAULT_LOGIN_LIMIT } else { limit };

        let rows = sqlx::query_as::<_, LoginAttempt>(
            "SELECT id, user_id, ip_address, user_agent, login_timestamp, logout_timestamp,
                    status, failure_reason, attempted_email, is_active
             FROM login_audit
             ORDER BY login_timestamp DESC
             LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Append a transition inside the caller's transaction
    pub async fn append_transition(
        conn: &mut SqliteConnection,
        entry: NewVerificationLog,
    ) -> TrustResult<VerificationLog> {
        let action = LogAction::derive(entry.previous_status, entry.new_status);

        let log = VerificationLog {
            id: Uuid::new_v4().to_string(),
            verification_id: entry.verification_id,
            admin_user_id: entry.admin_user_id,
            previous_status: entry.previous_status.as_str().to_string(),
            new_status: entry.new_status.as_str().to_string(),
            action: action.as_str().to_string(),
            reason: entry.reason,
            admin_remarks: entry.admin_remarks,
            action_timestamp: Utc::now(),
            ip_address: entry.meta.ip_address,
            user_agent: entry.meta.user_agent,
        };

        sqlx::query(
            "INSERT INTO verification_log (id, verification_id, admin_user_id, previous_status,
                                           new_status, action, reason, admin_remarks,
                                           action_timestamp, ip_address, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&log.id)
        .bind(log.verification_id)
        .bind(&log.admin_user_id)
        .bind(&log.previous_status)
        .bind(&log.new_status)
        .bind(&log.action)
        .bind(&log.reason)
        .bind(&log.admin_remarks)
        .bind(log.action_timestamp)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(
            verification_id = log.verification_id,
            action = %log.action,
            "appended verification log"
        );

        Ok(log)
    }

    /// Transition history, newest first, optionally for one verification
    pub async fn list_transitions(
        &self,
        verification_id: Option<i64>,
    ) -> TrustResult<Vec<VerificationLogView>> {
        let rows = sqlx::query_as::<_, VerificationLogView>(
            "SELECT l.id, l.verification_id, l.admin_user_id,
                    NULLIF(TRIM(COALESCE(a.first_name, '') || ' ' || COALESCE(a.last_name, '')), '')
                        AS admin_name,
                    a.email AS admin_email,
                    v.user_id AS user_id,
                    l.previous_status, l.new_status, l.action, l.reason, l.admin_remarks,
                    l.action_timestamp, l.ip_address, l.user_agent
             FROM verification_log l
             LEFT JOIN identity a ON a.id = l.admin_user_id
             LEFT JOIN account_verification v ON v.id = l.verification_id
             WHERE ?1 IS NULL OR l.verification_id = ?1
             ORDER BY l.action_timestamp DESC",
        )
        .bind(verification_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn seed_identity(pool: &SqlitePool, id: &str, first: &str, role_id: i64) {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO identity (id, first_name, last_name, email, password_hash, role_id,
                                   created_at, updated_at)
             VALUES (?1, ?2, 'Reyes', ?3, 'x', ?4, ?5, ?5)",
        )
        .bind(id)
        .bind(first)
        .bind(format!("{}@example.ph", id))
        .bind(role_id)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seed_verification(pool: &SqlitePool, user_id: &str) -> i64 {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO account_verification (user_id, verification_type_id, status,
                                               created_at, updated_at)
             VALUES (?1, 1, 'pending', ?2, ?2)",
        )
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    fn attempt(user_id: Option<&str>, status: LoginStatus) -> NewLoginAttempt {
        NewLoginAttempt {
            user_id: user_id.map(str::to_string),
            status,
            failure_reason: None,
            attempted_email: Some("someone@example.ph".to_string()),
            meta: RequestMeta::new("198.51.100.4", "test-agent"),
        }
    }

    #[test]
    fn test_login_status_parse() {
        assert_eq!(LoginStatus::parse("SUCCESS").unwrap(), LoginStatus::Success);
        assert!(LoginStatus::parse("maybe").is_err());
    }

    #[tokio::test]
    async fn test_unknown_user_recorded_under_nil_uuid() {
        let audit = AuditLog::new(db::memory_pool().await.unwrap());
        let row = audit.record_login(attempt(None, LoginStatus::Failed)).await.unwrap();
        assert_eq!(row.user_id, Uuid::nil().to_string());
        assert!(!row.is_active);
    }

    #[tokio::test]
    async fn test_close_session_stamps_latest_success() {
        let audit = AuditLog::new(db::memory_pool().await.unwrap());
        audit.record_login(attempt(Some("u1"), LoginStatus::Success)).await.unwrap();
        audit.record_login(attempt(Some("u1"), LoginStatus::Failed)).await.unwrap();

        assert!(audit.close_session("u1").await.unwrap());
        assert!(!audit.close_session("u1").await.unwrap());

        let logins = audit.recent_logins(10).await.unwrap();
        assert_eq!(logins.len(), 2);
        let success = logins.iter().find(|l| l.status == "success").unwrap();
        assert!(success.logout_timestamp.is_some());
        assert!(!success.is_active);
    }

    #[tokio::test]
    async fn test_recent_logins_limit() {
        let audit = AuditLog::new(db::memory_pool().await.unwrap());
        for _ in 0..5 {
            audit.record_login(attempt(Some("u1"), LoginStatus::Failed)).await.unwrap();
        }
        assert_eq!(audit.recent_logins(3).await.unwrap().len(), 3);
        assert_eq!(audit.recent_logins(0).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_transition_log_joined_with_names() {
        let pool = db::memory_pool().await.unwrap();
        seed_identity(&pool, "admin", "Andres", 1).await;
        seed_identity(&pool, "citizen", "Gabriela", 2).await;
        let vid = seed_verification(&pool, "citizen").await;

        let audit = AuditLog::new(pool.clone());
        let mut conn = pool.acquire().await.unwrap();
        let log = AuditLog::append_transition(
            &mut conn,
            NewVerificationLog {
                verification_id: vid,
                admin_user_id: "admin".to_string(),
                previous_status: VerificationStatus::Pending,
                new_status: VerificationStatus::Approved,
                reason: Some("clear photo".to_string()),
                admin_remarks: Some("clear photo".to_string()),
                meta: RequestMeta::default(),
            },
        )
        .await
        .unwrap();
        drop(conn);
        assert_eq!(log.action, "approved");

        let views = audit.list_transitions(Some(vid)).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].admin_name.as_deref(), Some("Andres Reyes"));
        assert_eq!(views[0].user_id.as_deref(), Some("citizen"));

        assert_eq!(audit.list_transitions(None).await.unwrap().len(), 1);
        assert!(audit.list_transitions(Some(vid + 1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verification_log_rejects_updates() {
        let pool = db::memory_pool().await.unwrap();
        seed_identity(&pool, "citizen", "Gabriela", 2).await;
        let vid = seed_verification(&pool, "citizen").await;

        let mut conn = pool.acquire().await.unwrap();
        AuditLog::append_transition(
            &mut conn,
            NewVerificationLog {
                verification_id: vid,
                admin_user_id: "admin".to_string(),
                previous_status: VerificationStatus::Pending,
                new_status: VerificationStatus::UnderReview,
                reason: None,
                admin_remarks: None,
                meta: RequestMeta::default(),
            },
        )
        .await
        .unwrap();
        drop(conn);

        assert!(sqlx::query("UPDATE verification_log SET action = 'tampered'")
            .execute(&pool)
            .await
            .is_err());
        assert!(sqlx::query("DELETE FROM verification_log").execute(&pool).await.is_err());
    }
}
