/// Issuing and redeeming contact challenge codes
use super::{
    Channel, ChannelRouter, ChannelStatus, CodeIssued, ContactVerificationStatus, VerifiedContact,
};
use crate::{
    auth::{AuthenticatedPrincipal, RequestMeta},
    config::ChallengeConfig,
    credentials::CredentialStore,
    db::{identity::Identity, token::ContactVerificationToken},
    error::{TrustError, TrustResult},
    metrics,
    secrets::{constant_time_eq, generate_code},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const TOKEN_COLUMNS: &str = "id, user_id, channel, contact_value, code, created_at, expires_at,
    is_used, verified_at, attempt_count, ip_address, user_agent";

/// Contact challenge service over `contact_verification_token`
#[derive(Clone)]
pub struct ContactChallengeService {
    db: SqlitePool,
    credentials: Arc<dyn CredentialStore>,
    senders: ChannelRouter,
    config: ChallengeConfig,
}

impl ContactChallengeService {
    pub fn new(
        db: SqlitePool,
        credentials: Arc<dyn CredentialStore>,
        senders: ChannelRouter,
        config: ChallengeConfig,
    ) -> Self {
        Self {
            db,
            credentials,
            senders,
            config,
        }
    }

    /// Issue a code for a contact channel on the principal's profile.
    ///
    /// Delivery failures are logged; the code stays valid either way.
    pub async fn request_code(
        &self,
        principal: &AuthenticatedPrincipal,
        channel: &str,
        claimed_value: &str,
        meta: RequestMeta,
    ) -> TrustResult<CodeIssued> {
        let channel = Channel::parse(channel)?;
        let identity = self.load_identity(principal).await?;
        let on_file = on_file_value(&identity, channel);

        if !channel.matches(on_file, claimed_value) {
            return Err(TrustError::Validation(
                "Contact value does not match your profile".to_string(),
            ));
        }

        if is_verified(&identity, channel) {
            return Err(TrustError::AlreadyVerified(format!(
                "{} is already verified",
                channel.as_str()
            )));
        }

        let code = generate_code();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.code_ttl);
        let cooldown_start = now - Duration::seconds(self.config.cooldown);

        // Cooldown check and insert are one statement so concurrent requests cannot both pass
        let result = sqlx::query(
            "INSERT INTO contact_verification_token (id, user_id, channel, contact_value, code,
                                                     created_at, expires_at, is_used,
                                                     attempt_count, ip_address, user_agent)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8, ?9
             WHERE NOT EXISTS (
                 SELECT 1 FROM contact_verification_token
                 WHERE user_id = ?2 AND channel = ?3 AND is_used = 0
                   AND expires_at > ?6 AND created_at > ?10
             )",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&identity.id)
        .bind(channel.as_str())
        .bind(on_file)
        .bind(&code)
        .bind(now)
        .bind(expires_at)
        .bind(&meta.ip_address)
        .bind(&meta.user_agent)
        .bind(cooldown_start)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            let retry_after = self.cooldown_remaining(&identity.id, channel, now).await?;
            tracing::warn!(
                user_id = %identity.id,
                channel = channel.as_str(),
                retry_after,
                "Verification code requested during cooldown"
            );
            return Err(TrustError::cooldown(retry_after));
        }

        let delivered = self
            .senders
            .sender_for(channel)
            .send_code(on_file, &code, &identity.display_name())
            .await;

        if !delivered {
            tracing::warn!(
                user_id = %identity.id,
                channel = channel.as_str(),
                "Verification code was issued but could not be delivered"
            );
        }

        metrics::record_code_issued(channel.as_str(), delivered);
        tracing::info!(user_id = %identity.id, channel = channel.as_str(), "Verification code issued");

        Ok(CodeIssued {
            verification_type: channel,
            expires_at,
            delivered,
        })
    }

    /// Redeem a code and mark the channel verified
    pub async fn verify_code(
        &self,
        principal: &AuthenticatedPrincipal,
        channel: &str,
        claimed_value: &str,
        code: &str,
    ) -> TrustResult<VerifiedContact> {
        let channel = Channel::parse(channel)?;
        let identity = self.load_identity(principal).await?;
        let on_file = on_file_value(&identity, channel);

        // No code can exist for a value other than the one on file
        if !channel.matches(on_file, claimed_value) {
            return Err(TrustError::NotFound("Invalid or expired verification code".to_string()));
        }

        let now = Utc::now();
        let token = sqlx::query_as::<_, ContactVerificationToken>(&format!(
            "SELECT {} FROM contact_verification_token
             WHERE user_id = ?1 AND channel = ?2 AND contact_value = ?3
               AND is_used = 0 AND expires_at > ?4
             ORDER BY created_at DESC
             LIMIT 1",
            TOKEN_COLUMNS
        ))
        .bind(&identity.id)
        .bind(channel.as_str())
        .bind(on_file)
        .bind(now)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| TrustError::NotFound("Invalid or expired verification code".to_string()))?;

        let max_attempts = i64::from(self.config.max_attempts);
        if token.attempt_count >= max_attempts {
            metrics::record_code_verification(channel.as_str(), "locked");
            return Err(too_many_attempts());
        }

        if !constant_time_eq(code.trim(), &token.code) {
            return self.record_wrong_code(&token, channel, max_attempts).await;
        }

        let mut tx = self.db.begin().await?;

        let consumed = sqlx::query(
            "UPDATE contact_verification_token SET is_used = 1, verified_at = ?1
             WHERE id = ?2 AND is_used = 0 AND attempt_count < ?3 AND expires_at > ?1",
        )
        .bind(now)
        .bind(&token.id)
        .bind(max_attempts)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() == 0 {
            return Err(TrustError::NotFound(
                "Invalid or expired verification code".to_string(),
            ));
        }

        let (flag, stamp) = channel.verified_columns();
        sqlx::query(&format!(
            "UPDATE identity SET {} = 1, {} = ?1, updated_at = ?1 WHERE id = ?2",
            flag, stamp
        ))
        .bind(now)
        .bind(&identity.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        metrics::record_code_verification(channel.as_str(), "verified");
        tracing::info!(user_id = %identity.id, channel = channel.as_str(), "Contact verified");

        Ok(VerifiedContact {
            verification_type: channel,
            verified_at: now,
        })
    }

    /// Verification state of both channels for the principal
    pub async fn status(
        &self,
        principal: &AuthenticatedPrincipal,
    ) -> TrustResult<ContactVerificationStatus> {
        let identity = self.load_identity(principal).await?;

        Ok(ContactVerificationStatus {
            email: ChannelStatus {
                value: identity.email.clone(),
                is_verified: identity.email_verified,
                verified_at: identity.email_verified_at,
            },
            phone: ChannelStatus {
                value: identity.phone_number.clone(),
                is_verified: identity.phone_verified,
                verified_at: identity.phone_verified_at,
            },
        })
    }

    async fn load_identity(&self, principal: &AuthenticatedPrincipal) -> TrustResult<Identity> {
        self.credentials
            .find_by_id(&principal.user_id)
            .await?
            .ok_or_else(|| TrustError::NotFound("User not found".to_string()))
    }

    async fn record_wrong_code<T>(
        &self,
        token: &ContactVerificationToken,
        channel: Channel,
        max_attempts: i64,
    ) -> TrustResult<T> {
        let bumped = sqlx::query(
            "UPDATE contact_verification_token SET attempt_count = attempt_count + 1
             WHERE id = ?1 AND is_used = 0 AND attempt_count < ?2",
        )
        .bind(&token.id)
        .bind(max_attempts)
        .execute(&self.db)
        .await?;

        if bumped.rows_affected() == 0 {
            metrics::record_code_verification(channel.as_str(), "locked");
            return Err(too_many_attempts());
        }

        let attempts: i64 = sqlx::query_scalar(
            "SELECT attempt_count FROM contact_verification_token WHERE id = ?1",
        )
        .bind(&token.id)
        .fetch_one(&self.db)
        .await?;

        let attempts_remaining = u32::try_from((max_attempts - attempts).max(0)).unwrap_or(0);

        metrics::record_code_verification(channel.as_str(), "invalid_code");
        tracing::warn!(
            user_id = %token.user_id,
            channel = channel.as_str(),
            attempts_remaining,
            "Invalid verification code"
        );

        Err(TrustError::InvalidCode { attempts_remaining })
    }

    /// Seconds until the newest blocking code leaves its cooldown window, at least 1
    async fn cooldown_remaining(
        &self,
        user_id: &str,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> TrustResult<u64> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT created_at FROM contact_verification_token
             WHERE user_id = ?1 AND channel = ?2 AND is_used = 0 AND expires_at > ?3
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(channel.as_str())
        .bind(now)
        .fetch_optional(&self.db)
        .await?;

        let remaining = match latest {
            Some(created_at) => {
                (created_at + Duration::seconds(self.config.cooldown) - now).num_seconds()
            }
            None => self.config.cooldown,
        };

        Ok(u64::try_from(remaining.max(1)).unwrap_or(1))
    }
}

fn on_file_value(identity: &Identity, channel: Channel) -> &str {
    match channel {
        Channel::Email => identity.email.trim(),
        Channel::Phone => identity.phone_number.trim(),
    }
}

fn is_verified(identity: &Identity, channel: Channel) -> bool {
    match channel {
        Channel::Email => identity.email_verified,
        Channel::Phone => identity.phone_verified,
    }
}

fn too_many_attempts() -> TrustError {
    TrustError::RateLimited {
        message: "Too many verification attempts. Please request a new code".to_string(),
        retry_after_secs: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::RoleName,
        challenge::CodeSender,
        credentials::SqliteCredentialStore,
        db,
        error::ErrorKind,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn last_code(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl CodeSender for RecordingSender {
        async fn send_code(&self, destination: &str, code: &str, _display_name: &str) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), code.to_string()));
            !self.fail
        }
    }

    async fn setup(fail: bool) -> (ContactChallengeService, Arc<RecordingSender>, SqlitePool, AuthenticatedPrincipal) {
        let pool = db::memory_pool().await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO identity (id, first_name, last_name, email, phone_number, password_hash,
                                   role_id, created_at, updated_at)
             VALUES ('u1', 'Ana', 'Lim', 'Ana@Example.ph', '+639171234567', 'x', 2, ?1, ?1)",
        )
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let sender = Arc::new(RecordingSender {
            fail,
            ..Default::default()
        });
        let service = ContactChallengeService::new(
            pool.clone(),
            Arc::new(SqliteCredentialStore::new(pool.clone())),
            ChannelRouter::single(sender.clone()),
            ChallengeConfig::default(),
        );
        let principal = AuthenticatedPrincipal {
            user_id: "u1".to_string(),
            email: "Ana@Example.ph".to_string(),
            role: RoleName::User,
        };

        (service, sender, pool, principal)
    }

    #[tokio::test]
    async fn test_request_and_verify_email() {
        let (service, sender, _pool, principal) = setup(false).await;

        let issued = service
            .request_code(&principal, "Email", "ana@example.ph", RequestMeta::default())
            .await
            .unwrap();
        assert!(issued.delivered);
        assert!(issued.expires_at <= Utc::now() + Duration::minutes(10));

        let code = sender.last_code();
        assert_eq!(code.len(), 6);

        let verified = service
            .verify_code(&principal, "email", "ANA@example.ph", &code)
            .await
            .unwrap();
        assert_eq!(verified.verification_type, Channel::Email);

        let status = service.status(&principal).await.unwrap();
        assert!(status.email.is_verified);
        assert!(status.email.verified_at.is_some());
        assert!(!status.phone.is_verified);

        // Code is single use and the channel is now verified
        let err = service
            .verify_code(&principal, "email", "ana@example.ph", &code)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service
            .request_code(&principal, "email", "ana@example.ph", RequestMeta::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyVerified);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let (service, _sender, _pool, principal) = setup(false).await;

        let err = service
            .request_code(&principal, "carrier-pigeon", "x", RequestMeta::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let err = service
            .request_code(&principal, "phone", "09171234567", RequestMeta::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let stranger = AuthenticatedPrincipal {
            user_id: "ghost".to_string(),
            ..principal
        };
        let err = service
            .request_code(&stranger, "phone", "+639171234567", RequestMeta::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cooldown_reports_retry_after() {
        let (service, _sender, _pool, principal) = setup(false).await;

        service
            .request_code(&principal, "phone", "+639171234567", RequestMeta::default())
            .await
            .unwrap();

        let err = service
            .request_code(&principal, "phone", "+639171234567", RequestMeta::default())
            .await
            .unwrap_err();
        match err {
            TrustError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => assert!(secs >= 1 && secs <= 120),
            other => panic!("expected cooldown, got {:?}", other),
        }

        // The other channel has its own cooldown
        assert!(service
            .request_code(&principal, "email", "ana@example.ph", RequestMeta::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cooldown_lapses() {
        let (service, _sender, pool, principal) = setup(false).await;
        service
            .request_code(&principal, "phone", "+639171234567", RequestMeta::default())
            .await
            .unwrap();

        sqlx::query("UPDATE contact_verification_token SET created_at = ?1")
            .bind(Utc::now() - Duration::minutes(3))
            .execute(&pool)
            .await
            .unwrap();

        assert!(service
            .request_code(&principal, "phone", "+639171234567", RequestMeta::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_wrong_codes_exhaust_attempts() {
        let (service, sender, _pool, principal) = setup(false).await;
        service
            .request_code(&principal, "phone", "+639171234567", RequestMeta::default())
            .await
            .unwrap();
        let code = sender.last_code();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for expected_remaining in (0..5u32).rev() {
            let err = service
                .verify_code(&principal, "phone", "+639171234567", wrong)
                .await
                .unwrap_err();
            match err {
                TrustError::InvalidCode { attempts_remaining } => {
                    assert_eq!(attempts_remaining, expected_remaining)
                }
                other => panic!("expected invalid code, got {:?}", other),
            }
        }

        // Even the right code is refused once attempts are exhausted
        let err = service
            .verify_code(&principal, "phone", "+639171234567", &code)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(!service.status(&principal).await.unwrap().phone.is_verified);
    }

    #[tokio::test]
    async fn test_expired_code_not_found() {
        let (service, sender, pool, principal) = setup(false).await;
        service
            .request_code(&principal, "phone", "+639171234567", RequestMeta::default())
            .await
            .unwrap();
        let code = sender.last_code();

        sqlx::query("UPDATE contact_verification_token SET expires_at = ?1")
            .bind(Utc::now() - Duration::seconds(1))
            .execute(&pool)
            .await
            .unwrap();

        let err = service
            .verify_code(&principal, "phone", "+639171234567", &code)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_verify_with_other_value_finds_no_code() {
        let (service, sender, _pool, principal) = setup(false).await;

        service
            .request_code(&principal, "email", "ana@example.ph", RequestMeta::default())
            .await
            .unwrap();
        let code = sender.last_code();

        let err = service
            .verify_code(&principal, "email", "someone@example.ph", &code)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // The real code is untouched by the lookup miss
        assert!(service
            .verify_code(&principal, "email", "ana@example.ph", &code)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_delivery_failure_still_issues_code() {
        let (service, sender, _pool, principal) = setup(true).await;

        let issued = service
            .request_code(&principal, "phone", "+639171234567", RequestMeta::default())
            .await
            .unwrap();
        assert!(!issued.delivered);

        let code = sender.last_code();
        assert!(service
            .verify_code(&principal, "phone", "+639171234567", &code)
            .await
            .is_ok());
    }
}
