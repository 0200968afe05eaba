/// Token issuance, rotation and revocation
use super::{AccessClaims, TokenPair};
use crate::{
    audit::{AuditLog, LoginStatus, NewLoginAttempt},
    auth::{AuthenticatedPrincipal, RequestMeta, RoleName},
    config::AuthConfig,
    credentials::{CredentialStore, PasswordHasher},
    db::{identity::Identity, token::RefreshToken},
    error::{ErrorKind, TrustError, TrustResult},
    metrics,
    secrets::{generate_token, token_digest},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Issues access tokens and manages the refresh token chain
#[derive(Clone)]
pub struct TokenService {
    db: SqlitePool,
    credentials: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    audit: AuditLog,
    config: AuthConfig,
}

impl TokenService {
    pub fn new(
        db: SqlitePool,
        credentials: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        audit: AuditLog,
        config: AuthConfig,
    ) -> Self {
        Self {
            db,
            credentials,
            hasher,
            audit,
            config,
        }
    }

    /// Authenticate with email and password.
    ///
    /// Every attempt is recorded in the login audit regardless of outcome.
    pub async fn login(&self, email: &str, password: &str, meta: RequestMeta) -> TrustResult<TokenPair> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(TrustError::Validation("Email and password are required".to_string()));
        }

        let identity = match self.credentials.find_by_email(email).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                self.audit_login(None, LoginStatus::Failed, Some("User not found"), email, &meta)
                    .await;
                metrics::record_login("not_found");
                tracing::warn!("Login failed: unknown email");
                return Err(TrustError::NotFound("User not found".to_string()));
            }
            Err(e) => {
                self.audit_login(None, LoginStatus::Error, Some(&e.to_string()), email, &meta)
                    .await;
                metrics::record_login("error");
                return Err(e);
            }
        };

        match self.hasher.verify(password, &identity.password_hash) {
            Ok(true) => {}
            Ok(false) => {
                self.audit_login(
                    Some(&identity.id),
                    LoginStatus::Failed,
                    Some("Invalid password"),
                    email,
                    &meta,
                )
                .await;
                metrics::record_login("invalid_password");
                tracing::warn!(user_id = %identity.id, "Login failed: invalid password");
                return Err(TrustError::InvalidCredential("Invalid password".to_string()));
            }
            Err(e) => {
                self.audit_login(Some(&identity.id), LoginStatus::Error, Some(&e.to_string()), email, &meta)
                    .await;
                metrics::record_login("error");
                return Err(e);
            }
        }

        match self.issue_for_login(&identity, &meta).await {
            Ok(pair) => {
                self.audit_login(Some(&identity.id), LoginStatus::Success, None, email, &meta)
                    .await;
                metrics::record_login("success");
                tracing::info!(user_id = %identity.id, "User logged in");
                Ok(pair)
            }
            Err(e) => {
                self.audit_login(Some(&identity.id), LoginStatus::Error, Some(&e.to_string()), email, &meta)
                    .await;
                metrics::record_login("error");
                Err(e)
            }
        }
    }

    /// Redeem a refresh token for a new pair, revoking the presented one
    pub async fn refresh(&self, value: &str, meta: RequestMeta) -> TrustResult<TokenPair> {
        let result = self.rotate(value, &meta).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => match e.kind() {
                ErrorKind::NotFound => "not_found",
                ErrorKind::AlreadyUsed => "already_used",
                ErrorKind::Expired => "expired",
                ErrorKind::Invalid => "invalid",
                _ => "error",
            },
        };
        metrics::record_refresh(outcome);

        if let Err(e) = &result {
            if e.is_system() {
                tracing::error!(ip = ?meta.ip_address, "Refresh token rotation failed: {}", e);
            } else {
                tracing::warn!(ip = ?meta.ip_address, outcome, "Refresh token rejected: {}", e);
            }
        }

        result
    }

    async fn rotate(&self, value: &str, meta: &RequestMeta) -> TrustResult<TokenPair> {
        let value = value.trim();
        if value.is_empty() {
            return Err(TrustError::Validation("Refresh token is required".to_string()));
        }

        let digest = token_digest(value);
        let token = self
            .find_refresh_token(&digest)
            .await?
            .ok_or_else(|| TrustError::NotFound("Refresh token not found".to_string()))?;

        let now = Utc::now();
        if token.revoked {
            tracing::warn!(user_id = %token.user_id, "Revoked refresh token presented");
            return Err(TrustError::AlreadyUsed("Refresh token has been revoked".to_string()));
        }
        if token.is_expired_at(now) {
            return Err(TrustError::Expired("Refresh token has expired".to_string()));
        }

        let identity = self
            .credentials
            .find_by_id(&token.user_id)
            .await?
            .ok_or_else(|| TrustError::NotFound("User not found".to_string()))?;
        let role = self.role_of(&identity).await?;

        let mut tx = self.db.begin().await?;

        // Only one redemption of the same row can flip revoked from 0 to 1
        let result = sqlx::query(
            "UPDATE refresh_token SET revoked = 1, revoked_at = ?1, updated_at = ?1
             WHERE id = ?2 AND revoked = 0 AND expires_at > ?1",
        )
        .bind(now)
        .bind(&token.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::warn!(user_id = %identity.id, "Refresh token redeemed concurrently");
            return Err(TrustError::AlreadyUsed("Refresh token was already used".to_string()));
        }

        let (refresh_token, refresh_expires_at) =
            self.insert_refresh_token(&mut tx, &identity.id, meta).await?;
        tx.commit().await?;

        let (access_token, access_expires_at) = self.generate_access_token(&identity, role)?;

        tracing::debug!(user_id = %identity.id, "Rotated refresh token");

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            access_token_expires_at: access_expires_at,
            refresh_token_expires_at: refresh_expires_at,
            user_id: identity.id,
            role: role.as_str().to_string(),
        })
    }

    /// Revoke a refresh token. Unknown or already revoked values are a no-op.
    ///
    /// Returns whether a token was revoked by this call.
    pub async fn revoke(&self, value: &str) -> TrustResult<bool> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(false);
        }

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE refresh_token SET revoked = 1, revoked_at = ?1, updated_at = ?1
             WHERE token_hash = ?2 AND revoked = 0",
        )
        .bind(now)
        .bind(token_digest(value))
        .execute(&self.db)
        .await?;

        let revoked = result.rows_affected() > 0;
        if revoked {
            tracing::info!("Refresh token revoked");
        }

        Ok(revoked)
    }

    /// Close the principal's most recent login session in the audit trail
    pub async fn logout(&self, principal: &AuthenticatedPrincipal) -> TrustResult<bool> {
        let closed = self.audit.close_session(&principal.user_id).await?;
        tracing::info!(user_id = %principal.user_id, closed, "User logged out");
        Ok(closed)
    }

    /// Delete refresh tokens that are revoked or expired
    pub async fn cleanup_expired(&self) -> TrustResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_token WHERE revoked = 1 OR expires_at <= ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, "Cleaned up inactive refresh tokens");
        }

        Ok(deleted)
    }

    /// Verify an access token and resolve the principal it was issued to
    pub fn validate_access_token(&self, token: &str) -> TrustResult<AuthenticatedPrincipal> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);
        validation.leeway = 0;

        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => {
                TrustError::Unauthenticated("Access token has expired".to_string())
            }
            _ => TrustError::Unauthenticated("Invalid access token".to_string()),
        })?;

        let role = RoleName::parse(&data.claims.role)
            .map_err(|_| TrustError::Unauthenticated("Invalid access token".to_string()))?;

        Ok(AuthenticatedPrincipal {
            user_id: data.claims.uid,
            email: data.claims.sub,
            role,
        })
    }

    async fn issue_for_login(&self, identity: &Identity, meta: &RequestMeta) -> TrustResult<TokenPair> {
        let role = self.role_of(identity).await?;

        let mut conn = self.db.acquire().await?;
        let (refresh_token, refresh_expires_at) =
            self.insert_refresh_token(&mut conn, &identity.id, meta).await?;
        drop(conn);

        let (access_token, access_expires_at) = self.generate_access_token(identity, role)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            access_token_expires_at: access_expires_at,
            refresh_token_expires_at: refresh_expires_at,
            user_id: identity.id.clone(),
            role: role.as_str().to_string(),
        })
    }

    async fn role_of(&self, identity: &Identity) -> TrustResult<RoleName> {
        let name = self
            .credentials
            .role_name(identity.role_id)
            .await?
            .ok_or_else(|| TrustError::Internal(format!("Unknown role id {}", identity.role_id)))?;
        RoleName::parse(&name).map_err(|_| TrustError::Internal(format!("Unsupported role {}", name)))
    }

    /// Store a fresh refresh token and return its opaque value
    async fn insert_refresh_token(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
        meta: &RequestMeta,
    ) -> TrustResult<(String, DateTime<Utc>)> {
        let value = generate_token();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.refresh_token_ttl);

        sqlx::query(
            "INSERT INTO refresh_token (id, user_id, token_hash, expires_at, revoked,
                                        ip_address, user_agent, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?7)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(token_digest(&value))
        .bind(expires_at)
        .bind(&meta.ip_address)
        .bind(&meta.user_agent)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok((value, expires_at))
    }

    async fn find_refresh_token(&self, digest: &str) -> TrustResult<Option<RefreshToken>> {
        let token = sqlx::query_as::<_, RefreshToken>(
            "SELECT id, user_id, token_hash, expires_at, revoked, revoked_at, ip_address,
                    user_agent, created_at, updated_at
             FROM refresh_token WHERE token_hash = ?1",
        )
        .bind(digest)
        .fetch_optional(&self.db)
        .await?;

        Ok(token)
    }

    fn generate_access_token(
        &self,
        identity: &Identity,
        role: RoleName,
    ) -> TrustResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.access_token_ttl);

        let claims = AccessClaims {
            sub: identity.email.clone(),
            uid: identity.id.clone(),
            role: role.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| TrustError::Jwt(e.to_string()))?;

        Ok((token, expires_at))
    }

    /// Best-effort login audit; failures are logged and swallowed
    async fn audit_login(
        &self,
        user_id: Option<&str>,
        status: LoginStatus,
        failure_reason: Option<&str>,
        email: &str,
        meta: &RequestMeta,
    ) {
        let attempt = NewLoginAttempt {
            user_id: user_id.map(str::to_string),
            status,
            failure_reason: failure_reason.map(str::to_string),
            attempted_email: Some(email.to_string()),
            meta: meta.clone(),
        };

        if let Err(e) = self.audit.record_login(attempt).await {
            tracing::warn!("Failed to record login attempt: {}", e);
        }
    }
}
