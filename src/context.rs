/// Application context and dependency injection
use crate::{
    audit::AuditLog,
    challenge::{ChannelRouter, CodeSender, ContactChallengeService, SmsSender},
    config::ServerConfig,
    credentials::{Argon2Hasher, CredentialStore, PasswordHasher, SqliteCredentialStore},
    db,
    error::TrustResult,
    mailer::Mailer,
    rate_limit::RateLimiter,
    session::TokenService,
    verification::ReviewWorkflow,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub credentials: Arc<dyn CredentialStore>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub audit_log: Arc<AuditLog>,
    pub token_service: Arc<TokenService>,
    pub challenge_service: Arc<ContactChallengeService>,
    pub review_workflow: Arc<ReviewWorkflow>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> TrustResult<Self> {
        // Validate configuration
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        let db = db::create_pool(
            &config.storage.database,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..db::DatabaseOptions::default()
            },
        )
        .await?;

        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let mailer = Mailer::new(config.email.clone())?.with_code_ttl(config.challenge.code_ttl);
        let sms = SmsSender::new(config.sms.clone());

        if !mailer.is_configured() {
            tracing::warn!("Email delivery is not configured; email codes will not be sent");
        }
        if !sms.is_configured() {
            tracing::warn!("SMS delivery is not configured; phone codes will not be sent");
        }

        let senders = ChannelRouter::new(Arc::new(mailer), Arc::new(sms));

        Ok(Self::with_parts(config, db, senders))
    }

    /// Assemble the services over an existing pool and code senders
    pub fn with_parts(config: ServerConfig, db: SqlitePool, senders: ChannelRouter) -> Self {
        let credentials: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(db.clone()));
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher);
        let audit_log = AuditLog::new(db.clone());

        let token_service = Arc::new(TokenService::new(
            db.clone(),
            credentials.clone(),
            hasher.clone(),
            audit_log.clone(),
            config.authentication.clone(),
        ));

        let challenge_service = Arc::new(ContactChallengeService::new(
            db.clone(),
            credentials.clone(),
            senders,
            config.challenge.clone(),
        ));

        let review_workflow = Arc::new(ReviewWorkflow::new(
            db.clone(),
            audit_log.clone(),
            config.verification.clone(),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config: Arc::new(config),
            db,
            credentials,
            hasher,
            audit_log: Arc::new(audit_log),
            token_service,
            challenge_service,
            review_workflow,
            rate_limiter,
        }
    }

    /// Context over a private in-memory database, for tests
    pub async fn for_tests(sender: Arc<dyn CodeSender>) -> TrustResult<Self> {
        let db = db::memory_pool().await?;
        Ok(Self::with_parts(
            ServerConfig::for_tests(),
            db,
            ChannelRouter::single(sender),
        ))
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
