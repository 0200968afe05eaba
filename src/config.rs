/// Configuration management for the trust service
use crate::error::{TrustError, TrustResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "siglat_trust=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub challenge: ChallengeConfig,
    pub verification: VerificationConfig,
    pub email: Option<EmailConfig>,
    pub sms: Option<SmsConfig>,
    pub rate_limit: RateLimitConfig,
    pub jobs: JobsConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub max_connections: u32,
}

/// Token signing and lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: i64,
}

/// Contact challenge code policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Code lifetime in seconds
    pub code_ttl: i64,
    /// Minimum seconds between codes for the same (user, channel)
    pub cooldown: i64,
    pub max_attempts: u32,
}

/// Document submission limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub max_image_bytes: usize,
    pub allowed_mime_types: Vec<String>,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// SMS gateway configuration (Twilio Messages API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

/// Background job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Seconds between refresh-token cleanup sweeps
    pub token_cleanup_interval: u64,
    /// Seconds between database health probes
    pub health_check_interval: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl LoggingConfig {
    /// Filter directives for the subscriber; unparsable levels fall back to the default
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid log level {:?}: {}", self.level, e);
            EnvFilter::new(DEFAULT_LOG_LEVEL)
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "siglat".to_string(),
            jwt_audience: "siglat-clients".to_string(),
            access_token_ttl: 15 * 60,
            refresh_token_ttl: 7 * 24 * 3600,
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            code_ttl: 10 * 60,
            cooldown: 2 * 60,
            max_attempts: 5,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 5 * 1024 * 1024,
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/jpg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
            ],
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 50,
            unauthenticated_rps: 5,
            burst_size: 20,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            token_cleanup_interval: 3600,
            health_check_interval: 300,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> TrustResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("SIGLAT_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SIGLAT_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| TrustError::Validation("Invalid port number".to_string()))?;
        let version = env::var("SIGLAT_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("SIGLAT_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("SIGLAT_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("siglat.sqlite"));
        let max_connections = env_or("SIGLAT_DATABASE_MAX_CONNECTIONS", 10);

        let auth_defaults = AuthConfig::default();
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| TrustError::Validation("JWT secret required".to_string()))?;
        let authentication = AuthConfig {
            jwt_secret,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(auth_defaults.jwt_issuer),
            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or(auth_defaults.jwt_audience),
            access_token_ttl: env_or("SIGLAT_ACCESS_TOKEN_TTL", auth_defaults.access_token_ttl),
            refresh_token_ttl: env_or("SIGLAT_REFRESH_TOKEN_TTL", auth_defaults.refresh_token_ttl),
        };

        let challenge_defaults = ChallengeConfig::default();
        let challenge = ChallengeConfig {
            code_ttl: env_or("SIGLAT_CODE_TTL", challenge_defaults.code_ttl),
            cooldown: env_or("SIGLAT_CODE_COOLDOWN", challenge_defaults.cooldown),
            max_attempts: env_or("SIGLAT_CODE_MAX_ATTEMPTS", challenge_defaults.max_attempts),
        };

        let verification_defaults = VerificationConfig::default();
        let verification = VerificationConfig {
            max_image_bytes: env_or(
                "SIGLAT_MAX_DOCUMENT_BYTES",
                verification_defaults.max_image_bytes,
            ),
            allowed_mime_types: verification_defaults.allowed_mime_types,
        };

        let email = if let Ok(smtp_url) = env::var("SIGLAT_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("SIGLAT_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| "noreply@siglat.local".to_string()),
            })
        } else {
            None
        };

        let sms = if let Ok(account_sid) = env::var("TWILIO_ACCOUNT_SID") {
            Some(SmsConfig {
                account_sid,
                auth_token: env::var("TWILIO_AUTH_TOKEN")
                    .map_err(|_| TrustError::Validation("Twilio auth token required".to_string()))?,
                from_number: env::var("TWILIO_FROM_NUMBER")
                    .map_err(|_| TrustError::Validation("Twilio sender number required".to_string()))?,
                api_base: env::var("TWILIO_API_BASE")
                    .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            })
        } else {
            None
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: env_or("SIGLAT_RATE_LIMITS_ENABLED", rate_defaults.enabled),
            authenticated_rps: env_or("SIGLAT_RATE_LIMIT_AUTHENTICATED_RPS", rate_defaults.authenticated_rps),
            unauthenticated_rps: env_or(
                "SIGLAT_RATE_LIMIT_UNAUTHENTICATED_RPS",
                rate_defaults.unauthenticated_rps,
            ),
            burst_size: env_or("SIGLAT_RATE_LIMIT_BURST", rate_defaults.burst_size),
        };

        let jobs_defaults = JobsConfig::default();
        let jobs = JobsConfig {
            token_cleanup_interval: env_or(
                "SIGLAT_TOKEN_CLEANUP_INTERVAL",
                jobs_defaults.token_cleanup_interval,
            ),
            health_check_interval: env_or(
                "SIGLAT_HEALTH_CHECK_INTERVAL",
                jobs_defaults.health_check_interval,
            ),
        };

        let logging = LoggingConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
            json: env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false),
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
                max_connections,
            },
            authentication,
            challenge,
            verification,
            email,
            sms,
            rate_limit,
            jobs,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> TrustResult<()> {
        if self.service.hostname.is_empty() {
            return Err(TrustError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(TrustError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.access_token_ttl <= 0 || self.authentication.access_token_ttl > 15 * 60 {
            return Err(TrustError::Validation(
                "Access token lifetime must be between 1 second and 15 minutes".to_string(),
            ));
        }

        if self.authentication.refresh_token_ttl <= self.authentication.access_token_ttl {
            return Err(TrustError::Validation(
                "Refresh token lifetime must exceed access token lifetime".to_string(),
            ));
        }

        if self.challenge.max_attempts == 0 {
            return Err(TrustError::Validation(
                "Challenge attempts must be at least 1".to_string(),
            ));
        }

        if self.challenge.cooldown < 0 || self.challenge.code_ttl <= 0 {
            return Err(TrustError::Validation(
                "Challenge code lifetime and cooldown must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration used by unit and integration tests
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 5000,
                version: "test".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
                max_connections: 1,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
                ..AuthConfig::default()
            },
            challenge: ChallengeConfig::default(),
            verification: VerificationConfig::default(),
            email: None,
            sms: None,
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            jobs: JobsConfig::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}
