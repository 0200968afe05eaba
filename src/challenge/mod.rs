/// Contact channel ownership challenges
///
/// A six-digit code is delivered to the email address or phone number on
/// file; presenting it back marks that channel verified.

mod router;
mod service;
mod sms;

pub use router::ChannelRouter;
pub use service::ContactChallengeService;
pub use sms::SmsSender;

use crate::error::{TrustError, TrustResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contact channel being verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Phone,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> TrustResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "phone" => Ok(Channel::Phone),
            _ => Err(TrustError::Validation(
                "Invalid verification type. Must be 'email' or 'phone'".to_string(),
            )),
        }
    }

    /// Whether a claimed value names the same contact as the one on file.
    /// Email comparison ignores case; phone numbers must match exactly.
    pub fn matches(&self, on_file: &str, claimed: &str) -> bool {
        let (on_file, claimed) = (on_file.trim(), claimed.trim());
        match self {
            Channel::Email => on_file.eq_ignore_ascii_case(claimed),
            Channel::Phone => on_file == claimed,
        }
    }

    /// Identity columns holding this channel's verified flag and timestamp
    fn verified_columns(&self) -> (&'static str, &'static str) {
        match self {
            Channel::Email => ("email_verified", "email_verified_at"),
            Channel::Phone => ("phone_verified", "phone_verified_at"),
        }
    }
}

/// Delivers challenge codes to a destination
#[async_trait]
pub trait CodeSender: Send + Sync {
    /// Returns false when the code could not be delivered
    async fn send_code(&self, destination: &str, code: &str, display_name: &str) -> bool;
}

/// Request for a new code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeRequest {
    pub verification_type: String,
    pub contact_value: String,
}

/// Request to redeem a code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub verification_type: String,
    pub contact_value: String,
    pub verification_code: String,
}

/// Result of issuing a code
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeIssued {
    pub verification_type: Channel,
    pub expires_at: DateTime<Utc>,
    pub delivered: bool,
}

/// Result of a successful redemption
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedContact {
    pub verification_type: Channel,
    pub verified_at: DateTime<Utc>,
}

/// Verification state of one channel
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub value: String,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Verification state of both channels
#[derive(Debug, Clone, Serialize)]
pub struct ContactVerificationStatus {
    pub email: ChannelStatus,
    pub phone: ChannelStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse() {
        assert_eq!(Channel::parse("EMAIL").unwrap(), Channel::Email);
        assert_eq!(Channel::parse(" phone ").unwrap(), Channel::Phone);
        assert!(matches!(Channel::parse("sms"), Err(TrustError::Validation(_))));
    }

    #[test]
    fn test_channel_matching() {
        assert!(Channel::Email.matches("Ana@Example.ph", "ana@example.ph"));
        assert!(Channel::Phone.matches("+639171234567", "+639171234567 "));
        assert!(!Channel::Phone.matches("+639171234567", "09171234567"));
    }
}
