/// SMS delivery through the Twilio Messages API
use super::CodeSender;
use crate::{
    config::SmsConfig,
    error::{TrustError, TrustResult},
};
use async_trait::async_trait;
use std::collections::HashMap;

/// SMS sender; a missing configuration disables delivery
#[derive(Clone)]
pub struct SmsSender {
    config: Option<SmsConfig>,
    client: reqwest::Client,
}

impl SmsSender {
    pub fn new(config: Option<SmsConfig>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Send a text message
    pub async fn send_sms(&self, to: &str, body: &str) -> TrustResult<()> {
        let config = match &self.config {
            Some(config) => config,
            None => {
                return Err(TrustError::Internal("SMS gateway is not configured".to_string()));
            }
        };

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            config.api_base.trim_end_matches('/'),
            config.account_sid
        );

        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("To", to);
        form.insert("From", &config.from_number);
        form.insert("Body", body);

        let response = self
            .client
            .post(url)
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| TrustError::Internal(format!("SMS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrustError::Internal(format!(
                "SMS gateway returned {}: {}",
                status, body
            )));
        }

        tracing::info!("Sent SMS to {}", mask_phone(to));
        Ok(())
    }
}

#[async_trait]
impl CodeSender for SmsSender {
    async fn send_code(&self, destination: &str, code: &str, display_name: &str) -> bool {
        if !self.is_configured() {
            tracing::warn!("SMS not configured, skipping code to {}", mask_phone(destination));
            return false;
        }

        let body = format!(
            "Hi {}, your Siglat verification code is {}. Do not share this code with anyone.",
            display_name, code
        );

        match self.send_sms(destination, &body).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send verification SMS: {}", e);
                false
            }
        }
    }
}

/// Keep only the last four digits for logs
fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().collect();
    if digits.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("****{}", tail)
}
