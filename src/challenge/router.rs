/// Per-channel sender selection
use super::{Channel, CodeSender};
use std::sync::Arc;

/// Routes each channel to its delivery adapter
#[derive(Clone)]
pub struct ChannelRouter {
    email: Arc<dyn CodeSender>,
    sms: Arc<dyn CodeSender>,
}

impl ChannelRouter {
    pub fn new(email: Arc<dyn CodeSender>, sms: Arc<dyn CodeSender>) -> Self {
        Self { email, sms }
    }

    /// One sender for both channels
    pub fn single(sender: Arc<dyn CodeSender>) -> Self {
        Self {
            email: sender.clone(),
            sms: sender,
        }
    }

    pub fn sender_for(&self, channel: Channel) -> &dyn CodeSender {
        match channel {
            Channel::Email => self.email.as_ref(),
            Channel::Phone => self.sms.as_ref(),
        }
    }
}
