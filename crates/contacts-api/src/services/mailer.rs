//! Outgoing email
//!
//! Account flows only need "send this message"; delivery is behind the
//! [`Mailer`] trait. [`LogMailer`] writes messages to the log for local
//! runs, [`OutboxMailer`] keeps them in memory for tests.

use async_trait::async_trait;
use contacts_core::MailConfig;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Action link embedded in the body, if any
    pub link: Option<String>,
}

impl EmailMessage {
    pub fn verification(base_url: &str, to: &str, username: &str, token: &str) -> Self {
        let link = format!(
            "{}/api/auth/confirmed_email/{token}",
            base_url.trim_end_matches('/')
        );
        Self {
            to: to.to_string(),
            subject: "Confirm your email".to_string(),
            body: format!(
                "Hi {username},\n\nPlease confirm your email address by opening:\n{link}\n"
            ),
            link: Some(link),
        }
    }

    pub fn password_reset(base_url: &str, to: &str, username: &str, token: &str) -> Self {
        let link = format!(
            "{}/reset-password?token={token}",
            base_url.trim_end_matches('/')
        );
        Self {
            to: to.to_string(),
            subject: "Reset your password".to_string(),
            body: format!(
                "Hi {username},\n\nA password reset was requested for your account.\n\
                 Use this link to choose a new password:\n{link}\n\n\
                 If you did not ask for this, ignore this message.\n"
            ),
            link: Some(link),
        }
    }

    /// Token carried in the action link
    pub fn token(&self) -> Option<&str> {
        let link = self.link.as_deref()?;
        match link.split_once("token=") {
            Some((_, token)) => Some(token),
            None => link.rsplit('/').next(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Logs messages instead of delivering them
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            from: format!("{} <{}>", config.from_name, config.from_address),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        tracing::info!(from = %self.from, to = %message.to, subject = %message.subject, "email sent");
        tracing::debug!(body = %message.body, "email body");
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }

    /// Most recent message addressed to `to`
    pub fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|m| m.to.eq_ignore_ascii_case(to))
            .cloned()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        self.sent.lock().push(message);
        Ok(())
    }
}
