//! Outgoing notification mail.
//!
//! Delivery never decides the outcome of a request: handlers call
//! [`deliver`], which logs and swallows transport failures.

use axum::async_trait;

use crate::db::models::ContactView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Writes outgoing mail to the log instead of a mail server.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        tracing::info!(from = %self.from, to = %email.to, subject = %email.subject, "Sending mail");
        tracing::debug!("{}", email.body);
        Ok(())
    }
}

pub async fn deliver(mailer: &dyn Mailer, email: Email) {
    let to = email.to.clone();
    if let Err(e) = mailer.send(email).await {
        tracing::warn!("Failed to send mail to {to}: {e:#}");
    }
}

pub fn contact_confirmation(contact: &ContactView) -> Email {
    Email {
        to: contact.email.clone(),
        subject: "Thank you for contacting TrashToCash".to_string(),
        body: format!(
            "Hi {},\n\nThanks for contacting TrashToCash. Our team will get back to you \
             within 24 hours.\n\nCategory: {}\nSubject: {}\n\n{}\n",
            contact.name, contact.category, contact.subject, contact.message
        ),
    }
}

pub fn contact_admin_notice(contact: &ContactView, admin_mailbox: &str) -> Email {
    Email {
        to: admin_mailbox.to_string(),
        subject: format!("New Contact Form Submission - {}", contact.category),
        body: format!(
            "From: {} <{}>\nPhone: {}\nSubject: {}\nPriority: {}\n\n{}\n",
            contact.name, contact.email, contact.phone, contact.subject, contact.priority,
            contact.message
        ),
    }
}

pub fn contact_reply(contact: &ContactView, response: &str) -> Email {
    Email {
        to: contact.email.clone(),
        subject: format!("Re: {}", contact.subject),
        body: format!(
            "Hi {},\n\n{response}\n\nYour original message:\n{}\n\nThe TrashToCash team\n",
            contact.name, contact.message
        ),
    }
}
