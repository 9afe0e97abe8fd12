//! Email channel — SMTP sending via async lettre.
//!
//! Port 465 uses implicit TLS, anything else STARTTLS. `to` may list several
//! addresses separated by commas.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use subtrack_core::config::EmailSettings;
use subtrack_core::{ChannelSender, Result, SubTrackError};

const IMPLICIT_TLS_PORT: u16 = 465;

pub struct EmailSender {
    settings: EmailSettings,
}

impl EmailSender {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    /// Build the message without sending it.
    pub fn build_message(&self, title: &str, body: &str) -> Result<LettreMessage> {
        let from_name = self.settings.display_name.as_deref().unwrap_or("SubTrack");
        let from: Mailbox = format!("{from_name} <{}>", self.settings.from)
            .parse()
            .map_err(|e| SubTrackError::channel(format!("Invalid from: {e}")))?;

        let mut builder = LettreMessage::builder()
            .from(from)
            .subject(title)
            .header(ContentType::TEXT_PLAIN);

        let mut recipients = 0;
        for addr in self.settings.to.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let mailbox: Mailbox = addr
                .parse()
                .map_err(|e| SubTrackError::channel(format!("Invalid to '{addr}': {e}")))?;
            builder = builder.to(mailbox);
            recipients += 1;
        }
        if recipients == 0 {
            return Err(SubTrackError::channel("email: no recipient address"));
        }

        builder
            .body(body.to_string())
            .map_err(|e| SubTrackError::channel(format!("Build email: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = &self.settings.smtp_host;
        let relay = if self.settings.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| SubTrackError::channel(format!("SMTP relay: {e}")))?;

        let creds = Credentials::new(self.settings.username.clone(), self.settings.password.clone());
        Ok(relay.port(self.settings.smtp_port).credentials(creds).build())
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, title: &str, body: &str, _recipient: Option<&str>) -> Result<()> {
        let email = self.build_message(title, body)?;
        self.transport()?
            .send(email)
            .await
            .map_err(|e| SubTrackError::channel(format!("SMTP send: {e}")))?;
        tracing::info!("📤 Email sent to: {}", self.settings.to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(to: &str) -> EmailSettings {
        EmailSettings {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: "bot@example.com".into(),
            password: "pw".into(),
            from: "bot@example.com".into(),
            to: to.into(),
            display_name: None,
        }
    }

    #[test]
    fn test_build_message_with_several_recipients() {
        let msg = EmailSender::new(settings("a@example.com, b@example.com"))
            .build_message("Reminder", "VPS expires in 3 days")
            .unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("Subject: Reminder"));
        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("SubTrack <bot@example.com>"));
    }

    #[test]
    fn test_build_message_requires_recipient() {
        assert!(EmailSender::new(settings(" , ")).build_message("t", "b").is_err());
        assert!(EmailSender::new(settings("not an address")).build_message("t", "b").is_err());
    }
}
