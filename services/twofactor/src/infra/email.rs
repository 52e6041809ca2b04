use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::domain::repository::MailerPort;
use crate::domain::types::OtpPurpose;
use crate::error::TwoFactorError;

/// SMTP-backed mailer. Messages are plain text; the OTP subject names the
/// flow so an unsolicited disable code is recognizable as such.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
        from: Mailbox,
    ) -> Result<Self, TwoFactorError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| anyhow::anyhow!("invalid SMTP relay: {e}"))?
            .port(port)
            .credentials(Credentials::new(username, password))
            .build();
        Ok(Self { transport, from })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), TwoFactorError> {
        let to = to
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid recipient address: {e}"))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body)
            .map_err(|e| anyhow::anyhow!("failed to build email: {e}"))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow::anyhow!("smtp send failed: {e}"))?;
        Ok(())
    }
}

fn otp_subject(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Setup => "Your two-factor setup code",
        OtpPurpose::Disable => "Your two-factor disable code",
        OtpPurpose::BackupRegenerate => "Your backup-code regeneration code",
        OtpPurpose::Login => "Your sign-in code",
        OtpPurpose::EmailVerify => "Your email verification code",
    }
}

impl MailerPort for SmtpMailer {
    async fn send_otp_email(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), TwoFactorError> {
        let body = format!(
            "Your one-time code is {code}.\n\n\
             It expires in a few minutes and works only once. If you did not \
             request this code, you can ignore this email."
        );
        self.send(to, otp_subject(purpose), body).await
    }

    async fn send_two_factor_enabled(&self, to: &str) -> Result<(), TwoFactorError> {
        let body = "Two-factor authentication was just enabled on your account.\n\n\
                    If this was not you, contact support immediately."
            .to_owned();
        self.send(to, "Two-factor authentication enabled", body).await
    }

    async fn send_two_factor_disabled(&self, to: &str) -> Result<(), TwoFactorError> {
        let body = "Two-factor authentication was just disabled on your account.\n\n\
                    If this was not you, contact support immediately."
            .to_owned();
        self.send(to, "Two-factor authentication disabled", body).await
    }
}
