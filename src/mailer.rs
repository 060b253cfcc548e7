use async_trait::async_trait;

/// Outbound mail transport. Delivery failures are recoverable from the
/// caller's point of view: the password-reset flow rolls back its token
/// fields when `send` fails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Development transport: writes the message to the log instead of
/// delivering it. The reset-token plaintext is intentionally not logged.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to, subject = %subject, "mail sent (log transport)");
        Ok(())
    }
}
