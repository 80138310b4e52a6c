use axum::async_trait;
use tracing::info;

/// Out-of-band delivery channel for password-reset tokens. The transport is
/// deployment-specific; the default just surfaces the token in the server log.
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset_token(&self, email: &str, token: &str) -> anyhow::Result<()>;
}

/// Development mailer: writes the reset token to the log instead of sending
/// mail. Never reaches the API response body.
#[derive(Clone)]
pub struct LogMailer;

#[async_trait]
impl ResetMailer for LogMailer {
    async fn send_reset_token(&self, email: &str, token: &str) -> anyhow::Result<()> {
        info!(%email, %token, "password reset token issued (no mail transport configured)");
        Ok(())
    }
}
