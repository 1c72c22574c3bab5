use async_trait::async_trait;

use crate::models::analysis::Platform;

/// User-facing notification channel. The browser product surfaces these as
/// toasts; this service logs them at the boundary where the real channel
/// would be wired in.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn success(&self, platform: Platform, message: &str);
    async fn failure(&self, platform: Platform, message: &str);
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn success(&self, platform: Platform, message: &str) {
        tracing::info!(platform = %platform, notification = message, "Analysis succeeded");
    }

    async fn failure(&self, platform: Platform, message: &str) {
        tracing::warn!(platform = %platform, notification = message, "Analysis failed");
    }
}
