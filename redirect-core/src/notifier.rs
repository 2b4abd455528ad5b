//! Capture notifications
//!
//! When headers are harvested from a page's traffic the user gets a short
//! banner on that page. Delivery is best-effort: failures never affect rule
//! state.

use crate::Result;
use async_trait::async_trait;
use tracing::info;

/// Banner text shown on the page
pub const CAPTURE_BANNER: &str = "Redirect to Local Server: Listening to APIs...";

#[async_trait]
pub trait CaptureNotifier: Send + Sync {
    /// Show the capture banner in `tab_id` for traffic to `domain`
    async fn notify_capture(&self, tab_id: i64, domain: &str) -> Result<()>;
}

/// Writes the banner to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl CaptureNotifier for LogNotifier {
    async fn notify_capture(&self, tab_id: i64, domain: &str) -> Result<()> {
        info!(tab_id, domain, "{}", CAPTURE_BANNER);
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopNotifier;

#[async_trait]
impl CaptureNotifier for NoopNotifier {
    async fn notify_capture(&self, _tab_id: i64, _domain: &str) -> Result<()> {
        Ok(())
    }
}
