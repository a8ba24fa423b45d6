use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{Alert, Severity};

/// Source tag attached to every forwarded alert
pub const ALERT_SOURCE: &str = "telemetry_pipeline";

/// Outbound notification channel for raised alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn raise_custom_alert(
        &self,
        alert_type: &str,
        severity: Severity,
        message: &str,
        source: &str,
    ) -> Result<()>;
}

/// Notifier that only writes a log line
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn raise_custom_alert(
        &self,
        alert_type: &str,
        severity: Severity,
        message: &str,
        source: &str,
    ) -> Result<()> {
        info!(
            alert_type = %alert_type,
            severity = %severity,
            source = %source,
            "{message}"
        );
        Ok(())
    }
}

/// Forward alerts one by one. Failures and timeouts are logged and skipped.
/// Returns the number delivered.
pub async fn forward_alerts(notifier: &dyn Notifier, alerts: &[Alert], timeout: Duration) -> usize {
    let mut delivered = 0;
    for alert in alerts {
        let call = notifier.raise_custom_alert(
            alert.alert_type.as_str(),
            alert.severity,
            &alert.message,
            ALERT_SOURCE,
        );
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(())) => delivered += 1,
            Ok(Err(e)) => {
                warn!(alert_type = %alert.alert_type, error = %e, "Failed to forward alert");
            }
            Err(_) => {
                warn!(alert_type = %alert.alert_type, "Timed out forwarding alert");
            }
        }
    }
    delivered
}
