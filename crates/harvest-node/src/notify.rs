//! Notification sink. Delivery is best-effort with a short per-transport
//! timeout; a dead webhook must never stall or fail a run. Webhook URLs
//! carry secrets, so anything logged goes through the masker first.

use serde_json::json;
use tracing::{debug, warn};

use harvest_config::NotificationConfig;
use harvest_types::{RunSummary, SecurityIncident};

pub struct Notifier {
    config: NotificationConfig,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(config: NotificationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    pub async fn run_summary(&self, summary: &RunSummary) {
        let payload = json!({
            "event": "run-summary",
            "severity": if summary.accounts_failed == 0 { "info" } else { "warning" },
            "fields": {
                "run_id": summary.run_id,
                "accounts": summary.accounts_total,
                "succeeded": summary.accounts_succeeded,
                "failed": summary.accounts_failed,
                "total_points": summary.total_points,
            }
        });
        self.deliver("run-summary", payload).await;
    }

    pub async fn incident(&self, incident: &SecurityIncident) {
        let payload = json!({
            "event": "security-incident",
            "severity": "critical",
            "fields": {
                "kind": incident.kind.to_string(),
                "account": incident.account,
                "details": incident.details,
                "next": incident.next,
                "docs": incident.docs_url,
            }
        });
        self.deliver("incident", payload).await;
    }

    async fn deliver(&self, event: &str, payload: serde_json::Value) {
        if let Some(url) = &self.config.webhook_url {
            match self.client.post(url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(event, transport = "webhook", "notification delivered");
                }
                Ok(response) => warn!(
                    event,
                    transport = "webhook",
                    url = %mask_url(url),
                    status = response.status().as_u16(),
                    "notification rejected"
                ),
                Err(err) => warn!(
                    event,
                    transport = "webhook",
                    url = %mask_url(url),
                    error = %err,
                    "notification failed"
                ),
            }
        }

        if let Some(url) = &self.config.push_url {
            let text = payload["fields"].to_string();
            if let Err(err) = self.client.post(url).body(text).send().await {
                warn!(event, transport = "push", url = %mask_url(url), error = %err, "push failed");
            }
        }
    }
}

/// Keep scheme and host, drop path and query (where tokens live).
pub fn mask_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split(['/', '?']).next().unwrap_or("");
            format!("{scheme}://{host}/***")
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_webhook_path_and_query() {
        assert_eq!(
            mask_url("https://discord.example/api/webhooks/123/secrettoken"),
            "https://discord.example/***"
        );
        assert_eq!(
            mask_url("https://push.example/topic?auth=tok"),
            "https://push.example/***"
        );
        assert_eq!(mask_url("not a url"), "***");
    }

    #[tokio::test]
    async fn unreachable_transport_never_errors() {
        let notifier = Notifier::new(NotificationConfig {
            webhook_url: Some("http://127.0.0.1:1/hook".into()),
            push_url: Some("http://127.0.0.1:1/push".into()),
            timeout: std::time::Duration::from_millis(200),
        });
        // Must simply return; failures are logged, not raised.
        notifier.run_summary(&RunSummary::default()).await;
    }
}
