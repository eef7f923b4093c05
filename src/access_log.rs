use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a media access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDecision {
    Granted,
    Denied,
}

/// One grant/deny decision. Written once, never mutated; entries are
/// independent facts with no ordering guarantee across requests.
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    pub user_id: String,
    pub content_id: String,
    pub storage_key: String,
    pub decision: AccessDecision,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AccessLogEntry {
    pub fn granted(user_id: &str, content_id: &str, storage_key: &str, reason: &str) -> Self {
        Self::new(user_id, content_id, storage_key, AccessDecision::Granted, reason)
    }

    pub fn denied(user_id: &str, content_id: &str, storage_key: &str, reason: &str) -> Self {
        Self::new(user_id, content_id, storage_key, AccessDecision::Denied, reason)
    }

    fn new(
        user_id: &str,
        content_id: &str,
        storage_key: &str,
        decision: AccessDecision,
        reason: &str,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            content_id: content_id.to_string(),
            storage_key: storage_key.to_string(),
            decision,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Fire-and-forget audit logger.
///
/// `log` never blocks and never fails the request path. Entries drain
/// through a spawned task into structured tracing events and, when
/// configured, a best-effort audit webhook; every delivery failure is
/// swallowed after a warning.
#[derive(Clone)]
pub struct AccessLogger {
    tx: UnboundedSender<AccessLogEntry>,
}

impl AccessLogger {
    /// Spawn the drain task and return the logging handle.
    pub fn spawn(audit_webhook_url: Option<String>) -> Self {
        let (tx, rx) = unbounded::<AccessLogEntry>();

        tokio::spawn(async move {
            let client = audit_webhook_url.as_ref().map(|_| reqwest::Client::new());
            let mut rx = rx;

            while let Some(entry) = rx.next().await {
                emit(&entry);

                if let (Some(url), Some(client)) = (&audit_webhook_url, &client) {
                    deliver(client, url, &entry).await;
                }
            }

            debug!("Access log drain finished");
        });

        Self { tx }
    }

    /// Record a decision. Delivery is best-effort; a closed channel is
    /// invisible to the caller.
    pub fn log(&self, entry: AccessLogEntry) {
        _ = self.tx.unbounded_send(entry);
    }
}

fn emit(entry: &AccessLogEntry) {
    tracing::info!(
        target: "audit",
        user_id = %entry.user_id,
        content_id = %entry.content_id,
        storage_key = %entry.storage_key,
        decision = ?entry.decision,
        reason = %entry.reason,
        timestamp = %entry.timestamp.to_rfc3339(),
        "Media access decision"
    );
}

async fn deliver(client: &reqwest::Client, url: &str, entry: &AccessLogEntry) {
    match client
        .post(url)
        .json(entry)
        .timeout(Duration::from_secs(10))
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => {
            warn!(
                url,
                status = %response.status(),
                "Audit webhook returned non-success status"
            );
        }
        Err(err) => {
            warn!(url, ?err, "Failed to deliver audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AccessDecision::Granted).unwrap(),
            r#""granted""#
        );
        assert_eq!(
            serde_json::to_string(&AccessDecision::Denied).unwrap(),
            r#""denied""#
        );
    }

    #[test]
    fn test_entry_serializes_all_fields() {
        let entry = AccessLogEntry::denied("user-a", "content-1", "media/a.mp4", "token has expired");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["user_id"], "user-a");
        assert_eq!(json["content_id"], "content-1");
        assert_eq!(json["storage_key"], "media/a.mp4");
        assert_eq!(json["decision"], "denied");
        assert_eq!(json["reason"], "token has expired");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_log_never_blocks_or_panics() {
        let logger = AccessLogger::spawn(None);
        for i in 0..100 {
            logger.log(AccessLogEntry::granted(
                "user-a",
                &format!("content-{i}"),
                "media/a.mp4",
                "ok",
            ));
        }
        // Give the drain task a chance to run; nothing to assert beyond
        // the absence of a panic, the sink owns the entries from here.
        tokio::task::yield_now().await;
    }
}
