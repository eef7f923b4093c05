use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

/// External entitlement predicate: may `user_id` view `content_id`?
///
/// Subscription and purchase state live outside this service; the core
/// only consumes the answer. Every mint path must call this and get `true`
/// before a credential is produced.
#[async_trait]
pub trait EntitlementCheck: Send + Sync {
    async fn is_entitled(&self, user_id: &str, content_id: &str) -> bool;
}

/// Allow-all entitlement, for deployments where the internal listener is
/// only reachable by callers that have already enforced entitlement.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl EntitlementCheck for AllowAll {
    async fn is_entitled(&self, _user_id: &str, _content_id: &str) -> bool {
        true
    }
}

/// Queries an external entitlement service over HTTP.
///
/// Fails closed: transport errors, non-2xx responses and unreadable bodies
/// all count as not entitled.
pub struct HttpEntitlement {
    client: reqwest::Client,
    url: String,
}

impl HttpEntitlement {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[derive(Serialize)]
struct EntitlementQuery<'a> {
    user_id: &'a str,
    content_id: &'a str,
}

#[derive(Deserialize)]
struct EntitlementVerdict {
    entitled: bool,
}

#[async_trait]
impl EntitlementCheck for HttpEntitlement {
    async fn is_entitled(&self, user_id: &str, content_id: &str) -> bool {
        let query = EntitlementQuery { user_id, content_id };

        let response = match self
            .client
            .post(&self.url)
            .json(&query)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(url = %self.url, ?err, "Entitlement service unreachable");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(
                url = %self.url,
                status = %response.status(),
                "Entitlement service returned non-success status"
            );
            return false;
        }

        match response.json::<EntitlementVerdict>().await {
            Ok(verdict) => verdict.entitled,
            Err(err) => {
                error!(url = %self.url, ?err, "Entitlement response unreadable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_all_is_entitled() {
        assert!(AllowAll.is_entitled("user-a", "content-1").await);
    }

    #[tokio::test]
    async fn test_http_entitlement_fails_closed_when_unreachable() {
        // Nothing listens here; the check must come back false, not error.
        let check = HttpEntitlement::new("http://127.0.0.1:9/entitlements".to_string());
        assert!(!check.is_entitled("user-a", "content-1").await);
    }
}
