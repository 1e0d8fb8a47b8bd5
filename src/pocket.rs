//! Read-later fan-out: push a freshly announced article to every
//! subscriber's Pocket account.
//!
//! Submissions are serialized with a fixed delay between them to respect
//! the save API's rate limit. One subscriber's revoked token or network
//! hiccup never aborts the fan-out for the rest.

use crate::config::Config;
use crate::storage::Database;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from a single save submission.
#[derive(Debug, Error)]
pub enum PocketError {
    /// The save API no longer recognizes the subscriber's access token
    #[error("access token revoked")]
    Auth,
    /// The request exceeded the submission timeout
    #[error("request timed out")]
    Timeout,
    /// No response, or a response other than success/unauthorized
    #[error("network error: {0}")]
    Network(String),
}

/// Client for the Pocket save API.
#[derive(Clone)]
pub struct PocketClient {
    client: reqwest::Client,
    base_url: String,
    consumer_key: SecretString,
    /// Saves are tagged with the hub's name so subscribers can find them
    app_tag: String,
    submit_delay: Duration,
}

impl PocketClient {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        consumer_key: SecretString,
        app_tag: String,
        submit_delay: Duration,
    ) -> Self {
        Self {
            client,
            base_url,
            consumer_key,
            app_tag,
            submit_delay,
        }
    }

    /// Build a client when the fan-out is enabled and has a consumer key.
    pub fn from_config(config: &Config, client: &reqwest::Client) -> Option<Self> {
        if !config.pocket.enabled {
            return None;
        }
        let Some(key) = &config.pocket.consumer_key else {
            tracing::warn!("Pocket fan-out enabled but no consumer key configured");
            return None;
        };

        Some(Self::new(
            client.clone(),
            config.pocket.base_url.clone(),
            SecretString::from(key.clone()),
            config.app_name.clone(),
            Duration::from_secs(config.pocket.submit_delay_secs),
        ))
    }

    /// Save one URL to one subscriber's account.
    async fn submit(&self, access_token: &str, url: &str) -> Result<(), PocketError> {
        let body = serde_json::json!({
            "consumer_key": self.consumer_key.expose_secret(),
            "access_token": access_token,
            "url": url,
            "tags": self.app_tag,
        });

        let response = tokio::time::timeout(
            SUBMIT_TIMEOUT,
            self.client
                .post(format!("{}/v3/add", self.base_url))
                .header("X-Accept", "application/json")
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| PocketError::Timeout)?
        .map_err(|e| {
            if e.is_timeout() {
                PocketError::Timeout
            } else {
                PocketError::Network(e.to_string())
            }
        })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::UNAUTHORIZED => Err(PocketError::Auth),
            status => Err(PocketError::Network(format!("HTTP status {status}"))),
        }
    }
}

/// Push one article to every subscriber who has not excluded its blog.
///
/// A 401 means the subscriber revoked our access from the Pocket side but
/// the link is still recorded here, so the credentials are unlinked
/// automatically and the fan-out continues with the remaining subscribers.
pub async fn fan_out(db: &Database, pocket: &PocketClient, blog_id: i64, article_url: &str) {
    let subscribers = match db.pocket_subscribers(blog_id).await {
        Ok(subscribers) => subscribers,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list Pocket subscribers");
            return;
        }
    };

    for (i, subscriber) in subscribers.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pocket.submit_delay).await;
        }

        match pocket.submit(&subscriber.pocket_token, article_url).await {
            Ok(()) => {
                tracing::debug!(email = %subscriber.email, url = %article_url, "Saved to Pocket");
            }
            Err(PocketError::Auth) => {
                tracing::warn!(
                    email = %subscriber.email,
                    "Pocket token no longer recognized, unlinking account"
                );
                if let Err(e) = db.unlink_pocket(&subscriber.email).await {
                    tracing::error!(email = %subscriber.email, error = %e, "Failed to unlink Pocket account");
                }
            }
            Err(e) => {
                tracing::warn!(email = %subscriber.email, error = %e, "Pocket submission failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: String) -> PocketClient {
        PocketClient::new(
            reqwest::Client::new(),
            base_url,
            SecretString::from("test-consumer-key"),
            "tidepool-test".to_string(),
            Duration::from_millis(1),
        )
    }

    async fn db_with_subscribers() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let blog_id = db
            .register_blog("https://blog.example.com", "https://blog.example.com/feed", None, None)
            .await
            .unwrap();

        let ana_id = db.upsert_user("ana@example.com", None, None).await.unwrap();
        db.link_pocket("ana@example.com", "ana", "token-ana").await.unwrap();
        db.upsert_user("ben@example.com", None, None).await.unwrap();
        db.link_pocket("ben@example.com", "ben", "token-ben").await.unwrap();

        (db, blog_id, ana_id)
    }

    #[tokio::test]
    async fn test_fan_out_submits_for_each_subscriber() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/add"))
            .and(body_string_contains("tidepool-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let (db, blog_id, _ana_id) = db_with_subscribers().await;
        let pocket = test_client(mock_server.uri());

        fan_out(&db, &pocket, blog_id, "https://blog.example.com/post").await;
    }

    #[tokio::test]
    async fn test_excluded_subscriber_is_skipped() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/add"))
            .and(body_string_contains("token-ben"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (db, blog_id, ana_id) = db_with_subscribers().await;
        // ana opts out of this blog
        db.exclude_blog_from_pocket(ana_id, blog_id).await.unwrap();

        let pocket = test_client(mock_server.uri());
        fan_out(&db, &pocket, blog_id, "https://blog.example.com/post").await;
    }

    #[tokio::test]
    async fn test_revoked_token_unlinks_only_that_subscriber() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("token-ana"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("token-ben"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (db, blog_id, _ana_id) = db_with_subscribers().await;
        let pocket = test_client(mock_server.uri());

        fan_out(&db, &pocket, blog_id, "https://blog.example.com/post").await;

        // ana's credentials are gone, ben's remain
        let remaining = db.pocket_subscribers(blog_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].email, "ben@example.com");
    }

    #[tokio::test]
    async fn test_server_error_does_not_unlink() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let (db, blog_id, _ana_id) = db_with_subscribers().await;
        let pocket = test_client(mock_server.uri());

        fan_out(&db, &pocket, blog_id, "https://blog.example.com/post").await;

        assert_eq!(db.pocket_subscribers(blog_id).await.unwrap().len(), 2);
    }
}
