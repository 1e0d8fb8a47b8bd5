use crate::config::Config;
use crate::storage::ChannelKind;
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;

const POST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from posting to a social channel. All of them are terminal for
/// the announcement being dispatched: logged, never retried.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel API rejected the post
    #[error("channel API returned HTTP status {0}")]
    Http(u16),
    /// The request never completed
    #[error("network error: {0}")]
    Network(String),
    /// The request exceeded the posting timeout
    #[error("request timed out")]
    Timeout,
}

/// A posting capability for one social channel.
///
/// Constructed once at startup from config and injected into the
/// dispatcher, so nothing in the pipeline touches global client state.
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    fn post<'a>(
        &'a self,
        message: &'a str,
        content_warning: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), ChannelError>>;
}

/// The configured channel clients, at most one per kind.
#[derive(Default)]
pub struct ChannelSet {
    tweet: Option<Box<dyn Channel>>,
    toot: Option<Box<dyn Channel>>,
}

impl ChannelSet {
    /// Build clients for every enabled channel that has a token. An enabled
    /// channel without a token is a configuration mistake worth flagging,
    /// but not worth refusing to start over.
    pub fn from_config(config: &Config, client: &reqwest::Client) -> Self {
        let mut set = ChannelSet::default();

        if config.tweet.enabled {
            match &config.tweet.access_token {
                Some(token) => {
                    set.tweet = Some(Box::new(TwitterClient::new(
                        client.clone(),
                        config.tweet.base_url.clone(),
                        SecretString::from(token.clone()),
                    )));
                }
                None => {
                    tracing::warn!("Tweet channel enabled but no access token configured");
                }
            }
        }

        if config.toot.enabled {
            match &config.toot.access_token {
                Some(token) => {
                    set.toot = Some(Box::new(MastodonClient::new(
                        client.clone(),
                        config.toot.base_url.clone(),
                        SecretString::from(token.clone()),
                    )));
                }
                None => {
                    tracing::warn!("Toot channel enabled but no access token configured");
                }
            }
        }

        set
    }

    pub fn with_channel(mut self, channel: Box<dyn Channel>) -> Self {
        match channel.kind() {
            ChannelKind::Tweet => self.tweet = Some(channel),
            ChannelKind::Toot => self.toot = Some(channel),
        }
        self
    }

    pub fn get(&self, kind: ChannelKind) -> Option<&dyn Channel> {
        match kind {
            ChannelKind::Tweet => self.tweet.as_deref(),
            ChannelKind::Toot => self.toot.as_deref(),
        }
    }
}

fn from_reqwest(err: reqwest::Error) -> ChannelError {
    if err.is_timeout() {
        ChannelError::Timeout
    } else {
        ChannelError::Network(err.to_string())
    }
}

// ============================================================================
// Mastodon
// ============================================================================

/// Posts statuses to a Mastodon instance. Content warnings map to the
/// spoiler text field.
pub struct MastodonClient {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl MastodonClient {
    pub fn new(client: reqwest::Client, base_url: String, token: SecretString) -> Self {
        Self {
            client,
            base_url,
            token,
        }
    }
}

impl Channel for MastodonClient {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Toot
    }

    fn post<'a>(
        &'a self,
        message: &'a str,
        content_warning: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), ChannelError>> {
        Box::pin(async move {
            let mut form = vec![("status", message)];
            if let Some(warning) = content_warning {
                form.push(("spoiler_text", warning));
            }

            let response = tokio::time::timeout(
                POST_TIMEOUT,
                self.client
                    .post(format!("{}/api/v1/statuses", self.base_url))
                    .bearer_auth(self.token.expose_secret())
                    .form(&form)
                    .send(),
            )
            .await
            .map_err(|_| ChannelError::Timeout)?
            .map_err(from_reqwest)?;

            if !response.status().is_success() {
                return Err(ChannelError::Http(response.status().as_u16()));
            }
            Ok(())
        })
    }
}

// ============================================================================
// Twitter
// ============================================================================

/// Posts tweets via the v2 API. The tweet channel has no content-warning
/// mechanism, so any warning is ignored.
pub struct TwitterClient {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl TwitterClient {
    pub fn new(client: reqwest::Client, base_url: String, token: SecretString) -> Self {
        Self {
            client,
            base_url,
            token,
        }
    }
}

impl Channel for TwitterClient {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Tweet
    }

    fn post<'a>(
        &'a self,
        message: &'a str,
        _content_warning: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), ChannelError>> {
        Box::pin(async move {
            let response = tokio::time::timeout(
                POST_TIMEOUT,
                self.client
                    .post(format!("{}/2/tweets", self.base_url))
                    .bearer_auth(self.token.expose_secret())
                    .json(&serde_json::json!({ "text": message }))
                    .send(),
            )
            .await
            .map_err(|_| ChannelError::Timeout)?
            .map_err(from_reqwest)?;

            if !response.status().is_success() {
                return Err(ChannelError::Http(response.status().as_u16()));
            }
            Ok(())
        })
    }
}
