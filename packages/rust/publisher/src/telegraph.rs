//! Telegraph (telegra.ph) publisher.

use async_trait::async_trait;
use backlinkoo_shared::{BacklinkooError, Platform, Result, TelegraphConfig};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::convert::{TelegraphNode, html_to_telegraph_nodes};
use crate::{PublishOutcome, PublishRequest, Publisher};

/// Telegraph rejects titles longer than this.
const MAX_TITLE_CHARS: usize = 256;
const MAX_AUTHOR_CHARS: usize = 128;
const MAX_SHORT_NAME_CHARS: usize = 32;

/// Telegraph wraps every response in `{ ok, result, error }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Account {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    url: String,
}

#[derive(Debug, Serialize)]
struct CreateAccount<'a> {
    short_name: &'a str,
    author_name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePage<'a> {
    access_token: &'a str,
    title: &'a str,
    author_name: &'a str,
    content: &'a [TelegraphNode],
    return_content: bool,
}

/// Publishes articles as Telegraph pages.
pub struct TelegraphPublisher {
    client: Client,
    api_base: String,
    short_name: String,
    author_name: String,
    access_token: Option<String>,
}

impl TelegraphPublisher {
    /// Build from config, reading the access token from its env var if set.
    pub fn new(config: &TelegraphConfig, client: Client) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            short_name: truncate_chars(&config.short_name, MAX_SHORT_NAME_CHARS),
            author_name: truncate_chars(&config.author_name, MAX_AUTHOR_CHARS),
            access_token: config.access_token(),
        }
    }

    async fn call<B: Serialize, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T> {
        let url = format!("{}/{method}", self.api_base);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| publish_err(format!("{method} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(publish_err(format!("{method} returned HTTP {status}")));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| publish_err(format!("{method} returned invalid JSON: {e}")))?;

        match envelope {
            Envelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            Envelope { error, .. } => Err(publish_err(format!(
                "{method} failed: {}",
                error.unwrap_or_else(|| "unknown error".into())
            ))),
        }
    }

    /// Create a throw-away account and return its access token.
    async fn create_account(&self) -> Result<String> {
        let account: Account = self
            .call(
                "createAccount",
                &CreateAccount {
                    short_name: &self.short_name,
                    author_name: &self.author_name,
                },
            )
            .await?;
        debug!("created telegraph account");
        Ok(account.access_token)
    }
}

#[async_trait]
impl Publisher for TelegraphPublisher {
    fn platform(&self) -> Platform {
        Platform::Telegraph
    }

    #[instrument(skip_all, fields(platform = "telegraph", title = %req.title))]
    async fn publish(&self, req: &PublishRequest) -> Result<PublishOutcome> {
        let content = html_to_telegraph_nodes(&req.html);
        if content.is_empty() {
            return Err(publish_err("article has no publishable content"));
        }

        let token = match &self.access_token {
            Some(token) => token.clone(),
            None => self.create_account().await?,
        };

        let title = truncate_chars(req.title.trim(), MAX_TITLE_CHARS);
        let page: Page = self
            .call(
                "createPage",
                &CreatePage {
                    access_token: &token,
                    title: &title,
                    author_name: &self.author_name,
                    content: &content,
                    return_content: false,
                },
            )
            .await?;

        info!(url = %page.url, "published to telegraph");
        Ok(PublishOutcome {
            platform: Platform::Telegraph,
            url: page.url,
        })
    }
}

fn publish_err(msg: impl Into<String>) -> BacklinkooError {
    BacklinkooError::publish(Platform::Telegraph.id(), msg)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
