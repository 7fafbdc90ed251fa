//! Publishing generated articles to external platforms.
//!
//! Each destination implements [`Publisher`]. A [`PublisherRegistry`] holds
//! the configured publishers in rotation order, and [`select_platform`]
//! spreads a campaign's posts evenly across them.

pub mod convert;

mod blog;
mod telegraph;
mod writeas;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backlinkoo_shared::{AppConfig, BacklinkooError, CampaignId, Platform, Result};
use backlinkoo_storage::Storage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use blog::BlogPublisher;
pub use telegraph::TelegraphPublisher;
pub use writeas::WriteAsPublisher;

/// User-Agent string for publishing requests.
const USER_AGENT: &str = concat!("Backlinkoo/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// An article ready to be published.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishRequest {
    pub title: String,
    pub html: String,
    pub keyword: String,
    pub anchor_text: String,
    pub target_url: String,
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    /// Trial content expires unless claimed (blog only).
    #[serde(default)]
    pub trial: bool,
}

impl PublishRequest {
    pub fn new(title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            html: html.into(),
            ..Self::default()
        }
    }
}

/// Where an article went live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub platform: Platform,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Publisher trait
// ---------------------------------------------------------------------------

/// A publishing destination.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish one article. Not idempotent: calling twice creates two posts.
    async fn publish(&self, req: &PublishRequest) -> Result<PublishOutcome>;
}

// ---------------------------------------------------------------------------
// Registry and rotation
// ---------------------------------------------------------------------------

/// Publishers in rotation order.
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: Vec<Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a publisher. A later publisher for the same platform replaces
    /// the earlier one but keeps its position.
    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        let platform = publisher.platform();
        match self.publishers.iter_mut().find(|p| p.platform() == platform) {
            Some(slot) => *slot = publisher,
            None => self.publishers.push(publisher),
        }
    }

    pub fn with(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.register(publisher);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Publisher>> {
        self.publishers
            .iter()
            .find(|p| p.platform() == platform)
            .cloned()
    }

    /// Registered platforms in rotation order.
    pub fn platforms(&self) -> Vec<Platform> {
        self.publishers.iter().map(|p| p.platform()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    /// Build the publishers named in `[publishing] platforms`.
    pub fn from_config(config: &AppConfig, storage: Arc<Storage>, client: Client) -> Result<Self> {
        let mut registry = Self::new();
        for name in &config.publishing.platforms {
            let platform: Platform = name.parse().map_err(|_| {
                BacklinkooError::config(format!("unknown platform '{name}' in [publishing]"))
            })?;
            let publisher: Arc<dyn Publisher> = match platform {
                Platform::Telegraph => {
                    Arc::new(TelegraphPublisher::new(&config.telegraph, client.clone()))
                }
                Platform::WriteAs => {
                    Arc::new(WriteAsPublisher::new(&config.writeas, client.clone()))
                }
                Platform::Blog => Arc::new(BlogPublisher::new(&config.blog, storage.clone())?),
            };
            registry.register(publisher);
        }

        if registry.is_empty() {
            return Err(BacklinkooError::config(
                "no publishing platforms configured in [publishing] platforms",
            ));
        }
        debug!(platforms = ?registry.platforms(), "publisher registry ready");
        Ok(registry)
    }
}

/// Pick the platform with the fewest posts for a campaign.
///
/// `counts` is keyed by [`Platform::id`]. Ties go to the earliest platform in
/// `order`, which makes repeated runs cycle through the list.
pub fn select_platform(order: &[Platform], counts: &HashMap<String, usize>) -> Option<Platform> {
    order
        .iter()
        .enumerate()
        .min_by_key(|(i, p)| (counts.get(p.id()).copied().unwrap_or(0), *i))
        .map(|(_, p)| *p)
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Build the shared HTTP client used by the publishers.
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BacklinkooError::Network(format!("failed to build HTTP client: {e}")))
}

/// Check that a published URL responds. Failures are logged, never returned.
pub async fn verify_url(client: &Client, url: &str) -> bool {
    match client.head(url).send().await {
        Ok(response) if response.status().is_success() || response.status().is_redirection() => {
            debug!(%url, status = %response.status(), "published URL is reachable");
            true
        }
        Ok(response) => {
            warn!(%url, status = %response.status(), "published URL did not verify");
            false
        }
        Err(e) => {
            warn!(%url, error = %e, "published URL could not be checked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixed(Platform, &'static str);

    #[async_trait]
    impl Publisher for Fixed {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn publish(&self, _req: &PublishRequest) -> Result<PublishOutcome> {
            Ok(PublishOutcome {
                platform: self.0,
                url: self.1.to_string(),
            })
        }
    }

    fn counts(pairs: &[(&str, usize)]) -> HashMap<String, usize> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn rotation_prefers_fewest_posts() {
        let order = [Platform::Telegraph, Platform::WriteAs];
        assert_eq!(select_platform(&order, &counts(&[])), Some(Platform::Telegraph));
        assert_eq!(
            select_platform(&order, &counts(&[("telegraph", 1)])),
            Some(Platform::WriteAs)
        );
        assert_eq!(
            select_platform(&order, &counts(&[("telegraph", 1), ("writeas", 1)])),
            Some(Platform::Telegraph)
        );
        assert_eq!(
            select_platform(&order, &counts(&[("telegraph", 5), ("writeas", 2)])),
            Some(Platform::WriteAs)
        );
        assert_eq!(select_platform(&[], &counts(&[])), None);
    }

    #[test]
    fn rotation_ignores_unconfigured_platforms() {
        let order = [Platform::WriteAs];
        assert_eq!(
            select_platform(&order, &counts(&[("telegraph", 0), ("writeas", 3)])),
            Some(Platform::WriteAs)
        );
    }

    #[tokio::test]
    async fn registry_keeps_order_and_replaces_duplicates() {
        let registry = PublisherRegistry::new()
            .with(Arc::new(Fixed(Platform::WriteAs, "a")))
            .with(Arc::new(Fixed(Platform::Telegraph, "b")))
            .with(Arc::new(Fixed(Platform::WriteAs, "c")));

        assert_eq!(registry.platforms(), vec![Platform::WriteAs, Platform::Telegraph]);
        let writeas = registry.get(Platform::WriteAs).expect("registered");
        let outcome = writeas.publish(&PublishRequest::default()).await.unwrap();
        assert_eq!(outcome.url, "c");
        assert!(registry.get(Platform::Blog).is_none());
    }

    #[tokio::test]
    async fn registry_from_config() {
        let tmp = std::env::temp_dir().join(format!("bl_reg_test_{}.db", uuid::Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.unwrap());
        let client = build_http_client(5).unwrap();

        let mut config = AppConfig::default();
        config.publishing.platforms = vec!["write.as".into(), "blog".into()];
        let registry = PublisherRegistry::from_config(&config, storage.clone(), client.clone())
            .expect("registry");
        assert_eq!(registry.platforms(), vec![Platform::WriteAs, Platform::Blog]);

        config.publishing.platforms = vec!["medium".into()];
        assert!(PublisherRegistry::from_config(&config, storage.clone(), client.clone()).is_err());

        config.publishing.platforms.clear();
        assert!(PublisherRegistry::from_config(&config, storage, client).is_err());
    }

    #[tokio::test]
    async fn verify_url_is_warn_only() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let client = build_http_client(5).unwrap();
        assert!(verify_url(&client, &server.uri()).await);

        let missing = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&missing)
            .await;
        assert!(!verify_url(&client, &missing.uri()).await);
        assert!(!verify_url(&client, "http://127.0.0.1:9/unreachable").await);
    }
}
