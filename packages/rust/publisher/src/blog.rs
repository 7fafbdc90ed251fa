//! Publisher that stores articles on the Backlinkoo blog (`blog_posts`).

use std::sync::Arc;

use async_trait::async_trait;
use backlinkoo_generator::{reading_time_minutes, slugify, word_count};
use backlinkoo_shared::{BacklinkooError, BlogConfig, BlogPost, Platform, Result};
use backlinkoo_storage::Storage;
use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{PublishOutcome, PublishRequest, Publisher};

/// Writes posts into the local blog table.
pub struct BlogPublisher {
    storage: Arc<Storage>,
    base_url: String,
    trial_ttl: Duration,
}

impl BlogPublisher {
    pub fn new(config: &BlogConfig, storage: Arc<Storage>) -> Result<Self> {
        let trial_ttl = Duration::try_hours(config.trial_ttl_hours)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| {
                BacklinkooError::config(format!(
                    "blog.trial_ttl_hours must be a positive number of hours, got {}",
                    config.trial_ttl_hours
                ))
            })?;
        Ok(Self {
            storage,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            trial_ttl,
        })
    }

    fn build_post(&self, req: &PublishRequest, slug: String) -> BlogPost {
        let now = Utc::now();
        let words = word_count(&req.html);
        BlogPost {
            id: Uuid::now_v7().to_string(),
            published_url: format!("{}/blog/{slug}", self.base_url),
            slug,
            title: req.title.clone(),
            content: req.html.clone(),
            keyword: req.keyword.clone(),
            anchor_text: req.anchor_text.clone(),
            target_url: req.target_url.clone(),
            campaign_id: req.campaign_id.clone(),
            word_count: words,
            reading_time_minutes: reading_time_minutes(words),
            is_trial: req.trial,
            expires_at: req.trial.then(|| now + self.trial_ttl),
            created_at: now,
        }
    }
}

#[async_trait]
impl Publisher for BlogPublisher {
    fn platform(&self) -> Platform {
        Platform::Blog
    }

    #[instrument(skip_all, fields(platform = "blog", title = %req.title))]
    async fn publish(&self, req: &PublishRequest) -> Result<PublishOutcome> {
        let base_slug = slugify(&req.title);
        let post = self.build_post(req, base_slug.clone());

        let stored = match self.storage.insert_blog_post(&post).await {
            Ok(()) => post,
            Err(BacklinkooError::Conflict(_)) => {
                // The tail of a v7 UUID is random; the head is a timestamp.
                let id = Uuid::now_v7().simple().to_string();
                let retry_slug = format!("{base_slug}-{}", &id[id.len() - 8..]);
                warn!(slug = %base_slug, retry = %retry_slug, "slug taken, retrying with suffix");

                let retry = self.build_post(req, retry_slug);
                self.storage.insert_blog_post(&retry).await.map_err(|e| {
                    BacklinkooError::publish(Platform::Blog.id(), format!("could not store post: {e}"))
                })?;
                retry
            }
            Err(e) => return Err(e),
        };

        info!(url = %stored.published_url, trial = stored.is_trial, "published to blog");
        Ok(PublishOutcome {
            platform: Platform::Blog,
            url: stored.published_url,
        })
    }
}
