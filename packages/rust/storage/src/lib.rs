//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding campaigns, the posts
//! they published, blog posts, and per-campaign activity logs.
//!
//! Foreign keys are enforced on every connection, so deleting a campaign
//! removes its published posts and logs and detaches its blog posts.

mod migrations;

use std::collections::HashMap;
use std::path::Path;

use backlinkoo_shared::{
    ActivityLog, BacklinkooError, BlogPost, Campaign, CampaignId, CampaignStatus, NewCampaign,
    Platform, PublishedPost, Result,
};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

const CAMPAIGN_COLUMNS: &str = "id, user_id, name, target_url, keywords_json, anchors_json, status, \
     model, error_message, published_url, created_at, updated_at, started_at, completed_at";

const POST_COLUMNS: &str = "id, campaign_id, platform, url, title, content_hash, keyword, \
     anchor_text, prompt_index, published_at";

const BLOG_COLUMNS: &str = "id, slug, title, content, keyword, anchor_text, target_url, \
     campaign_id, published_url, word_count, reading_time_minutes, is_trial, expires_at, created_at";

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| BacklinkooError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(db_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        BacklinkooError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Campaign operations
    // -----------------------------------------------------------------------

    /// Insert a validated campaign as a draft and return the stored record.
    pub async fn insert_campaign(&self, new: &NewCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = Campaign {
            id: CampaignId::new(),
            user_id: new.user_id.clone(),
            name: new
                .name
                .clone()
                .or_else(|| new.keywords.first().cloned())
                .unwrap_or_default(),
            target_url: new.target_url.clone(),
            keywords: new.keywords.clone(),
            anchor_texts: new.anchor_texts.clone(),
            status: CampaignStatus::Draft,
            model: new.model.clone(),
            error_message: None,
            published_url: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };

        let keywords_json = serde_json::to_string(&campaign.keywords)
            .map_err(|e| BacklinkooError::Storage(e.to_string()))?;
        let anchors_json = serde_json::to_string(&campaign.anchor_texts)
            .map_err(|e| BacklinkooError::Storage(e.to_string()))?;
        let ts_now = ts(&now);

        self.conn
            .execute(
                "INSERT INTO campaigns (id, user_id, name, target_url, keywords_json, anchors_json,
                                        status, model, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    campaign.id.to_string(),
                    campaign.user_id.as_str(),
                    campaign.name.as_str(),
                    campaign.target_url.as_str(),
                    keywords_json,
                    anchors_json,
                    campaign.status.as_str(),
                    campaign.model.as_deref(),
                    ts_now.as_str(),
                    ts_now.as_str(),
                ],
            )
            .await
            .map_err(write_err)?;

        tracing::debug!(campaign_id = %campaign.id, "inserted campaign");
        Ok(campaign)
    }

    /// Get a campaign by ID.
    pub async fn get_campaign(&self, id: &CampaignId) -> Result<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_campaign(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List campaigns, newest first, optionally filtered by owner and status.
    pub async fn list_campaigns(
        &self,
        user_id: Option<&str>,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
             WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![user_id, status.map(|s| s.as_str())])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_campaign(&row)?);
        }
        Ok(results)
    }

    /// Write a new status and maintain the lifecycle timestamps.
    ///
    /// Entering `Active` stamps `started_at` and clears any previous error and
    /// completion time. Entering `Completed` or `Failed` stamps `completed_at`.
    /// `error` is stored as the campaign's error message when given.
    pub async fn update_campaign_status(
        &self,
        id: &CampaignId,
        status: CampaignStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let now = ts(&Utc::now());
        let sql = match status {
            CampaignStatus::Active => {
                "UPDATE campaigns SET status = ?1, updated_at = ?2, started_at = ?2,
                        completed_at = NULL, error_message = ?3
                 WHERE id = ?4"
            }
            CampaignStatus::Completed | CampaignStatus::Failed => {
                "UPDATE campaigns SET status = ?1, updated_at = ?2, completed_at = ?2,
                        error_message = ?3
                 WHERE id = ?4"
            }
            CampaignStatus::Draft | CampaignStatus::Paused => {
                "UPDATE campaigns SET status = ?1, updated_at = ?2,
                        error_message = COALESCE(?3, error_message)
                 WHERE id = ?4"
            }
        };

        let affected = self
            .conn
            .execute(
                sql,
                params![status.as_str(), now.as_str(), error, id.to_string()],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(BacklinkooError::not_found("campaign", id.to_string()));
        }
        tracing::debug!(campaign_id = %id, status = %status, "campaign status updated");
        Ok(())
    }

    /// Record the most recently published URL on a campaign.
    pub async fn set_published_url(&self, id: &CampaignId, url: &str) -> Result<()> {
        let now = ts(&Utc::now());
        let affected = self
            .conn
            .execute(
                "UPDATE campaigns SET published_url = ?1, updated_at = ?2 WHERE id = ?3",
                params![url, now.as_str(), id.to_string()],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(BacklinkooError::not_found("campaign", id.to_string()));
        }
        Ok(())
    }

    /// Delete a campaign. Returns `false` if it did not exist.
    pub async fn delete_campaign(&self, id: &CampaignId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM campaigns WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Published post operations
    // -----------------------------------------------------------------------

    /// Insert a published post record.
    pub async fn insert_published_post(&self, post: &PublishedPost) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO published_posts ({POST_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    post.id.as_str(),
                    post.campaign_id.to_string(),
                    post.platform.id(),
                    post.url.as_str(),
                    post.title.as_str(),
                    post.content_hash.as_str(),
                    post.keyword.as_str(),
                    post.anchor_text.as_str(),
                    post.prompt_index,
                    ts(&post.published_at),
                ],
            )
            .await
            .map_err(write_err)?;
        Ok(())
    }

    /// List a campaign's published posts, oldest first.
    pub async fn list_published_posts(&self, campaign_id: &CampaignId) -> Result<Vec<PublishedPost>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM published_posts
             WHERE campaign_id = ?1 ORDER BY published_at, id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![campaign_id.to_string()])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_published_post(&row)?);
        }
        Ok(results)
    }

    /// Number of posts per normalized platform id for a campaign.
    pub async fn platform_counts(&self, campaign_id: &CampaignId) -> Result<HashMap<String, usize>> {
        let mut rows = self
            .conn
            .query(
                "SELECT platform, COUNT(*) FROM published_posts
                 WHERE campaign_id = ?1 GROUP BY platform",
                params![campaign_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut counts = HashMap::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let raw: String = row.get(0).map_err(db_err)?;
            let count: i64 = row.get(1).map_err(db_err)?;
            let key = raw
                .parse::<Platform>()
                .map(|p| p.id().to_string())
                .unwrap_or_else(|_| raw.to_ascii_lowercase());
            *counts.entry(key).or_insert(0) += count as usize;
        }
        Ok(counts)
    }

    /// Total number of posts a campaign has published.
    pub async fn count_published_posts(&self, campaign_id: &CampaignId) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM published_posts WHERE campaign_id = ?1",
                params![campaign_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as usize),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Blog post operations
    // -----------------------------------------------------------------------

    /// Insert a blog post. A duplicate slug yields [`BacklinkooError::Conflict`].
    pub async fn insert_blog_post(&self, post: &BlogPost) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO blog_posts ({BLOG_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    post.id.as_str(),
                    post.slug.as_str(),
                    post.title.as_str(),
                    post.content.as_str(),
                    post.keyword.as_str(),
                    post.anchor_text.as_str(),
                    post.target_url.as_str(),
                    post.campaign_id.as_ref().map(|c| c.to_string()),
                    post.published_url.as_str(),
                    post.word_count as i64,
                    post.reading_time_minutes,
                    i64::from(post.is_trial),
                    post.expires_at.as_ref().map(ts),
                    ts(&post.created_at),
                ],
            )
            .await
            .map_err(write_err)?;
        Ok(())
    }

    /// Get a blog post by slug.
    pub async fn get_blog_post_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let sql = format!("SELECT {BLOG_COLUMNS} FROM blog_posts WHERE slug = ?1");
        let mut rows = self.conn.query(&sql, params![slug]).await.map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_blog_post(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List the most recent blog posts.
    pub async fn list_blog_posts(&self, limit: u32) -> Result<Vec<BlogPost>> {
        let sql = format!(
            "SELECT {BLOG_COLUMNS} FROM blog_posts ORDER BY created_at DESC, id DESC LIMIT ?1"
        );
        let mut rows = self.conn.query(&sql, params![limit]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_blog_post(&row)?);
        }
        Ok(results)
    }

    /// Delete a blog post by slug. Returns `false` if it did not exist.
    pub async fn delete_blog_post(&self, slug: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM blog_posts WHERE slug = ?1", params![slug])
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM blog_posts WHERE slug = ?1", params![slug])
            .await
            .map_err(db_err)?;
        Ok(rows.next().await.map_err(db_err)?.is_some())
    }

    /// Delete trial posts whose expiry is before `now`. Returns the number removed.
    pub async fn cleanup_expired_posts(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM blog_posts
                 WHERE is_trial = 1 AND expires_at IS NOT NULL AND expires_at < ?1",
                params![ts(&now)],
            )
            .await
            .map_err(db_err)?;
        if removed > 0 {
            tracing::info!(removed, "cleaned up expired trial posts");
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Activity log operations
    // -----------------------------------------------------------------------

    /// Append an activity line for a campaign.
    pub async fn log_activity(
        &self,
        campaign_id: &CampaignId,
        level: &str,
        message: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO campaign_logs (campaign_id, level, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![campaign_id.to_string(), level, message, ts(&Utc::now())],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// List a campaign's activity in insertion order.
    pub async fn list_activity(&self, campaign_id: &CampaignId) -> Result<Vec<ActivityLog>> {
        let mut rows = self
            .conn
            .query(
                "SELECT level, message, created_at FROM campaign_logs
                 WHERE campaign_id = ?1 ORDER BY id",
                params![campaign_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(ActivityLog {
                campaign_id: campaign_id.clone(),
                level: row.get(0).map_err(db_err)?,
                message: row.get(1).map_err(db_err)?,
                created_at: parse_ts(&row.get::<String>(2).map_err(db_err)?)?,
            });
        }
        Ok(results)
    }
}

fn db_err(e: libsql::Error) -> BacklinkooError {
    BacklinkooError::Storage(e.to_string())
}

/// Like [`db_err`], but surfaces unique-constraint violations as conflicts.
fn write_err(e: libsql::Error) -> BacklinkooError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        BacklinkooError::Conflict(msg)
    } else {
        BacklinkooError::Storage(msg)
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BacklinkooError::Storage(format!("invalid date '{s}': {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_id(s: &str) -> Result<CampaignId> {
    s.parse()
        .map_err(|e| BacklinkooError::Storage(format!("invalid campaign id '{s}': {e}")))
}

fn parse_list(json: &str) -> Result<Vec<String>> {
    serde_json::from_str(json).map_err(|e| BacklinkooError::Storage(e.to_string()))
}

/// Convert a database row to a [`Campaign`].
fn row_to_campaign(row: &libsql::Row) -> Result<Campaign> {
    let status: String = row.get(6).map_err(db_err)?;
    Ok(Campaign {
        id: parse_id(&row.get::<String>(0).map_err(db_err)?)?,
        user_id: row.get(1).map_err(db_err)?,
        name: row.get(2).map_err(db_err)?,
        target_url: row.get(3).map_err(db_err)?,
        keywords: parse_list(&row.get::<String>(4).map_err(db_err)?)?,
        anchor_texts: parse_list(&row.get::<String>(5).map_err(db_err)?)?,
        status: status
            .parse()
            .map_err(|_| BacklinkooError::Storage(format!("invalid status '{status}'")))?,
        model: row.get::<String>(7).ok(),
        error_message: row.get::<String>(8).ok(),
        published_url: row.get::<String>(9).ok(),
        created_at: parse_ts(&row.get::<String>(10).map_err(db_err)?)?,
        updated_at: parse_ts(&row.get::<String>(11).map_err(db_err)?)?,
        started_at: parse_opt_ts(row.get::<String>(12).ok())?,
        completed_at: parse_opt_ts(row.get::<String>(13).ok())?,
    })
}

/// Convert a database row to a [`PublishedPost`].
fn row_to_published_post(row: &libsql::Row) -> Result<PublishedPost> {
    let platform: String = row.get(2).map_err(db_err)?;
    Ok(PublishedPost {
        id: row.get(0).map_err(db_err)?,
        campaign_id: parse_id(&row.get::<String>(1).map_err(db_err)?)?,
        platform: platform
            .parse()
            .map_err(|_| BacklinkooError::Storage(format!("invalid platform '{platform}'")))?,
        url: row.get(3).map_err(db_err)?,
        title: row.get(4).map_err(db_err)?,
        content_hash: row.get(5).map_err(db_err)?,
        keyword: row.get(6).map_err(db_err)?,
        anchor_text: row.get(7).map_err(db_err)?,
        prompt_index: row.get::<u32>(8).map_err(db_err)?,
        published_at: parse_ts(&row.get::<String>(9).map_err(db_err)?)?,
    })
}

/// Convert a database row to a [`BlogPost`].
fn row_to_blog_post(row: &libsql::Row) -> Result<BlogPost> {
    Ok(BlogPost {
        id: row.get(0).map_err(db_err)?,
        slug: row.get(1).map_err(db_err)?,
        title: row.get(2).map_err(db_err)?,
        content: row.get(3).map_err(db_err)?,
        keyword: row.get(4).map_err(db_err)?,
        anchor_text: row.get(5).map_err(db_err)?,
        target_url: row.get(6).map_err(db_err)?,
        campaign_id: row
            .get::<String>(7)
            .ok()
            .map(|s| parse_id(&s))
            .transpose()?,
        published_url: row.get(8).map_err(db_err)?,
        word_count: row.get::<i64>(9).map_err(db_err)? as usize,
        reading_time_minutes: row.get::<u32>(10).map_err(db_err)?,
        is_trial: row.get::<i64>(11).map_err(db_err)? != 0,
        expires_at: parse_opt_ts(row.get::<String>(12).ok())?,
        created_at: parse_ts(&row.get::<String>(13).map_err(db_err)?)?,
    })
}
