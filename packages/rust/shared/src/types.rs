//! Core domain types for Backlinkoo campaigns and their published content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::error::{BacklinkooError, Result};

// ---------------------------------------------------------------------------
// CampaignId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for campaign identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(pub Uuid);

impl CampaignId {
    /// Generate a new time-sortable campaign identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CampaignId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CampaignStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Database/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check whether moving from `self` to `to` is allowed.
    pub fn can_transition_to(self, to: CampaignStatus) -> bool {
        use CampaignStatus::*;
        match (self, to) {
            (Draft, Active) => true,

            (Active, Completed) | (Active, Failed) | (Active, Paused) => true,

            (Paused, Active) | (Paused, Completed) => true,

            // Completed campaigns keep rotating: another run publishes again.
            (Completed, Active) => true,

            (Failed, Active) => true,

            _ if self == to => true,

            _ => false,
        }
    }

    /// States reachable from `self` in one step (excluding `self`).
    pub fn allowed_next(self) -> Vec<CampaignStatus> {
        use CampaignStatus::*;
        match self {
            Draft => vec![Active],
            Active => vec![Completed, Failed, Paused],
            Paused => vec![Active, Completed],
            Completed => vec![Active],
            Failed => vec![Active],
        }
    }

    /// Whether the publish pipeline may run a campaign in this state.
    pub fn is_runnable(self) -> bool {
        self != CampaignStatus::Paused
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = BacklinkooError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(BacklinkooError::validation(format!(
                "unknown campaign status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Campaign
// ---------------------------------------------------------------------------

/// A user-initiated request to generate and publish backlink content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    /// Owning user.
    pub user_id: String,
    /// Display name (defaults to the first keyword).
    pub name: String,
    /// URL the generated content links to.
    pub target_url: String,
    pub keywords: Vec<String>,
    pub anchor_texts: Vec<String>,
    pub status: CampaignStatus,
    /// Per-campaign model override for content generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Last failure message, cleared on the next run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Most recently published URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Keyword/anchor pair for the `n`-th run, rotating through both lists.
    pub fn pick_pair(&self, n: usize) -> (&str, &str) {
        let keyword = self
            .keywords
            .get(n % self.keywords.len().max(1))
            .map(String::as_str)
            .unwrap_or_default();
        let anchor = self
            .anchor_texts
            .get(n % self.anchor_texts.len().max(1))
            .map(String::as_str)
            .unwrap_or(keyword);
        (keyword, anchor)
    }
}

/// Input for creating a campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCampaign {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "targetUrl")]
    pub target_url: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, alias = "anchorTexts")]
    pub anchor_texts: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl NewCampaign {
    /// Trim blank entries and check required fields.
    pub fn validate(self) -> Result<NewCampaign> {
        let user_id = self.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(BacklinkooError::validation("user_id is required"));
        }

        let target_url = self.target_url.trim().to_string();
        let parsed = Url::parse(&target_url).map_err(|e| {
            BacklinkooError::validation(format!("invalid target_url '{target_url}': {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BacklinkooError::validation(format!(
                "target_url must be http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let keywords = clean_list(self.keywords);
        if keywords.is_empty() {
            return Err(BacklinkooError::validation(
                "at least one keyword is required",
            ));
        }

        let anchor_texts = clean_list(self.anchor_texts);
        if anchor_texts.is_empty() {
            return Err(BacklinkooError::validation(
                "at least one anchor text is required",
            ));
        }

        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| keywords[0].clone());

        Ok(NewCampaign {
            user_id,
            name: Some(name),
            target_url,
            keywords,
            anchor_texts,
            model: self.model.filter(|m| !m.trim().is_empty()),
        })
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// A publishing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegraph,
    WriteAs,
    Blog,
}

impl Platform {
    /// Normalized identifier stored alongside published posts.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Telegraph => "telegraph",
            Self::WriteAs => "writeas",
            Self::Blog => "blog",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Telegraph => "Telegraph.ph",
            Self::WriteAs => "Write.as",
            Self::Blog => "Backlinkoo Blog",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for Platform {
    type Err = BacklinkooError;

    /// Accepts current ids as well as legacy display names.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telegraph" | "telegraph.ph" | "telegra.ph" => Ok(Self::Telegraph),
            "writeas" | "write.as" => Ok(Self::WriteAs),
            "blog" => Ok(Self::Blog),
            other => Err(BacklinkooError::validation(format!(
                "unknown platform '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Published content
// ---------------------------------------------------------------------------

/// A piece of generated content that went live on a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: String,
    pub campaign_id: CampaignId,
    pub platform: Platform,
    /// Public URL returned by the platform.
    pub url: String,
    pub title: String,
    /// SHA-256 hash of the published HTML.
    pub content_hash: String,
    pub keyword: String,
    pub anchor_text: String,
    /// Which prompt variant produced the content (1-based).
    pub prompt_index: u32,
    pub published_at: DateTime<Utc>,
}

/// A post hosted on the Backlinkoo blog (`blog_posts` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    /// Unique URL slug.
    pub slug: String,
    pub title: String,
    pub content: String,
    pub keyword: String,
    pub anchor_text: String,
    pub target_url: String,
    /// Originating campaign; nulled when the campaign is deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<CampaignId>,
    pub published_url: String,
    pub word_count: usize,
    pub reading_time_minutes: u32,
    /// Trial posts expire unless claimed.
    pub is_trial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One line of campaign activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    pub campaign_id: CampaignId,
    /// `info`, `warn`, or `error`.
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// SHA-256 hex digest of a content body.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
