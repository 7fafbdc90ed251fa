//! End-to-end campaign run: load → generate → publish → record.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use backlinkoo_generator::{ContentGenerator, GenerateRequest, GenerationSource, generator_from_config};
use backlinkoo_publisher::{
    PublishRequest, PublisherRegistry, build_http_client, select_platform, verify_url,
};
use backlinkoo_shared::{
    AppConfig, BacklinkooError, Campaign, CampaignId, CampaignStatus, NewCampaign, Platform,
    PublishedPost, Result, content_hash,
};
use backlinkoo_storage::Storage;

use crate::campaign::{create_campaign, get_campaign};

/// Owner id used for campaigns created without a signed-in user.
/// Their blog posts are trial posts that expire.
pub const GUEST_USER_ID: &str = "guest";

/// Everything a campaign run needs.
#[derive(Clone)]
pub struct PipelineContext {
    pub storage: Arc<Storage>,
    pub generator: Arc<dyn ContentGenerator>,
    pub publishers: PublisherRegistry,
    /// HEAD-check each published URL (warn-only).
    pub verify_urls: bool,
    pub http: Client,
}

impl PipelineContext {
    pub fn new(
        storage: Arc<Storage>,
        generator: Arc<dyn ContentGenerator>,
        publishers: PublisherRegistry,
        http: Client,
    ) -> Self {
        Self {
            storage,
            generator,
            publishers,
            verify_urls: false,
            http,
        }
    }

    /// Open storage and build the generator and publishers from config.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config.storage.resolved_db_path()).await?);
        let generator = generator_from_config(&config.openai)?;
        let http = build_http_client(config.publishing.timeout_secs)?;
        let publishers = PublisherRegistry::from_config(config, storage.clone(), http.clone())?;

        Ok(Self {
            storage,
            generator,
            publishers,
            verify_urls: config.publishing.verify_urls,
            http,
        })
    }
}

/// Outcome of one successful campaign run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub campaign_id: CampaignId,
    pub platform: Platform,
    pub url: String,
    pub title: String,
    pub keyword: String,
    pub anchor_text: String,
    pub prompt_index: u32,
    pub source: GenerationSource,
    /// `None` when verification is disabled.
    pub verified: Option<bool>,
    pub elapsed_ms: u64,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a run completes successfully.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &RunResult) {}
}

/// Run one generate-and-publish cycle for a campaign.
///
/// 1. Load the campaign; paused campaigns are refused
/// 2. Mark it active
/// 3. Pick the next keyword/anchor pair
/// 4. Generate the article
/// 5. Publish to the least-used platform and verify the URL
/// 6. Record the post and the campaign's published URL
/// 7. Mark it completed
///
/// A failure in steps 3-6 marks the campaign failed and returns the error.
/// Nothing is retried or rolled back; running again starts a fresh cycle.
#[instrument(skip_all, fields(campaign_id = %campaign_id))]
pub async fn run_campaign(
    ctx: &PipelineContext,
    campaign_id: &CampaignId,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();

    // --- Load ---
    progress.phase("Loading campaign");
    let campaign = get_campaign(&ctx.storage, campaign_id).await?;
    if !campaign.status.is_runnable() {
        return Err(BacklinkooError::InvalidTransition {
            from: campaign.status,
            to: CampaignStatus::Active,
        });
    }

    ctx.storage
        .update_campaign_status(campaign_id, CampaignStatus::Active, None)
        .await?;
    ctx.storage
        .log_activity(campaign_id, "info", "Campaign run started")
        .await?;
    info!(from = %campaign.status, "campaign run started");

    match publish_once(ctx, &campaign, progress, start).await {
        Ok(result) => {
            ctx.storage
                .update_campaign_status(campaign_id, CampaignStatus::Completed, None)
                .await?;
            ctx.storage
                .log_activity(
                    campaign_id,
                    "info",
                    &format!("Published to {}: {}", result.platform.display_name(), result.url),
                )
                .await?;

            progress.done(&result);
            info!(
                platform = %result.platform,
                url = %result.url,
                elapsed_ms = result.elapsed_ms,
                "campaign run complete"
            );
            Ok(result)
        }
        Err(e) => {
            let message = e.to_string();
            error!(error = %message, "campaign run failed");
            if let Err(mark_err) = ctx
                .storage
                .update_campaign_status(campaign_id, CampaignStatus::Failed, Some(&message))
                .await
            {
                warn!(error = %mark_err, "could not mark campaign as failed");
            }
            if let Err(log_err) = ctx
                .storage
                .log_activity(campaign_id, "error", &format!("Run failed: {message}"))
                .await
            {
                warn!(error = %log_err, "could not record failure");
            }
            Err(e)
        }
    }
}

/// Steps 3-6 of a run.
async fn publish_once(
    ctx: &PipelineContext,
    campaign: &Campaign,
    progress: &dyn ProgressReporter,
    start: Instant,
) -> Result<RunResult> {
    let posted = ctx.storage.count_published_posts(&campaign.id).await?;
    let (keyword, anchor_text) = campaign.pick_pair(posted);
    let (keyword, anchor_text) = (keyword.to_string(), anchor_text.to_string());

    // --- Generate ---
    progress.phase("Generating content");
    let mut request = GenerateRequest::new(&keyword, &anchor_text, &campaign.target_url);
    request.model = campaign.model.clone();
    let generated = ctx.generator.generate(&request).await?;
    ctx.storage
        .log_activity(
            &campaign.id,
            "info",
            &format!(
                "Generated '{}' with {} (prompt #{})",
                generated.title,
                ctx.generator.name(),
                generated.prompt_index
            ),
        )
        .await?;

    // --- Publish ---
    let counts = ctx.storage.platform_counts(&campaign.id).await?;
    let platform = select_platform(&ctx.publishers.platforms(), &counts)
        .ok_or_else(|| BacklinkooError::config("no publishing platforms available"))?;
    let publisher = ctx
        .publishers
        .get(platform)
        .ok_or_else(|| BacklinkooError::config(format!("no publisher for {platform}")))?;

    progress.phase(&format!("Publishing to {}", platform.display_name()));
    let outcome = publisher
        .publish(&PublishRequest {
            title: generated.title.clone(),
            html: generated.html.clone(),
            keyword: keyword.clone(),
            anchor_text: anchor_text.clone(),
            target_url: campaign.target_url.clone(),
            campaign_id: Some(campaign.id.clone()),
            trial: campaign.user_id == GUEST_USER_ID,
        })
        .await?;

    let verified = if ctx.verify_urls {
        progress.phase("Verifying published URL");
        let ok = verify_url(&ctx.http, &outcome.url).await;
        if !ok {
            ctx.storage
                .log_activity(
                    &campaign.id,
                    "warn",
                    &format!("Published URL did not verify: {}", outcome.url),
                )
                .await?;
        }
        Some(ok)
    } else {
        None
    };

    // --- Record ---
    progress.phase("Recording post");
    ctx.storage
        .insert_published_post(&PublishedPost {
            id: Uuid::now_v7().to_string(),
            campaign_id: campaign.id.clone(),
            platform: outcome.platform,
            url: outcome.url.clone(),
            title: generated.title.clone(),
            content_hash: content_hash(&generated.html),
            keyword: keyword.clone(),
            anchor_text: anchor_text.clone(),
            prompt_index: generated.prompt_index,
            published_at: chrono::Utc::now(),
        })
        .await?;
    ctx.storage
        .set_published_url(&campaign.id, &outcome.url)
        .await?;

    Ok(RunResult {
        campaign_id: campaign.id.clone(),
        platform: outcome.platform,
        url: outcome.url,
        title: generated.title,
        keyword,
        anchor_text,
        prompt_index: generated.prompt_index,
        source: generated.source,
        verified,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

/// Build a single-keyword campaign request, owned by the guest user when no
/// user id is given.
pub fn one_shot_campaign(
    keyword: &str,
    anchor_text: &str,
    target_url: &str,
    user_id: Option<&str>,
) -> NewCampaign {
    NewCampaign {
        user_id: user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(GUEST_USER_ID)
            .to_string(),
        name: None,
        target_url: target_url.to_string(),
        keywords: vec![keyword.to_string()],
        anchor_texts: vec![anchor_text.to_string()],
        model: None,
    }
}

/// Create a campaign and run it immediately.
pub async fn create_and_run(
    ctx: &PipelineContext,
    new: NewCampaign,
    progress: &dyn ProgressReporter,
) -> Result<(Campaign, RunResult)> {
    progress.phase("Creating campaign");
    let campaign = create_campaign(&ctx.storage, new).await?;
    let result = run_campaign(ctx, &campaign.id, progress).await?;
    let campaign = get_campaign(&ctx.storage, &campaign.id).await?;
    Ok((campaign, result))
}

/// Per-campaign outcome of [`run_drafts`].
#[derive(Debug, Serialize)]
pub struct DraftRun {
    pub campaign_id: CampaignId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run every draft campaign, oldest first, one at a time.
///
/// A failing campaign does not stop the batch.
#[instrument(skip_all)]
pub async fn run_drafts(
    ctx: &PipelineContext,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<Vec<DraftRun>> {
    let mut drafts = ctx
        .storage
        .list_campaigns(None, Some(CampaignStatus::Draft))
        .await?;
    drafts.reverse();
    if let Some(limit) = limit {
        drafts.truncate(limit);
    }

    info!(count = drafts.len(), "running draft campaigns");
    let mut runs = Vec::with_capacity(drafts.len());
    for campaign in drafts {
        let run = match run_campaign(ctx, &campaign.id, progress).await {
            Ok(result) => DraftRun {
                campaign_id: campaign.id,
                result: Some(result),
                error: None,
            },
            Err(e) => DraftRun {
                campaign_id: campaign.id,
                result: None,
                error: Some(e.to_string()),
            },
        };
        runs.push(run);
    }

    let failed = runs.iter().filter(|r| r.error.is_some()).count();
    info!(total = runs.len(), failed, "draft batch finished");
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use backlinkoo_generator::GeneratedPost;
    use backlinkoo_publisher::{PublishOutcome, Publisher};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Generator that echoes the request, or fails while `fail` is set.
    struct FakeGenerator {
        fail: AtomicBool,
    }

    impl FakeGenerator {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ContentGenerator for FakeGenerator {
        async fn generate(&self, req: &GenerateRequest) -> Result<GeneratedPost> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BacklinkooError::Generation("model overloaded".into()));
            }
            Ok(GeneratedPost {
                title: format!("All about {}", req.keyword),
                html: format!(
                    r#"<h1>All about {}</h1><p><a href="{}">{}</a></p>"#,
                    req.keyword, req.target_url, req.anchor_text
                ),
                prompt: "fake".into(),
                prompt_index: 2,
                model: "fake-model".into(),
                tokens_in: 1,
                tokens_out: 1,
                source: GenerationSource::Llm,
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Publisher that records requests and hands out numbered URLs.
    struct RecordingPublisher {
        platform: Platform,
        base: String,
        seen: Mutex<Vec<PublishRequest>>,
    }

    impl RecordingPublisher {
        fn new(platform: Platform) -> Arc<Self> {
            Self::at(platform, &format!("https://{}.example", platform.id()))
        }

        fn at(platform: Platform, base: &str) -> Arc<Self> {
            Arc::new(Self {
                platform,
                base: base.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<PublishRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn publish(&self, req: &PublishRequest) -> Result<PublishOutcome> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(req.clone());
            Ok(PublishOutcome {
                platform: self.platform,
                url: format!("{}/post-{}", self.base, seen.len()),
            })
        }
    }

    struct Harness {
        ctx: PipelineContext,
        generator: Arc<FakeGenerator>,
        telegraph: Arc<RecordingPublisher>,
        writeas: Arc<RecordingPublisher>,
    }

    async fn harness() -> Harness {
        let tmp = std::env::temp_dir().join(format!("bl_pipeline_test_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        let generator = Arc::new(FakeGenerator::new());
        let telegraph = RecordingPublisher::new(Platform::Telegraph);
        let writeas = RecordingPublisher::new(Platform::WriteAs);
        let publishers = PublisherRegistry::new()
            .with(telegraph.clone())
            .with(writeas.clone());
        let ctx = PipelineContext::new(storage, generator.clone(), publishers, Client::new());
        Harness {
            ctx,
            generator,
            telegraph,
            writeas,
        }
    }

    fn new_campaign() -> NewCampaign {
        NewCampaign {
            user_id: "user-1".into(),
            name: None,
            target_url: "https://example.com/shop".into(),
            keywords: vec!["espresso".into(), "latte art".into()],
            anchor_texts: vec!["espresso machines".into()],
            model: Some("gpt-4o-mini".into()),
        }
    }

    #[tokio::test]
    async fn successful_run_records_everything() {
        let h = harness().await;
        let campaign = create_campaign(&h.ctx.storage, new_campaign()).await.unwrap();

        let result = run_campaign(&h.ctx, &campaign.id, &SilentProgress)
            .await
            .expect("run succeeds");
        assert_eq!(result.platform, Platform::Telegraph);
        assert_eq!(result.url, "https://telegraph.example/post-1");
        assert_eq!(result.keyword, "espresso");
        assert_eq!(result.prompt_index, 2);
        assert_eq!(result.verified, None);

        let stored = get_campaign(&h.ctx.storage, &campaign.id).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::Completed);
        assert_eq!(stored.published_url.as_deref(), Some(result.url.as_str()));
        assert!(stored.started_at.is_some());
        assert!(stored.completed_at.is_some());

        let posts = h.ctx.storage.list_published_posts(&campaign.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "All about espresso");
        assert_eq!(posts[0].content_hash.len(), 64);

        let sent = h.telegraph.seen();
        assert_eq!(sent[0].campaign_id.as_ref(), Some(&campaign.id));
        assert!(!sent[0].trial);

        let logs = h.ctx.storage.list_activity(&campaign.id).await.unwrap();
        assert!(logs.iter().any(|l| l.message.starts_with("Published to Telegraph.ph")));
    }

    #[tokio::test]
    async fn unreachable_published_url_is_logged_but_run_completes() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness().await;
        let telegraph = RecordingPublisher::at(Platform::Telegraph, &server.uri());
        let mut ctx = PipelineContext::new(
            h.ctx.storage.clone(),
            h.generator.clone(),
            PublisherRegistry::new().with(telegraph.clone()),
            Client::new(),
        );
        ctx.verify_urls = true;
        let campaign = create_campaign(&ctx.storage, new_campaign()).await.unwrap();

        let result = run_campaign(&ctx, &campaign.id, &SilentProgress)
            .await
            .expect("run still succeeds");
        assert_eq!(result.verified, Some(false));
        assert_eq!(result.url, format!("{}/post-1", server.uri()));

        let stored = get_campaign(&ctx.storage, &campaign.id).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::Completed);
        assert_eq!(stored.published_url.as_deref(), Some(result.url.as_str()));

        let logs = ctx.storage.list_activity(&campaign.id).await.unwrap();
        let warning = logs
            .iter()
            .find(|l| l.level == "warn")
            .expect("warn row logged");
        assert!(warning.message.contains(&result.url));
    }

    #[tokio::test]
    async fn repeated_runs_rotate_platforms_and_keywords() {
        let h = harness().await;
        let campaign = create_campaign(&h.ctx.storage, new_campaign()).await.unwrap();

        let mut platforms = Vec::new();
        let mut keywords = Vec::new();
        for _ in 0..4 {
            let r = run_campaign(&h.ctx, &campaign.id, &SilentProgress).await.unwrap();
            platforms.push(r.platform);
            keywords.push(r.keyword);
        }

        assert_eq!(
            platforms,
            vec![
                Platform::Telegraph,
                Platform::WriteAs,
                Platform::Telegraph,
                Platform::WriteAs
            ]
        );
        assert_eq!(keywords, vec!["espresso", "latte art", "espresso", "latte art"]);
        assert_eq!(h.telegraph.seen().len(), 2);
        assert_eq!(h.writeas.seen().len(), 2);

        let counts = h.ctx.storage.platform_counts(&campaign.id).await.unwrap();
        assert_eq!(counts.get("telegraph"), Some(&2));
        assert_eq!(counts.get("writeas"), Some(&2));
    }

    #[tokio::test]
    async fn generation_failure_marks_failed_and_rerun_recovers() {
        let h = harness().await;
        let campaign = create_campaign(&h.ctx.storage, new_campaign()).await.unwrap();

        h.generator.fail.store(true, Ordering::SeqCst);
        let err = run_campaign(&h.ctx, &campaign.id, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BacklinkooError::Generation(_)));

        let failed = get_campaign(&h.ctx.storage, &campaign.id).await.unwrap();
        assert_eq!(failed.status, CampaignStatus::Failed);
        assert!(failed.error_message.unwrap().contains("model overloaded"));
        assert!(failed.published_url.is_none());
        assert!(h.telegraph.seen().is_empty());

        let logs = h.ctx.storage.list_activity(&campaign.id).await.unwrap();
        assert!(logs.iter().any(|l| l.level == "error"));

        h.generator.fail.store(false, Ordering::SeqCst);
        run_campaign(&h.ctx, &campaign.id, &SilentProgress)
            .await
            .expect("re-run succeeds");
        let recovered = get_campaign(&h.ctx.storage, &campaign.id).await.unwrap();
        assert_eq!(recovered.status, CampaignStatus::Completed);
        assert!(recovered.error_message.is_none());
        assert!(recovered.published_url.is_some());
    }

    #[tokio::test]
    async fn paused_campaign_is_refused() {
        let h = harness().await;
        let campaign = create_campaign(&h.ctx.storage, new_campaign()).await.unwrap();
        crate::campaign::resume(&h.ctx.storage, &campaign.id).await.unwrap();
        crate::campaign::pause(&h.ctx.storage, &campaign.id).await.unwrap();

        let err = run_campaign(&h.ctx, &campaign.id, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BacklinkooError::InvalidTransition {
                from: CampaignStatus::Paused,
                ..
            }
        ));
        assert!(h.telegraph.seen().is_empty());
        let still = get_campaign(&h.ctx.storage, &campaign.id).await.unwrap();
        assert_eq!(still.status, CampaignStatus::Paused);
    }

    #[tokio::test]
    async fn missing_campaign_is_not_found() {
        let h = harness().await;
        let err = run_campaign(&h.ctx, &CampaignId::new(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BacklinkooError::NotFound { .. }));
    }

    #[tokio::test]
    async fn guest_one_shot_is_trial() {
        let h = harness().await;
        let new = one_shot_campaign("cold brew", "cold brew kits", "https://example.com", None);
        assert_eq!(new.user_id, GUEST_USER_ID);

        let (campaign, result) = create_and_run(&h.ctx, new, &SilentProgress).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.published_url.as_deref(), Some(result.url.as_str()));
        assert!(h.telegraph.seen()[0].trial);
    }

    #[tokio::test]
    async fn run_drafts_skips_non_drafts_and_continues_after_failures() {
        let h = harness().await;
        let first = create_campaign(&h.ctx.storage, new_campaign()).await.unwrap();
        let second = create_campaign(&h.ctx.storage, new_campaign()).await.unwrap();
        let active = create_campaign(&h.ctx.storage, new_campaign()).await.unwrap();
        crate::campaign::resume(&h.ctx.storage, &active.id).await.unwrap();

        let runs = run_drafts(&h.ctx, None, &SilentProgress).await.unwrap();
        assert_eq!(runs.len(), 2);
        let ids: Vec<_> = runs.iter().map(|r| r.campaign_id.clone()).collect();
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
        assert!(runs.iter().all(|r| r.result.is_some()));

        let third = create_campaign(&h.ctx.storage, new_campaign()).await.unwrap();
        h.generator.fail.store(true, Ordering::SeqCst);
        let runs = run_drafts(&h.ctx, Some(5), &SilentProgress).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].campaign_id, third.id);
        assert!(runs[0].error.as_deref().unwrap().contains("model overloaded"));
    }
}
