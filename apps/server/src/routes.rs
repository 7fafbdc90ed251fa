//! Route table and request handlers.

use actix_web::middleware::DefaultHeaders;
use actix_web::web::{self, Data, Json, JsonConfig, Path, PathConfig, Query, QueryConfig};
use actix_web::{HttpResponse, ResponseError, guard};
use backlinkoo_core::campaign;
use backlinkoo_core::pipeline::{self, PipelineContext, RunResult, SilentProgress, one_shot_campaign};
use backlinkoo_shared::{BacklinkooError, Campaign, CampaignId, CampaignStatus, NewCampaign};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::ApiError;

const DEFAULT_BLOG_LIMIT: u32 = 20;
const MAX_BLOG_LIMIT: u32 = 100;

type ApiResult = Result<HttpResponse, ApiError>;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Response body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::ok(data))
}

fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope::ok(data))
}

// ---------------------------------------------------------------------------
// App wiring
// ---------------------------------------------------------------------------

/// Permissive CORS headers added to every response.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add((
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, Accept, X-Requested-With, apikey",
        ))
        .add(("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS"))
}

pub fn init(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        JsonConfig::default().error_handler(|err, _req| ApiError::InvalidJson(err).into()),
    )
    .app_data(PathConfig::default().error_handler(|err, _req| ApiError::InvalidPath(err).into()))
    .app_data(
        QueryConfig::default().error_handler(|err, _req| ApiError::InvalidQuery(err).into()),
    )
    // Preflight for any path.
    .service(
        web::resource("/{tail:.*}")
            .guard(guard::Options())
            .to(|| async { HttpResponse::Ok().finish() }),
    )
    .route("/health", web::get().to(health))
    .service(
        web::scope("/api")
            .service(
                web::scope("/campaigns")
                    .route("", web::post().to(create_campaign))
                    .route("", web::get().to(list_campaigns))
                    .route("/{id}", web::get().to(get_campaign))
                    .route("/{id}", web::delete().to(delete_campaign))
                    .route("/{id}/run", web::post().to(run_campaign))
                    .route("/{id}/status", web::post().to(set_campaign_status))
                    .route("/{id}/posts", web::get().to(list_campaign_posts))
                    .route("/{id}/logs", web::get().to(list_campaign_logs)),
            )
            .route("/process", web::post().to(process))
            .service(
                web::scope("/blog")
                    .route("", web::get().to(list_blog_posts))
                    .route("/cleanup", web::post().to(cleanup_blog_posts))
                    .route("/{slug}", web::get().to(get_blog_post)),
            ),
    )
    .default_service(web::to(|| async { ApiError::PathNotFound.error_response() }));
}

fn parse_id(raw: &str) -> Result<CampaignId, ApiError> {
    raw.parse()
        .map_err(|_| BacklinkooError::validation(format!("invalid campaign id '{raw}'")).into())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> HttpResponse {
    ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct CreateCampaignBody {
    #[serde(flatten)]
    campaign: NewCampaign,
    /// Run the campaign right after creating it.
    #[serde(default)]
    run: bool,
}

#[derive(Debug, Serialize)]
struct CampaignCreated {
    campaign: Campaign,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<RunResult>,
}

#[tracing::instrument(skip_all)]
async fn create_campaign(ctx: Data<PipelineContext>, body: Json<CreateCampaignBody>) -> ApiResult {
    let body = body.into_inner();
    let created_campaign = campaign::create_campaign(&ctx.storage, body.campaign).await?;

    if !body.run {
        return Ok(created(CampaignCreated {
            campaign: created_campaign,
            run: None,
        }));
    }

    let result = pipeline::run_campaign(&ctx, &created_campaign.id, &SilentProgress)
        .await
        .map_err(|source| ApiError::RunAfterCreate {
            campaign_id: created_campaign.id.clone(),
            source,
        })?;
    let campaign = campaign::get_campaign(&ctx.storage, &created_campaign.id).await?;
    Ok(created(CampaignCreated {
        campaign,
        run: Some(result),
    }))
}

#[derive(Debug, Deserialize)]
struct ListCampaignsQuery {
    #[serde(default, alias = "userId")]
    user_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

async fn list_campaigns(ctx: Data<PipelineContext>, query: Query<ListCampaignsQuery>) -> ApiResult {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<CampaignStatus>)
        .transpose()?;
    let campaigns = ctx
        .storage
        .list_campaigns(query.user_id.as_deref(), status)
        .await?;
    Ok(ok(campaigns))
}

async fn get_campaign(ctx: Data<PipelineContext>, id: Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    Ok(ok(campaign::get_campaign(&ctx.storage, &id).await?))
}

async fn delete_campaign(ctx: Data<PipelineContext>, id: Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    campaign::delete_campaign(&ctx.storage, &id).await?;
    Ok(ok(json!({ "deleted": id })))
}

#[tracing::instrument(skip_all, fields(campaign_id = %id))]
async fn run_campaign(ctx: Data<PipelineContext>, id: Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let result = pipeline::run_campaign(&ctx, &id, &SilentProgress).await?;
    Ok(ok(result))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: CampaignStatus,
}

async fn set_campaign_status(
    ctx: Data<PipelineContext>,
    id: Path<String>,
    body: Json<StatusBody>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let campaign = campaign::transition(&ctx.storage, &id, body.status).await?;
    Ok(ok(campaign))
}

async fn list_campaign_posts(ctx: Data<PipelineContext>, id: Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    campaign::get_campaign(&ctx.storage, &id).await?;
    Ok(ok(ctx.storage.list_published_posts(&id).await?))
}

async fn list_campaign_logs(ctx: Data<PipelineContext>, id: Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    campaign::get_campaign(&ctx.storage, &id).await?;
    Ok(ok(ctx.storage.list_activity(&id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessBody {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    anchor_text: String,
    #[serde(default)]
    target_url: String,
    #[serde(default)]
    user_id: Option<String>,
    /// Run an existing campaign instead of creating a new one.
    #[serde(default)]
    campaign_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessResponse {
    campaign_id: CampaignId,
    published_urls: Vec<String>,
    total_posts: usize,
    keyword: String,
    anchor_text: String,
    target_url: String,
    platform: String,
    prompt_used: u32,
    completed_at: DateTime<Utc>,
}

#[tracing::instrument(skip_all)]
async fn process(ctx: Data<PipelineContext>, body: Json<ProcessBody>) -> ApiResult {
    let body = body.into_inner();

    let (target_url, result) = match body.campaign_id.as_deref() {
        Some(raw) => {
            let id = parse_id(raw)?;
            let result = pipeline::run_campaign(&ctx, &id, &SilentProgress).await?;
            let campaign = campaign::get_campaign(&ctx.storage, &id).await?;
            (campaign.target_url, result)
        }
        None => {
            if body.keyword.trim().is_empty()
                || body.anchor_text.trim().is_empty()
                || body.target_url.trim().is_empty()
            {
                return Err(BacklinkooError::validation(
                    "Missing required parameters: keyword, anchorText, targetUrl",
                )
                .into());
            }
            let new = one_shot_campaign(
                &body.keyword,
                &body.anchor_text,
                &body.target_url,
                body.user_id.as_deref(),
            );
            let (campaign, result) = pipeline::create_and_run(&ctx, new, &SilentProgress).await?;
            (campaign.target_url, result)
        }
    };

    info!(campaign_id = %result.campaign_id, url = %result.url, "processed campaign");
    Ok(ok(ProcessResponse {
        campaign_id: result.campaign_id,
        published_urls: vec![result.url],
        total_posts: 1,
        keyword: result.keyword,
        anchor_text: result.anchor_text,
        target_url,
        platform: result.platform.display_name().to_string(),
        prompt_used: result.prompt_index,
        completed_at: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
struct BlogListQuery {
    #[serde(default)]
    limit: Option<u32>,
}

async fn list_blog_posts(ctx: Data<PipelineContext>, query: Query<BlogListQuery>) -> ApiResult {
    let limit = query.limit.unwrap_or(DEFAULT_BLOG_LIMIT).clamp(1, MAX_BLOG_LIMIT);
    Ok(ok(ctx.storage.list_blog_posts(limit).await?))
}

async fn get_blog_post(ctx: Data<PipelineContext>, slug: Path<String>) -> ApiResult {
    let post = ctx
        .storage
        .get_blog_post_by_slug(&slug)
        .await?
        .ok_or_else(|| BacklinkooError::not_found("blog post", slug.as_str()))?;
    Ok(ok(post))
}

async fn cleanup_blog_posts(ctx: Data<PipelineContext>) -> ApiResult {
    let removed = ctx.storage.cleanup_expired_posts(Utc::now()).await?;
    info!(removed, "expired trial posts removed");
    Ok(ok(json!({ "removed": removed })))
}
