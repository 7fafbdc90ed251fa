//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use backlinkoo_core::campaign;
use backlinkoo_core::pipeline::{
    self, PipelineContext, ProgressReporter, RunResult, one_shot_campaign,
};
use backlinkoo_shared::{
    AppConfig, Campaign, CampaignId, CampaignStatus, NewCampaign, config_file_path, init_config,
    load_config, load_config_from, validate_api_key,
};
use backlinkoo_storage::Storage;
use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Backlinkoo: generate backlink articles and publish them.
#[derive(Parser)]
#[command(
    name = "backlinkoo",
    version,
    about = "Create backlink campaigns, generate articles, and publish them to Telegraph, Write.as or the blog.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.backlinkoo/backlinkoo.toml).
    #[arg(long, global = true, env = "BACKLINKOO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the database path from the config file.
    #[arg(long, global = true, env = "BACKLINKOO_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Manage campaigns.
    Campaign {
        #[command(subcommand)]
        action: CampaignAction,
    },

    /// Create a single-keyword campaign and publish it right away.
    Process {
        #[arg(long)]
        keyword: String,

        /// Anchor text for the backlink.
        #[arg(long)]
        anchor: String,

        /// Target URL the article links to.
        #[arg(long)]
        url: String,

        /// Owning user (defaults to the guest user; guest blog posts expire).
        #[arg(long)]
        user: Option<String>,
    },

    /// Inspect and maintain blog posts.
    Blog {
        #[command(subcommand)]
        action: BlogAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Campaign subcommands.
#[derive(Subcommand)]
pub(crate) enum CampaignAction {
    /// Create a draft campaign.
    Create {
        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Target URL the articles link to.
        #[arg(long)]
        url: String,

        /// Keyword (repeatable).
        #[arg(long = "keyword", required = true)]
        keywords: Vec<String>,

        /// Anchor text (repeatable).
        #[arg(long = "anchor", required = true)]
        anchors: Vec<String>,

        /// Display name (defaults to the first keyword).
        #[arg(long)]
        name: Option<String>,

        /// Model override for this campaign.
        #[arg(long)]
        model: Option<String>,

        /// Run the campaign immediately after creating it.
        #[arg(long)]
        run: bool,
    },

    /// Generate and publish one article for a campaign, or for every draft.
    Run {
        /// Campaign id.
        #[arg(required_unless_present = "drafts", conflicts_with = "drafts")]
        id: Option<String>,

        /// Run all draft campaigns.
        #[arg(long)]
        drafts: bool,

        /// Maximum number of drafts to run.
        #[arg(long, requires = "drafts")]
        limit: Option<usize>,
    },

    /// List campaigns.
    List {
        #[arg(long)]
        user: Option<String>,

        /// Filter by status (draft, active, paused, completed, failed).
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one campaign.
    Show { id: String },

    /// List a campaign's published posts.
    Posts { id: String },

    /// Show a campaign's activity log.
    Logs { id: String },

    /// Pause a campaign.
    Pause { id: String },

    /// Resume a paused or finished campaign.
    Resume { id: String },

    /// Mark a campaign completed.
    Complete { id: String },

    /// Delete a campaign and its posts.
    Delete { id: String },
}

/// Blog subcommands.
#[derive(Subcommand)]
pub(crate) enum BlogAction {
    /// List recent blog posts.
    List {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Show one blog post.
    Show { slug: String },
    /// Delete expired trial posts.
    Cleanup,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "backlinkoo=info",
        1 => "backlinkoo=debug",
        _ => "backlinkoo=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Command::Campaign { action } => run_campaign_action(&config, action).await,
        Command::Process {
            keyword,
            anchor,
            url,
            user,
        } => cmd_process(&config, &keyword, &anchor, &url, user.as_deref()).await,
        Command::Blog { action } => match action {
            BlogAction::List { limit } => cmd_blog_list(&config, limit).await,
            BlogAction::Show { slug } => cmd_blog_show(&config, &slug).await,
            BlogAction::Cleanup => cmd_blog_cleanup(&config).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config, cli.config.as_deref()).await,
        },
    }
}

async fn run_campaign_action(config: &AppConfig, action: CampaignAction) -> Result<()> {
    match action {
        CampaignAction::Create {
            user,
            url,
            keywords,
            anchors,
            name,
            model,
            run,
        } => {
            let new = NewCampaign {
                user_id: user,
                name,
                target_url: url,
                keywords,
                anchor_texts: anchors,
                model,
            };
            cmd_campaign_create(config, new, run).await
        }
        CampaignAction::Run { id, drafts, limit } => match (id, drafts) {
            (_, true) => cmd_run_drafts(config, limit).await,
            (Some(id), false) => cmd_campaign_run(config, &id).await,
            (None, false) => Err(eyre!("pass a campaign id or --drafts")),
        },
        CampaignAction::List { user, status } => {
            cmd_campaign_list(config, user.as_deref(), status.as_deref()).await
        }
        CampaignAction::Show { id } => cmd_campaign_show(config, &id).await,
        CampaignAction::Posts { id } => cmd_campaign_posts(config, &id).await,
        CampaignAction::Logs { id } => cmd_campaign_logs(config, &id).await,
        CampaignAction::Pause { id } => cmd_transition(config, &id, CampaignStatus::Paused).await,
        CampaignAction::Resume { id } => cmd_transition(config, &id, CampaignStatus::Active).await,
        CampaignAction::Complete { id } => {
            cmd_transition(config, &id, CampaignStatus::Completed).await
        }
        CampaignAction::Delete { id } => cmd_campaign_delete(config, &id).await,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(db) = &cli.db {
        config.storage.db_path = db.to_string_lossy().to_string();
    }
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = config.storage.resolved_db_path();
    info!(path = %path.display(), "opening database");
    Ok(Arc::new(Storage::open(&path).await?))
}

fn parse_id(id: &str) -> Result<CampaignId> {
    id.parse()
        .map_err(|e| eyre!("invalid campaign id '{id}': {e}"))
}

fn print_campaign(c: &Campaign) {
    println!();
    println!("  ID:         {}", c.id);
    println!("  Name:       {}", c.name);
    println!("  User:       {}", c.user_id);
    println!("  Status:     {}", c.status);
    println!("  Target:     {}", c.target_url);
    println!("  Keywords:   {}", c.keywords.join(", "));
    println!("  Anchors:    {}", c.anchor_texts.join(", "));
    if let Some(model) = &c.model {
        println!("  Model:      {model}");
    }
    if let Some(url) = &c.published_url {
        println!("  Published:  {url}");
    }
    if let Some(err) = &c.error_message {
        println!("  Error:      {err}");
    }
    println!("  Created:    {}", c.created_at.to_rfc3339());
    if let Some(t) = c.started_at {
        println!("  Started:    {}", t.to_rfc3339());
    }
    if let Some(t) = c.completed_at {
        println!("  Finished:   {}", t.to_rfc3339());
    }
    println!();
}

fn print_run(result: &RunResult) {
    println!();
    println!("  Published successfully!");
    println!("  Campaign: {}", result.campaign_id);
    println!("  Platform: {}", result.platform.display_name());
    println!("  URL:      {}", result.url);
    println!("  Title:    {}", result.title);
    println!("  Keyword:  {} -> {}", result.keyword, result.anchor_text);
    if let Some(verified) = result.verified {
        println!("  Verified: {}", if verified { "yes" } else { "no" });
    }
    println!("  Time:     {:.1}s", result.elapsed_ms as f64 / 1000.0);
    println!();
}

// ---------------------------------------------------------------------------
// Campaign commands
// ---------------------------------------------------------------------------

async fn cmd_campaign_create(config: &AppConfig, new: NewCampaign, run: bool) -> Result<()> {
    if run {
        let ctx = PipelineContext::from_config(config).await?;
        let reporter = CliProgress::new();
        let (campaign, result) = pipeline::create_and_run(&ctx, new, &reporter).await?;
        reporter.finish();
        print_campaign(&campaign);
        print_run(&result);
        return Ok(());
    }

    let storage = open_storage(config).await?;
    let campaign = campaign::create_campaign(&storage, new).await?;
    println!("Created campaign {} ({})", campaign.id, campaign.name);
    Ok(())
}

async fn cmd_campaign_run(config: &AppConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let ctx = PipelineContext::from_config(config).await?;
    let reporter = CliProgress::new();
    let result = pipeline::run_campaign(&ctx, &id, &reporter).await;
    reporter.finish();
    print_run(&result?);
    Ok(())
}

async fn cmd_run_drafts(config: &AppConfig, limit: Option<usize>) -> Result<()> {
    let ctx = PipelineContext::from_config(config).await?;
    let reporter = CliProgress::new();
    let runs = pipeline::run_drafts(&ctx, limit, &reporter).await?;
    reporter.finish();

    if runs.is_empty() {
        println!("No draft campaigns to run.");
        return Ok(());
    }
    for run in &runs {
        match (&run.result, &run.error) {
            (Some(result), _) => println!("  ok    {}  {}", run.campaign_id, result.url),
            (None, Some(err)) => println!("  FAIL  {}  {err}", run.campaign_id),
            (None, None) => {}
        }
    }
    let failed = runs.iter().filter(|r| r.error.is_some()).count();
    println!();
    println!("  {} run(s), {failed} failed", runs.len());
    Ok(())
}

async fn cmd_campaign_list(config: &AppConfig, user: Option<&str>, status: Option<&str>) -> Result<()> {
    let status = status
        .map(|s| s.parse::<CampaignStatus>())
        .transpose()?;
    let storage = open_storage(config).await?;
    let campaigns = storage.list_campaigns(user, status).await?;

    if campaigns.is_empty() {
        println!("No campaigns found.");
        return Ok(());
    }
    for c in &campaigns {
        println!(
            "{}  {:<10} {:<30} {}",
            c.id,
            c.status,
            c.name,
            c.published_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_campaign_show(config: &AppConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let storage = open_storage(config).await?;
    let campaign = campaign::get_campaign(&storage, &id).await?;
    print_campaign(&campaign);
    Ok(())
}

async fn cmd_campaign_posts(config: &AppConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let storage = open_storage(config).await?;
    campaign::get_campaign(&storage, &id).await?;
    let posts = storage.list_published_posts(&id).await?;

    if posts.is_empty() {
        println!("No posts published yet.");
        return Ok(());
    }
    for p in &posts {
        println!(
            "{}  {:<10} {}  ({})",
            p.published_at.format("%Y-%m-%d %H:%M"),
            p.platform.id(),
            p.url,
            p.keyword
        );
    }
    Ok(())
}

async fn cmd_campaign_logs(config: &AppConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let storage = open_storage(config).await?;
    campaign::get_campaign(&storage, &id).await?;
    for entry in storage.list_activity(&id).await? {
        println!(
            "{}  {:<5} {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.level,
            entry.message
        );
    }
    Ok(())
}

async fn cmd_transition(config: &AppConfig, id: &str, to: CampaignStatus) -> Result<()> {
    let id = parse_id(id)?;
    let storage = open_storage(config).await?;
    let campaign = campaign::transition(&storage, &id, to).await?;
    println!("Campaign {} is now {}", campaign.id, campaign.status);
    Ok(())
}

async fn cmd_campaign_delete(config: &AppConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let storage = open_storage(config).await?;
    campaign::delete_campaign(&storage, &id).await?;
    println!("Deleted campaign {id}");
    Ok(())
}

async fn cmd_process(
    config: &AppConfig,
    keyword: &str,
    anchor: &str,
    url: &str,
    user: Option<&str>,
) -> Result<()> {
    let ctx = PipelineContext::from_config(config).await?;
    let reporter = CliProgress::new();
    let new = one_shot_campaign(keyword, anchor, url, user);
    let (_, result) = pipeline::create_and_run(&ctx, new, &reporter).await?;
    reporter.finish();
    print_run(&result);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, result: &RunResult) {
        self.spinner
            .println(format!("  published {} -> {}", result.campaign_id, result.url));
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

// ---------------------------------------------------------------------------
// Blog commands
// ---------------------------------------------------------------------------

async fn cmd_blog_list(config: &AppConfig, limit: u32) -> Result<()> {
    let storage = open_storage(config).await?;
    let posts = storage.list_blog_posts(limit).await?;
    if posts.is_empty() {
        println!("No blog posts.");
        return Ok(());
    }
    for p in &posts {
        let trial = match p.expires_at {
            Some(t) if p.is_trial => format!("trial, expires {}", t.format("%Y-%m-%d %H:%M")),
            _ => "permanent".to_string(),
        };
        println!("{:<40} {:>5} words  {}  ({trial})", p.slug, p.word_count, p.published_url);
    }
    Ok(())
}

async fn cmd_blog_show(config: &AppConfig, slug: &str) -> Result<()> {
    let storage = open_storage(config).await?;
    let post = storage
        .get_blog_post_by_slug(slug)
        .await?
        .ok_or_else(|| eyre!("blog post '{slug}' not found"))?;

    println!();
    println!("  Title:    {}", post.title);
    println!("  URL:      {}", post.published_url);
    println!("  Keyword:  {}", post.keyword);
    println!("  Links to: {} ({})", post.target_url, post.anchor_text);
    println!("  Length:   {} words, {} min read", post.word_count, post.reading_time_minutes);
    if let Some(c) = &post.campaign_id {
        println!("  Campaign: {c}");
    }
    println!();
    println!("{}", post.content);
    Ok(())
}

async fn cmd_blog_cleanup(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let removed = storage.cleanup_expired_posts(Utc::now()).await?;
    println!("Removed {removed} expired trial post(s).");
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig, explicit_path: Option<&Path>) -> Result<()> {
    let path = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    let toml_str = toml::to_string_pretty(config)?;
    println!("# {}", path.display());
    println!("{toml_str}");

    if let Err(e) = validate_api_key(config) {
        let fallback = if config.openai.template_fallback {
            "articles will be generated from templates"
        } else {
            "runs will fail until it is set"
        };
        eprintln!("warning: {e} ({fallback})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_campaign_create_with_repeated_flags() {
        let cli = Cli::try_parse_from([
            "backlinkoo",
            "campaign",
            "create",
            "--user",
            "u1",
            "--url",
            "https://example.com",
            "--keyword",
            "a",
            "--keyword",
            "b",
            "--anchor",
            "x",
        ])
        .expect("parse");
        match cli.command {
            Command::Campaign {
                action: CampaignAction::Create { keywords, anchors, run, .. },
            } => {
                assert_eq!(keywords, vec!["a", "b"]);
                assert_eq!(anchors, vec!["x"]);
                assert!(!run);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[tokio::test]
    async fn config_show_tolerates_a_missing_api_key() {
        let mut config = AppConfig::default();
        config.openai.api_key_env = "BACKLINKOO_TEST_UNSET_KEY".into();
        assert!(validate_api_key(&config).is_err());

        let path = Path::new("/tmp/backlinkoo-test/config.toml");
        cmd_config_show(&config, Some(path)).await.expect("show succeeds");
    }

    #[test]
    fn run_requires_id_or_drafts() {
        assert!(Cli::try_parse_from(["backlinkoo", "campaign", "run"]).is_err());
        assert!(Cli::try_parse_from(["backlinkoo", "campaign", "run", "--drafts"]).is_ok());
        assert!(
            Cli::try_parse_from(["backlinkoo", "campaign", "run", "--drafts", "--limit", "3"])
                .is_ok()
        );
        assert!(Cli::try_parse_from(["backlinkoo", "-vv", "campaign", "run", "some-id"]).is_ok());
    }
}
