//! Content generation for backlink articles.
//!
//! A [`ContentGenerator`] turns a keyword, anchor text and target URL into a
//! titled HTML article that links the anchor to the target. The production
//! generator calls an OpenAI-compatible chat completions API; the template
//! generator produces fixed articles and can act as a fallback.

mod openai;
mod postprocess;
mod prompts;
mod template;

use std::sync::Arc;

use async_trait::async_trait;
use backlinkoo_shared::{BacklinkooError, OpenAiConfig, Result};
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use openai::OpenAiGenerator;
pub use postprocess::{ensure_link, escape_html, extract_title, link_html, strip_code_fences};
pub use prompts::{PromptSet, SYSTEM_PROMPT};
pub use template::{TEMPLATE_COUNT, TemplateGenerator};

/// User-Agent string for outbound API requests.
pub(crate) const USER_AGENT: &str = concat!("Backlinkoo/", env!("CARGO_PKG_VERSION"));

/// Average reading speed used for reading-time estimates.
const WORDS_PER_MINUTE: usize = 200;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// What to write about and where to link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub keyword: String,
    pub anchor_text: String,
    pub target_url: String,
    /// Optional writing tone ("friendly", "technical", ...).
    #[serde(default)]
    pub tone: Option<String>,
    /// Target length; the generator's configured default applies when unset.
    #[serde(default)]
    pub word_count: Option<u32>,
    /// Model override for this request.
    #[serde(default)]
    pub model: Option<String>,
    /// Pin a 1-based prompt/template variant instead of picking one at random.
    #[serde(default)]
    pub prompt_index: Option<u32>,
}

impl GenerateRequest {
    pub fn new(
        keyword: impl Into<String>,
        anchor_text: impl Into<String>,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            anchor_text: anchor_text.into(),
            target_url: target_url.into(),
            tone: None,
            word_count: None,
            model: None,
            prompt_index: None,
        }
    }
}

/// Where a generated article came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    Llm,
    Template,
}

/// A generated article ready to publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub title: String,
    pub html: String,
    /// The rendered prompt (or template label).
    pub prompt: String,
    /// 1-based variant index.
    pub prompt_index: u32,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub source: GenerationSource,
}

// ---------------------------------------------------------------------------
// Generator trait
// ---------------------------------------------------------------------------

/// Produces an article for a [`GenerateRequest`].
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate one article. Failures are returned as-is; no retry.
    async fn generate(&self, req: &GenerateRequest) -> Result<GeneratedPost>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: ContentGenerator + ?Sized> ContentGenerator for Arc<T> {
    async fn generate(&self, req: &GenerateRequest) -> Result<GeneratedPost> {
        (**self).generate(req).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Tries `primary` and falls back to `fallback` if it fails.
pub struct FallbackGenerator<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackGenerator<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, F> ContentGenerator for FallbackGenerator<P, F>
where
    P: ContentGenerator,
    F: ContentGenerator,
{
    async fn generate(&self, req: &GenerateRequest) -> Result<GeneratedPost> {
        match self.primary.generate(req).await {
            Ok(post) => Ok(post),
            Err(e) => {
                warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "generation failed, using fallback"
                );
                self.fallback.generate(req).await
            }
        }
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}

/// Build the generator described by `config`.
///
/// With an API key the OpenAI generator is used, wrapped in a template
/// fallback when `template_fallback` is on. Without a key the template
/// generator is used if fallback is allowed; otherwise this is a config error.
pub fn generator_from_config(config: &OpenAiConfig) -> Result<Arc<dyn ContentGenerator>> {
    match config.api_key() {
        Some(key) => {
            let openai = OpenAiGenerator::new(config, key)?;
            if config.template_fallback {
                Ok(Arc::new(FallbackGenerator::new(
                    openai,
                    TemplateGenerator::new(),
                )))
            } else {
                Ok(Arc::new(openai))
            }
        }
        None if config.template_fallback => {
            warn!(
                env = %config.api_key_env,
                "API key not set, articles will be generated from templates"
            );
            Ok(Arc::new(TemplateGenerator::new()))
        }
        None => Err(BacklinkooError::config(format!(
            "OpenAI API key not found. Set the {} environment variable.",
            config.api_key_env
        ))),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Count words in the visible text of an HTML fragment.
pub fn word_count(html: &str) -> usize {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(|t| t.split_whitespace().count())
        .sum()
}

/// Estimated reading time in minutes (at least one).
pub fn reading_time_minutes(words: usize) -> u32 {
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

/// Turn a title into a URL slug.
///
/// Lowercases, drops everything except ASCII letters, digits, `-`, `_` and
/// spaces, turns spaces into dashes and collapses repeated dashes.
pub fn slugify(text: &str) -> String {
    let filtered: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | ' '))
        .map(|c| if c == ' ' { '-' } else { c })
        .collect();

    let mut slug = String::with_capacity(filtered.len());
    for c in filtered.chars() {
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }

    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() { "post".into() } else { slug }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl ContentGenerator for Failing {
        async fn generate(&self, _req: &GenerateRequest) -> Result<GeneratedPost> {
            Err(BacklinkooError::Generation("boom".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn req() -> GenerateRequest {
        GenerateRequest::new("seo", "seo tools", "https://example.com")
    }

    #[tokio::test]
    async fn fallback_used_on_primary_error() {
        let generator = FallbackGenerator::new(Failing, TemplateGenerator::new());
        let post = generator.generate(&req()).await.expect("fallback succeeds");
        assert_eq!(post.source, GenerationSource::Template);
        assert_eq!(generator.name(), "failing");
    }

    #[tokio::test]
    async fn primary_error_surfaces_without_fallback() {
        let err = Failing.generate(&req()).await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[test]
    fn from_config_without_key() {
        let mut config = OpenAiConfig {
            api_key_env: "BL_TEST_NO_SUCH_OPENAI_KEY".into(),
            ..OpenAiConfig::default()
        };
        let generator = generator_from_config(&config).expect("template generator");
        assert_eq!(generator.name(), "template");

        config.template_fallback = false;
        assert!(generator_from_config(&config).is_err());
    }

    #[test]
    fn counts_visible_words() {
        assert_eq!(word_count("<h1>Hello world</h1><p>one <b>two</b> three</p>"), 5);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn reading_time_rounds_up() {
        assert_eq!(reading_time_minutes(0), 1);
        assert_eq!(reading_time_minutes(200), 1);
        assert_eq!(reading_time_minutes(201), 2);
        assert_eq!(reading_time_minutes(1000), 5);
    }

    #[test]
    fn slugify_rules() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  SEO -- Tips & Tricks 2024 "), "seo-tips-tricks-2024");
        assert_eq!(slugify("snake_case kept"), "snake_case-kept");
        assert_eq!(slugify("!!!"), "post");
    }
}
