//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use backlinkoo_shared::{BacklinkooError, OpenAiConfig, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::postprocess::{ensure_link, extract_title, strip_code_fences};
use crate::prompts::{PromptSet, SYSTEM_PROMPT};
use crate::{ContentGenerator, GenerateRequest, GeneratedPost, GenerationSource, USER_AGENT};

/// Longest slice of an error body kept in error messages.
const ERROR_EXCERPT_LEN: usize = 300;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Generates articles through a chat completions endpoint.
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    word_count: u32,
    prompts: PromptSet,
}

impl OpenAiGenerator {
    pub fn new(config: &OpenAiConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BacklinkooError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            word_count: config.word_count,
            prompts: PromptSet::new(config.prompts.clone()),
        })
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    #[instrument(skip_all, fields(keyword = %req.keyword, model = tracing::field::Empty))]
    async fn generate(&self, req: &GenerateRequest) -> Result<GeneratedPost> {
        let model = req.model.as_deref().unwrap_or(&self.model);
        tracing::Span::current().record("model", model);

        let index = req.prompt_index.unwrap_or_else(|| self.prompts.pick());
        let prompt = self.prompts.render(index, req);
        let user_message = self.prompts.user_message(index, req, self.word_count);

        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_message,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, index, "requesting completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BacklinkooError::Generation(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let excerpt: String = text.chars().take(ERROR_EXCERPT_LEN).collect();
            return Err(BacklinkooError::Generation(format!(
                "API returned HTTP {status}: {excerpt}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BacklinkooError::Generation(format!("invalid API response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| strip_code_fences(&c))
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BacklinkooError::Generation("API returned no content".into()))?;

        let html = ensure_link(&content, &req.anchor_text, &req.target_url);
        let title =
            extract_title(&html).unwrap_or_else(|| format!("{}: Professional Guide", req.keyword));
        let (tokens_in, tokens_out) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        debug!(tokens_in, tokens_out, %title, "completion received");

        Ok(GeneratedPost {
            title,
            html,
            prompt,
            prompt_index: index,
            model: parsed.model.unwrap_or_else(|| model.to_string()),
            tokens_in,
            tokens_out,
            source: GenerationSource::Llm,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> OpenAiConfig {
        OpenAiConfig {
            base_url: base.to_string(),
            ..OpenAiConfig::default()
        }
    }

    fn req() -> GenerateRequest {
        let mut r = GenerateRequest::new("trail running", "trail shoes", "https://example.com/shoes");
        r.prompt_index = Some(1);
        r
    }

    #[tokio::test]
    async fn generates_and_post_processes() {
        let server = MockServer::start().await;
        let content = "```html\n<h1>Trail Running 101</h1><p>Pick good trail shoes early.</p>\n```";

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 2000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-3.5-turbo-0125",
                "choices": [{ "message": { "role": "assistant", "content": content } }],
                "usage": { "prompt_tokens": 42, "completion_tokens": 350 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&config(&server.uri()), "sk-test").unwrap();
        let post = generator.generate(&req()).await.expect("generate");

        assert_eq!(post.title, "Trail Running 101");
        assert!(!post.html.contains("```"));
        assert!(post.html.contains(r#"<a href="https://example.com/shoes""#));
        assert_eq!(post.prompt_index, 1);
        assert!(post.prompt.starts_with("Generate a blog post on trail running"));
        assert_eq!(post.tokens_in, 42);
        assert_eq!(post.tokens_out, 350);
        assert_eq!(post.model, "gpt-3.5-turbo-0125");
        assert_eq!(post.source, GenerationSource::Llm);
    }

    #[tokio::test]
    async fn configured_prompts_replace_the_built_ins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "<h1>T</h1><p>trail shoes</p>" } }]
            })))
            .mount(&server)
            .await;

        let config = OpenAiConfig {
            prompts: vec!["Review {keyword} and link {anchor} to {url}".into()],
            ..config(&server.uri())
        };
        let generator = OpenAiGenerator::new(&config, "k").unwrap();
        let post = generator.generate(&req()).await.unwrap();
        assert!(post.prompt.starts_with(
            "Review trail running and link trail shoes to https://example.com/shoes"
        ));
    }

    #[tokio::test]
    async fn missing_h1_uses_default_title() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "<p>Body only.</p>" } }]
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&config(&server.uri()), "k").unwrap();
        let post = generator.generate(&req()).await.unwrap();
        assert_eq!(post.title, "trail running: Professional Guide");
        assert!(post.html.contains("For more information"));
    }

    #[tokio::test]
    async fn campaign_model_override_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "model": "gpt-4o-mini" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "<h1>T</h1>" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&config(&server.uri()), "k").unwrap();
        let mut r = req();
        r.model = Some("gpt-4o-mini".into());
        let post = generator.generate(&r).await.unwrap();
        assert_eq!(post.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn http_error_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_string(r#"{"error":"rate limited"}"#),
            )
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&config(&server.uri()), "k").unwrap();
        let err = generator.generate(&req()).await.unwrap_err();
        assert!(matches!(err, BacklinkooError::Generation(_)));
        let msg = err.to_string();
        assert!(msg.contains("429"), "{msg}");
        assert!(msg.contains("rate limited"), "{msg}");
    }

    #[tokio::test]
    async fn empty_content_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&config(&server.uri()), "k").unwrap();
        let err = generator.generate(&req()).await.unwrap_err();
        assert!(err.to_string().contains("no content"));
    }
}
