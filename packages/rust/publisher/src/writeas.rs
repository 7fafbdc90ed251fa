//! Write.as anonymous post publisher.

use async_trait::async_trait;
use backlinkoo_shared::{BacklinkooError, Platform, Result, WriteAsConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::convert::html_to_markdown;
use crate::{PublishOutcome, PublishRequest, Publisher};

#[derive(Debug, Serialize)]
struct NewPost<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    code: u16,
    #[serde(default)]
    data: Option<PostData>,
    #[serde(default)]
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
}

/// Publishes articles as anonymous Write.as posts (Markdown body).
pub struct WriteAsPublisher {
    client: Client,
    api_base: String,
    public_base: String,
}

impl WriteAsPublisher {
    pub fn new(config: &WriteAsConfig, client: Client) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            public_base: config.public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Publisher for WriteAsPublisher {
    fn platform(&self) -> Platform {
        Platform::WriteAs
    }

    #[instrument(skip_all, fields(platform = "writeas", title = %req.title))]
    async fn publish(&self, req: &PublishRequest) -> Result<PublishOutcome> {
        let body = html_to_markdown(&req.html)?;
        let url = format!("{}/api/posts", self.api_base);

        let response = self
            .client
            .post(&url)
            .json(&NewPost {
                title: req.title.trim(),
                body: &body,
            })
            .send()
            .await
            .map_err(|e| publish_err(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| publish_err(format!("failed to read response: {e}")))?;

        let parsed: Option<PostResponse> = serde_json::from_str(&text).ok();
        let id = match parsed {
            Some(PostResponse {
                code: 201,
                data: Some(data),
                ..
            }) => data.id,
            Some(PostResponse { code, error_msg, .. }) => {
                return Err(publish_err(format!(
                    "API returned code {code}: {}",
                    error_msg.unwrap_or_else(|| "no error message".into())
                )));
            }
            None => {
                let excerpt: String = text.chars().take(200).collect();
                return Err(publish_err(format!("HTTP {status}: {excerpt}")));
            }
        };

        let public_url = format!("{}/{id}", self.public_base);
        info!(url = %public_url, "published to write.as");
        Ok(PublishOutcome {
            platform: Platform::WriteAs,
            url: public_url,
        })
    }
}

fn publish_err(msg: impl Into<String>) -> BacklinkooError {
    BacklinkooError::publish(Platform::WriteAs.id(), msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(base: &str) -> WriteAsPublisher {
        let config = WriteAsConfig {
            api_base: base.to_string(),
            public_base: "https://write.as".into(),
        };
        WriteAsPublisher::new(&config, Client::new())
    }

    #[tokio::test]
    async fn posts_markdown_and_builds_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts"))
            .and(body_partial_json(serde_json::json!({ "title": "Tea Basics" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "code": 201,
                "data": { "id": "abc123xyz", "slug": null, "token": "t" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = PublishRequest::new(
            "Tea Basics",
            r#"<h1>Tea Basics</h1><p>Try <a href="https://example.com/tea">green tea</a>.</p>"#,
        );
        let outcome = publisher(&server.uri()).publish(&req).await.expect("publish");
        assert_eq!(outcome.platform, Platform::WriteAs);
        assert_eq!(outcome.url, "https://write.as/abc123xyz");

        let received = server.received_requests().await.expect("recorded requests");
        let body: serde_json::Value = received[0].body_json().expect("json body");
        let markdown = body["body"].as_str().unwrap_or_default();
        assert!(markdown.contains("[green tea](https://example.com/tea)"));
        assert!(!markdown.contains("<p>"));
    }

    #[tokio::test]
    async fn api_error_code_is_publish_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 400,
                "error_msg": "Post body is required."
            })))
            .mount(&server)
            .await;

        let err = publisher(&server.uri())
            .publish(&PublishRequest::new("t", "<p>x</p>"))
            .await
            .unwrap_err();
        assert!(matches!(err, BacklinkooError::Publish { .. }));
        assert!(err.to_string().contains("Post body is required."));
    }

    #[tokio::test]
    async fn non_json_response_is_publish_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = publisher(&server.uri())
            .publish(&PublishRequest::new("t", "<p>x</p>"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("502"), "{msg}");
        assert!(msg.contains("bad gateway"), "{msg}");
    }
}
