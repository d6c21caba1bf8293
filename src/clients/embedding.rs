/// OpenAI 互換の埋め込み API クライアント。
///
/// `POST {base_url}/embeddings` に1件ずつ問い合わせる。再試行は行いません。
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::novelty::{EmbeddingError, EmbeddingModel};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// 埋め込みクライアントの設定。
#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub api_key: Option<String>,
    pub dimensions: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    dimensions: Option<usize>,
}

impl HttpEmbeddingClient {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build embedding HTTP client")?;

        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&base)
            .and_then(|base| base.join("embeddings"))
            .context("invalid embedding base URL")?;

        Ok(Self {
            client,
            endpoint,
            model: config.model,
            api_key: config.api_key,
            dimensions: config.dimensions,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        debug!(model = %self.model, chars = text.len(), "requesting embedding");

        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::Decode(error.to_string()))?;
        payload
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| EmbeddingError::Decode("response contained no embeddings".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String, api_key: Option<&str>) -> HttpEmbeddingClient {
        HttpEmbeddingClient::new(HttpEmbeddingConfig {
            base_url,
            model: "text-embedding-3-small".to_string(),
            timeout: Duration::from_secs(5),
            api_key: api_key.map(str::to_string),
            dimensions: None,
        })
        .expect("client should build")
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let bare = client("https://api.example.com/v1".to_string(), None);
        assert_eq!(bare.endpoint().as_str(), "https://api.example.com/v1/embeddings");
        let slashed = client("https://api.example.com/v1/".to_string(), None);
        assert_eq!(slashed.endpoint(), bare.endpoint());
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": "Miso Soup\nmiso, tofu"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [0.25, -0.5, 1.0]}]
            })))
            .mount(&server)
            .await;

        let vector = client(server.uri(), Some("sk-test"))
            .embed("Miso Soup\nmiso, tofu")
            .await
            .expect("embedding succeeds");
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let error = client(server.uri(), None)
            .embed("anything")
            .await
            .expect_err("should fail");
        match error {
            EmbeddingError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_data_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let error = client(server.uri(), None)
            .embed("anything")
            .await
            .expect_err("should fail");
        assert!(matches!(error, EmbeddingError::Decode(_)));
    }
}
