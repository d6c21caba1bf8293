pub mod embedding;
#[cfg(feature = "local-embeddings")]
pub mod sentence;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{EmbeddingProvider, EmbeddingSettings};
use crate::novelty::EmbeddingModel;

pub use embedding::{HttpEmbeddingClient, HttpEmbeddingConfig};
#[cfg(feature = "local-embeddings")]
pub use sentence::SentenceEmbeddingModel;

/// 設定に従って埋め込みモデルを構築する。
///
/// # Errors
/// HTTP クライアントの構築やローカルモデルの読み込みに失敗した場合はエラーを返します。
pub fn embedding_model_from_settings(
    settings: &EmbeddingSettings,
    api_key: Option<&str>,
) -> Result<Arc<dyn EmbeddingModel>> {
    match settings.provider {
        EmbeddingProvider::Http => {
            let client = HttpEmbeddingClient::new(HttpEmbeddingConfig {
                base_url: settings.base_url.clone(),
                model: settings.model.clone(),
                timeout: settings.timeout(),
                api_key: api_key.map(str::to_string),
                dimensions: settings.dimensions,
            })?;
            Ok(Arc::new(client))
        }
        EmbeddingProvider::Local => local_model(),
    }
}

#[cfg(feature = "local-embeddings")]
fn local_model() -> Result<Arc<dyn EmbeddingModel>> {
    Ok(Arc::new(SentenceEmbeddingModel::new()?))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_model() -> Result<Arc<dyn EmbeddingModel>> {
    anyhow::bail!("local embeddings require building with the `local-embeddings` feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_http_model_from_defaults() {
        let model = embedding_model_from_settings(&EmbeddingSettings::default(), Some("key"));
        assert!(model.is_ok());
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn local_provider_needs_the_feature() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProvider::Local,
            ..EmbeddingSettings::default()
        };
        let error = embedding_model_from_settings(&settings, None).expect_err("feature disabled");
        assert!(error.to_string().contains("local-embeddings"));
    }
}
