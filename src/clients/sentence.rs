use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rust_bert::pipelines::sentence_embeddings::{
    SentenceEmbeddingsBuilder, SentenceEmbeddingsModel, SentenceEmbeddingsModelType,
};
use tokio::sync::Mutex;

use crate::novelty::{EmbeddingError, EmbeddingModel};

/// rust-bert によるプロセス内の文埋め込みモデル（CPU 推論）。
#[derive(Clone)]
pub struct SentenceEmbeddingModel {
    model: Arc<Mutex<SentenceEmbeddingsModel>>,
}

impl std::fmt::Debug for SentenceEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceEmbeddingModel")
            .field("model", &"<SentenceEmbeddingsModel>")
            .finish()
    }
}

impl SentenceEmbeddingModel {
    /// モデルを読み込む。初回はダウンロードに時間がかかる。
    ///
    /// # Errors
    /// モデルの取得・初期化に失敗した場合はエラーを返します。
    pub fn new() -> Result<Self> {
        // 初期化はブロッキングかつ重いため専用スレッドで行う。
        let model = std::thread::spawn(|| {
            SentenceEmbeddingsBuilder::remote(SentenceEmbeddingsModelType::AllMiniLmL12V2)
                .create_model()
        })
        .join()
        .map_err(|_| anyhow::anyhow!("failed to join embedding model loader thread"))??;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl EmbeddingModel for SentenceEmbeddingModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = self.model.clone();
        let texts = vec![text.to_string()];

        let mut vectors = tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.encode(&texts)
        })
        .await
        .map_err(|error| EmbeddingError::Model(format!("embedding task failed: {error}")))?
        .map_err(|error| EmbeddingError::Model(error.to_string()))?;

        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Model("model returned no embeddings".to_string()))
    }
}
