//! 埋め込みベクトルのコサイン類似度による新規性判定と、その JSON キャッシュ。

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::util::text::round2;

use super::{
    CorpusError, NoveltyError, NoveltyOutcome, NoveltyRecord, NoveltyStrategy, RecipeFingerprint,
};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode embedding response: {0}")]
    Decode(String),
    #[error("invalid embedding vector: {0}")]
    InvalidVector(String),
    #[error("embedding model failed: {0}")]
    Model(String),
}

/// テキストを埋め込みベクトルに変換するモデル。
///
/// 遅く失敗しうる呼び出しとして扱う。リトライは行わない。
#[async_trait]
pub trait EmbeddingModel: Send + Sync + fmt::Debug {
    /// # Errors
    /// モデル呼び出しに失敗した場合は [`EmbeddingError`] を返す。
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// 2つのベクトルのコサイン類似度。どちらかのノルムが 0 なら 0。
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}

/// 空・非有限値・ゼロベクトル・次元数不一致を拒否する。
///
/// # Errors
/// ベクトルが使えない場合は [`EmbeddingError::InvalidVector`] を返す。
pub fn validate_vector(
    vector: &[f32],
    expected_dimensions: Option<usize>,
) -> Result<(), EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::InvalidVector("empty vector".to_string()));
    }
    if let Some(expected) = expected_dimensions {
        if vector.len() != expected {
            return Err(EmbeddingError::InvalidVector(format!(
                "expected {expected} dimensions, got {}",
                vector.len()
            )));
        }
    }
    if vector.iter().any(|value| !value.is_finite()) {
        return Err(EmbeddingError::InvalidVector(
            "vector contains non-finite values".to_string(),
        ));
    }
    if norm(vector) == 0.0 {
        return Err(EmbeddingError::InvalidVector("zero-norm vector".to_string()));
    }
    Ok(())
}

/// タイトル → 埋め込みベクトルの JSON キャッシュ。
///
/// 更新のたびに一時ファイルへ全体を書き出してからリネームで置き換える。
#[derive(Debug, Clone)]
pub struct EmbeddingCacheStore {
    path: PathBuf,
}

impl EmbeddingCacheStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// キャッシュを読み込む。読めない・壊れている場合は警告を出して空として扱う。
    pub async fn load(&self) -> BTreeMap<String, Vec<f32>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "embedding cache not found; starting empty");
                return BTreeMap::new();
            }
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    error = %error,
                    "embedding cache unreadable; treating every recipe as novel"
                );
                return BTreeMap::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(cache) => cache,
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    error = %error,
                    "embedding cache is corrupt; treating every recipe as novel"
                );
                BTreeMap::new()
            }
        }
    }

    /// # Errors
    /// 書き込み・リネームに失敗した場合は [`CorpusError`] を返す。元のファイルは残る。
    pub async fn save(&self, cache: &BTreeMap<String, Vec<f32>>) -> Result<(), CorpusError> {
        let io_error = |source: std::io::Error| CorpusError::Io {
            path: self.path.clone(),
            source,
        };
        let payload = serde_json::to_vec(cache).map_err(|source| CorpusError::Encode {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await.map_err(io_error)?;
        file.write_all(&payload).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;
        file.sync_data().await.map_err(io_error)?;
        drop(file);
        fs::rename(&temp_path, &self.path).await.map_err(io_error)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// 埋め込みベクトルによる新規性戦略。
#[derive(Debug)]
pub struct EmbeddingNovelty {
    model: Arc<dyn EmbeddingModel>,
    cache: BTreeMap<String, Vec<f32>>,
    dimensions: Option<usize>,
    store: Option<EmbeddingCacheStore>,
}

impl EmbeddingNovelty {
    #[must_use]
    pub fn in_memory(model: Arc<dyn EmbeddingModel>, dimensions: Option<usize>) -> Self {
        Self {
            model,
            cache: BTreeMap::new(),
            dimensions,
            store: None,
        }
    }

    pub async fn durable(
        model: Arc<dyn EmbeddingModel>,
        store: EmbeddingCacheStore,
        dimensions: Option<usize>,
    ) -> Self {
        let cache = store.load().await;
        debug!(path = %store.path().display(), entries = cache.len(), "loaded embedding cache");
        Self {
            model,
            cache,
            dimensions,
            store: Some(store),
        }
    }

    /// キャッシュ全体での最大コサイン類似度。比較できる記録がなければ `None`。
    ///
    /// 次元数の異なる記録は読み飛ばす。
    #[must_use]
    pub fn max_similarity(&self, vector: &[f32]) -> Option<f64> {
        let mut skipped = 0_usize;
        let best = self
            .cache
            .values()
            .filter(|cached| {
                let comparable = cached.len() == vector.len();
                if !comparable {
                    skipped += 1;
                }
                comparable
            })
            .map(|cached| cosine_similarity(cached, vector))
            .fold(None, |best: Option<f64>, similarity| {
                Some(best.map_or(similarity, |current| current.max(similarity)))
            });
        if skipped > 0 {
            debug!(skipped, "skipped cached embeddings with mismatched dimensions");
        }
        best
    }
}

#[async_trait]
impl NoveltyStrategy for EmbeddingNovelty {
    fn name(&self) -> &'static str {
        "embedding"
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    async fn score_and_record(
        &mut self,
        fingerprint: &RecipeFingerprint,
    ) -> Result<NoveltyOutcome, NoveltyError> {
        let vector = self.model.embed(&fingerprint.embedding_text).await?;
        validate_vector(&vector, self.dimensions)?;

        let score = match self.max_similarity(&vector) {
            Some(similarity) => round2((1.0 - similarity).clamp(0.0, 1.0)),
            None => 1.0,
        };
        debug!(title = %fingerprint.title, score, "scored embedding novelty");

        self.cache.insert(fingerprint.title.clone(), vector.clone());
        let persist_error = match &self.store {
            Some(store) => store.save(&self.cache).await.err(),
            None => None,
        };

        let mut record = NoveltyRecord::from(fingerprint);
        record.embedding = Some(vector);
        Ok(NoveltyOutcome {
            score,
            appended: record,
            persist_error,
        })
    }
}
