//! 新規性コーパスと新規性スコア。
//!
//! 過去に採点したレシピの指紋を追記専用で保持し、新しいレシピとの最大類似度から
//! 新規性を求める。読み取り・採点・追記は呼び出し側のロックの下で1ステップとして行う。

pub mod embedding;
pub mod jaccard;

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{CorpusScope, NoveltySettings, NoveltyStrategyKind};
use crate::recipe::ParsedRecipe;
use crate::util::text::word_set;

pub use self::embedding::{
    EmbeddingCacheStore, EmbeddingError, EmbeddingModel, EmbeddingNovelty, cosine_similarity,
    validate_vector,
};
pub use self::jaccard::{
    JaccardBreakdown, JaccardNovelty, TabularCorpusStore, TokenCorpus, jaccard_similarity,
    penalty_score,
};

/// 新規性判定に使うレシピの指紋。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFingerprint {
    /// 埋め込みキャッシュのキーになる、前後の空白を除いたタイトル。
    pub title: String,
    pub title_tokens: BTreeSet<String>,
    pub ingredient_tokens: BTreeSet<String>,
    /// 埋め込みモデルに渡す「タイトル + 材料」テキスト。
    pub embedding_text: String,
}

impl RecipeFingerprint {
    #[must_use]
    pub fn from_recipe(recipe: &ParsedRecipe, normalized_ingredients: &[String]) -> Self {
        let title = recipe.title.trim().to_string();
        let title_tokens = word_set(&title);
        let ingredient_tokens = normalized_ingredients
            .iter()
            .flat_map(|ingredient| ingredient.split_whitespace())
            .map(str::to_string)
            .collect();
        let embedding_text = if recipe.ingredients.is_empty() {
            title.clone()
        } else {
            format!("{title}\n{}", recipe.ingredients.join(", "))
        };
        Self {
            title,
            title_tokens,
            ingredient_tokens,
            embedding_text,
        }
    }
}

/// コーパスに追記される1件分の記録。一度追記されたら変更も削除もされない。
#[derive(Debug, Clone, PartialEq)]
pub struct NoveltyRecord {
    pub title: String,
    pub title_tokens: BTreeSet<String>,
    pub ingredient_tokens: BTreeSet<String>,
    pub embedding: Option<Vec<f32>>,
}

impl From<&RecipeFingerprint> for NoveltyRecord {
    fn from(fingerprint: &RecipeFingerprint) -> Self {
        Self {
            title: fingerprint.title.clone(),
            title_tokens: fingerprint.title_tokens.clone(),
            ingredient_tokens: fingerprint.ingredient_tokens.clone(),
            embedding: None,
        }
    }
}

/// 1回の採点・追記の結果。
///
/// 永続化に失敗してもスコアは有効で、失敗は `persist_error` として並べて返す。
#[derive(Debug)]
pub struct NoveltyOutcome {
    pub score: f64,
    pub appended: NoveltyRecord,
    pub persist_error: Option<CorpusError>,
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to write novelty corpus {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write novelty corpus row {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv_async::Error,
    },
    #[error("failed to encode novelty corpus {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum NoveltyError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("embedding strategy selected but no embedding model is available")]
    ModelUnavailable,
    #[error("durable novelty corpus has no configured path")]
    MissingPath,
}

/// 新規性の採点と追記を行う戦略。
#[async_trait]
pub trait NoveltyStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// コーパスに保持している記録数。
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 指紋をコーパスと照合して新規性を返し、その後で指紋を追記する。
    ///
    /// # Errors
    /// 埋め込みの取得に失敗した場合は [`NoveltyError`] を返す。このときは何も追記しない。
    async fn score_and_record(
        &mut self,
        fingerprint: &RecipeFingerprint,
    ) -> Result<NoveltyOutcome, NoveltyError>;
}

/// 設定に従って戦略を組み立てる。`durable` の場合は既存のコーパスを読み込む。
///
/// # Errors
/// 埋め込み戦略でモデルが渡されていない場合や、永続化パスがない場合は [`NoveltyError`] を返す。
pub async fn build_strategy(
    settings: &NoveltySettings,
    model: Option<Arc<dyn EmbeddingModel>>,
) -> Result<Box<dyn NoveltyStrategy>, NoveltyError> {
    let durable_path = match settings.scope {
        CorpusScope::Process => None,
        CorpusScope::Durable => Some(
            settings
                .durable_path()
                .ok_or(NoveltyError::MissingPath)?
                .to_path_buf(),
        ),
    };

    match settings.strategy {
        NoveltyStrategyKind::Jaccard => {
            let strategy = match durable_path {
                Some(path) => {
                    JaccardNovelty::durable(
                        TabularCorpusStore::new(path),
                        settings.thresholds,
                        settings.weighting,
                    )
                    .await
                }
                None => JaccardNovelty::in_memory(settings.thresholds, settings.weighting),
            };
            Ok(Box::new(strategy))
        }
        NoveltyStrategyKind::Embedding => {
            let model = model.ok_or(NoveltyError::ModelUnavailable)?;
            let dimensions = settings.embedding.dimensions;
            let strategy = match durable_path {
                Some(path) => {
                    EmbeddingNovelty::durable(model, EmbeddingCacheStore::new(path), dimensions)
                        .await
                }
                None => EmbeddingNovelty::in_memory(model, dimensions),
            };
            Ok(Box::new(strategy))
        }
    }
}
