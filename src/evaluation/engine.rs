//! 評価エンジン。
//!
//! 設定・コンパイル済みの語彙・新規性コーパス・メトリクスを1つのコンテキストにまとめ、
//! レシピを1件ずつ決まった順序で採点する。

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, RubricConfig};
use crate::novelty::{
    CorpusError, EmbeddingModel, NoveltyError, NoveltyStrategy, RecipeFingerprint, build_strategy,
};
use crate::observability::metrics::Metrics;
use crate::recipe::{Descriptors, INVALID_ENTRY_NOTE, ParsedRecipe, RecipeEntry, RecipeSource};

use super::aggregate::ScoreReport;
use super::metrics::{MetricKind, MetricSuite};

/// レシピ本文がないエントリに付ける注記。
pub const NO_RECIPE_NOTE: &str = "No recipe text available";

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("no recipe text available")]
    MissingRecipe,
    #[error("novelty scoring failed: {0}")]
    Novelty(#[from] NoveltyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 1件分の評価結果。
///
/// コーパスへの書き込みに失敗してもレポートは有効で、失敗は `corpus_error` に入る。
#[derive(Debug)]
pub struct Evaluation {
    pub parsed: ParsedRecipe,
    pub report: ScoreReport,
    pub corpus_error: Option<CorpusError>,
}

/// バッチ実行の集計。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub scored: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 読み込み時に型が合わなかったエントリ。
    pub invalid: usize,
    pub corpus_write_failures: usize,
}

impl BatchSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.scored + self.skipped + self.failed + self.invalid
    }
}

/// ルーブリック評価器。
///
/// 新規性コーパスは非同期ミューテックスの内側にあり、採点から追記までロックを保持する。
/// 並行に呼び出しても、各呼び出しはそれ以前の追記をすべて観測する。
#[derive(Debug)]
pub struct Evaluator {
    config: Arc<RubricConfig>,
    suite: MetricSuite,
    novelty: Mutex<Box<dyn NoveltyStrategy>>,
    metrics: Option<Arc<Metrics>>,
}

impl Evaluator {
    /// 設定から評価器を組み立てる。`durable` スコープのコーパスはここで読み込まれる。
    ///
    /// # Errors
    /// 語彙のコンパイルや新規性戦略の構築に失敗した場合は [`EvaluationError`] を返す。
    pub async fn new(
        config: RubricConfig,
        model: Option<Arc<dyn EmbeddingModel>>,
    ) -> Result<Self, EvaluationError> {
        let strategy = build_strategy(&config.novelty, model).await?;
        Self::with_strategy(config, strategy)
    }

    /// 新規性戦略を直接渡して組み立てる。
    ///
    /// # Errors
    /// 設定の検証や語彙のコンパイルに失敗した場合は [`EvaluationError`] を返す。
    pub fn with_strategy(
        config: RubricConfig,
        strategy: Box<dyn NoveltyStrategy>,
    ) -> Result<Self, EvaluationError> {
        config.validate()?;
        let suite = MetricSuite::new(
            &config.vocabulary,
            config.cues.policy,
            config.coherence.penalty,
        )?;
        info!(
            strategy = strategy.name(),
            corpus_records = strategy.len(),
            vocabulary = %config.vocabulary.version,
            "evaluator ready"
        );
        Ok(Self {
            config: Arc::new(config),
            suite,
            novelty: Mutex::new(strategy),
            metrics: None,
        })
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RubricConfig {
        &self.config
    }

    /// 新規性コーパスの現在の記録数。
    pub async fn corpus_len(&self) -> usize {
        self.novelty.lock().await.len()
    }

    /// レシピを採点し、新規性コーパスに追記する。
    ///
    /// # Errors
    /// 本文が空の場合は [`EvaluationError::MissingRecipe`]、埋め込みの取得に失敗した場合は
    /// [`EvaluationError::Novelty`] を返す。どちらの場合もコーパスには何も追記されない。
    pub async fn evaluate(
        &self,
        source: &RecipeSource,
        descriptors: Option<&Descriptors>,
    ) -> Result<Evaluation, EvaluationError> {
        if source.is_blank() {
            return Err(EvaluationError::MissingRecipe);
        }
        let started = Instant::now();

        let parsed = source.to_parsed();
        let normalized = self.suite.normalizer().normalize_all(&parsed.ingredients);
        let fingerprint = RecipeFingerprint::from_recipe(&parsed, &normalized);

        let outcome = {
            let mut novelty = self.novelty.lock().await;
            let outcome = novelty.score_and_record(&fingerprint).await;
            if let Some(metrics) = &self.metrics {
                metrics.corpus_records.set(novelty.len() as f64);
            }
            outcome
        };
        let outcome = outcome.inspect_err(|error| {
            if let (Some(metrics), NoveltyError::Embedding(_)) = (&self.metrics, error) {
                metrics.embedding_failures.inc();
            }
        })?;

        if let Some(error) = &outcome.persist_error {
            warn!(title = %parsed.title, error = %error, "novelty record was not persisted");
            if let Some(metrics) = &self.metrics {
                metrics.corpus_write_failures.inc();
            }
        }

        let scores = self
            .suite
            .score(&parsed, &normalized, descriptors, outcome.score);
        let report = ScoreReport::new(scores, &self.config.weights);

        if let Some(metrics) = &self.metrics {
            metrics.recipes_scored.inc();
            metrics.total_score.observe(report.total());
            if let Some(novelty) = report.metric(MetricKind::Novelty) {
                metrics.novelty_score.observe(novelty);
            }
            metrics
                .scoring_duration
                .observe(started.elapsed().as_secs_f64());
        }
        debug!(title = %parsed.title, total = report.total(), "recipe scored");

        Ok(Evaluation {
            parsed,
            report,
            corpus_error: outcome.persist_error,
        })
    }

    /// バッチ入力の1エントリを採点する。
    ///
    /// # Errors
    /// [`Evaluator::evaluate`] と同じ。`recipe` がないエントリは [`EvaluationError::MissingRecipe`]。
    pub async fn evaluate_entry(&self, entry: &RecipeEntry) -> Result<Evaluation, EvaluationError> {
        let source = entry.recipe.as_ref().ok_or(EvaluationError::MissingRecipe)?;
        self.evaluate(source, entry.input.as_ref()).await
    }

    /// エントリを先頭から順に採点し、各エントリの `scores` を埋める。
    ///
    /// 本文のないエントリや採点に失敗したエントリには合計 0 と注記だけのレポートを付け、
    /// バッチは継続する。
    pub async fn evaluate_batch(&self, entries: &mut [RecipeEntry]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for (index, entry) in entries.iter_mut().enumerate() {
            if let Some(reason) = &entry.rejection {
                summary.invalid += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.recipes_failed.inc();
                }
                warn!(index, reason = %reason, "entry has invalid fields; skipping");
                entry.scores.get_or_insert_with(|| {
                    ScoreReport::unscored(format!("{INVALID_ENTRY_NOTE}: {reason}"))
                });
                continue;
            }
            match self.evaluate_entry(entry).await {
                Ok(evaluation) => {
                    summary.scored += 1;
                    if evaluation.corpus_error.is_some() {
                        summary.corpus_write_failures += 1;
                    }
                    info!(
                        index,
                        title = %evaluation.parsed.title,
                        total = evaluation.report.total(),
                        "recipe scored"
                    );
                    entry.scores = Some(evaluation.report);
                }
                Err(EvaluationError::MissingRecipe) => {
                    summary.skipped += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.recipes_skipped.inc();
                    }
                    warn!(index, "entry has no recipe text; skipping");
                    entry.scores = Some(ScoreReport::unscored(NO_RECIPE_NOTE));
                }
                Err(error) => {
                    summary.failed += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.recipes_failed.inc();
                    }
                    warn!(index, error = %error, "failed to score recipe");
                    entry.scores = Some(ScoreReport::unscored(format!("Scoring failed: {error}")));
                }
            }
        }
        summary
    }
}
