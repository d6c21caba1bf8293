/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// スコア系ヒストグラムのバケット（0.1 刻み）。
fn score_buckets() -> Vec<f64> {
    vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
}

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub recipes_scored: Counter,
    pub recipes_skipped: Counter,
    pub recipes_failed: Counter,
    pub corpus_write_failures: Counter,
    pub embedding_failures: Counter,

    // ヒストグラム
    pub total_score: Histogram,
    pub novelty_score: Histogram,
    pub scoring_duration: Histogram,

    // ゲージ
    pub corpus_records: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同じ名前のメトリクスが既に登録されている場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            recipes_scored: register_counter_with_registry!(
                "rubric_recipes_scored_total",
                "Total number of recipes scored",
                registry
            )?,
            recipes_skipped: register_counter_with_registry!(
                "rubric_recipes_skipped_total",
                "Recipes without text that received an unscored report",
                registry
            )?,
            recipes_failed: register_counter_with_registry!(
                "rubric_recipes_failed_total",
                "Recipes whose scoring failed",
                registry
            )?,
            corpus_write_failures: register_counter_with_registry!(
                "rubric_corpus_write_failures_total",
                "Novelty corpus appends that could not be persisted",
                registry
            )?,
            embedding_failures: register_counter_with_registry!(
                "rubric_embedding_failures_total",
                "Embedding model calls that failed",
                registry
            )?,
            total_score: register_histogram_with_registry!(
                "rubric_total_score",
                "Weighted rubric total per scored recipe",
                score_buckets(),
                registry
            )?,
            novelty_score: register_histogram_with_registry!(
                "rubric_novelty_score",
                "Novelty metric per scored recipe",
                score_buckets(),
                registry
            )?,
            scoring_duration: register_histogram_with_registry!(
                "rubric_scoring_duration_seconds",
                "Duration of scoring a single recipe",
                registry
            )?,
            corpus_records: register_gauge_with_registry!(
                "rubric_corpus_records",
                "Records currently held by the novelty corpus",
                registry
            )?,
        })
    }
}
