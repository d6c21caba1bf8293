//! 重み付き集計とスコアレポート。

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::util::text::round4;

use super::metrics::{MetricKind, MetricScore};

/// 出力レコードで合計値を格納するキー。
pub const TOTAL_KEY: &str = "RScore";
/// 出力レコードで注記を格納するキー。
pub const NOTE_KEY: &str = "note";

/// メトリクス名 → 重み。合計が1である必要はない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricWeights(BTreeMap<String, f64>);

impl MetricWeights {
    #[must_use]
    pub fn new<I, K>(weights: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self(
            weights
                .into_iter()
                .map(|(name, weight)| (name.into(), weight))
                .collect(),
        )
    }

    /// 既定の重み。
    #[must_use]
    pub fn standard() -> Self {
        Self::new([
            (MetricKind::IngredientUsageCompleteness.as_str(), 0.2),
            (MetricKind::InstructionCoherence.as_str(), 0.2),
            (MetricKind::Cues.as_str(), 0.05),
            (MetricKind::Plausibility.as_str(), 0.15),
            (MetricKind::Novelty.as_str(), 0.15),
            (MetricKind::Conciseness.as_str(), 0.1),
            (MetricKind::AbedAlignment.as_str(), 0.15),
        ])
    }

    /// 重みを返す。未設定のメトリクスは 0。
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, weight)| (name.as_str(), *weight))
    }

    /// 負の値・非有限値を含む重みを見つけたら、そのメトリクス名を返す。
    #[must_use]
    pub fn first_invalid(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
            .map(|(name, _)| name.as_str())
    }
}

/// `Σ score × weight` を小数点以下4桁に丸めて返す。
///
/// 重みのないメトリクスは 0 として扱う。入力の並び順は結果に影響しない。
#[must_use]
pub fn aggregate(scores: &[MetricScore], weights: &MetricWeights) -> f64 {
    let mut terms: Vec<f64> = scores
        .iter()
        .map(|score| score.value * weights.get(&score.name))
        .collect();
    // 浮動小数の加算順序で結果が揺れないよう、値で並べてから足す。
    terms.sort_by(f64::total_cmp);
    round4(terms.into_iter().sum())
}

/// 1レシピ分の評価結果。
///
/// `total` は常に `metrics` と重みから計算され、単独では設定できない。
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    metrics: Vec<MetricScore>,
    total: f64,
    note: Option<String>,
}

impl ScoreReport {
    #[must_use]
    pub fn new(metrics: Vec<MetricScore>, weights: &MetricWeights) -> Self {
        let total = aggregate(&metrics, weights);
        Self {
            metrics,
            total,
            note: None,
        }
    }

    /// 採点できなかったレシピ用の、合計 0 と注記だけのレポート。
    #[must_use]
    pub fn unscored(note: impl Into<String>) -> Self {
        Self {
            metrics: Vec::new(),
            total: 0.0,
            note: Some(note.into()),
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// 別の重み設定で合計を計算し直したレポートを返す。
    #[must_use]
    pub fn reweighted(&self, weights: &MetricWeights) -> Self {
        Self {
            metrics: self.metrics.clone(),
            total: aggregate(&self.metrics, weights),
            note: self.note.clone(),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &[MetricScore] {
        &self.metrics
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.total
    }

    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|metric| metric.name == name)
            .map(|metric| metric.value)
    }

    #[must_use]
    pub fn metric(&self, kind: MetricKind) -> Option<f64> {
        self.get(kind.as_str())
    }
}

impl Serialize for ScoreReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = 1 + usize::from(self.note.is_some());
        let mut map = serializer.serialize_map(Some(self.metrics.len() + extra))?;
        for metric in &self.metrics {
            map.serialize_entry(&metric.name, &metric.value)?;
        }
        map.serialize_entry(TOTAL_KEY, &self.total)?;
        if let Some(note) = &self.note {
            map.serialize_entry(NOTE_KEY, note)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScoreReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ReportVisitor)
    }
}

struct ReportVisitor;

impl<'de> Visitor<'de> for ReportVisitor {
    type Value = ScoreReport;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a flat map of metric scores with a total")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ScoreReport, A::Error> {
        let mut metrics = Vec::new();
        let mut total = None;
        let mut note = None;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                TOTAL_KEY => total = Some(map.next_value::<f64>()?),
                NOTE_KEY => note = map.next_value::<Option<String>>()?,
                _ => {
                    let value = map.next_value::<f64>()?;
                    metrics.push(MetricScore { name: key, value });
                }
            }
        }
        let total = total.ok_or_else(|| de::Error::missing_field(TOTAL_KEY))?;
        Ok(ScoreReport {
            metrics,
            total,
            note,
        })
    }
}
