//! YAML で与える採点ルール（重み・閾値・新規性戦略・語彙）。

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::evaluation::{CuePolicy, MetricWeights};
use crate::vocabulary::Vocabulary;

use super::ConfigError;

/// ルーブリック設定全体。プロセス起動時に一度だけ読み込む。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricConfig {
    #[serde(default = "MetricWeights::standard")]
    pub weights: MetricWeights,
    /// コーパスの永続化範囲を明示させるため、このセクションは省略できない。
    pub novelty: NoveltySettings,
    #[serde(default)]
    pub cues: CueSettings,
    #[serde(default)]
    pub coherence: CoherenceSettings,
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CueSettings {
    #[serde(default)]
    pub policy: CuePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoherenceSettings {
    /// 逆転ペア1件あたりの減点。
    #[serde(default = "default_inversion_penalty")]
    pub penalty: f64,
}

impl Default for CoherenceSettings {
    fn default() -> Self {
        Self {
            penalty: default_inversion_penalty(),
        }
    }
}

fn default_inversion_penalty() -> f64 {
    0.3
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyStrategyKind {
    #[default]
    Jaccard,
    Embedding,
}

/// 新規性コーパスの寿命。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusScope {
    /// 評価器のインスタンスが生きている間だけメモリに保持する。
    Process,
    /// 設定されたパスに永続化し、実行をまたいで引き継ぐ。
    Durable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltySettings {
    #[serde(default)]
    pub strategy: NoveltyStrategyKind,
    pub scope: CorpusScope,
    /// Jaccard コーパスの CSV パス（`durable` の場合に必須）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,
    /// 埋め込みキャッシュの JSON パス（`durable` の場合に必須）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(default)]
    pub thresholds: NoveltyThresholds,
    #[serde(default)]
    pub weighting: TokenClassWeights,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

impl NoveltySettings {
    /// 指定した戦略・範囲と既定の閾値で組み立てる。
    #[must_use]
    pub fn new(strategy: NoveltyStrategyKind, scope: CorpusScope) -> Self {
        Self {
            strategy,
            scope,
            corpus_path: None,
            cache_path: None,
            thresholds: NoveltyThresholds::default(),
            weighting: TokenClassWeights::default(),
            embedding: EmbeddingSettings::default(),
        }
    }

    /// 現在の戦略で使う永続化パス。`process` の場合は `None`。
    #[must_use]
    pub fn durable_path(&self) -> Option<&Path> {
        if self.scope == CorpusScope::Process {
            return None;
        }
        match self.strategy {
            NoveltyStrategyKind::Jaccard => self.corpus_path.as_deref(),
            NoveltyStrategyKind::Embedding => self.cache_path.as_deref(),
        }
    }
}

/// トークン種別ごとの減点閾値。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyBands {
    /// これを超える類似度で 0.0。
    pub hard_penalty: f64,
    /// これを超える類似度で 0.5。
    pub soft_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoveltyThresholds {
    pub title: PenaltyBands,
    pub ingredients: PenaltyBands,
}

impl Default for NoveltyThresholds {
    fn default() -> Self {
        Self {
            title: PenaltyBands {
                hard_penalty: 0.8,
                soft_penalty: 0.5,
            },
            ingredients: PenaltyBands {
                hard_penalty: 0.7,
                soft_penalty: 0.4,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenClassWeights {
    pub title: f64,
    pub ingredients: f64,
}

impl Default for TokenClassWeights {
    fn default() -> Self {
        Self {
            title: 0.4,
            ingredients: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// OpenAI 互換の `/embeddings` エンドポイント。
    #[default]
    Http,
    /// rust-bert によるプロセス内推論（`local-embeddings` フィーチャー）。
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
    /// 期待する次元数。指定時は応答ベクトルの長さを検証する。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Http,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            timeout_ms: 10_000,
            dimensions: None,
        }
    }
}

impl EmbeddingSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RubricConfig {
    /// 既定のルーブリックに、指定した新規性設定を組み合わせる。
    #[must_use]
    pub fn with_novelty(novelty: NoveltySettings) -> Self {
        Self {
            weights: MetricWeights::standard(),
            novelty,
            cues: CueSettings::default(),
            coherence: CoherenceSettings::default(),
            vocabulary: Vocabulary::default(),
        }
    }

    /// YAML ファイルを読み込み、検証する。
    ///
    /// # Errors
    /// ファイルが読めない・パースできない・値が不正な場合は [`ConfigError`] を返す。
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// パースに失敗した場合や値が不正な場合は [`ConfigError`] を返す。
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 値の整合性を検証する。
    ///
    /// # Errors
    /// 重み・閾値・減点が範囲外、または `durable` で永続化パスがない場合は [`ConfigError`] を返す。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(metric) = self.weights.first_invalid() {
            return Err(ConfigError::Invalid {
                name: "weights",
                source: anyhow::anyhow!("weight for {metric} must be a non-negative number"),
            });
        }

        let penalty = self.coherence.penalty;
        if !(penalty.is_finite() && (0.0..=1.0).contains(&penalty)) {
            return Err(ConfigError::Invalid {
                name: "coherence.penalty",
                source: anyhow::anyhow!("penalty must be within [0, 1], got {penalty}"),
            });
        }

        validate_bands(&self.novelty.thresholds.title, "novelty.thresholds.title")?;
        validate_bands(
            &self.novelty.thresholds.ingredients,
            "novelty.thresholds.ingredients",
        )?;

        let weighting = self.novelty.weighting;
        if [weighting.title, weighting.ingredients]
            .iter()
            .any(|weight| !weight.is_finite() || *weight < 0.0)
        {
            return Err(ConfigError::Invalid {
                name: "novelty.weighting",
                source: anyhow::anyhow!("token class weights must be non-negative numbers"),
            });
        }

        if self.novelty.scope == CorpusScope::Durable && self.novelty.durable_path().is_none() {
            return Err(ConfigError::Missing(match self.novelty.strategy {
                NoveltyStrategyKind::Jaccard => "novelty.corpus_path",
                NoveltyStrategyKind::Embedding => "novelty.cache_path",
            }));
        }

        let embedding = &self.novelty.embedding;
        if self.novelty.strategy == NoveltyStrategyKind::Embedding
            && embedding.provider == EmbeddingProvider::Http
            && embedding.base_url.trim().is_empty()
        {
            return Err(ConfigError::Missing("novelty.embedding.base_url"));
        }
        if embedding.dimensions == Some(0) {
            return Err(ConfigError::Invalid {
                name: "novelty.embedding.dimensions",
                source: anyhow::anyhow!("dimensions must be positive"),
            });
        }

        Ok(())
    }
}

fn validate_bands(bands: &PenaltyBands, name: &'static str) -> Result<(), ConfigError> {
    let in_unit = |value: f64| value.is_finite() && (0.0..=1.0).contains(&value);
    if !in_unit(bands.hard_penalty) || !in_unit(bands.soft_penalty) {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("penalty thresholds must be within [0, 1]"),
        });
    }
    if bands.soft_penalty >= bands.hard_penalty {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!(
                "soft_penalty ({}) must be below hard_penalty ({})",
                bands.soft_penalty,
                bands.hard_penalty
            ),
        });
    }
    Ok(())
}
