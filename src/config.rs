pub mod rubric;

use std::{env, fs, path::PathBuf};

use thiserror::Error;

pub use self::rubric::{
    CorpusScope, EmbeddingProvider, EmbeddingSettings, NoveltySettings, NoveltyStrategyKind,
    NoveltyThresholds, PenaltyBands, RubricConfig, TokenClassWeights,
};

/// バッチ実行時のプロセス設定（環境変数由来）。
///
/// 採点ルールそのものは [`RubricConfig`] が YAML から読み込む。
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    rubric_config_path: PathBuf,
    input_path: PathBuf,
    output_path: PathBuf,
    review_log_dir: Option<PathBuf>,
    metrics_textfile: Option<PathBuf>,
    embedding_api_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to read rubric config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rubric config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl Config {
    /// 環境変数からバッチ設定を読み込む。
    ///
    /// パス類は未設定なら既定値を使う。`RUBRIC_EMBEDDING_API_KEY_FILE` が設定されていれば
    /// そのファイルの内容を API キーとして優先する。
    ///
    /// # Errors
    /// キーファイルが読めない、またはパスが空文字列の場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let rubric_config_path = parse_path("RUBRIC_CONFIG_PATH", "config/rubric.yaml")?;
        let input_path = parse_path("RUBRIC_INPUT_PATH", "data/generated_recipes.json")?;
        let output_path = parse_path("RUBRIC_OUTPUT_PATH", "data/generated_scored_recipes.json")?;
        let review_log_dir = optional_path("RUBRIC_REVIEW_LOG_DIR");
        let metrics_textfile = optional_path("RUBRIC_METRICS_TEXTFILE");
        let embedding_api_key = env_or_file("RUBRIC_EMBEDDING_API_KEY")?;

        Ok(Self {
            rubric_config_path,
            input_path,
            output_path,
            review_log_dir,
            metrics_textfile,
            embedding_api_key,
        })
    }

    #[must_use]
    pub fn rubric_config_path(&self) -> &std::path::Path {
        &self.rubric_config_path
    }

    #[must_use]
    pub fn input_path(&self) -> &std::path::Path {
        &self.input_path
    }

    #[must_use]
    pub fn output_path(&self) -> &std::path::Path {
        &self.output_path
    }

    #[must_use]
    pub fn review_log_dir(&self) -> Option<&std::path::Path> {
        self.review_log_dir.as_deref()
    }

    #[must_use]
    pub fn metrics_textfile(&self) -> Option<&std::path::Path> {
        self.metrics_textfile.as_deref()
    }

    #[must_use]
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.embedding_api_key.as_deref()
    }
}

fn parse_path(name: &'static str, default: &str) -> Result<PathBuf, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    if raw.trim().is_empty() {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("path must not be empty"),
        });
    }
    Ok(PathBuf::from(raw))
}

fn optional_path(name: &'static str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
}

/// `NAME_FILE` があればファイルから、なければ `NAME` から読む（Docker Secrets 対応）。
fn env_or_file(name: &'static str) -> Result<Option<String>, ConfigError> {
    let file_env = format!("{name}_FILE");
    if let Ok(file_path) = env::var(&file_env) {
        let content = fs::read_to_string(&file_path).map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(error).context(format!("failed to read {file_env}")),
        })?;
        let secret = content.trim().to_string();
        return Ok((!secret.is_empty()).then_some(secret));
    }
    Ok(env::var(name).ok().filter(|value| !value.trim().is_empty()))
}
