//! トークン集合の Jaccard 類似度による新規性判定と、その CSV コーパス。

use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv_async::{AsyncReaderBuilder, AsyncWriterBuilder, StringRecord};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::{NoveltyThresholds, PenaltyBands, TokenClassWeights};
use crate::util::text::{ratio_or, round2, word_set};

use super::{
    CorpusError, NoveltyError, NoveltyOutcome, NoveltyRecord, NoveltyStrategy, RecipeFingerprint,
};

/// コーパス CSV の列名。
pub const CORPUS_COLUMNS: [&str; 2] = ["title", "ingredients"];

/// 末尾の改行を探すときに一度に読むバイト数。
const TAIL_CHUNK: usize = 4096;

/// `|A ∩ B| / |A ∪ B|`。和集合が空なら 0。
#[must_use]
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    let intersection = a.intersection(b).count();
    ratio_or(intersection, union, 0.0)
}

/// 類似度を段階的な部分スコアに変換する。境界値ちょうどは減点しない。
#[must_use]
pub fn penalty_score(similarity: f64, bands: &PenaltyBands) -> f64 {
    if similarity > bands.hard_penalty {
        0.0
    } else if similarity > bands.soft_penalty {
        0.5
    } else {
        1.0
    }
}

/// トークン集合のコーパス（メモリ上）。
#[derive(Debug, Clone, Default)]
pub struct TokenCorpus {
    records: Vec<NoveltyRecord>,
}

impl TokenCorpus {
    #[must_use]
    pub fn from_records(records: Vec<NoveltyRecord>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[NoveltyRecord] {
        &self.records
    }

    /// コーパス全体でのタイトルの最大類似度。空なら 0。
    #[must_use]
    pub fn max_title_similarity(&self, tokens: &BTreeSet<String>) -> f64 {
        self.max_similarity(tokens, |record| &record.title_tokens)
    }

    /// コーパス全体での材料の最大類似度。空なら 0。
    #[must_use]
    pub fn max_ingredient_similarity(&self, tokens: &BTreeSet<String>) -> f64 {
        self.max_similarity(tokens, |record| &record.ingredient_tokens)
    }

    fn max_similarity(
        &self,
        tokens: &BTreeSet<String>,
        field: impl Fn(&NoveltyRecord) -> &BTreeSet<String>,
    ) -> f64 {
        self.records
            .iter()
            .map(|record| jaccard_similarity(tokens, field(record)))
            .fold(0.0, f64::max)
    }

    pub fn push(&mut self, record: NoveltyRecord) {
        self.records.push(record);
    }
}

/// トークン種別ごとの部分スコア。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JaccardBreakdown {
    pub title: f64,
    pub ingredients: f64,
}

impl JaccardBreakdown {
    #[must_use]
    pub fn combined(&self, weighting: &TokenClassWeights) -> f64 {
        let weighted = weighting.title * self.title + weighting.ingredients * self.ingredients;
        round2(weighted.clamp(0.0, 1.0))
    }
}

/// 追記専用の CSV コーパス。
///
/// 読み書きとも `csv_async` を通すので、引用符付きのフィールドも読める。
#[derive(Debug, Clone)]
pub struct TabularCorpusStore {
    path: PathBuf,
}

impl TabularCorpusStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// コーパスを読み込む。読めない場合は警告を出して空のコーパスとして扱う。
    ///
    /// 壊れた行と、改行で終わっていない末尾行（書き込み途中のクラッシュ）は読み飛ばす。
    pub async fn load(&self) -> Vec<NoveltyRecord> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "novelty corpus not found; starting empty");
                return Vec::new();
            }
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    error = %error,
                    "novelty corpus unreadable; treating every recipe as novel"
                );
                return Vec::new();
            }
        };

        let (records, skipped) = parse_rows(&contents).await;
        if skipped > 0 {
            warn!(
                path = %self.path.display(),
                skipped,
                loaded = records.len(),
                "skipped corrupt novelty corpus rows"
            );
        }
        records
    }

    /// 1行追記する。ファイルが空ならヘッダーを先に書く。
    ///
    /// 改行で終わっていない末尾（書き込み途中のクラッシュ）は、追記の前に最後の改行まで切り詰める。
    /// 行全体を1回の `write_all` で書き、`flush` と `sync_data` まで行う。
    ///
    /// # Errors
    /// ファイルを開けない・書けない場合は [`CorpusError::Io`]、
    /// 行をエンコードできない場合は [`CorpusError::Csv`] を返す。
    pub async fn append(&self, record: &NoveltyRecord) -> Result<(), CorpusError> {
        let io_error = |source: std::io::Error| CorpusError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        let len = file.metadata().await.map_err(io_error)?.len();
        let complete = complete_prefix_len(&mut file, len)
            .await
            .map_err(io_error)?;
        if complete < len {
            warn!(
                path = %self.path.display(),
                dropped_bytes = len - complete,
                "truncating torn novelty corpus tail before append"
            );
            file.set_len(complete).await.map_err(io_error)?;
        }

        let payload = self.encode_row(record, complete == 0).await?;
        file.write_all(&payload).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;
        file.sync_data().await.map_err(io_error)?;
        Ok(())
    }

    async fn encode_row(
        &self,
        record: &NoveltyRecord,
        with_header: bool,
    ) -> Result<Vec<u8>, CorpusError> {
        let csv_error = |source: csv_async::Error| CorpusError::Csv {
            path: self.path.clone(),
            source,
        };

        let mut payload = Vec::new();
        {
            let mut writer = AsyncWriterBuilder::new().create_writer(&mut payload);
            if with_header {
                writer.write_record(CORPUS_COLUMNS).await.map_err(csv_error)?;
            }
            let title = join_tokens(&record.title_tokens);
            let ingredients = join_tokens(&record.ingredient_tokens);
            writer
                .write_record([title.as_str(), ingredients.as_str()])
                .await
                .map_err(csv_error)?;
            writer.flush().await.map_err(|source| CorpusError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(payload)
    }
}

/// 最後の改行の直後までのバイト数を返す。改行がなければ 0。
async fn complete_prefix_len(file: &mut File, len: u64) -> std::io::Result<u64> {
    let mut chunk = vec![0_u8; TAIL_CHUNK];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK as u64);
        let window = &mut chunk[..usize::try_from(end - start).unwrap_or(TAIL_CHUNK)];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(window).await?;
        if let Some(position) = window.iter().rposition(|byte| *byte == b'\n') {
            return Ok(start + position as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

fn join_tokens(tokens: &BTreeSet<String>) -> String {
    tokens.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

/// 改行で終わる部分だけを解釈し、(記録, 読み飛ばした行数) を返す。
async fn parse_rows(contents: &[u8]) -> (Vec<NoveltyRecord>, usize) {
    let complete = match contents.iter().rposition(|byte| *byte == b'\n') {
        Some(end) => &contents[..=end],
        None => &contents[..0],
    };
    let mut skipped = usize::from(complete.len() < contents.len());

    let mut reader = AsyncReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .create_reader(complete);
    let mut row = StringRecord::new();
    let mut records = Vec::new();
    let mut first = true;
    loop {
        match reader.read_record(&mut row).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(error) => {
                debug!(error = %error, "unreadable novelty corpus row");
                skipped += 1;
                continue;
            }
        }
        let is_header = first && row.iter().eq(CORPUS_COLUMNS);
        first = false;
        if is_header || row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        match parse_row(&row) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }
    (records, skipped)
}

/// 列がちょうど2つの行だけを記録として扱う。
///
/// タイトル列は小文字化されただけの生のタイトルでもよいので、単語集合に畳み込んで読む。
fn parse_row(row: &StringRecord) -> Option<NoveltyRecord> {
    if row.len() != CORPUS_COLUMNS.len() {
        return None;
    }
    let title = row.get(0)?.trim();
    let ingredients = row.get(1)?;
    if title.chars().chain(ingredients.chars()).any(char::is_control) {
        return None;
    }
    Some(NoveltyRecord {
        title: title.to_string(),
        title_tokens: word_set(title),
        ingredient_tokens: word_set(ingredients),
        embedding: None,
    })
}

/// Jaccard 類似度による新規性戦略。
#[derive(Debug)]
pub struct JaccardNovelty {
    corpus: TokenCorpus,
    thresholds: NoveltyThresholds,
    weighting: TokenClassWeights,
    store: Option<TabularCorpusStore>,
}

impl JaccardNovelty {
    /// プロセス内だけで保持するコーパス。
    #[must_use]
    pub fn in_memory(thresholds: NoveltyThresholds, weighting: TokenClassWeights) -> Self {
        Self {
            corpus: TokenCorpus::default(),
            thresholds,
            weighting,
            store: None,
        }
    }

    /// CSV に永続化するコーパス。既存の行を読み込んでから始める。
    pub async fn durable(
        store: TabularCorpusStore,
        thresholds: NoveltyThresholds,
        weighting: TokenClassWeights,
    ) -> Self {
        let records = store.load().await;
        debug!(path = %store.path().display(), records = records.len(), "loaded novelty corpus");
        Self {
            corpus: TokenCorpus::from_records(records),
            thresholds,
            weighting,
            store: Some(store),
        }
    }

    /// 追記せずに部分スコアだけを求める。
    #[must_use]
    pub fn assess(&self, fingerprint: &RecipeFingerprint) -> JaccardBreakdown {
        let title = self.corpus.max_title_similarity(&fingerprint.title_tokens);
        let ingredients = self
            .corpus
            .max_ingredient_similarity(&fingerprint.ingredient_tokens);
        JaccardBreakdown {
            title: penalty_score(title, &self.thresholds.title),
            ingredients: penalty_score(ingredients, &self.thresholds.ingredients),
        }
    }

    #[must_use]
    pub fn corpus(&self) -> &TokenCorpus {
        &self.corpus
    }
}

#[async_trait]
impl NoveltyStrategy for JaccardNovelty {
    fn name(&self) -> &'static str {
        "jaccard"
    }

    fn len(&self) -> usize {
        self.corpus.len()
    }

    async fn score_and_record(
        &mut self,
        fingerprint: &RecipeFingerprint,
    ) -> Result<NoveltyOutcome, NoveltyError> {
        let breakdown = self.assess(fingerprint);
        let score = breakdown.combined(&self.weighting);
        debug!(
            title = %fingerprint.title,
            title_score = breakdown.title,
            ingredient_score = breakdown.ingredients,
            score,
            "scored jaccard novelty"
        );

        let record = NoveltyRecord::from(fingerprint);
        let persist_error = match &self.store {
            Some(store) => store.append(&record).await.err(),
            None => None,
        };
        self.corpus.push(record.clone());

        Ok(NoveltyOutcome {
            score,
            appended: record,
            persist_error,
        })
    }
}
