//! レビューログ（採点結果つきのレシピマークダウン）の書き出し。

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::evaluation::ScoreReport;

/// ✅ とみなす下限（この値を超えたら合格）。
const PASS_THRESHOLD: f64 = 0.6;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-]").expect("filename pattern is valid"));

/// 小文字にしたうえで、ファイル名に使えない文字を `_` に置き換える。
#[must_use]
pub fn sanitize_filename(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return "untitled".to_string();
    }
    UNSAFE_FILENAME_CHARS
        .replace_all(&trimmed.to_lowercase(), "_")
        .into_owned()
}

/// レシピ本文の後ろにスコアの内訳を付けたマークダウンを組み立てる。
#[must_use]
pub fn render_review(markdown: &str, report: &ScoreReport) -> String {
    let mut out = String::with_capacity(markdown.len() + 256);
    out.push_str(markdown.trim_end());
    out.push_str("\n\n---\n\n");
    let _ = writeln!(out, "**RScore:** {:.2}", report.total());
    out.push('\n');
    for metric in report.metrics() {
        let mark = if metric.value > PASS_THRESHOLD {
            "✅"
        } else {
            "❌"
        };
        let _ = writeln!(
            out,
            "- {}: {mark} ({:.2})",
            capitalize(&metric.name),
            metric.value
        );
    }
    if let Some(note) = report.note() {
        let _ = writeln!(out, "\n> {note}");
    }
    out
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 日付ごとのディレクトリにレビューログを書き出す。
#[derive(Debug, Clone)]
pub struct ReviewLog {
    root: PathBuf,
}

impl ReviewLog {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/YYYY/MM/DD/HH-MM-SS-mmm_<title>.md` を返す。
    #[must_use]
    pub fn path_for(&self, title: &str, at: DateTime<Utc>) -> PathBuf {
        self.candidate_path(title, at, 0)
    }

    /// 同じ名前のファイルがあるときは `_<title>-<n>.md` と連番を付ける。
    fn candidate_path(&self, title: &str, at: DateTime<Utc>, attempt: u32) -> PathBuf {
        let stem = format!("{}_{}", at.format("%H-%M-%S-%3f"), sanitize_filename(title));
        let file_name = if attempt == 0 {
            format!("{stem}.md")
        } else {
            format!("{stem}-{attempt}.md")
        };
        self.root
            .join(at.format("%Y").to_string())
            .join(at.format("%m").to_string())
            .join(at.format("%d").to_string())
            .join(file_name)
    }

    /// 現在時刻でレビューログを書き出し、書き出したパスを返す。
    ///
    /// # Errors
    /// ディレクトリの作成やファイルの書き込みに失敗した場合はエラーを返す。
    pub async fn write(&self, title: &str, markdown: &str, report: &ScoreReport) -> Result<PathBuf> {
        self.write_at(title, markdown, report, Utc::now()).await
    }

    /// 既存のレビューログは上書きしない。
    ///
    /// # Errors
    /// ディレクトリの作成やファイルの書き込みに失敗した場合はエラーを返す。
    pub async fn write_at(
        &self,
        title: &str,
        markdown: &str,
        report: &ScoreReport,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let body = render_review(markdown, report);
        if let Some(parent) = self.path_for(title, at).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut attempt = 0;
        loop {
            let path = self.candidate_path(title, at, attempt);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())
                        .await
                        .with_context(|| format!("failed to write review log {}", path.display()))?;
                    file.flush()
                        .await
                        .with_context(|| format!("failed to write review log {}", path.display()))?;
                    return Ok(path);
                }
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("failed to create review log {}", path.display()));
                }
            }
        }
    }
}
