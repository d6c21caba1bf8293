//! Recipe data model and batch I/O records.

pub mod ingredient;
pub mod parser;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::evaluation::ScoreReport;

pub use self::ingredient::IngredientNormalizer;
pub use self::parser::parse_markdown;

/// 抽出済みのレシピ。
///
/// `ingredients` と `steps` は原文の順序を保持する（手順順序の評価に使うため）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedRecipe {
    pub title: String,
    pub description: String,
    /// 箇条書き記号を除去した材料行。
    pub ingredients: Vec<String>,
    /// 番号を除去した手順行。
    pub steps: Vec<String>,
    pub tags: BTreeMap<String, Vec<String>>,
}

impl ParsedRecipe {
    /// タイトル・材料・手順がすべて空かどうか。
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.ingredients.is_empty() && self.steps.is_empty()
    }

    /// 抽出器が読み戻せるマークダウン形式に整形する。
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = format!("{}{}\n", parser::TITLE_MARKER, spaced(&self.title));
        if !self.description.is_empty() {
            out.push_str(&format!(
                "\n{}{}\n",
                parser::DESCRIPTION_MARKER,
                spaced(&self.description)
            ));
        }
        out.push_str(&format!("\n{}\n", parser::INGREDIENTS_MARKER));
        for ingredient in &self.ingredients {
            out.push_str(&format!("- {ingredient}\n"));
        }
        out.push_str(&format!("\n{}\n", parser::INSTRUCTIONS_MARKER));
        for (index, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("{}. {step}\n", index + 1));
        }
        if !self.tags.is_empty() {
            let tags = self
                .tags
                .iter()
                .map(|(key, values)| format!("{key}={}", values.join(",")))
                .collect::<Vec<_>>()
                .join("|");
            out.push_str(&format!("\n{}{}\n", parser::TAGS_MARKER, spaced(&tags)));
        }
        out
    }
}

fn spaced(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!(" {text}")
    }
}

/// 評価対象のレシピ本体。
///
/// 生成パイプラインからはマークダウン文字列が届くが、構造化済みのレシピも受け付ける。
/// どちらも [`RecipeSource::to_parsed`] を通して [`ParsedRecipe`] に変換される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipeSource {
    RawMarkdown(String),
    Parsed(ParsedRecipe),
}

impl RecipeSource {
    #[must_use]
    pub fn to_parsed(&self) -> ParsedRecipe {
        match self {
            Self::RawMarkdown(text) => parse_markdown(text),
            Self::Parsed(recipe) => recipe.clone(),
        }
    }

    /// 評価すべき内容が何もないかどうか。
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::RawMarkdown(text) => text.trim().is_empty(),
            Self::Parsed(recipe) => recipe.is_blank(),
        }
    }

    /// レビューログ用のマークダウン表現。
    #[must_use]
    pub fn markdown(&self) -> String {
        match self {
            Self::RawMarkdown(text) => text.clone(),
            Self::Parsed(recipe) => recipe.to_markdown(),
        }
    }
}

/// 生成時に要求された記述子（ABED）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptors {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flavor: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texture: Vec<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub dish_type: Option<String>,
    /// mood や prep_time などの評価に使わない記述子。
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Descriptors {
    /// 整合性評価の対象となる要求数。
    #[must_use]
    pub fn requested_count(&self) -> usize {
        self.flavor.len() + self.texture.len() + usize::from(self.dish_type.is_some())
    }
}

/// バッチ入出力の1レコード。
///
/// 未知のフィールドは `extra` に保持され、出力にそのまま書き戻される。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Descriptors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<RecipeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreReport>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// 読み込み時に型が合わなかった理由。これが入ったエントリは採点しない。
    #[serde(skip)]
    pub rejection: Option<String>,
}

/// 型が合わないエントリに付ける注記の接頭辞。
pub const INVALID_ENTRY_NOTE: &str = "Invalid entry";

/// バッチ入力 JSON（エントリの配列）を読む。
///
/// # Errors
/// 全体が JSON の配列でない場合だけエラーを返す。
/// 個々のエントリの型の誤りは [`RecipeEntry::from_value`] がそのエントリの中に閉じ込める。
pub fn parse_batch(text: &str) -> Result<Vec<RecipeEntry>, serde_json::Error> {
    let values: Vec<Value> = serde_json::from_str(text)?;
    Ok(values.into_iter().map(RecipeEntry::from_value).collect())
}

impl RecipeEntry {
    /// JSON 値を1エントリに変換する。
    ///
    /// 型が合わない場合は元のフィールドを `extra` にそのまま残し、
    /// 合計 0 と注記だけのレポートを付ける。
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(entry) => entry,
            Err(error) => Self::rejected(value, &error.to_string()),
        }
    }

    fn rejected(value: Value, reason: &str) -> Self {
        let mut extra = match value {
            Value::Object(fields) => fields,
            other => Map::from_iter([("entry".to_string(), other)]),
        };
        extra.remove("scores");
        Self {
            scores: Some(ScoreReport::unscored(format!("{INVALID_ENTRY_NOTE}: {reason}"))),
            rejection: Some(reason.to_string()),
            extra,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_markdown(text: impl Into<String>) -> Self {
        Self {
            recipe: Some(RecipeSource::RawMarkdown(text.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_descriptors(mut self, descriptors: Descriptors) -> Self {
        self.input = Some(descriptors);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_source_accepts_string_and_object() {
        let raw: RecipeSource = serde_json::from_str(r#""**Title:** Soup""#).expect("string");
        assert!(matches!(raw, RecipeSource::RawMarkdown(_)));

        let parsed: RecipeSource =
            serde_json::from_str(r#"{"title":"Soup","steps":["Boil water."]}"#).expect("object");
        let RecipeSource::Parsed(recipe) = parsed else {
            panic!("expected structured recipe");
        };
        assert_eq!(recipe.title, "Soup");
        assert!(recipe.ingredients.is_empty());
    }

    #[test]
    fn to_markdown_round_trips_through_the_extractor() {
        let recipe = ParsedRecipe {
            title: "Lemon Rice".into(),
            description: "Bright and quick.".into(),
            ingredients: vec!["1 cup rice".into(), "1 lemon, zested".into()],
            steps: vec!["Cook the rice.".into(), "Stir in the lemon.".into()],
            tags: BTreeMap::from([("flavor".to_string(), vec!["tangy".to_string()])]),
        };
        assert_eq!(parse_markdown(&recipe.to_markdown()), recipe);
    }

    #[test]
    fn entry_preserves_unknown_fields() {
        let json = r#"{"recipe":"**Title:** Toast","batch":"b-7","input":{"type":"snack","mood":"cozy"}}"#;
        let entry: RecipeEntry = serde_json::from_str(json).expect("entry parses");
        assert_eq!(entry.extra["batch"], "b-7");
        let descriptors = entry.input.as_ref().expect("descriptors");
        assert_eq!(descriptors.dish_type.as_deref(), Some("snack"));
        assert_eq!(descriptors.extra["mood"], "cozy");
        assert_eq!(descriptors.requested_count(), 1);

        let back = serde_json::to_value(&entry).expect("serializes");
        assert_eq!(back["batch"], "b-7");
        assert_eq!(back["input"]["mood"], "cozy");
    }

    #[test]
    fn malformed_entries_are_rejected_one_by_one() {
        let entries = parse_batch(
            r#"[{"recipe":"**Title:** Toast"},{"input":{"flavor":"sweet"},"batch":"b-7"},{"recipe":42},7]"#,
        )
        .expect("batch array");

        assert_eq!(entries.len(), 4);
        assert!(entries[0].rejection.is_none());
        assert!(entries[0].scores.is_none());
        for entry in &entries[1..] {
            assert!(entry.rejection.is_some());
            let note = entry.scores.as_ref().and_then(ScoreReport::note).expect("note");
            assert!(note.starts_with("Invalid entry: "));
        }

        let kept = serde_json::to_value(&entries[1]).expect("serializes");
        assert_eq!(kept["input"]["flavor"], "sweet");
        assert_eq!(kept["batch"], "b-7");
        assert_eq!(serde_json::to_value(&entries[2]).expect("serializes")["recipe"], 42);
        assert_eq!(serde_json::to_value(&entries[3]).expect("serializes")["entry"], 7);
    }

    #[test]
    fn batch_must_be_an_array() {
        assert!(parse_batch(r#"{"recipe":"**Title:** Toast"}"#).is_err());
    }

    #[test]
    fn blank_sources_are_detected() {
        assert!(RecipeSource::RawMarkdown("  \n ".into()).is_blank());
        assert!(RecipeSource::Parsed(ParsedRecipe::default()).is_blank());
        assert!(!RecipeSource::RawMarkdown("**Title:** Tea".into()).is_blank());
    }
}
