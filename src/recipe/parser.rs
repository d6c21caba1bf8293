//! Line-oriented extractor for semi-structured markdown recipes.
//!
//! The extractor never fails: missing or out-of-order sections degrade to
//! empty fields, and lines that belong to no recognised section are ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ParsedRecipe;

pub(crate) const TITLE_MARKER: &str = "**Title:**";
pub(crate) const DESCRIPTION_MARKER: &str = "**Description:**";
pub(crate) const INGREDIENTS_MARKER: &str = "**Ingredients:**";
pub(crate) const INSTRUCTIONS_MARKER: &str = "**Instructions:**";
pub(crate) const TAGS_MARKER: &str = "**Tags:**";

static ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\s*").expect("compile step ordinal pattern"));

/// 抽出器の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Description,
    Ingredients,
    Steps,
    Tags,
}

/// マークダウン形式のレシピを [`ParsedRecipe`] に変換する。
#[must_use]
pub fn parse_markdown(markdown: &str) -> ParsedRecipe {
    let mut recipe = ParsedRecipe::default();
    let mut section = Section::None;

    for raw_line in markdown.lines() {
        let line = raw_line.trim();

        if let Some(rest) = line.strip_prefix(TITLE_MARKER) {
            recipe.title = rest.trim().to_string();
            section = Section::None;
        } else if let Some(rest) = line.strip_prefix(DESCRIPTION_MARKER) {
            recipe.description = rest.trim().to_string();
            section = Section::Description;
        } else if line.starts_with(INGREDIENTS_MARKER) {
            section = Section::Ingredients;
        } else if line.starts_with(INSTRUCTIONS_MARKER) {
            section = Section::Steps;
        } else if let Some(rest) = line.strip_prefix(TAGS_MARKER) {
            section = Section::Tags;
            parse_tag_line(rest, &mut recipe);
        } else if !line.is_empty() {
            match section {
                Section::Description => {
                    if !recipe.description.is_empty() {
                        recipe.description.push(' ');
                    }
                    recipe.description.push_str(line);
                }
                Section::Ingredients => {
                    if let Some(item) = strip_bullet(line).filter(|item| !item.is_empty()) {
                        recipe.ingredients.push(item.to_string());
                    }
                }
                Section::Steps => {
                    if let Some(step) = strip_ordinal(line).filter(|step| !step.is_empty()) {
                        recipe.steps.push(step.to_string());
                    }
                }
                Section::Tags => parse_tag_line(line, &mut recipe),
                Section::None => {}
            }
        }
    }

    recipe
}

/// 先頭の箇条書き記号（`-`, `*`, `•`）を取り除く。記号がなければ `None`。
///
/// `**` で始まる行は強調見出しとみなし、箇条書きとして扱わない。
#[must_use]
pub(crate) fn strip_bullet(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with("**") {
        return None;
    }
    line.strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('•'))
        .map(str::trim)
}

fn strip_ordinal(line: &str) -> Option<&str> {
    ORDINAL
        .find(line)
        .map(|matched| line[matched.end()..].trim())
}

/// `key=v1,v2|key2=v3` 形式のタグ行を取り込む。`=` を含まない区切りは無視する。
fn parse_tag_line(line: &str, recipe: &mut ParsedRecipe) {
    for part in line.split('|') {
        let Some((key, values)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        recipe.tags.entry(key.to_string()).or_default().extend(
            values
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        );
    }
}
