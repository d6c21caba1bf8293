//! Ingredient line normalization.

use rustc_hash::FxHashSet;

use crate::util::text::fold_letters;
use crate::vocabulary::Vocabulary;

use super::parser::strip_bullet;

/// 停止語の分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopWordClass {
    /// 分量の単位（cup, tbsp, pinch など）。
    Measure,
    /// 下ごしらえの動詞や接続語（minced, to, taste など）。
    Preparation,
}

/// 材料行から見出し語（headword）だけを残す正規化器。
#[derive(Debug, Clone, Default)]
pub struct IngredientNormalizer {
    measure_words: FxHashSet<String>,
    preparation_words: FxHashSet<String>,
}

impl IngredientNormalizer {
    #[must_use]
    pub fn new<M, P>(measure_words: M, preparation_words: P) -> Self
    where
        M: IntoIterator,
        M::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            measure_words: measure_words
                .into_iter()
                .map(|word| word.as_ref().to_lowercase())
                .collect(),
            preparation_words: preparation_words
                .into_iter()
                .map(|word| word.as_ref().to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn from_vocabulary(vocabulary: &Vocabulary) -> Self {
        Self::new(&vocabulary.measure_words, &vocabulary.preparation_words)
    }

    /// 停止語であればその分類を返す。
    #[must_use]
    pub fn classify(&self, token: &str) -> Option<StopWordClass> {
        if self.measure_words.contains(token) {
            Some(StopWordClass::Measure)
        } else if self.preparation_words.contains(token) {
            Some(StopWordClass::Preparation)
        } else {
            None
        }
    }

    /// 材料行を正規化し、残った見出し語を半角スペース区切りで返す。
    ///
    /// すべての語が除去された場合は空文字列を返す。
    #[must_use]
    pub fn normalize(&self, line: &str) -> String {
        self.headwords(line).join(" ")
    }

    /// 見出し語を原文順で返す。
    #[must_use]
    pub fn headwords(&self, line: &str) -> Vec<String> {
        let line = line.trim();
        let line = strip_bullet(line).unwrap_or(line);
        fold_letters(line)
            .split_whitespace()
            .filter(|token| self.classify(token).is_none() && !is_numeric(token))
            .map(str::to_string)
            .collect()
    }

    /// 各材料行を正規化する。
    #[must_use]
    pub fn normalize_all<S: AsRef<str>>(&self, lines: &[S]) -> Vec<String> {
        lines
            .iter()
            .map(|line| self.normalize(line.as_ref()))
            .collect()
    }
}

// 畳み込み後は数字が残らないが、語彙から直接渡されるトークンにも備える。
fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_numeric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn normalizer() -> IngredientNormalizer {
        IngredientNormalizer::from_vocabulary(&Vocabulary::default())
    }

    #[rstest]
    #[case("2 tbsp soy sauce", "soy sauce")]
    #[case("- 3 cloves garlic, minced", "garlic")]
    #[case("1/2 cup Jalapeño peppers, diced", "jalapeno peppers")]
    #[case("Salt and pepper to taste", "salt pepper")]
    #[case("  * 200 g  Flour ", "flour")]
    #[case("1 pinch", "")]
    #[case("300 g 木綿豆腐", "木綿豆腐")]
    #[case("", "")]
    fn normalizes_ingredient_lines(#[case] line: &str, #[case] expected: &str) {
        assert_eq!(normalizer().normalize(line), expected);
    }

    #[test]
    fn classifies_stop_words() {
        let normalizer = normalizer();
        assert_eq!(normalizer.classify("cup"), Some(StopWordClass::Measure));
        assert_eq!(normalizer.classify("chopped"), Some(StopWordClass::Preparation));
        assert_eq!(normalizer.classify("onion"), None);
    }

    #[test]
    fn custom_vocabulary_is_respected() {
        let normalizer = IngredientNormalizer::new(["handful"], ["torn"]);
        assert_eq!(normalizer.normalize("1 handful basil, torn"), "basil");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(line in "\\PC{0,60}") {
            let normalizer = normalizer();
            let once = normalizer.normalize(&line);
            prop_assert_eq!(normalizer.normalize(&once), once);
        }

        #[test]
        fn normalized_output_is_lowercase_words(line in "\\PC{0,60}") {
            let normalized = normalizer().normalize(&line);
            prop_assert!(normalized
                .chars()
                .all(|ch| ch == ' ' || (ch.is_alphabetic() && !ch.is_ascii_uppercase())));
            prop_assert!(!normalized.starts_with(' ') && !normalized.ends_with(' '));
        }
    }
}
