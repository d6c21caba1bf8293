//! ルーブリックの各メトリクス。
//!
//! 新規性以外のメトリクスは入力だけから決まる純粋関数で、値はすべて [0, 1] に収まり
//! 小数点以下2桁に丸められる。

use std::collections::BTreeSet;
use std::fmt;

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::recipe::{Descriptors, IngredientNormalizer, ParsedRecipe};
use crate::util::text::{contains_phrase, ratio_or, round2, word_set, word_tokens};
use crate::vocabulary::Vocabulary;

use super::alignment::DescriptorMatcher;

/// メトリクスの種類。宣言順がレポートの出力順になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    IngredientUsageCompleteness,
    InstructionCoherence,
    Cues,
    Plausibility,
    Novelty,
    Conciseness,
    AbedAlignment,
}

impl MetricKind {
    pub const ALL: [Self; 7] = [
        Self::IngredientUsageCompleteness,
        Self::InstructionCoherence,
        Self::Cues,
        Self::Plausibility,
        Self::Novelty,
        Self::Conciseness,
        Self::AbedAlignment,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IngredientUsageCompleteness => "ingredient_usage_completeness",
            Self::InstructionCoherence => "instruction_coherence",
            Self::Cues => "cues",
            Self::Plausibility => "plausibility",
            Self::Novelty => "novelty",
            Self::Conciseness => "conciseness",
            Self::AbedAlignment => "abed_alignment",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 名前付きのメトリクス値。
#[derive(Debug, Clone, PartialEq)]
pub struct MetricScore {
    pub name: String,
    pub value: f64,
}

impl MetricScore {
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    #[must_use]
    pub fn of(kind: MetricKind, value: f64) -> Self {
        Self::new(kind.as_str(), value)
    }
}

/// cues メトリクスの採点方式。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuePolicy {
    /// いずれかの合図語があれば 1.0、なければ 0.0。
    #[default]
    Presence,
    /// 見つかった合図語の種類数 / 合図語リストの長さ。
    DistinctFraction,
}

/// 材料の使用網羅率。
///
/// 正規化済み材料の見出し語がすべて手順中に単語として現れていれば「言及あり」とする。
/// 材料が空なら 0。空の正規化結果は分母に数えるが言及ありにはならない。
#[must_use]
pub fn score_ingredient_usage<I, S>(normalized: &[I], steps: &[S]) -> f64
where
    I: AsRef<str>,
    S: AsRef<str>,
{
    let instruction_words = word_set(&join_steps(steps));
    let mentioned = normalized
        .iter()
        .filter(|ingredient| {
            let mut headwords = ingredient.as_ref().split_whitespace().peekable();
            headwords.peek().is_some() && headwords.all(|word| instruction_words.contains(word))
        })
        .count();
    round2(ratio_or(mentioned, normalized.len(), 0.0))
}

/// 重複行の少なさ。
///
/// 空でない手順のうち、直前と同一の行を重複として数える。行がなければ 1.0。
#[must_use]
pub fn score_conciseness<S: AsRef<str>>(steps: &[S]) -> f64 {
    let lines: Vec<&str> = steps
        .iter()
        .map(|step| step.as_ref().trim())
        .filter(|step| !step.is_empty())
        .collect();
    if lines.is_empty() {
        return 1.0;
    }
    let repeated = lines.windows(2).filter(|pair| pair[0] == pair[1]).count();
    round2(1.0 - ratio_or(repeated, lines.len(), 0.0))
}

fn join_steps<S: AsRef<str>>(steps: &[S]) -> String {
    steps
        .iter()
        .map(|step| step.as_ref())
        .collect::<Vec<&str>>()
        .join(" ")
}

fn phrase_tokens<S: AsRef<str>>(phrases: &[S]) -> Vec<Vec<String>> {
    phrases
        .iter()
        .map(|phrase| word_tokens(phrase.as_ref()))
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

/// 手順の順序の一貫性ルール。
#[derive(Debug, Clone)]
pub struct CoherenceRules {
    pairs: Vec<(Vec<String>, Vec<String>)>,
    multitask: Vec<Vec<String>>,
    penalty: f64,
}

impl CoherenceRules {
    #[must_use]
    pub fn from_vocabulary(vocabulary: &Vocabulary, penalty: f64) -> Self {
        Self {
            pairs: vocabulary
                .inversion_pairs
                .iter()
                .map(|pair| (word_tokens(&pair.premature), word_tokens(&pair.prerequisite)))
                .filter(|(premature, prerequisite)| !premature.is_empty() && !prerequisite.is_empty())
                .collect(),
            multitask: phrase_tokens(&vocabulary.multitask_cues),
            penalty,
        }
    }

    /// 逆転ペアごとに `penalty` を差し引く。1.0 から始まり 0.0 で下げ止まる。
    ///
    /// 並行作業の合図を含む手順は照合対象から外す。
    #[must_use]
    pub fn score<S: AsRef<str>>(&self, steps: &[S]) -> f64 {
        let eligible: Vec<(usize, Vec<String>)> = steps
            .iter()
            .enumerate()
            .map(|(index, step)| (index, word_tokens(step.as_ref())))
            .filter(|(_, tokens)| {
                !self
                    .multitask
                    .iter()
                    .any(|cue| contains_phrase(tokens, cue))
            })
            .collect();

        let first_index = |phrase: &[String]| {
            eligible
                .iter()
                .find(|(_, tokens)| contains_phrase(tokens, phrase))
                .map(|(index, _)| *index)
        };

        let inversions = self
            .pairs
            .iter()
            .filter(|(premature, prerequisite)| {
                matches!(
                    (
                        first_index(premature.as_slice()),
                        first_index(prerequisite.as_slice())
                    ),
                    (Some(early), Some(late)) if early < late
                )
            })
            .count();

        #[allow(clippy::cast_precision_loss)]
        let score = (1.0 - self.penalty * inversions as f64).max(0.0);
        round2(score)
    }
}

/// 時間・順序の合図語ルール。
#[derive(Debug, Clone)]
pub struct CueRules {
    cues: Vec<Vec<String>>,
    policy: CuePolicy,
}

impl CueRules {
    #[must_use]
    pub fn from_vocabulary(vocabulary: &Vocabulary, policy: CuePolicy) -> Self {
        Self {
            cues: phrase_tokens(&vocabulary.cue_words),
            policy,
        }
    }

    #[must_use]
    pub fn score<S: AsRef<str>>(&self, steps: &[S]) -> f64 {
        let step_tokens: Vec<Vec<String>> =
            steps.iter().map(|step| word_tokens(step.as_ref())).collect();
        let found = |cue: &Vec<String>| step_tokens.iter().any(|tokens| contains_phrase(tokens, cue));

        match self.policy {
            CuePolicy::Presence => {
                if self.cues.iter().any(found) {
                    1.0
                } else {
                    0.0
                }
            }
            CuePolicy::DistinctFraction => {
                let distinct: BTreeSet<&Vec<String>> =
                    self.cues.iter().filter(|&cue| found(cue)).collect();
                let total: BTreeSet<&Vec<String>> = self.cues.iter().collect();
                round2(ratio_or(distinct.len(), total.len(), 0.0))
            }
        }
    }
}

/// 明らかにおかしい手順の検出（拒否リストとの部分一致）。
#[derive(Debug, Clone)]
pub struct PlausibilityRules {
    deny_list: AhoCorasick,
}

impl PlausibilityRules {
    /// # Errors
    /// 拒否リストのオートマトン構築に失敗した場合は [`ConfigError`] を返す。
    pub fn from_vocabulary(vocabulary: &Vocabulary) -> Result<Self, ConfigError> {
        let patterns: Vec<String> = vocabulary
            .implausible_phrases
            .iter()
            .map(|phrase| phrase.trim().to_lowercase())
            .filter(|phrase| !phrase.is_empty())
            .collect();
        let deny_list = AhoCorasick::new(&patterns).map_err(|source| ConfigError::Invalid {
            name: "vocabulary.implausible_phrases",
            source: source.into(),
        })?;
        Ok(Self { deny_list })
    }

    #[must_use]
    pub fn score<S: AsRef<str>>(&self, steps: &[S]) -> f64 {
        let instructions = join_steps(steps).to_lowercase();
        if self.deny_list.is_match(&instructions) {
            0.0
        } else {
            1.0
        }
    }
}

/// 語彙から組み立てたメトリクス一式。
#[derive(Debug, Clone)]
pub struct MetricSuite {
    normalizer: IngredientNormalizer,
    coherence: CoherenceRules,
    cues: CueRules,
    plausibility: PlausibilityRules,
    alignment: DescriptorMatcher,
}

impl MetricSuite {
    /// # Errors
    /// 語彙からマッチャーを構築できない場合は [`ConfigError`] を返す。
    pub fn new(
        vocabulary: &Vocabulary,
        cue_policy: CuePolicy,
        coherence_penalty: f64,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            normalizer: IngredientNormalizer::from_vocabulary(vocabulary),
            coherence: CoherenceRules::from_vocabulary(vocabulary, coherence_penalty),
            cues: CueRules::from_vocabulary(vocabulary, cue_policy),
            plausibility: PlausibilityRules::from_vocabulary(vocabulary)?,
            alignment: DescriptorMatcher::from_vocabulary(vocabulary)?,
        })
    }

    #[must_use]
    pub fn normalizer(&self) -> &IngredientNormalizer {
        &self.normalizer
    }

    /// 全メトリクスを宣言順で返す。新規性は呼び出し側で算出済みの値を受け取る。
    #[must_use]
    pub fn score(
        &self,
        recipe: &ParsedRecipe,
        normalized_ingredients: &[String],
        descriptors: Option<&Descriptors>,
        novelty: f64,
    ) -> Vec<MetricScore> {
        MetricKind::ALL
            .iter()
            .map(|&kind| {
                let value = match kind {
                    MetricKind::IngredientUsageCompleteness => {
                        score_ingredient_usage(normalized_ingredients, &recipe.steps)
                    }
                    MetricKind::InstructionCoherence => self.coherence.score(&recipe.steps),
                    MetricKind::Cues => self.cues.score(&recipe.steps),
                    MetricKind::Plausibility => self.plausibility.score(&recipe.steps),
                    MetricKind::Novelty => round2(novelty.clamp(0.0, 1.0)),
                    MetricKind::Conciseness => score_conciseness(&recipe.steps),
                    MetricKind::AbedAlignment => self.alignment.score(
                        descriptors,
                        &recipe.ingredients,
                        &recipe.steps,
                    ),
                };
                MetricScore::of(kind, value)
            })
            .collect()
    }
}
