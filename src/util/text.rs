//! テキスト処理ユーティリティ。
//!
//! 小文字への畳み込み、単語分割、フレーズ照合、丸め処理を提供します。

use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::canonical_combining_class;

/// テキストを小文字の文字と空白だけに畳み込む。
///
/// NFKD分解で結合文字を切り離してから、文字と空白以外をすべて除去します。
/// 数字・句読点・分数表記（`1/2`）は副作用として消えます。
/// 英字以外の文字（`豆腐` や `сыр`）も残ります。
/// 残すのは再度畳み込んでも変わらない文字だけなので、同じ関数を再適用しても結果は変わりません。
#[must_use]
pub fn fold_letters(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.nfkd() {
        if ch.is_whitespace() {
            folded.push(' ');
        } else if ch.is_alphabetic() {
            folded.extend(ch.to_lowercase().filter(|lower| is_folded_letter(*lower)));
        }
    }
    folded
}

// 小文字化しても NFKD 分解しても自分自身のままで、並べ替えの対象にもならない文字。
fn is_folded_letter(ch: char) -> bool {
    fn is_only<I: Iterator<Item = char>>(mut chars: I, ch: char) -> bool {
        chars.next() == Some(ch) && chars.next().is_none()
    }

    if ch.is_ascii() {
        return ch.is_ascii_lowercase();
    }
    ch.is_alphabetic()
        && canonical_combining_class(ch) == 0
        && is_only(ch.to_lowercase(), ch)
        && is_only(std::iter::once(ch).nfkd(), ch)
}

/// テキストを畳み込み後の単語列に分割する。
#[must_use]
pub fn word_tokens(text: &str) -> Vec<String> {
    fold_letters(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// テキストの単語集合を返す。
#[must_use]
pub fn word_set(text: &str) -> BTreeSet<String> {
    fold_letters(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// 単語列の中に、フレーズの単語列が連続して出現するかを判定する。
///
/// 空のフレーズは一致しない。
#[must_use]
pub fn contains_phrase<S: AsRef<str>>(tokens: &[S], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return false;
    }
    tokens.windows(phrase.len()).any(|window| {
        window
            .iter()
            .zip(phrase)
            .all(|(token, expected)| token.as_ref() == expected)
    })
}

/// 小数点以下 `places` 桁に丸める。
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

/// メトリクス値の丸め（小数点以下2桁）。
#[must_use]
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// 合計値の丸め（小数点以下4桁）。
#[must_use]
pub fn round4(value: f64) -> f64 {
    round_to(value, 4)
}

/// `numerator / denominator` を返す。分母が0なら `fallback`。
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ratio_or(numerator: usize, denominator: usize, fallback: f64) -> f64 {
    if denominator == 0 {
        fallback
    } else {
        numerator as f64 / denominator as f64
    }
}
