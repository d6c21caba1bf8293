//! Descriptor (ABED) alignment: does the recipe deliver the requested flavor,
//! texture and dish type?

use std::collections::BTreeMap;

use aho_corasick::AhoCorasick;

use crate::config::ConfigError;
use crate::recipe::Descriptors;
use crate::util::text::{ratio_or, round2};
use crate::vocabulary::Vocabulary;

/// Curated keyword automata per flavor and texture descriptor.
#[derive(Debug, Clone, Default)]
pub struct DescriptorMatcher {
    flavor: BTreeMap<String, AhoCorasick>,
    texture: BTreeMap<String, AhoCorasick>,
}

impl DescriptorMatcher {
    /// # Errors
    /// Returns [`ConfigError`] when a keyword automaton cannot be built.
    pub fn from_vocabulary(vocabulary: &Vocabulary) -> Result<Self, ConfigError> {
        Ok(Self {
            flavor: compile_table(&vocabulary.flavor_keywords, "vocabulary.flavor_keywords")?,
            texture: compile_table(&vocabulary.texture_keywords, "vocabulary.texture_keywords")?,
        })
    }

    /// Fraction of requested descriptors found in the combined ingredient and
    /// step text. `0.0` when nothing was requested.
    ///
    /// Unknown flavor or texture descriptors count as requested but unsatisfied.
    #[must_use]
    pub fn score<S: AsRef<str>>(
        &self,
        descriptors: Option<&Descriptors>,
        ingredients: &[S],
        steps: &[S],
    ) -> f64 {
        let Some(descriptors) = descriptors else {
            return 0.0;
        };
        let requested = descriptors.requested_count();
        if requested == 0 {
            return 0.0;
        }

        let text = steps
            .iter()
            .chain(ingredients)
            .map(|line| line.as_ref())
            .collect::<Vec<&str>>()
            .join(" ")
            .to_lowercase();

        let keyword_hits = |table: &BTreeMap<String, AhoCorasick>, wanted: &[String]| {
            wanted
                .iter()
                .filter(|descriptor| {
                    table
                        .get(&descriptor.trim().to_lowercase())
                        .is_some_and(|keywords| keywords.is_match(&text))
                })
                .count()
        };

        let mut satisfied = keyword_hits(&self.flavor, descriptors.flavor.as_slice())
            + keyword_hits(&self.texture, descriptors.texture.as_slice());

        if let Some(dish_type) = &descriptors.dish_type {
            let dish_type = dish_type.trim().to_lowercase();
            if !dish_type.is_empty() && text.contains(&dish_type) {
                satisfied += 1;
            }
        }

        round2(ratio_or(satisfied, requested, 0.0))
    }
}

fn compile_table(
    table: &BTreeMap<String, Vec<String>>,
    name: &'static str,
) -> Result<BTreeMap<String, AhoCorasick>, ConfigError> {
    table
        .iter()
        .map(|(descriptor, keywords)| {
            let patterns: Vec<String> = keywords
                .iter()
                .map(|keyword| keyword.trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect();
            AhoCorasick::new(&patterns)
                .map(|automaton| (descriptor.trim().to_lowercase(), automaton))
                .map_err(|source| ConfigError::Invalid {
                    name,
                    source: source.into(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> DescriptorMatcher {
        DescriptorMatcher::from_vocabulary(&Vocabulary::default()).expect("matcher")
    }

    fn descriptors(flavor: &[&str], texture: &[&str], dish_type: Option<&str>) -> Descriptors {
        Descriptors {
            flavor: flavor.iter().map(|value| (*value).to_string()).collect(),
            texture: texture.iter().map(|value| (*value).to_string()).collect(),
            dish_type: dish_type.map(str::to_string),
            ..Descriptors::default()
        }
    }

    #[test]
    fn no_descriptors_scores_zero() {
        let ingredients = ["honey"];
        let steps = ["Drizzle honey."];
        assert!(matcher().score(None, &ingredients, &steps).abs() < f64::EPSILON);
        let empty = Descriptors::default();
        assert!(matcher().score(Some(&empty), &ingredients, &steps).abs() < f64::EPSILON);
    }

    #[test]
    fn counts_flavor_texture_and_type() {
        let ingredients = ["2 tbsp honey", "1 cup rice"];
        let steps = ["Simmer the rice.", "Serve the pudding warm."];
        let wanted = descriptors(&["sweet", "bitter"], &["grainy"], Some("Pudding"));
        // sweet (honey), grainy (rice) and the type match; bitter does not.
        assert!((matcher().score(Some(&wanted), &ingredients, &steps) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_descriptors_are_unsatisfied() {
        let ingredients = ["sugar"];
        let steps = ["Stir."];
        let wanted = descriptors(&["umami-bomb"], &[], None);
        assert!(matcher().score(Some(&wanted), &ingredients, &steps).abs() < f64::EPSILON);
    }

    #[test]
    fn keyword_match_is_a_substring_match() {
        let ingredients = ["sugared pecans"];
        let steps: [&str; 0] = [];
        let wanted = descriptors(&["Sweet"], &[], None);
        assert!((matcher().score(Some(&wanted), &ingredients, &steps) - 1.0).abs() < f64::EPSILON);
    }
}
