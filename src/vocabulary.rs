//! Versioned word lists used by the normalizer and the metric functions.
//!
//! Every list has a built-in default. A rubric YAML file may override any
//! single list; lists it omits keep their defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Version tag of the built-in vocabulary.
pub const DEFAULT_VOCABULARY_VERSION: &str = "2025.1";

/// An ordered phrase pair that signals an inverted instruction sequence when
/// `premature` first occurs on an earlier step than `prerequisite`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InversionPair {
    pub premature: String,
    pub prerequisite: String,
}

impl InversionPair {
    #[must_use]
    pub fn new(premature: impl Into<String>, prerequisite: impl Into<String>) -> Self {
        Self {
            premature: premature.into(),
            prerequisite: prerequisite.into(),
        }
    }
}

/// Cue and stop-word vocabularies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub version: String,
    /// Units of quantity dropped by the ingredient normalizer.
    pub measure_words: Vec<String>,
    /// Preparation verbs and filler words dropped by the ingredient normalizer.
    pub preparation_words: Vec<String>,
    /// Temporal/sequencing words counted by the cues metric.
    pub cue_words: Vec<String>,
    /// Steps containing one of these are excluded from coherence matching.
    pub multitask_cues: Vec<String>,
    pub inversion_pairs: Vec<InversionPair>,
    /// Known-implausible instruction substrings.
    pub implausible_phrases: Vec<String>,
    pub flavor_keywords: BTreeMap<String, Vec<String>>,
    pub texture_keywords: BTreeMap<String, Vec<String>>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            version: DEFAULT_VOCABULARY_VERSION.to_string(),
            measure_words: words(&[
                "tsp",
                "tbsp",
                "teaspoon",
                "teaspoons",
                "tablespoon",
                "tablespoons",
                "cup",
                "cups",
                "oz",
                "ounce",
                "ounces",
                "pint",
                "quart",
                "gallon",
                "ml",
                "liter",
                "liters",
                "gram",
                "grams",
                "g",
                "kg",
                "pound",
                "pounds",
                "lb",
                "lbs",
                "dash",
                "pinch",
                "clove",
                "cloves",
                "can",
                "cans",
                "package",
                "packages",
            ]),
            preparation_words: words(&[
                "minced", "chopped", "diced", "sliced", "crushed", "grated", "peeled", "halved",
                "shredded", "zested", "mashed", "beaten", "whisked", "blended", "rinsed",
                "drained", "to", "taste", "and",
            ]),
            cue_words: words(&[
                "until", "when", "after", "before", "while", "as", "during", "then", "next",
                "finally",
            ]),
            multitask_cues: words(&["while", "meanwhile", "as the", "during the"]),
            inversion_pairs: vec![
                InversionPair::new("add", "chop"),
                InversionPair::new("serve", "bake"),
                InversionPair::new("garnish", "cook"),
            ],
            implausible_phrases: words(&[
                "microwave for 2 hours",
                "boil lettuce",
                "grill yogurt",
            ]),
            flavor_keywords: keyword_table(&[
                ("sweet", &["sugar", "honey", "syrup", "molasses", "maple"]),
                ("tangy", &["lemon", "lime", "vinegar", "pickled", "tamarind"]),
                ("salty", &["salt", "soy sauce", "brine"]),
                ("peppery", &["chili", "pepper", "hot sauce", "jalapeno"]),
                (
                    "spiced",
                    &[
                        "cinnamon", "cumin", "garlic", "onion", "ginger", "nutmeg", "clove",
                    ],
                ),
                ("fatty", &["butter", "cream", "bacon", "oil"]),
                ("bitter", &["coffee", "dark chocolate", "kale"]),
                ("earthy", &["mushroom", "truffle", "miso", "soy"]),
            ]),
            texture_keywords: keyword_table(&[
                ("crispy", &["crisp", "crunch", "bake", "fry"]),
                ("chewy", &["chewy", "doughy", "stretchy"]),
                ("creamy", &["cream", "custard", "puree", "smooth"]),
                ("fluffy", &["fluffy", "airy", "whipped"]),
                ("juicy", &["juicy", "moist", "dripping"]),
                ("smooth", &["smooth", "silky"]),
                ("dry", &["dry", "crumbly"]),
                ("soft", &["soft", "tender"]),
                ("grainy", &["grainy", "grain", "rice", "coarse"]),
            ]),
        }
    }
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

fn keyword_table(rows: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    rows.iter()
        .map(|(key, keywords)| ((*key).to_string(), words(keywords)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vocabulary_covers_every_list() {
        let vocabulary = Vocabulary::default();
        assert!(vocabulary.measure_words.contains(&"tbsp".to_string()));
        assert!(vocabulary.preparation_words.contains(&"minced".to_string()));
        assert_eq!(vocabulary.cue_words.len(), 10);
        assert_eq!(vocabulary.inversion_pairs.len(), 3);
        assert_eq!(vocabulary.flavor_keywords["sweet"][0], "sugar");
        assert!(vocabulary.texture_keywords.contains_key("crispy"));
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_lists() {
        let yaml = "version: test\ncue_words: [until, then]\n";
        let vocabulary: Vocabulary = serde_yaml::from_str(yaml).expect("vocabulary parses");
        assert_eq!(vocabulary.version, "test");
        assert_eq!(vocabulary.cue_words, vec!["until", "then"]);
        assert_eq!(vocabulary.measure_words, Vocabulary::default().measure_words);
    }
}
