/// 抽出・メトリクス・新規性判定の性能ベンチマーク。
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use recipe_rubric::evaluation::{CuePolicy, MetricSuite};
use recipe_rubric::novelty::{NoveltyRecord, RecipeFingerprint, TokenCorpus};
use recipe_rubric::recipe::parse_markdown;
use recipe_rubric::vocabulary::Vocabulary;

const PROTEINS: [&str; 6] = ["chicken", "tofu", "beef", "shrimp", "lentils", "pork"];
const AROMATICS: [&str; 5] = ["garlic", "ginger", "onion", "shallot", "scallion"];
const SAUCES: [&str; 4] = ["soy sauce", "miso", "vinegar", "honey"];

fn synthetic_recipe(seed: usize) -> String {
    let protein = PROTEINS[seed % PROTEINS.len()];
    let aromatic = AROMATICS[seed % AROMATICS.len()];
    let sauce = SAUCES[seed % SAUCES.len()];
    format!(
        "**Title:** {aromatic} {protein} bowl {seed}\n\
         **Description:** A quick bowl.\n\
         **Ingredients:**\n\
         - 300 g {protein}\n\
         - 3 cloves {aromatic}, minced\n\
         - 2 tbsp {sauce}\n\
         - 1 cup rice\n\
         **Instructions:**\n\
         1. Rinse the rice and cook until tender.\n\
         2. Chop the {aromatic}.\n\
         3. Sear the {protein} while the rice rests.\n\
         4. Add the {aromatic} and {sauce}, then toss.\n\
         5. Serve over rice.\n\
         **Tags:** dinner, quick\n"
    )
}

fn bench_parse_and_score(c: &mut Criterion) {
    let recipes: Vec<String> = (0..256).map(synthetic_recipe).collect();
    let suite = MetricSuite::new(&Vocabulary::default(), CuePolicy::Presence, 0.3)
        .expect("default vocabulary compiles");

    c.bench_function("parse_and_score_256_recipes", |b| {
        b.iter(|| {
            for markdown in &recipes {
                let parsed = parse_markdown(markdown);
                let normalized = suite.normalizer().normalize_all(&parsed.ingredients);
                let scores = suite.score(&parsed, &normalized, None, 1.0);
                black_box(scores);
            }
        });
    });
}

fn bench_jaccard_corpus(c: &mut Criterion) {
    let suite = MetricSuite::new(&Vocabulary::default(), CuePolicy::Presence, 0.3)
        .expect("default vocabulary compiles");
    let fingerprints: Vec<RecipeFingerprint> = (0..5_000)
        .map(|seed| {
            let parsed = parse_markdown(&synthetic_recipe(seed));
            let normalized = suite.normalizer().normalize_all(&parsed.ingredients);
            RecipeFingerprint::from_recipe(&parsed, &normalized)
        })
        .collect();
    let corpus = TokenCorpus::from_records(fingerprints.iter().map(NoveltyRecord::from).collect());
    let candidate = &fingerprints[42];

    c.bench_function("jaccard_max_similarity_5k_records", |b| {
        b.iter(|| {
            let title = corpus.max_title_similarity(&candidate.title_tokens);
            let ingredients = corpus.max_ingredient_similarity(&candidate.ingredient_tokens);
            black_box((title, ingredients));
        });
    });
}

criterion_group!(benches, bench_parse_and_score, bench_jaccard_corpus);
criterion_main!(benches);
