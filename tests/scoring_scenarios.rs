/// 評価器をライブラリの外側から使うシナリオテスト。
use std::path::Path;
use std::sync::Arc;

use recipe_rubric::config::{CorpusScope, NoveltySettings, NoveltyStrategyKind, RubricConfig};
use recipe_rubric::evaluation::{
    Evaluator, MetricKind, MetricScore, MetricWeights, ScoreReport, aggregate,
};
use recipe_rubric::recipe::{Descriptors, ParsedRecipe, RecipeEntry, RecipeSource, parse_batch};

const NOODLES: &str = "\
**Title:** Spicy Garlic Noodles
**Description:** Quick weeknight noodles.
**Ingredients:**
- 2 tbsp soy sauce
- 3 cloves garlic, minced
**Instructions:**
1. Mince the garlic.
2. Add soy sauce and garlic to the pan.
3. Cook until fragrant.
";

const NOODLES_WITH_CHILI: &str = "\
**Title:** Spicy Garlic Noodles
**Ingredients:**
- 2 tbsp soy sauce
- 3 cloves garlic, minced
- 1 tsp chili oil
**Instructions:**
1. Mince the garlic.
2. Add soy sauce, chili oil and garlic to the pan.
3. Cook until fragrant.
";

fn process_config() -> RubricConfig {
    RubricConfig::with_novelty(NoveltySettings::new(
        NoveltyStrategyKind::Jaccard,
        CorpusScope::Process,
    ))
}

fn durable_config(corpus_path: &Path) -> RubricConfig {
    let mut settings = NoveltySettings::new(NoveltyStrategyKind::Jaccard, CorpusScope::Durable);
    settings.corpus_path = Some(corpus_path.to_path_buf());
    RubricConfig::with_novelty(settings)
}

async fn evaluator(config: RubricConfig) -> Evaluator {
    Evaluator::new(config, None).await.expect("evaluator builds")
}

fn markdown(text: &str) -> RecipeSource {
    RecipeSource::RawMarkdown(text.to_string())
}

fn metric(report: &ScoreReport, kind: MetricKind) -> f64 {
    report.metric(kind).expect("metric present")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn spicy_garlic_noodles_end_to_end() {
    let evaluator = evaluator(process_config()).await;
    let evaluation = evaluator
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("scored");
    let report = &evaluation.report;

    assert_eq!(evaluation.parsed.title, "Spicy Garlic Noodles");
    assert_close(metric(report, MetricKind::IngredientUsageCompleteness), 1.0);
    assert_close(metric(report, MetricKind::InstructionCoherence), 1.0);
    assert!(metric(report, MetricKind::Cues) > 0.0);
    assert_close(metric(report, MetricKind::Plausibility), 1.0);
    assert_close(metric(report, MetricKind::Novelty), 1.0);
    assert_close(metric(report, MetricKind::Conciseness), 1.0);
    assert_close(metric(report, MetricKind::AbedAlignment), 0.0);

    let names: Vec<&str> = report.metrics().iter().map(|m| m.name.as_str()).collect();
    let declared: Vec<&str> = MetricKind::ALL.iter().map(|kind| kind.as_str()).collect();
    assert_eq!(names, declared);

    // 0.2 + 0.2 + 0.05 + 0.15 + 0.15 + 0.1 + 0.15 * 0
    assert_close(report.total(), 0.85);
    assert!(evaluation.corpus_error.is_none());
}

#[tokio::test]
async fn structured_and_markdown_sources_score_the_same() {
    let parsed = ParsedRecipe {
        title: "Spicy Garlic Noodles".into(),
        ingredients: vec!["2 tbsp soy sauce".into(), "3 cloves garlic, minced".into()],
        steps: vec![
            "Mince the garlic.".into(),
            "Add soy sauce and garlic to the pan.".into(),
            "Cook until fragrant.".into(),
        ],
        ..ParsedRecipe::default()
    };

    let from_markdown = evaluator(process_config())
        .await
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("markdown scored");
    let from_parsed = evaluator(process_config())
        .await
        .evaluate(&RecipeSource::Parsed(parsed), None)
        .await
        .expect("parsed scored");

    assert_eq!(from_markdown.report, from_parsed.report);
}

#[tokio::test]
async fn descriptors_feed_alignment() {
    let descriptors = Descriptors {
        flavor: vec!["salty".into()],
        ..Descriptors::default()
    };
    let evaluation = evaluator(process_config())
        .await
        .evaluate(&markdown(NOODLES), Some(&descriptors))
        .await
        .expect("scored");

    assert!(metric(&evaluation.report, MetricKind::AbedAlignment) > 0.0);
}

#[tokio::test]
async fn near_duplicate_scores_lower_than_against_empty_corpus() {
    let baseline = evaluator(process_config())
        .await
        .evaluate(&markdown(NOODLES_WITH_CHILI), None)
        .await
        .expect("baseline");

    let sequential = evaluator(process_config()).await;
    sequential
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("first");
    let second = sequential
        .evaluate(&markdown(NOODLES_WITH_CHILI), None)
        .await
        .expect("second");

    let empty_corpus = metric(&baseline.report, MetricKind::Novelty);
    let after_duplicate = metric(&second.report, MetricKind::Novelty);
    assert_close(empty_corpus, 1.0);
    assert!(after_duplicate < empty_corpus);
}

#[tokio::test]
async fn identical_recipe_has_no_novelty_left() {
    let evaluator = evaluator(process_config()).await;
    evaluator
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("first");
    let repeat = evaluator
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("repeat");

    assert_close(metric(&repeat.report, MetricKind::Novelty), 0.0);
    assert_eq!(evaluator.corpus_len().await, 2);
}

#[tokio::test]
async fn total_ignores_metric_order_and_config_reload() {
    let evaluation = evaluator(process_config())
        .await
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("scored");
    let weights = MetricWeights::standard();

    let mut reversed: Vec<MetricScore> = evaluation.report.metrics().to_vec();
    reversed.reverse();
    assert_eq!(
        aggregate(&reversed, &weights).to_bits(),
        evaluation.report.total().to_bits()
    );

    let yaml = "novelty:\n  scope: process\n";
    let first = RubricConfig::from_yaml_str(yaml).expect("config");
    let reloaded = RubricConfig::from_yaml_str(yaml).expect("config");
    assert_eq!(
        evaluation.report.reweighted(&first.weights).total().to_bits(),
        evaluation.report.reweighted(&reloaded.weights).total().to_bits()
    );
}

#[tokio::test]
async fn scored_batch_survives_json_round_trip() {
    let evaluator = evaluator(process_config()).await;
    let mut entries = vec![
        RecipeEntry::from_markdown(NOODLES),
        RecipeEntry::from_markdown(NOODLES_WITH_CHILI),
        RecipeEntry::default(),
    ];
    evaluator.evaluate_batch(&mut entries).await;

    let encoded = serde_json::to_string_pretty(&entries).expect("encode");
    let decoded: Vec<RecipeEntry> = serde_json::from_str(&encoded).expect("decode");

    assert_eq!(decoded, entries);
    let report = decoded[0].scores.as_ref().expect("scores");
    let value: serde_json::Value = serde_json::from_str(&encoded).expect("json");
    assert_eq!(value[0]["scores"]["RScore"], serde_json::json!(report.total()));
}

#[tokio::test]
async fn durable_corpus_carries_over_between_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let corpus = dir.path().join("novelty").join("corpus.csv");

    let first_run = evaluator(durable_config(&corpus)).await;
    first_run
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("first run");
    drop(first_run);

    let second_run = evaluator(durable_config(&corpus)).await;
    assert_eq!(second_run.corpus_len().await, 1);
    let repeat = second_run
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("second run");
    assert_close(metric(&repeat.report, MetricKind::Novelty), 0.0);

    let contents = std::fs::read_to_string(&corpus).expect("corpus file");
    assert_eq!(contents.lines().count(), 3);
}

#[tokio::test]
async fn corrupt_corpus_is_treated_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let corpus = dir.path().join("corpus.csv");
    std::fs::write(&corpus, "title,ingredients\n\u{0}\u{1}garbage without comma\n").expect("seed");

    let evaluator = evaluator(durable_config(&corpus)).await;
    assert_eq!(evaluator.corpus_len().await, 0);

    let evaluation = evaluator
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("scored");
    assert_close(metric(&evaluation.report, MetricKind::Novelty), 1.0);
    assert!(evaluation.corpus_error.is_none());
}

#[tokio::test]
async fn write_failure_still_returns_the_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, "occupied").expect("blocker file");
    let corpus = blocker.join("corpus.csv");

    let evaluator = evaluator(durable_config(&corpus)).await;
    let evaluation = evaluator
        .evaluate(&markdown(NOODLES), None)
        .await
        .expect("report survives the write failure");

    assert!(evaluation.corpus_error.is_some());
    assert_close(evaluation.report.total(), 0.85);
    // 書けなくてもプロセス内では記録を保持する
    assert_eq!(evaluator.corpus_len().await, 1);

    let mut entries = vec![RecipeEntry::from_markdown(NOODLES_WITH_CHILI)];
    let summary = evaluator.evaluate_batch(&mut entries).await;
    assert_eq!(summary.scored, 1);
    assert_eq!(summary.corpus_write_failures, 1);
}

#[tokio::test]
async fn batch_marks_entries_without_recipe_text() {
    let evaluator = evaluator(process_config()).await;
    let mut entries: Vec<RecipeEntry> = serde_json::from_value(serde_json::json!([
        { "input": { "flavor": ["salty"] }, "recipe": NOODLES },
        { "input": { "flavor": ["sweet"] }, "prompt": "dessert please" },
        { "recipe": "   " }
    ]))
    .expect("batch input");

    let summary = evaluator.evaluate_batch(&mut entries).await;

    assert_eq!(summary.scored, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.total(), 3);
    for entry in &entries[1..] {
        let report = entry.scores.as_ref().expect("unscored report");
        assert_eq!(report.note(), Some("No recipe text available"));
        assert_close(report.total(), 0.0);
    }
    assert_eq!(entries[1].prompt.as_deref(), Some("dessert please"));
}

#[tokio::test]
async fn malformed_entries_do_not_stop_the_batch() {
    let evaluator = evaluator(process_config()).await;
    let input = serde_json::json!([
        { "input": { "flavor": ["salty"] }, "recipe": NOODLES },
        { "input": { "flavor": "sweet" }, "recipe": NOODLES_WITH_CHILI },
        { "recipe": 42, "batch": "b-7" },
        { "recipe": NOODLES_WITH_CHILI }
    ]);
    let mut entries = parse_batch(&input.to_string()).expect("batch array");

    let summary = evaluator.evaluate_batch(&mut entries).await;

    assert_eq!(summary.scored, 2);
    assert_eq!(summary.invalid, 2);
    assert_eq!(summary.total(), 4);
    assert_eq!(evaluator.corpus_len().await, 2);
    for entry in &entries[1..3] {
        let report = entry.scores.as_ref().expect("unscored report");
        assert!(report.note().expect("note").starts_with("Invalid entry: "));
        assert_close(report.total(), 0.0);
        assert!(report.metrics().is_empty());
    }

    let output = serde_json::to_value(&entries).expect("encode");
    assert_eq!(output[1]["input"]["flavor"], "sweet");
    assert_eq!(output[2]["recipe"], 42);
    assert_eq!(output[2]["batch"], "b-7");
    assert!(output[3]["scores"]["RScore"].as_f64().expect("total") > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_see_every_earlier_append() {
    const CALLERS: usize = 8;
    let evaluator = Arc::new(evaluator(process_config()).await);

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let evaluator = Arc::clone(&evaluator);
            tokio::spawn(async move {
                let evaluation = evaluator
                    .evaluate(&markdown(NOODLES), None)
                    .await
                    .expect("scored");
                metric(&evaluation.report, MetricKind::Novelty)
            })
        })
        .collect();

    let mut novelties = Vec::with_capacity(CALLERS);
    for handle in handles {
        novelties.push(handle.await.expect("task completes"));
    }

    let fully_novel = novelties.iter().filter(|score| (**score - 1.0).abs() < 1e-9).count();
    let repeats = novelties.iter().filter(|score| score.abs() < 1e-9).count();
    assert_eq!(fully_novel, 1, "novelties: {novelties:?}");
    assert_eq!(repeats, CALLERS - 1, "novelties: {novelties:?}");
    assert_eq!(evaluator.corpus_len().await, CALLERS);
}
