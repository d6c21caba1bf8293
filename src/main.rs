use std::path::Path;

use anyhow::Context;
use tracing::{error, info, warn};

use recipe_rubric::{
    clients::embedding_model_from_settings,
    config::{Config, NoveltyStrategyKind, RubricConfig},
    evaluation::Evaluator,
    observability::Telemetry,
    recipe::{RecipeEntry, parse_batch},
    report::ReviewLog,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    let telemetry = Telemetry::new().context("failed to initialize telemetry")?;
    let config = Config::from_env().context("failed to load configuration")?;
    let rubric = RubricConfig::load(config.rubric_config_path())
        .context("failed to load rubric configuration")?;

    let model = match rubric.novelty.strategy {
        NoveltyStrategyKind::Embedding => Some(
            embedding_model_from_settings(&rubric.novelty.embedding, config.embedding_api_key())
                .context("failed to build embedding model")?,
        ),
        NoveltyStrategyKind::Jaccard => None,
    };

    let evaluator = Evaluator::new(rubric, model)
        .await
        .context("failed to build evaluator")?
        .with_metrics(telemetry.metrics());

    let mut entries = read_entries(config.input_path()).await?;
    info!(
        input = %config.input_path().display(),
        entries = entries.len(),
        "scoring recipes"
    );

    let summary = evaluator.evaluate_batch(&mut entries).await;

    if let Some(dir) = config.review_log_dir() {
        write_review_logs(&ReviewLog::new(dir), &entries).await;
    }

    write_entries(config.output_path(), &entries).await?;

    if let Some(path) = config.metrics_textfile() {
        if let Err(error) = telemetry.write_textfile(path).await {
            warn!(error = %error, "failed to write metrics textfile");
        }
    }

    info!(
        output = %config.output_path().display(),
        scored = summary.scored,
        skipped = summary.skipped,
        failed = summary.failed,
        invalid = summary.invalid,
        corpus_write_failures = summary.corpus_write_failures,
        corpus_records = evaluator.corpus_len().await,
        "batch complete"
    );

    Ok(())
}

async fn read_entries(path: &Path) -> anyhow::Result<Vec<RecipeEntry>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_batch(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

async fn write_entries(path: &Path, entries: &[RecipeEntry]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(entries).context("failed to encode scored recipes")?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn write_review_logs(log: &ReviewLog, entries: &[RecipeEntry]) {
    for entry in entries {
        let (Some(source), Some(report)) = (&entry.recipe, &entry.scores) else {
            continue;
        };
        if report.metrics().is_empty() {
            continue;
        }
        let title = source.to_parsed().title;
        if let Err(error) = log.write(&title, &source.markdown(), report).await {
            warn!(title = %title, error = %error, "failed to write review log");
        }
    }
}
