use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use lookervault_core::{ExtractionConfig, ExtractionOrchestrator};
use lookervault_metrics::Metrics;
use lookervault_ratelimit::CancellationToken;
use lookervault_store::ContentType;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::ExtractArgs;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled, Serialize)]
struct ExtractRow {
    content_type: String,
    items: u64,
}

pub fn run(ctx: &Context, args: ExtractArgs) -> Result<u8, CliError> {
    let content_types = parse_content_types(&args.types)?;
    let resume = if args.no_resume {
        false
    } else {
        args.resume || ctx.config.extraction.auto_resume
    };
    let fields = args.fields.clone().or_else(|| {
        if ctx.config.extraction.default_fields.is_empty() {
            None
        } else {
            Some(ctx.config.extraction.default_fields.clone())
        }
    });

    let config = ExtractionConfig {
        content_types,
        workers: args.workers.unwrap_or(ctx.config.parallel.workers),
        batch_size: args.batch_size.unwrap_or(ctx.config.extraction.batch_size),
        folder_ids: args.folder_ids.clone(),
        updated_after: args.updated_after,
        resume,
        fields,
    };

    let client = ctx.client_for(
        &ctx.config.looker.base_url,
        args.rate_limit_per_minute
            .unwrap_or(ctx.config.parallel.rate_limit_per_minute),
        args.rate_limit_per_second
            .unwrap_or(ctx.config.parallel.rate_limit_per_second),
    )?;
    let metrics = Arc::new(Metrics::new());
    let orchestrator = ExtractionOrchestrator::new(ctx.store.clone(), client, metrics, config);

    let cancel = CancellationToken::new();
    let cancel_for_handler = cancel.clone();
    let _ = ctrlc::set_handler(move || cancel_for_handler.cancel());

    let spinner = (args.output == crate::cli::OutputFormat::Table).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} extracting... {elapsed}").unwrap());
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar
    });

    let result = orchestrator.run(&cancel)?;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let mut rows: Vec<ExtractRow> = result
        .items_by_type
        .iter()
        .map(|(ct, count)| ExtractRow {
            content_type: ct.name().to_string(),
            items: *count,
        })
        .collect();
    rows.sort_by(|a, b| a.content_type.cmp(&b.content_type));
    output::render(args.output, &rows);

    println!(
        "extracted {} items in {:.1}s ({} checkpoints, {} errors)",
        result.total_items,
        result.duration.as_secs_f64(),
        result.checkpoints_created,
        result.errors.len()
    );
    for err in &result.errors {
        eprintln!("error: {err}");
    }

    if cancel.is_cancelled() {
        return Err(CliError::Cancelled);
    }
    Ok(if result.errors.is_empty() { 0 } else { 1 })
}

pub fn parse_content_types(raw: &[String]) -> Result<Vec<ContentType>, CliError> {
    if raw.is_empty() {
        return Ok(ContentType::ALL.to_vec());
    }
    raw.iter()
        .map(|s| {
            s.parse()
                .map_err(|_| CliError::Other(anyhow::anyhow!("unknown content type {s:?}")))
        })
        .collect()
}
