use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use lookervault_core::{IdMapper, RestorationConfig, RestorationOrchestrator, Restorer};
use lookervault_metrics::Metrics;
use lookervault_ratelimit::CancellationToken;
use lookervault_store::{DlqFilter, SessionKind};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{DlqAction, OutputFormat, RestoreAction, RestoreArgs};
use crate::commands::extract::parse_content_types;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

pub fn run(ctx: &Context, args: RestoreArgs) -> Result<u8, CliError> {
    match &args.action {
        Some(RestoreAction::Resume { session_id }) => resume(ctx, &args, *session_id),
        Some(RestoreAction::Dlq { action }) => dlq(ctx, action.clone()),
        Some(RestoreAction::Status { session_id, all }) => status(ctx, *session_id, *all),
        None => run_restoration(ctx, &args),
    }
}

fn build_orchestrator(
    ctx: &Context,
    args: &RestoreArgs,
) -> Result<(RestorationOrchestrator, Arc<Metrics>), CliError> {
    let content_types = parse_content_types(&args.types)?;
    let filters = ctx.config.restore.filters.resolve()?;
    let content_types: Vec<_> = content_types
        .into_iter()
        .filter(|t| !filters.exclude_types.contains(t))
        .filter(|t| filters.only_types.is_empty() || filters.only_types.contains(t))
        .collect();

    let config = RestorationConfig {
        content_types,
        workers: args.workers.unwrap_or(ctx.config.restore.workers),
        checkpoint_interval: args
            .checkpoint_interval
            .unwrap_or(ctx.config.restore.checkpoint_interval),
        skip_if_modified: args.skip_if_modified,
        dry_run: args.dry_run,
    };

    let client = ctx.client_for(
        &ctx.config.looker.base_url,
        args.rate_limit_per_minute
            .unwrap_or(ctx.config.restore.rate_limit_per_minute),
        args.rate_limit_per_second
            .unwrap_or(ctx.config.restore.rate_limit_per_second),
    )?;
    let id_mapper = Arc::new(IdMapper::new(ctx.store.clone(), ctx.config.looker.base_url.clone()));
    let restorer = Arc::new(Restorer::new(
        ctx.store.clone(),
        client,
        id_mapper,
        ctx.config.looker.base_url.clone(),
    ));
    let metrics = Arc::new(Metrics::new());
    Ok((
        RestorationOrchestrator::new(ctx.store.clone(), restorer, metrics.clone(), config),
        metrics,
    ))
}

fn run_restoration(ctx: &Context, args: &RestoreArgs) -> Result<u8, CliError> {
    if !args.force && !args.dry_run {
        eprintln!("this will write to the destination instance; pass --force to proceed (or --dry-run to preview)");
        return Ok(2);
    }

    let (orchestrator, _metrics) = build_orchestrator(ctx, args)?;
    let cancel = CancellationToken::new();
    let cancel_for_handler = cancel.clone();
    let _ = ctrlc::set_handler(move || cancel_for_handler.cancel());

    let spinner = (args.output == OutputFormat::Table).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} restoring... {elapsed}").unwrap());
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar
    });

    let summary = orchestrator.run(&cancel)?;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    render_summary(args.output, &summary);

    if cancel.is_cancelled() {
        return Err(CliError::Cancelled);
    }
    Ok(if summary.errors == 0 { 0 } else { 1 })
}

/// The `Store`'s checkpoint lookup already resumes mid-type work
/// automatically (§4.12); this variant exists to let the operator name
/// which prior session they mean, validating it actually exists first.
fn resume(ctx: &Context, args: &RestoreArgs, session_id: Option<uuid::Uuid>) -> Result<u8, CliError> {
    if let Some(id) = session_id {
        ctx.store
            .get_session(id)?
            .ok_or_else(|| CliError::Other(anyhow::anyhow!("no such session {id}")))?;
    }
    run_restoration(ctx, args)
}

fn render_summary(format: OutputFormat, summary: &lookervault_core::RestorationSummary) {
    #[derive(Tabled, Serialize)]
    struct Row {
        content_type: String,
        total: u64,
        created: u64,
        updated: u64,
        skipped: u64,
        errors: u64,
    }
    let mut rows: Vec<Row> = summary
        .by_type
        .iter()
        .map(|(ct, s)| Row {
            content_type: ct.name().to_string(),
            total: s.total,
            created: s.created,
            updated: s.updated,
            skipped: s.skipped,
            errors: s.errors,
        })
        .collect();
    rows.sort_by(|a, b| a.content_type.cmp(&b.content_type));
    output::render(format, &rows);
    println!(
        "{} total, {} created, {} updated, {} skipped, {} errors in {:.1}s",
        summary.total, summary.created, summary.updated, summary.skipped, summary.errors, summary.duration_s
    );
    for err in &summary.worker_errors {
        eprintln!("worker error: {err}");
    }
}

fn status(ctx: &Context, session_id: Option<uuid::Uuid>, all: bool) -> Result<u8, CliError> {
    #[derive(Tabled, Serialize)]
    struct Row {
        session_id: String,
        status: String,
        items_processed: i64,
        errors: i64,
    }

    let sessions = if let Some(id) = session_id {
        ctx.store
            .get_session(id)?
            .map(|s| vec![s])
            .ok_or_else(|| CliError::Other(anyhow::anyhow!("no such session {id}")))?
    } else {
        let limit = if all { 100 } else { 1 };
        ctx.store.list_sessions(Some(SessionKind::Restoration), limit)?
    };

    let rows: Vec<Row> = sessions
        .iter()
        .map(|s| Row {
            session_id: s.id.to_string(),
            status: format!("{:?}", s.status),
            items_processed: s.items_processed,
            errors: s.errors,
        })
        .collect();
    output::render(OutputFormat::Table, &rows);
    Ok(0)
}

fn dlq(ctx: &Context, action: DlqAction) -> Result<u8, CliError> {
    match action {
        DlqAction::List { content_type } => dlq_list(ctx, content_type),
        DlqAction::Show { id } => dlq_show(ctx, id),
        DlqAction::Retry { id } => dlq_retry(ctx, id),
        DlqAction::Clear { content_type } => dlq_clear(ctx, content_type),
    }
}

fn dlq_filter(content_type: Option<String>) -> Result<DlqFilter, CliError> {
    let content_type = content_type
        .map(|s| {
            s.parse()
                .map_err(|_| CliError::Other(anyhow::anyhow!("unknown content type {s:?}")))
        })
        .transpose()?;
    Ok(DlqFilter {
        content_type,
        session_id: None,
    })
}

fn dlq_list(ctx: &Context, content_type: Option<String>) -> Result<u8, CliError> {
    #[derive(Tabled, Serialize)]
    struct Row {
        id: i64,
        content_id: String,
        error_type: String,
        retry_count: i64,
    }
    let entries = ctx.store.dlq_list(&dlq_filter(content_type)?)?;
    let rows: Vec<Row> = entries
        .iter()
        .map(|e| Row {
            id: e.id,
            content_id: e.content_id.to_string(),
            error_type: e.error_type.clone(),
            retry_count: e.retry_count,
        })
        .collect();
    let is_empty = rows.is_empty();
    output::render(OutputFormat::Table, &rows);
    Ok(if is_empty { 0 } else { 1 })
}

fn dlq_show(ctx: &Context, id: i64) -> Result<u8, CliError> {
    let entries = ctx.store.dlq_list(&DlqFilter {
        content_type: None,
        session_id: None,
    })?;
    let entry = entries
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| CliError::Other(anyhow::anyhow!("no DLQ entry with id {id}")))?;

    use lookervault_codec::Codec as _;
    let decoded = lookervault_codec::BinCodec::new()
        .decode(&entry.content_data)
        .map(|v| format!("{v:?}"))
        .unwrap_or_else(|e| format!("<undecodable: {e}>"));

    println!("id: {}", entry.id);
    println!("content_id: {}", entry.content_id);
    println!("error_type: {}", entry.error_type);
    println!("error_message: {}", entry.error_message);
    println!("retry_count: {}", entry.retry_count);
    println!("failed_at: {}", entry.failed_at);
    println!("payload: {decoded}");
    Ok(0)
}

fn dlq_retry(ctx: &Context, id: i64) -> Result<u8, CliError> {
    let entries = ctx.store.dlq_list(&DlqFilter {
        content_type: None,
        session_id: None,
    })?;
    let entry = entries
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| CliError::Other(anyhow::anyhow!("no DLQ entry with id {id}")))?;

    let client = ctx.client_for(
        &ctx.config.looker.base_url,
        ctx.config.restore.rate_limit_per_minute,
        ctx.config.restore.rate_limit_per_second,
    )?;
    let id_mapper = Arc::new(IdMapper::new(ctx.store.clone(), ctx.config.looker.base_url.clone()));
    let restorer = Restorer::new(
        ctx.store.clone(),
        client,
        id_mapper,
        ctx.config.looker.base_url.clone(),
    );

    let cancel = CancellationToken::new();
    let cancel_for_handler = cancel.clone();
    let _ = ctrlc::set_handler(move || cancel_for_handler.cancel());

    match restorer.restore_item(&entry.content_id, false, &cancel) {
        Ok(result) => {
            ctx.store.dlq_remove(id)?;
            println!("retried DLQ entry {id}: {:?} -> {:?}", result.operation, result.destination_id);
            Ok(0)
        }
        Err(e) => {
            eprintln!("retry failed for DLQ entry {id}: {e}");
            Ok(1)
        }
    }
}

fn dlq_clear(ctx: &Context, content_type: Option<String>) -> Result<u8, CliError> {
    let entries = ctx.store.dlq_list(&dlq_filter(content_type)?)?;
    for entry in &entries {
        ctx.store.dlq_remove(entry.id)?;
    }
    println!("cleared {} DLQ entries", entries.len());
    Ok(0)
}
