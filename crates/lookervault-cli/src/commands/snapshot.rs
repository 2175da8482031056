use std::path::{Path, PathBuf};

use chrono::Duration as ChronoDuration;
use lookervault_snapshot::{LocalDirSnapshotSink, SnapshotSink};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{SnapshotAction, SnapshotArgs};
use crate::context::Context;
use crate::error::CliError;
use crate::output;

/// Snapshots of `db_path` are kept in a `snapshots/` directory next to it.
/// A real deployment points `LocalDirSnapshotSink` at a mounted bucket, or
/// swaps in an S3/GCS-backed `SnapshotSink`; object storage SDKs stay out
/// of scope here (see §1's non-goals).
fn sink_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("snapshots")
}

pub fn run(ctx: &Context, args: SnapshotArgs) -> Result<u8, CliError> {
    let sink = LocalDirSnapshotSink::new(sink_dir(&ctx.config.extraction.db_path), false);
    match args.action {
        SnapshotAction::Upload { prefix, gzip } => upload(ctx, &prefix, gzip),
        SnapshotAction::List { prefix } => list(&sink, &prefix),
        SnapshotAction::Download { reference, dest } => download(&sink, &reference, dest),
        SnapshotAction::Delete { reference } => delete(&sink, &reference),
        SnapshotAction::Cleanup { prefix } => cleanup(ctx, &sink, &prefix),
    }
}

fn upload(ctx: &Context, prefix: &str, gzip: bool) -> Result<u8, CliError> {
    let sink = LocalDirSnapshotSink::new(sink_dir(&ctx.config.extraction.db_path), gzip);
    let metadata = sink.upload(&ctx.config.extraction.db_path, prefix)?;
    println!(
        "uploaded {} ({} bytes, crc32c={:08x})",
        metadata.filename, metadata.size_bytes, metadata.crc32c
    );
    Ok(0)
}

fn list(sink: &LocalDirSnapshotSink, prefix: &str) -> Result<u8, CliError> {
    #[derive(Tabled, Serialize)]
    struct Row {
        filename: String,
        created_at: String,
        size_bytes: u64,
        gzip: bool,
    }
    let snapshots = sink.list(prefix)?;
    let rows: Vec<Row> = snapshots
        .iter()
        .map(|m| Row {
            filename: m.filename.clone(),
            created_at: m.created_at.to_rfc3339(),
            size_bytes: m.size_bytes,
            gzip: m.gzip,
        })
        .collect();
    output::render(crate::cli::OutputFormat::Table, &rows);
    Ok(0)
}

fn download(sink: &LocalDirSnapshotSink, reference: &str, dest: Option<PathBuf>) -> Result<u8, CliError> {
    let dest = dest.unwrap_or_else(|| PathBuf::from(reference));
    sink.download(reference, &dest)?;
    println!("downloaded {reference} to {}", dest.display());
    Ok(0)
}

fn delete(sink: &LocalDirSnapshotSink, reference: &str) -> Result<u8, CliError> {
    sink.delete(reference)?;
    println!("deleted {reference}");
    Ok(0)
}

fn cleanup(ctx: &Context, sink: &LocalDirSnapshotSink, prefix: &str) -> Result<u8, CliError> {
    let retention = ChronoDuration::days(ctx.config.storage.retention_days as i64);
    let cutoff = chrono::Utc::now() - retention;
    let snapshots = sink.list(prefix)?;
    let mut removed = 0u64;
    for snap in snapshots.into_iter().filter(|s| s.created_at < cutoff) {
        sink.delete(&snap.filename)?;
        removed += 1;
    }
    println!("removed {removed} snapshots older than {} days", ctx.config.storage.retention_days);
    Ok(0)
}
