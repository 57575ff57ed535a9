//! Subcommands and their output

use crate::snapshot_file;
use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;
use strata_client::{
    diff, ListOptions, MultipartUploadSummary, ObjectSummary, Progress, S3Client, SnapshotDiff,
    Stage, TaskContext,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a directory, or every key under a prefix with --recursive
    Ls {
        #[arg(default_value = "")]
        prefix: String,
        #[arg(short, long)]
        recursive: bool,
        /// Print entries as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Upload a file, in parts when it is larger than one chunk
    Put {
        file: PathBuf,
        key: String,
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Delete an object, or everything under a prefix with --recursive
    Rm {
        key: String,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Rename an object, or everything under a prefix with --recursive
    Mv {
        from: String,
        to: String,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Print a presigned URL
    Presign {
        key: String,
        /// Lifetime in seconds, capped at seven days
        #[arg(long, default_value = "3600")]
        expires: u64,
        /// Presign an upload instead of a download
        #[arg(long)]
        put: bool,
    },

    /// Capture and compare bucket snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Inspect multipart uploads that were never completed
    #[command(subcommand)]
    Uploads(UploadsCommand),
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Capture every key under a prefix into a JSON file
    Capture {
        output: PathBuf,
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Compare two snapshot files
    Diff {
        base: PathBuf,
        target: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum UploadsCommand {
    /// List uploads that were started and never completed
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Abort one upload
    Abort { key: String, upload_id: String },
}

/// Run one command, printing its result to stdout
pub async fn run(command: Command, client: &S3Client, ctx: &TaskContext) -> Result<()> {
    match command {
        Command::Ls {
            prefix,
            recursive,
            json,
        } => {
            let listing = if recursive {
                client.list_all(&prefix, ctx).await?
            } else {
                client
                    .list_directory(&prefix, &ListOptions::default(), ctx)
                    .await?
            };
            if listing.inconsistent {
                warn!("Listing ended early; results may be incomplete");
            }
            for entry in &listing.entries {
                if json {
                    println!("{}", serde_json::to_string(entry)?);
                } else {
                    println!("{}", format_entry(entry));
                }
            }
        }

        Command::Put {
            file,
            key,
            content_type,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = client
                .upload_large(&key, Bytes::from(data), content_type.as_deref(), ctx)
                .await?;
            println!("{}\t{}", key, result.etag.unwrap_or_default());
        }

        Command::Rm { key, recursive } => {
            if recursive {
                let report = client.delete_prefix(&key, ctx).await?;
                println!("deleted {} of {}", report.processed, report.total);
            } else {
                client.delete_object(&key).await?;
            }
        }

        Command::Mv {
            from,
            to,
            recursive,
        } => {
            if recursive {
                let report = client.rename_prefix(&from, &to, ctx).await?;
                println!("renamed {} of {}", report.processed, report.total);
            } else {
                client.rename_object(&from, &to).await?;
            }
        }

        Command::Presign { key, expires, put } => {
            let lifetime = Duration::from_secs(expires);
            let url = if put {
                client.presign_put(&key, lifetime)?
            } else {
                client.presign_get(&key, lifetime)?
            };
            println!("{}", url);
        }

        Command::Snapshot(SnapshotCommand::Capture { output, prefix }) => {
            let snapshot = client.capture_snapshot(&prefix, ctx).await?;
            snapshot_file::save(&output, &snapshot)?;
            println!("{} keys -> {}", snapshot.len(), output.display());
        }

        Command::Snapshot(SnapshotCommand::Diff { base, target, json }) => {
            let changes = diff(&snapshot_file::load(&base)?, &snapshot_file::load(&target)?);
            if json {
                println!("{}", serde_json::to_string_pretty(&changes)?);
            } else {
                for line in format_diff(&changes) {
                    println!("{}", line);
                }
            }
        }

        Command::Uploads(UploadsCommand::List { prefix }) => {
            let listing = client.list_multipart_uploads(&prefix, ctx).await?;
            for upload in &listing.entries {
                println!("{}", format_upload(upload));
            }
        }

        Command::Uploads(UploadsCommand::Abort { key, upload_id }) => {
            if upload_id.is_empty() {
                bail!("upload ID must not be empty");
            }
            client.abort_multipart_upload(&key, &upload_id).await?;
            info!(key = %key, upload_id = %upload_id, "Aborted multipart upload");
        }
    }

    Ok(())
}

/// Task context that logs progress and is cancelled by Ctrl-C
pub fn interactive_context() -> TaskContext {
    let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
    tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            debug!("{}", format_progress(&progress));
        }
    });

    let ctx = TaskContext::new().with_progress(tx);
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current request");
            cancel.cancel();
        }
    });
    ctx
}

pub fn format_entry(entry: &ObjectSummary) -> String {
    if entry.is_folder {
        format!("{:>12}  {:<20}  {}", "DIR", "", entry.key)
    } else {
        format!(
            "{:>12}  {:<20}  {}",
            entry.size,
            entry.last_modified.format("%Y-%m-%d %H:%M:%S"),
            entry.key
        )
    }
}

pub fn format_upload(upload: &MultipartUploadSummary) -> String {
    let initiated = upload
        .initiated
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    format!("{}\t{}\t{}", initiated, upload.upload_id, upload.key)
}

/// One line per change: `+` added, `-` removed, `~` modified
pub fn format_diff(changes: &SnapshotDiff) -> Vec<String> {
    let mut lines = Vec::new();
    for added in &changes.added {
        lines.push(format!("+ {} ({} bytes)", added.key, added.entry.size));
    }
    for removed in &changes.removed {
        lines.push(format!("- {} ({} bytes)", removed.key, removed.entry.size));
    }
    for modified in &changes.modified {
        lines.push(format!(
            "~ {} ({} -> {} bytes)",
            modified.key, modified.before.size, modified.after.size
        ));
    }
    lines
}

pub fn format_progress(progress: &Progress) -> String {
    let verb = match progress.stage {
        Stage::Listing => "listed pages",
        Stage::Uploading => "uploaded parts",
        Stage::Deleting => "deleted",
        Stage::Renaming => "renamed",
    };
    match progress.total {
        Some(total) => format!("{} {}/{}", verb, progress.completed, total),
        None => format!("{} {}", verb, progress.completed),
    }
}
