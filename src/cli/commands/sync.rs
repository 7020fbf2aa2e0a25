//! Sync command implementations.
//!
//! `push`, `pull` and `both` build a [`SyncEngine`] over the Mochi client
//! and block on one run. Ctrl-C sets the engine's cancel flag: no new
//! remote calls are started and the partial report is still printed.

use super::open_storage;
use crate::cli::{RunArgs, SyncCommands};
use crate::config::{
    RemoteSettings, SyncOptions, lock_dir, resolve_backup_dir, resolve_remote_settings,
};
use crate::error::{Error, Result};
use crate::remote::MochiClient;
use crate::sync::{
    BackupManager, CancelFlag, ItemOutcome, JobReport, RepairReport, RepairScope, SyncEngine,
    SyncMode, SyncReport, format_size, get_sync_status, print_status,
};
use colored::Colorize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Execute sync commands.
pub fn execute(command: &SyncCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    match command {
        SyncCommands::Push(args) => run(SyncMode::Push, args, db_path, json),
        SyncCommands::Pull(args) => run(SyncMode::Pull, args, db_path, json),
        SyncCommands::Both(args) => run(SyncMode::Both, args, db_path, json),
        SyncCommands::Status => status(db_path, json),
        SyncCommands::Repair {
            changed_only,
            deck,
            yes,
        } => repair(*changed_only, deck.as_deref(), *yes, db_path, json),
    }
}

fn options_for(args: &RunArgs) -> SyncOptions {
    let mut options = SyncOptions::from_env();
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency.max(1);
    }
    if let Some(secs) = args.timeout.filter(|s| *s > 0) {
        options.timeout = Duration::from_secs(secs);
    }
    options
}

fn target_deck(settings: &RemoteSettings, flag: Option<&str>) -> Result<String> {
    match flag.map(str::trim).filter(|d| !d.is_empty()) {
        Some(deck) => Ok(deck.to_string()),
        None => settings.require_deck_id().map(str::to_string),
    }
}

fn build_engine(
    db_path: &Path,
    deck_flag: Option<&str>,
    options: SyncOptions,
) -> Result<SyncEngine<MochiClient>> {
    let settings = resolve_remote_settings()?;
    let deck_id = target_deck(&settings, deck_flag)?;
    let client = MochiClient::from_settings(&settings, &options)?;

    Ok(SyncEngine::new(
        Arc::new(client),
        deck_id,
        BackupManager::new(resolve_backup_dir(db_path)),
        lock_dir(db_path),
    )
    .with_options(options))
}

/// Block on `fut`, cancelling `cancel` if Ctrl-C arrives first.
fn block_on_cancellable<T>(cancel: CancelFlag, fut: impl Future<Output = T>) -> Result<T> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    Ok(rt.block_on(async move {
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight items");
                cancel.cancel();
            }
        });
        let out = fut.await;
        watcher.abort();
        out
    }))
}

fn run(mode: SyncMode, args: &RunArgs, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (path, mut storage) = open_storage(db_path)?;
    let engine = build_engine(&path, args.deck.as_deref(), options_for(args))?;

    let report = block_on_cancellable(engine.cancel_flag(), engine.run(&mut storage, mode))??;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report);
    }

    if report.is_aborted() {
        return Err(Error::SyncAborted {
            reason: report
                .abort_reason
                .unwrap_or_else(|| "unknown reason".to_string()),
        });
    }
    Ok(())
}

fn status(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (_, storage) = open_storage(db_path)?;
    let settings = resolve_remote_settings()?;
    let status = get_sync_status(&storage, settings.require_deck_id().ok())?;

    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn repair(
    changed_only: bool,
    deck: Option<&str>,
    yes: bool,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    if !yes {
        return Err(Error::InvalidArgument(
            "repair deletes and recreates remote cards; pass --yes to confirm".to_string(),
        ));
    }

    let (path, mut storage) = open_storage(db_path)?;
    let engine = build_engine(&path, deck, SyncOptions::from_env())?;
    let scope = if changed_only {
        RepairScope::ChangedOnly
    } else {
        RepairScope::All
    };

    let report = block_on_cancellable(engine.cancel_flag(), engine.repair(&mut storage, scope))??;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_repair_report(&report);
    }

    if let Some(reason) = report.aborted {
        return Err(Error::SyncAborted { reason });
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    let title = format!("Sync {} → deck {}", report.mode, report.deck_id);
    println!("{}", title.bold());

    if let Some(backup) = &report.backup {
        println!(
            "  Backup: {} ({})",
            backup.path.display(),
            format_size(backup.size_bytes)
        );
    }

    if report.is_aborted() {
        println!(
            "  {} {}",
            "Aborted:".red().bold(),
            report.abort_reason.as_deref().unwrap_or_default()
        );
        println!("  {}", "No notes or links were modified.".dimmed());
        return;
    }

    if let Some(push) = &report.push {
        println!();
        println!("{}", "Push:".blue().bold());
        print_job(push);
    }
    if let Some(pull) = &report.pull {
        println!();
        println!("{}", "Pull:".blue().bold());
        print_job(pull);
    }

    let totals = report.totals();
    println!();
    let summary = format!(
        "{} created, {} updated, {} skipped, {} local changes not pushed, {} errors",
        totals.created,
        totals.updated,
        totals.skipped,
        totals.local_changed_not_pushed,
        totals.errors
    );
    if totals.errors > 0 {
        println!("{}", summary.yellow());
    } else {
        println!("{}", summary.green());
    }
}

fn print_job(job: &JobReport) {
    println!("  Created:  {}", job.created);
    if job.updated > 0 {
        println!("  Updated:  {}", job.updated);
    }
    println!("  Skipped:  {}", job.skipped);

    if job.local_changed_not_pushed > 0 {
        let ids: Vec<String> = job
            .local_changed_note_ids()
            .iter()
            .map(|id| format!("#{id}"))
            .collect();
        println!(
            "  {} {} ({})",
            "Local changes not pushed:".yellow(),
            job.local_changed_not_pushed,
            ids.join(", ")
        );
    }
    if job.overwritten_local_changes > 0 {
        println!(
            "  {} {}",
            "Local changes overwritten by remote:".yellow(),
            job.overwritten_local_changes
        );
    }
    if job.missing_remote > 0 {
        println!("  {} {}", "Missing on remote:".yellow(), job.missing_remote);
        for outcome in &job.outcomes {
            if let ItemOutcome::MissingRemote { note_id, card_id } = outcome {
                println!("    note #{note_id} → card {card_id}");
            }
        }
    }
    for err in &job.errors {
        let target = match (err.note_id, &err.card_id) {
            (Some(note), _) => format!("note #{note}"),
            (None, Some(card)) => format!("card {card}"),
            (None, None) => "run".to_string(),
        };
        println!("  {} {}: {}", "Error".red(), target, err.message);
    }
    if let Some(reason) = &job.aborted {
        println!("  {} {reason}", "Stopped:".red().bold());
    }
    if job.cancelled {
        println!("  {}", "Cancelled before all items were scheduled.".yellow());
    }
}

fn print_repair_report(report: &RepairReport) {
    println!("{}", format!("Repair deck {}", report.deck_id).bold());
    if let Some(backup) = &report.backup {
        println!("  Backup: {}", backup.path.display());
    }
    println!("  Checked:            {}", report.checked);
    println!("  Recreated:          {}", report.recreated);
    println!("  Missing local note: {}", report.missing_local_note);
    println!("  Failed:             {}", report.failed);
    for err in &report.errors {
        println!(
            "  {} note #{}: {}",
            "Error".red(),
            err.note_id.unwrap_or_default(),
            err.message
        );
    }
    if let Some(reason) = &report.aborted {
        println!("  {} {reason}", "Stopped:".red().bold());
    }
    if report.cancelled {
        println!("  {}", "Cancelled.".yellow());
    }
}
