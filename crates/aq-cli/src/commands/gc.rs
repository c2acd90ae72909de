//! Deletion commands.

use anyhow::{Context, Result};
use aq_gc::{DeleteReport, GcEngine};
use colored::Colorize;

use crate::session::{parse_key, parse_owner, Session};

/// Handle `aq delete` and, with `cascade`, `aq purge`.
pub fn cmd_delete(session: &mut Session, key: &str, actor: &str, cascade: bool, json: bool) -> Result<()> {
    let key = parse_key(key)?;
    let actor = parse_owner(actor)?;
    let mut engine = GcEngine::new(&mut session.store, &session.blobs);
    let report = if cascade {
        engine.delete_chain(&key, &actor)
    } else {
        engine.delete_revision(&key, &actor)
    }
    .with_context(|| format!("failed to delete {key}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &DeleteReport) {
    println!(
        "{} {} revision(s) deleted",
        "✓".green().bold(),
        report.deleted.len()
    );
    for key in &report.deleted {
        println!("  - {}", key.to_string().red());
    }
    let released = &report.released;
    println!(
        "  {}: {} signature(s), {} witness(es), {} link(s), {} form field(s), {} file name(s)",
        "Released".bold(),
        released.signatures,
        released.witnesses,
        released.links,
        released.forms,
        released.file_names
    );
    if !report.files_collected.is_empty() {
        println!("  {}: {}", "Files removed".bold(), report.files_collected.len());
    }
    for (owner, usage) in &report.freed {
        println!(
            "  {} {}: {} file(s), {} byte(s)",
            "Freed for".bold(),
            owner,
            usage.files,
            usage.bytes
        );
    }
    if !report.blobs_left_behind.is_empty() {
        println!(
            "  {}: {}",
            "Blobs left behind".yellow().bold(),
            report.blobs_left_behind.len()
        );
    }
}
