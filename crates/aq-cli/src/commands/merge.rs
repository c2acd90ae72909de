//! Transfer and merge commands.

use anyhow::{Context, Result};
use aq_chain::{FetchOptions, TreeFetcher};
use aq_core::{AquaTree, PubkeyHash};
use aq_merge::{MergeEngine, MergeReport, MergeStrategy};
use colored::Colorize;

use crate::session::{parse_key, parse_owner, Session};

/// Source tree with its linked chains, no file objects.
fn source_tree(session: &Session, head: &PubkeyHash) -> Result<AquaTree> {
    let options = FetchOptions {
        include_linked_chains: true,
        include_file_objects: false,
    };
    TreeFetcher::new(&session.store, &session.blobs, &session.config)
        .fetch_tree(head, options)
        .with_context(|| format!("failed to assemble source chain at {head}"))
}

/// Handle `aq transfer`.
pub fn cmd_transfer(session: &mut Session, key: &str, to: &str, expect_version: Option<u64>, json: bool) -> Result<()> {
    let head = parse_key(key)?;
    let target = parse_owner(to)?;
    let tree = source_tree(session, &head)?;

    let report = MergeEngine::new(&mut session.store)
        .transfer(&tree, &target, &head.owner, expect_version)
        .with_context(|| format!("failed to transfer {head} to {target}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "{} {} revision(s) transferred to {}",
        "✓".green().bold(),
        report.transferred.len(),
        target
    );
    if report.linked_chains > 0 {
        println!("  {}: {}", "Linked chains".bold(), report.linked_chains);
    }
    if let Some(latest) = &report.latest {
        println!("  {}: {}", "Latest".bold(), latest.to_string().green());
    }
    Ok(())
}

/// Handle `aq merge`.
pub fn cmd_merge(
    session: &mut Session,
    key: &str,
    to: &str,
    strategy: MergeStrategy,
    expect_version: Option<u64>,
    json: bool,
) -> Result<()> {
    let head = parse_key(key)?;
    let target = parse_owner(to)?;
    let tree = source_tree(session, &head)?;

    let report = MergeEngine::new(&mut session.store)
        .merge(&tree, &target, &head.owner, strategy, expect_version)
        .with_context(|| format!("failed to merge {head} into {target}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_merge(&report, 0);
    }
    Ok(())
}

fn print_merge(report: &MergeReport, indent: usize) {
    let pad = "  ".repeat(indent);
    println!(
        "{pad}{} {:?}: {} revision(s) imported",
        "✓".green().bold(),
        report.outcome,
        report.imported.len()
    );
    if let Some(latest) = &report.latest {
        println!("{pad}  {}: {}", "Latest".bold(), latest.to_string().green());
    }
    for nested in &report.nested {
        print_merge(nested, indent + 1);
    }
}
