//! Read-only chain commands.

use anyhow::{Context, Result};
use aq_chain::{walk, walk_from_genesis, FetchOptions, TreeFetcher};
use aq_core::Revision;
use aq_store::Reader;
use colored::Colorize;

use crate::session::{parse_key, parse_owner, Session};

fn print_revision(session: &Session, rev: &Revision) -> Result<()> {
    let marker = if rev.is_genesis() { "genesis" } else { "revision" };
    println!("{} {}", marker.bold().cyan(), rev.key.to_string().cyan());
    println!("  {}: {}", "Type".bold(), rev.revision_type);
    if let Some(previous) = &rev.previous {
        println!("  {}: {}", "Previous".bold(), previous);
    }
    println!("  {}: {}", "Timestamp".bold(), rev.local_timestamp);
    if let Some(name) = session.store.file_name(&rev.key)? {
        println!("  {}: {}", "File".bold(), name);
    }
    if !rev.children.is_empty() {
        let children: Vec<String> = rev.children.iter().map(ToString::to_string).collect();
        println!("  {}: [{}]", "Children".bold(), children.join(", "));
    }
    if rev.obsolete {
        println!("  {}", "obsolete".yellow());
    }
    if session.store.latest(&rev.key)?.is_some() {
        println!("  {}", "latest".green());
    }
    Ok(())
}

/// Handle `aq walk`.
pub fn cmd_walk(session: &Session, key: &str, from_genesis: bool) -> Result<()> {
    let key = parse_key(key)?;
    let chain = if from_genesis {
        walk_from_genesis(&session.store, &key)
    } else {
        walk(&session.store, &key)
    }
    .with_context(|| format!("failed to walk chain from {key}"))?;

    println!("{}", "Revision Chain".bold().underline());
    println!("{}: {}", "Revisions".bold(), chain.len());
    println!();
    for rev in &chain {
        print_revision(session, rev)?;
        println!();
    }
    Ok(())
}

/// Handle `aq tree`.
pub fn cmd_tree(session: &Session, key: &str, linked: bool, files: bool, latest: bool) -> Result<()> {
    let key = parse_key(key)?;
    let options = FetchOptions {
        include_linked_chains: linked,
        include_file_objects: files,
    };
    let fetcher = TreeFetcher::new(&session.store, &session.blobs, &session.config);
    let tree = if latest {
        fetcher.fetch_latest_tree(&key, options)
    } else {
        fetcher.fetch_tree(&key, options)
    }
    .with_context(|| format!("failed to assemble tree at {key}"))?;

    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

/// Handle `aq latest`.
pub fn cmd_latest(session: &Session, owner: &str) -> Result<()> {
    let owner = parse_owner(owner)?;
    let heads = session.store.latest_for_owner(&owner)?;
    if heads.is_empty() {
        println!("{}", "No chains".yellow());
        return Ok(());
    }

    println!("{} {}", "Heads of".bold().underline(), owner.to_string().bold().underline());
    for entry in heads {
        let name = session.store.file_name(&entry.key)?;
        print!("  {}", entry.key.to_string().green());
        if let Some(template) = &entry.template_id {
            print!(" {}", format!("[{template}]").cyan());
        }
        if entry.is_workflow {
            print!(" {}", "workflow".magenta());
        }
        if let Some(name) = name {
            print!(" {name}");
        }
        println!();
    }
    println!(
        "{}: {}",
        "Version".bold(),
        session.store.owner_version(&owner)?
    );
    Ok(())
}

/// Handle `aq tag`.
pub fn cmd_tag(session: &mut Session, key: &str, template: Option<&str>, workflow: bool) -> Result<()> {
    let key = parse_key(key)?;
    session
        .store
        .tag_latest(&key, template, workflow)
        .with_context(|| format!("failed to tag {key}; is it a head revision?"))?;
    println!("{} {} tagged", "✓".green().bold(), key);
    Ok(())
}
