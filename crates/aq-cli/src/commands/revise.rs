//! Commands that append revisions.

use anyhow::{bail, Context, Result};
use aq_chain::{link_target, walk};
use aq_core::{FormField, LinkRecord, OwnerId, PubkeyHash};
use aq_store::{BlobStorage, FileAttachment, NewRevision, Reader, RevisionBody};
use colored::Colorize;
use std::fs;
use std::path::Path;

use crate::session::{parse_key, parse_owner, Session};

fn append(session: &mut Session, owner: OwnerId, previous: Option<PubkeyHash>, body: RevisionBody) -> Result<PubkeyHash> {
    let kind = body.revision_type();
    let key = session
        .store
        .append(&NewRevision::new(owner, previous, body))
        .with_context(|| format!("failed to append {kind} revision"))?;
    println!("{} {} {}", "✓".green().bold(), kind, key);
    Ok(key)
}

fn previous_key(previous: Option<&str>) -> Result<Option<PubkeyHash>> {
    previous.map(parse_key).transpose()
}

/// Handle `aq add-file`.
pub fn cmd_add_file(
    session: &mut Session,
    owner: &str,
    path: &Path,
    previous: Option<&str>,
    name: Option<String>,
) -> Result<()> {
    let owner = parse_owner(owner)?;
    let previous = previous_key(previous)?;
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a file name from {}", path.display()))?,
    };

    let blob = session.blobs.put(&bytes).context("failed to store file bytes")?;
    append(
        session,
        owner,
        previous,
        RevisionBody::File(FileAttachment {
            file_hash: blob.file_hash,
            name,
            location: blob.location,
            size: blob.size,
        }),
    )?;
    Ok(())
}

/// `KEY=VALUE` to a form field; keys gain the `forms_` prefix.
fn parse_field(raw: &str) -> Result<FormField> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("form field '{raw}' must be KEY=VALUE");
    };
    if key.is_empty() {
        bail!("form field '{raw}' has an empty key");
    }
    let key = if key.starts_with("forms_") {
        key.to_string()
    } else {
        format!("forms_{key}")
    };
    Ok(FormField {
        key,
        value: value.to_string(),
        field_type: "string".to_string(),
    })
}

/// Handle `aq add-form`.
pub fn cmd_add_form(session: &mut Session, owner: &str, fields: &[String], previous: Option<&str>) -> Result<()> {
    let owner = parse_owner(owner)?;
    let previous = previous_key(previous)?;
    let fields = fields
        .iter()
        .map(|raw| parse_field(raw))
        .collect::<Result<Vec<_>>>()?;
    append(session, owner, previous, RevisionBody::Form { fields, file: None })?;
    Ok(())
}

/// Handle `aq link`.
///
/// Each target must resolve to a stored revision; the genesis file hash of
/// its chain is recorded next to it.
pub fn cmd_link(session: &mut Session, owner: &str, previous: &str, targets: Vec<String>) -> Result<()> {
    let owner = parse_owner(owner)?;
    let previous = parse_key(previous)?;

    let mut file_hashes = Vec::with_capacity(targets.len());
    for raw in &targets {
        let target = link_target(&session.config, &owner, raw)
            .with_context(|| format!("invalid link target '{raw}'"))?;
        let chain = walk(&session.store, &target)
            .with_context(|| format!("link target {target} does not resolve"))?;
        let genesis = chain
            .last()
            .with_context(|| format!("link target {target} has an empty chain"))?;
        if let Some(file_hash) = session.store.indexed_file_hash(&genesis.key)? {
            file_hashes.push(file_hash.to_string());
        }
    }

    append(
        session,
        owner,
        Some(previous),
        RevisionBody::Link(LinkRecord {
            link_type: "aqua".to_string(),
            verification_hashes: targets,
            file_hashes,
            reference_count: 1,
        }),
    )?;
    Ok(())
}
