//! Subcommands of the `aq` binary.

pub mod chain;
pub mod gc;
pub mod merge;
pub mod revise;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::session::Session;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a chain from a revision back to its genesis
    Walk {
        /// Revision key (owner_hash)
        key: String,
        /// Print genesis first
        #[arg(long)]
        from_genesis: bool,
    },
    /// Print the assembled tree of a chain as JSON
    Tree {
        /// Head revision key (owner_hash)
        key: String,
        /// Expand linked chains
        #[arg(long)]
        linked: bool,
        /// Include downloadable file objects
        #[arg(long)]
        files: bool,
        /// Start from the newest descendant of KEY instead of KEY itself
        #[arg(long)]
        latest: bool,
    },
    /// List the head revisions of an owner
    Latest {
        owner: String,
    },
    /// Tag a head revision with the workflow template it follows
    Tag {
        /// Head revision key (owner_hash)
        key: String,
        #[arg(long)]
        template: Option<String>,
        #[arg(long)]
        workflow: bool,
    },
    /// Store a file and start (or extend) a chain with it
    AddFile {
        owner: String,
        path: PathBuf,
        /// Revision to append to; omitted for a new chain
        #[arg(long)]
        previous: Option<String>,
        /// Name recorded for the file (default: the path's file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Append a form revision
    AddForm {
        owner: String,
        /// Field as KEY=VALUE, repeatable
        #[arg(long = "field", value_name = "KEY=VALUE", required = true)]
        fields: Vec<String>,
        #[arg(long)]
        previous: Option<String>,
    },
    /// Append a link revision pointing at other chains
    Link {
        owner: String,
        /// Revision to append to
        #[arg(long)]
        previous: String,
        /// Linked revision hashes, bare or owner_hash
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Delete one revision
    Delete {
        key: String,
        /// Acting owner
        #[arg(long)]
        actor: String,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a revision together with its whole chain
    Purge {
        key: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        json: bool,
    },
    /// Copy a chain to another owner
    Transfer {
        /// Head of the source chain (owner_hash)
        key: String,
        /// Receiving owner
        #[arg(long)]
        to: String,
        /// Fail unless the receiver's version still matches
        #[arg(long)]
        expect_version: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Merge a chain into the receiver's copy of it
    Merge {
        key: String,
        #[arg(long)]
        to: String,
        /// replace or fork
        #[arg(long, default_value = "replace")]
        strategy: aq_merge::MergeStrategy,
        #[arg(long)]
        expect_version: Option<u64>,
        #[arg(long)]
        json: bool,
    },
}

/// Run `command` against an open session.
pub fn run(command: Command, session: &mut Session) -> Result<()> {
    match command {
        Command::Walk { key, from_genesis } => chain::cmd_walk(session, &key, from_genesis),
        Command::Tree {
            key,
            linked,
            files,
            latest,
        } => chain::cmd_tree(session, &key, linked, files, latest),
        Command::Latest { owner } => chain::cmd_latest(session, &owner),
        Command::Tag {
            key,
            template,
            workflow,
        } => chain::cmd_tag(session, &key, template.as_deref(), workflow),
        Command::AddFile {
            owner,
            path,
            previous,
            name,
        } => revise::cmd_add_file(session, &owner, &path, previous.as_deref(), name),
        Command::AddForm {
            owner,
            fields,
            previous,
        } => revise::cmd_add_form(session, &owner, &fields, previous.as_deref()),
        Command::Link {
            owner,
            previous,
            targets,
        } => revise::cmd_link(session, &owner, &previous, targets),
        Command::Delete { key, actor, json } => gc::cmd_delete(session, &key, &actor, false, json),
        Command::Purge { key, actor, json } => gc::cmd_delete(session, &key, &actor, true, json),
        Command::Transfer {
            key,
            to,
            expect_version,
            json,
        } => merge::cmd_transfer(session, &key, &to, expect_version, json),
        Command::Merge {
            key,
            to,
            strategy,
            expect_version,
            json,
        } => merge::cmd_merge(session, &key, &to, strategy, expect_version, json),
    }
}
