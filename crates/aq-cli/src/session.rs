//! Opening the store, blob directory and configuration from global flags.

use anyhow::{Context, Result};
use aq_core::{EngineConfig, OwnerId, PubkeyHash};
use aq_store::{FsBlobStore, Store};
use camino::Utf8PathBuf;
use clap::Args;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// SQLite database, overrides `database` from the config
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Blob directory, overrides `blob_dir` from the config
    #[arg(long, global = true)]
    pub blobs: Option<PathBuf>,
    /// Base URL for file download links
    #[arg(long = "base-url", global = true)]
    pub base_url: Option<String>,
}

fn utf8(path: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| anyhow::anyhow!("path {} is not valid UTF-8", path.display()))
}

impl StoreArgs {
    /// Config file (or defaults) with command-line overrides applied.
    pub fn config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(db) = &self.db {
            config.database = utf8(db.clone())?;
        }
        if let Some(blobs) = &self.blobs {
            config.blob_dir = utf8(blobs.clone())?;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        Ok(config)
    }
}

/// Everything a command needs.
pub struct Session {
    pub config: EngineConfig,
    pub store: Store,
    pub blobs: FsBlobStore,
}

impl Session {
    pub fn open(args: &StoreArgs) -> Result<Self> {
        let config = args.config()?;
        if let Some(parent) = config.database.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {parent}"))?;
            }
        }
        let store = Store::open(&config.database)
            .with_context(|| format!("failed to open database {}", config.database))?;
        let blobs = FsBlobStore::new(config.blob_dir.clone());
        debug!(database = %config.database, blobs = %config.blob_dir, "session opened");
        Ok(Self {
            config,
            store,
            blobs,
        })
    }
}

/// Parse an `owner_hash` key given on the command line.
pub fn parse_key(raw: &str) -> Result<PubkeyHash> {
    PubkeyHash::parse(raw).with_context(|| format!("invalid revision key '{raw}' (expected owner_hash)"))
}

pub fn parse_owner(raw: &str) -> Result<OwnerId> {
    OwnerId::new(raw).with_context(|| format!("invalid owner '{raw}'"))
}
