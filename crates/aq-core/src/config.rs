//! Engine configuration.

use crate::ids::OwnerId;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Owner of the shared workflow templates.
pub const SYSTEM_OWNER: &str = "0xfabacc150f2a0000000000000000000000000000";

/// Genesis hashes of the built-in workflow templates, all owned by [`SYSTEM_OWNER`].
pub const SYSTEM_TEMPLATE_HASHES: [&str; 14] = [
    "0x6ff9a00f08f675cf17eb6ce8572a7fdcbd9d43ff6b043f2b233e7b70e2d9c15f", // access_agreement
    "0xfd2085151958e5dbaa32322f1266a3cf86ff547c75379a4c3ebd2272d4abd89f", // aqua_sign
    "0x9da9cfc4587b102da24aec2ec0dbf5f7d702284f8073b476f9e94043673cf481", // cheque
    "0x61e1f638ca1017bd7baa32816f93e19e156dc598229873b801cd4c4f496bd799", // dba_claim
    "0x0838e1ec49d66a0c39e068c8c8465ef59692a1d8565895e2a52c2c19c75ab673", // identity_attestation
    "0xc70a426b08fad5afe66ffea6237ef66a8718f0f66ee2a35dcc29cee3a4dfd0ee", // identity_claim
    "0x4c3358285abd6b2499d3187b6f977ddac73b85cfa2e9b16dc9140b47c46c27bb", // user_signature
    "0x6ef241fa1d974bf0d0585781d437c9f2d95e328b7ff922bf24261090c6c7ed3a", // domain_claim
    "0x4b9202932025142b4d9a75141239e46ebfed210d178434303d1c7e5f586959c3", // email_claim
    "0xfa4c4ffde60cd293033b986034890800a63bd27ca2cde44d1fce5a073ae5e937", // phone_number_claim
    "0x5e339aed4184f012f1ec5e9a084636fb437f535233e20277a63c13d3e4af96e8", // user_profile
    "0x5285900dcc1586d6f22bb2a16a15ef7fff78c9c8506d7745a947c50d2545a6d6", // identity_card
    "0x421c9bf06117814badfba270092c8b1070eb2d0968a27dd267fd3c2bc0249193", // ens_claim
    "0xa8d724f58d432b98347f1fd52caf40402fc668bea8f7a5a7266922874b5ab522", // aqua_certificate
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid system owner: {0}")]
    SystemOwner(#[from] crate::ids::KeyError),

    #[error("max_link_depth must be at least 1")]
    ZeroDepth,
}

/// Engine settings.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Prefix for file download URLs (`{base_url}/files/{file_hash}`).
    pub base_url: String,
    /// Owner that linked template hashes resolve to.
    pub system_owner: String,
    pub system_template_hashes: Vec<String>,
    /// Maximum nesting of linked-chain expansion.
    pub max_link_depth: usize,
    /// SQLite database path.
    pub database: Utf8PathBuf,
    /// Root directory of stored file blobs.
    pub blob_dir: Utf8PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            base_url: "http://localhost:3000".to_string(),
            system_owner: SYSTEM_OWNER.to_string(),
            system_template_hashes: SYSTEM_TEMPLATE_HASHES
                .iter()
                .map(|hash| hash.to_string())
                .collect(),
            max_link_depth: 32,
            database: Utf8PathBuf::from("aqua.db"),
            blob_dir: Utf8PathBuf::from("blobs"),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        OwnerId::new(self.system_owner.as_str())?;
        if self.max_link_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        Ok(())
    }

    pub fn system_owner_id(&self) -> Result<OwnerId, crate::ids::KeyError> {
        OwnerId::new(self.system_owner.as_str())
    }

    pub fn is_system_template(&self, hash: &str) -> bool {
        self.system_template_hashes.iter().any(|known| known == hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_link_depth, 32);
        assert_eq!(config.system_template_hashes.len(), 14);
        assert!(config.is_system_template(SYSTEM_TEMPLATE_HASHES[1]));
        assert!(!config.is_system_template("0x00"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
base_url = "https://aqua.example"
max_link_depth = 4
"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://aqua.example");
        assert_eq!(config.max_link_depth, 4);
        assert_eq!(config.system_owner, SYSTEM_OWNER);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("colour = \"blue\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_link_depth = 0"),
            Err(ConfigError::ZeroDepth)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aqua.toml");
        fs::write(&path, "database = \"/tmp/x.db\"\nblob_dir = \"/tmp/blobs\"\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.database, Utf8PathBuf::from("/tmp/x.db"));
        assert_eq!(config.blob_dir, Utf8PathBuf::from("/tmp/blobs"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EngineConfig::load("/nonexistent/aqua.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
