//! Local manifest: known shard addresses per root domain and the gateway list.
//!
//! Persisted as `manifest.json` in the data directory:
//!
//! ```json
//! {
//!   "roots": { "example.com": { "shard_cid": "bafy..." } },
//!   "gateways": ["https://ipfs.io/ipfs/", "https://cloudflare-ipfs.com/ipfs/"],
//!   "index_cid": "bafy..."
//! }
//! ```
//!
//! A missing or unreadable manifest is never an error: loading falls back to
//! built-in defaults and backfills any empty field.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::VaultResult;

/// Public gateways tried, in order, when the manifest does not list any.
pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://ipfs.io/ipfs/",
    "https://cloudflare-ipfs.com/ipfs/",
    "https://gateway.pinata.cloud/ipfs/",
];

/// Manifest entry for one root domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootEntry {
    pub shard_cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub roots: BTreeMap<String, RootEntry>,
    #[serde(default)]
    pub gateways: Vec<String>,
    /// Content address of the most recent global index known to this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_cid: Option<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            roots: BTreeMap::new(),
            gateways: DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            index_cid: None,
        }
    }
}

impl Manifest {
    /// Load the manifest at `path`, or the defaults if it is absent or malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(_) => return Self::default(),
        };

        match serde_json::from_slice::<Manifest>(&data) {
            Ok(manifest) => manifest.backfilled(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid manifest file, using defaults");
                Self::default()
            }
        }
    }

    /// Write the manifest as pretty JSON, creating the parent directory if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> VaultResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Shard address recorded for `domain`, if any.
    pub fn cid_for(&self, domain: &str) -> Option<&str> {
        self.roots
            .get(domain)
            .map(|entry| entry.shard_cid.as_str())
            .filter(|cid| !cid.is_empty())
    }

    pub fn set_root(&mut self, domain: impl Into<String>, cid: impl Into<String>) {
        self.roots.insert(
            domain.into(),
            RootEntry {
                shard_cid: cid.into(),
            },
        );
    }

    fn backfilled(mut self) -> Self {
        self.gateways.retain(|g| !g.trim().is_empty());
        if self.gateways.is_empty() {
            self.gateways = Self::default().gateways;
        }
        if self.index_cid.as_deref().is_some_and(|cid| cid.trim().is_empty()) {
            self.index_cid = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::load_or_default(dir.path().join("manifest.json"));
        assert_eq!(manifest, Manifest::default());
        assert!(manifest.roots.is_empty());
        assert_eq!(manifest.gateways[0], "https://ipfs.io/ipfs/");
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(Manifest::load_or_default(&path), Manifest::default());
    }

    #[test]
    fn test_partial_manifest_is_backfilled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            br#"{"roots":{"example.com":{"shard_cid":"bafyroot"}},"gateways":[]}"#,
        )
        .unwrap();

        let manifest = Manifest::load_or_default(&path);
        assert_eq!(manifest.cid_for("example.com"), Some("bafyroot"));
        assert_eq!(manifest.gateways, Manifest::default().gateways);
        assert!(manifest.index_cid.is_none());
    }

    #[test]
    fn test_save_creates_directory_and_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("manifest.json");

        let mut manifest = Manifest::default();
        manifest.set_root("example.com", "bafyshard");
        manifest.gateways = vec!["https://gw.example/ipfs/".to_string()];
        manifest.index_cid = Some("bafyindex".to_string());
        manifest.save(&path).unwrap();

        assert_eq!(Manifest::load_or_default(&path), manifest);
    }

    #[test]
    fn test_index_cid_omitted_when_unset() {
        let json = serde_json::to_string(&Manifest::default()).unwrap();
        assert!(!json.contains("index_cid"));
    }

    #[test]
    fn test_save_failure_propagates() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        assert!(Manifest::default().save(blocker.join("manifest.json")).is_err());
    }
}
