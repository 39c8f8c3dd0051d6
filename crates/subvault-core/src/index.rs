//! Local view of the global index, persisted with redb.
//!
//! Holds the domain → content address entries this node has published or
//! learned about, plus a little node metadata:
//! - the node's self identifier (generated once, reported as `peer_id`)
//! - the time of the last successful network sync
//! - the time the local index view last changed

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{VaultError, VaultResult};
use crate::network::record::GlobalIndex;

/// domain → latest known content address
const INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("global_index");
/// Node metadata (key → string value)
const META_TABLE: TableDefinition<&str, &str> = TableDefinition::new("node_meta");

const PEER_ID_KEY: &str = "peer_id";
const LAST_SYNC_KEY: &str = "last_sync";
const INDEX_UPDATED_KEY: &str = "index_updated";

/// redb-backed local copy of the global index
#[derive(Clone)]
pub struct IndexCache {
    db: Arc<RwLock<Database>>,
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache").finish_non_exhaustive()
    }
}

impl IndexCache {
    /// Open or create the index database at `path`.
    ///
    /// Creates the parent directory and both tables, and assigns this node a
    /// random identifier on first use.
    pub fn open(path: impl AsRef<Path>) -> VaultResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(INDEX_TABLE)?;
            let mut meta = write_txn.open_table(META_TABLE)?;
            let has_peer_id = meta.get(PEER_ID_KEY)?.is_some();
            if !has_peer_id {
                let mut bytes = [0u8; 16];
                rand::rng().fill_bytes(&mut bytes);
                let peer_id = format!("subvault-{}", hex::encode(bytes));
                meta.insert(PEER_ID_KEY, peer_id.as_str())?;
            }
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Index Entries
    // ═══════════════════════════════════════════════════════════════════════

    /// Record `cid` as the latest content address for `domain` (last write wins).
    pub fn record(&self, domain: &str, cid: &str) -> VaultResult<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut index = write_txn.open_table(INDEX_TABLE)?;
            index.insert(domain, cid)?;
            let mut meta = write_txn.open_table(META_TABLE)?;
            meta.insert(INDEX_UPDATED_KEY, now.as_str())?;
        }
        write_txn.commit()?;

        debug!(domain, cid, "Updated local index view");
        Ok(())
    }

    /// Content address recorded for `domain`.
    pub fn lookup(&self, domain: &str) -> VaultResult<Option<String>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(INDEX_TABLE)?;

        Ok(table.get(domain)?.map(|v| v.value().to_string()))
    }

    /// All recorded entries.
    pub fn entries(&self) -> VaultResult<BTreeMap<String, String>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(INDEX_TABLE)?;

        let mut entries = BTreeMap::new();
        for entry in table.iter()? {
            let (domain, cid) = entry?;
            entries.insert(domain.value().to_string(), cid.value().to_string());
        }
        Ok(entries)
    }

    /// The local entries as a [`GlobalIndex`] signed with this node's id.
    pub fn to_global_index(&self) -> VaultResult<GlobalIndex> {
        Ok(GlobalIndex {
            domains: self.entries()?,
            last_updated: self.meta_time(INDEX_UPDATED_KEY)?.unwrap_or_else(Utc::now),
            peer_id: self.peer_id()?,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Node Metadata
    // ═══════════════════════════════════════════════════════════════════════

    /// This node's self identifier.
    pub fn peer_id(&self) -> VaultResult<String> {
        self.meta(PEER_ID_KEY)?.ok_or_else(|| {
            VaultError::CorruptData("node id missing from index database".to_string())
        })
    }

    /// When the last network sync finished, if ever.
    pub fn last_sync(&self) -> VaultResult<Option<DateTime<Utc>>> {
        self.meta_time(LAST_SYNC_KEY)
    }

    pub fn mark_synced(&self, at: DateTime<Utc>) -> VaultResult<()> {
        let value = at.to_rfc3339();
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META_TABLE)?;
            meta.insert(LAST_SYNC_KEY, value.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn meta(&self, key: &str) -> VaultResult<Option<String>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;

        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Unparseable timestamps read as "never".
    fn meta_time(&self, key: &str) -> VaultResult<Option<DateTime<Utc>>> {
        Ok(self
            .meta(key)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc)))
    }
}
