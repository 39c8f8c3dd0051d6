//! Per-domain durable subdomain store.
//!
//! Each root domain owns one zstd-compressed JSON-lines snapshot:
//!
//! ```text
//! <root>/
//! ├── cache/
//! │   ├── example.com.jsonl.zst                         # full snapshot, sorted by `sub`
//! │   └── example.org.jsonl.zst
//! └── deltas/
//!     └── example.com.delta-20261017T101500.123456789Z.jsonl.zst
//! ```
//!
//! Snapshots are rewritten in full on every merge (never appended) and replaced
//! atomically. Deltas are written once and never touched again.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::VaultResult;
use crate::normalize::normalize_domain;
use crate::types::SubdomainRecord;

mod codec;
mod delta;

pub use codec::ReadStats;
pub use delta::DeltaBatch;

const SNAPSHOT_SUFFIX: &str = ".jsonl.zst";

/// File-backed store of subdomain records, one snapshot per root domain.
///
/// Cloning is cheap and clones share the per-domain write locks.
#[derive(Clone, Debug)]
pub struct DomainStore {
    root: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DomainStore {
    /// Open (or initialize) a store rooted at `root`.
    ///
    /// Creates `cache/` and `deltas/` if needed. Failing to create them is fatal:
    /// the store cannot function without its directories.
    pub fn open(root: impl AsRef<Path>) -> VaultResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("cache"))?;
        fs::create_dir_all(root.join("deltas"))?;

        debug!(root = %root.display(), "Opened domain store");
        Ok(Self {
            root,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn deltas_dir(&self) -> PathBuf {
        self.root.join("deltas")
    }

    /// Path of the snapshot file for `domain`.
    pub fn snapshot_path(&self, domain: &str) -> VaultResult<PathBuf> {
        let domain = normalize_domain(domain)?;
        Ok(self.cache_dir().join(format!("{}{}", domain, SNAPSHOT_SUFFIX)))
    }

    /// Write lock for one domain.
    ///
    /// Anything that reads a snapshot, modifies it and writes it back must hold
    /// this for the whole sequence.
    pub fn domain_lock(&self, domain: &str) -> VaultResult<Arc<Mutex<()>>> {
        let domain = normalize_domain(domain)?;
        let mut locks = self.locks.lock();
        Ok(locks.entry(domain).or_default().clone())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    /// Stream every record of `domain` to `visitor`.
    ///
    /// Duplicates in a malformed file are passed through as-is; unparseable
    /// lines are skipped with a warning. A missing snapshot yields nothing.
    pub fn iter_records<F>(&self, domain: &str, visitor: F) -> VaultResult<ReadStats>
    where
        F: FnMut(SubdomainRecord),
    {
        let path = self.snapshot_path(domain)?;
        codec::read_file(&path, visitor)
    }

    /// Collect every record of `domain`.
    pub fn load_records(&self, domain: &str) -> VaultResult<Vec<SubdomainRecord>> {
        let mut records = Vec::new();
        self.iter_records(domain, |record| records.push(record))?;
        Ok(records)
    }

    /// Sorted, deduplicated hostnames stored for `domain`.
    pub fn list(&self, domain: &str) -> VaultResult<Vec<String>> {
        let mut subs = BTreeSet::new();
        self.iter_records(domain, |record| {
            subs.insert(record.sub);
        })?;
        Ok(subs.into_iter().collect())
    }

    /// Root domains that currently have a snapshot.
    pub fn list_domains(&self) -> BTreeSet<String> {
        let entries = match fs::read_dir(self.cache_dir()) {
            Ok(entries) => entries,
            Err(_) => return BTreeSet::new(),
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let domain = name.strip_suffix(SNAPSHOT_SUFFIX)?;
                (!domain.is_empty() && !domain.starts_with('.')).then(|| domain.to_string())
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Replace the snapshot of `domain` with `records`.
    ///
    /// Records are sorted by `sub`; if a key appears more than once the last
    /// occurrence wins. Either the whole snapshot is replaced or the previous one
    /// is left intact.
    pub fn write_snapshot(&self, domain: &str, records: Vec<SubdomainRecord>) -> VaultResult<()> {
        let lock = self.domain_lock(domain)?;
        let _guard = lock.lock();
        self.write_snapshot_locked(domain, records)
    }

    /// [`write_snapshot`](Self::write_snapshot) for callers already holding the domain lock.
    pub(crate) fn write_snapshot_locked(
        &self,
        domain: &str,
        records: Vec<SubdomainRecord>,
    ) -> VaultResult<()> {
        let path = self.snapshot_path(domain)?;

        let unique: BTreeMap<String, SubdomainRecord> = records
            .into_iter()
            .map(|record| (record.sub.clone(), record))
            .collect();
        let sorted: Vec<SubdomainRecord> = unique.into_values().collect();

        codec::replace_file(&path, &sorted)?;
        debug!(domain, records = sorted.len(), "Wrote snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceMask;
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(sub: &str) -> SubdomainRecord {
        SubdomainRecord::new(sub, Utc::now(), SourceMask::SCAN)
    }

    #[test]
    fn test_open_creates_layout() {
        let temp_dir = tempdir().unwrap();
        let store = DomainStore::open(temp_dir.path().join("vault")).unwrap();
        assert!(store.cache_dir().is_dir());
        assert!(store.deltas_dir().is_dir());
    }

    #[test]
    fn test_open_fails_on_file_root() {
        let temp_dir = tempdir().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        assert!(DomainStore::open(&blocker).is_err());
    }

    #[test]
    fn test_list_missing_domain_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = DomainStore::open(temp_dir.path()).unwrap();
        assert!(store.list("example.com").unwrap().is_empty());
    }

    #[test]
    fn test_write_snapshot_then_list_sorted_unique() {
        let temp_dir = tempdir().unwrap();
        let store = DomainStore::open(temp_dir.path()).unwrap();

        store
            .write_snapshot(
                "example.com",
                vec![
                    record("www.example.com"),
                    record("api.example.com"),
                    record("www.example.com"),
                    record("mail.example.com"),
                ],
            )
            .unwrap();

        assert_eq!(
            store.list("example.com").unwrap(),
            vec!["api.example.com", "mail.example.com", "www.example.com"]
        );

        // Persisted order is sorted too, not just the listing
        let subs: Vec<String> = store
            .load_records("example.com")
            .unwrap()
            .into_iter()
            .map(|r| r.sub)
            .collect();
        assert_eq!(subs, vec!["api.example.com", "mail.example.com", "www.example.com"]);
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let temp_dir = tempdir().unwrap();
        let store = DomainStore::open(temp_dir.path()).unwrap();

        let first = record("a.example.com");
        let mut second = record("a.example.com");
        second.src_bits = SourceMask::DNS_PROOF;

        store.write_snapshot("example.com", vec![first, second]).unwrap();

        let records = store.load_records("example.com").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].src_bits, SourceMask::DNS_PROOF);
    }

    #[test]
    fn test_list_domains() {
        let temp_dir = tempdir().unwrap();
        let store = DomainStore::open(temp_dir.path()).unwrap();
        assert!(store.list_domains().is_empty());

        store.write_snapshot("example.com", vec![record("a.example.com")]).unwrap();
        store.write_snapshot("Example.ORG", vec![record("b.example.org")]).unwrap();
        std::fs::write(store.cache_dir().join("notes.txt"), b"ignored").unwrap();

        let domains: Vec<String> = store.list_domains().into_iter().collect();
        assert_eq!(domains, vec!["example.com", "example.org"]);
    }

    #[test]
    fn test_list_domains_without_cache_dir() {
        let temp_dir = tempdir().unwrap();
        let store = DomainStore::open(temp_dir.path()).unwrap();
        std::fs::remove_dir_all(store.cache_dir()).unwrap();
        assert!(store.list_domains().is_empty());
    }

    #[test]
    fn test_rejects_path_like_domain() {
        let temp_dir = tempdir().unwrap();
        let store = DomainStore::open(temp_dir.path()).unwrap();
        assert!(store.write_snapshot("../escape", vec![]).is_err());
        assert!(store.list("a/b").is_err());
    }

    #[test]
    fn test_domain_lock_is_shared_across_clones() {
        let temp_dir = tempdir().unwrap();
        let store = DomainStore::open(temp_dir.path()).unwrap();
        let clone = store.clone();

        let a = store.domain_lock("example.com").unwrap();
        let b = clone.domain_lock("EXAMPLE.com").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
