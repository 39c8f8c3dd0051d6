//! Tiered resolution over the local store and the content network.
//!
//! Resolve walks LocalCheck → IndexLookup → RecordFetch → LocalWriteback,
//! each step absorbing its own failures, so callers only ever see a hit or
//! [`VaultError::NotFound`].

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{VaultError, VaultResult};
use crate::index::IndexCache;
use crate::manifest::Manifest;
use crate::normalize::{normalize_domain, normalize_host};
use crate::store::DomainStore;
use crate::types::{SourceMask, SubdomainRecord};

use super::gateway::{GatewayClient, GatewayHealth};
use super::record::{DomainRecord, GlobalIndex};
use super::transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Local,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub domain: String,
    /// Sorted, deduplicated hostnames
    pub hostnames: Vec<String>,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Index entries whose local store was empty and were therefore fetched
    pub considered: usize,
    /// Of those, how many were fetched and written back
    pub synced: usize,
    /// The deadline or caller cancelled before every entry was visited
    pub cancelled: bool,
    /// Why the published index could not be read, if it could not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkStatus {
    pub node_available: bool,
    pub index_cid: Option<String>,
    pub indexed_domains: usize,
    /// Timestamp carried by the published index, if one was read
    pub index_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
    pub gateways: Vec<GatewayHealth>,
}

/// Global index as seen from here: the published index, overlaid by the
/// manifest's roots, overlaid by entries this node recorded itself.
struct IndexView {
    index: GlobalIndex,
    remote_error: Option<String>,
}

pub struct NetworkResolver<T> {
    store: DomainStore,
    index: IndexCache,
    gateway: GatewayClient<T>,
    manifest: RwLock<Manifest>,
    manifest_path: PathBuf,
}

impl<T> std::fmt::Debug for NetworkResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkResolver")
            .field("manifest_path", &self.manifest_path)
            .finish_non_exhaustive()
    }
}

impl<T: HttpTransport> NetworkResolver<T> {
    pub fn new(
        store: DomainStore,
        index: IndexCache,
        gateway: GatewayClient<T>,
        manifest: Manifest,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            index,
            gateway,
            manifest: RwLock::new(manifest),
            manifest_path: manifest_path.into(),
        }
    }

    pub fn index(&self) -> &IndexCache {
        &self.index
    }

    pub fn gateway(&self) -> &GatewayClient<T> {
        &self.gateway
    }

    /// Snapshot of the current manifest.
    pub fn manifest(&self) -> Manifest {
        self.manifest.read().clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Resolve
    // ═══════════════════════════════════════════════════════════════════════

    /// Resolve `domain` from the store, falling back to the network.
    ///
    /// A network hit is written back into the store, so the next call for the
    /// same domain resolves locally.
    pub async fn resolve(&self, domain: &str) -> VaultResult<Resolution> {
        let domain = normalize_domain(domain)?;

        match self.store.list(&domain) {
            Ok(hostnames) if !hostnames.is_empty() => {
                debug!(domain = %domain, count = hostnames.len(), "Resolved from local store");
                return Ok(Resolution {
                    domain,
                    hostnames,
                    source: ResolutionSource::Local,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(domain = %domain, error = %e, "Local store unreadable, trying network"),
        }

        let Some(cid) = self.lookup_address(&domain).await else {
            debug!(domain = %domain, "Domain not in global index");
            return Err(VaultError::NotFound(domain));
        };

        let record = match self.fetch_record(&domain, &cid).await {
            Ok(record) => record,
            Err(e) => {
                warn!(domain = %domain, cid = %cid, error = %e, "Record fetch failed");
                return Err(VaultError::NotFound(domain));
            }
        };

        let hostnames = record_hostnames(&record);
        if hostnames.is_empty() {
            debug!(domain = %domain, cid = %cid, "Fetched record is empty");
            return Err(VaultError::NotFound(domain));
        }

        match self.write_back(&domain, &hostnames) {
            Ok(true) => {}
            Ok(false) => {
                // Something was merged while the record was in flight; the store wins
                debug!(
                    domain = %domain,
                    cid = %cid,
                    "Store filled during fetch, keeping local data"
                );
                return Ok(Resolution {
                    hostnames: self.store.list(&domain)?,
                    domain,
                    source: ResolutionSource::Local,
                });
            }
            Err(e) => warn!(domain = %domain, error = %e, "Failed to cache network result"),
        }

        info!(domain = %domain, cid = %cid, count = hostnames.len(), "Resolved from network");
        Ok(Resolution {
            domain,
            hostnames,
            source: ResolutionSource::Network,
        })
    }

    /// Content address for `domain`, consulting the cheapest view first.
    async fn lookup_address(&self, domain: &str) -> Option<String> {
        match self.index.lookup(domain) {
            Ok(Some(cid)) => return Some(cid),
            Ok(None) => {}
            Err(e) => warn!(domain, error = %e, "Local index unreadable"),
        }

        if let Some(cid) = self.manifest.read().cid_for(domain) {
            return Some(cid.to_string());
        }

        match self.fetch_remote_index().await {
            Ok(Some(index)) => index.lookup(domain).map(str::to_string),
            Ok(None) => None,
            Err(e) => {
                debug!(domain, error = %e, "Published index unavailable");
                None
            }
        }
    }

    async fn fetch_remote_index(&self) -> VaultResult<Option<GlobalIndex>> {
        let index_cid = self.manifest.read().index_cid.clone();
        let Some(index_cid) = index_cid else {
            return Ok(None);
        };
        let data = self.gateway.fetch(&index_cid).await?;
        Ok(Some(GlobalIndex::from_bytes(&data)?))
    }

    async fn index_view(&self) -> VaultResult<IndexView> {
        let (mut index, remote_error) = match self.fetch_remote_index().await {
            Ok(index) => (index.unwrap_or_default(), None),
            Err(e) if e.is_recoverable() => (GlobalIndex::default(), Some(e.to_string())),
            Err(e) => return Err(e),
        };

        {
            let manifest = self.manifest.read();
            index.overlay(
                manifest
                    .roots
                    .iter()
                    .filter(|(_, root)| !root.shard_cid.is_empty())
                    .map(|(domain, root)| (domain.clone(), root.shard_cid.clone())),
            );
        }
        index.overlay(self.index.to_global_index()?.domains);

        Ok(IndexView {
            index,
            remote_error,
        })
    }

    async fn fetch_record(&self, domain: &str, cid: &str) -> VaultResult<DomainRecord> {
        let data = self.gateway.fetch(cid).await?;
        let record = DomainRecord::from_bytes(&data)?;
        record.verify(domain)?;
        Ok(record)
    }

    /// Seed an empty store with fetched hostnames.
    ///
    /// Returns `false` without writing if the store gained records since it
    /// was last checked.
    fn write_back(&self, domain: &str, hostnames: &[String]) -> VaultResult<bool> {
        let lock = self.store.domain_lock(domain)?;
        let _guard = lock.lock();

        let mut occupied = false;
        self.store.iter_records(domain, |_| occupied = true)?;
        if occupied {
            return Ok(false);
        }

        let now = Utc::now();
        let records = hostnames
            .iter()
            .map(|sub| SubdomainRecord::new(sub.clone(), now, SourceMask::NETWORK))
            .collect();
        self.store.write_snapshot_locked(domain, records)?;
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Publish
    // ═══════════════════════════════════════════════════════════════════════

    /// Publish `records` as `domain`'s record and remember the new address.
    ///
    /// Failures surface unchanged and never touch the store.
    pub async fn publish_domain(
        &self,
        domain: &str,
        records: Vec<SubdomainRecord>,
    ) -> VaultResult<String> {
        let domain = normalize_domain(domain)?;
        if records.is_empty() {
            return Err(VaultError::NotFound(domain));
        }

        let record = DomainRecord::build(&domain, records, self.index.peer_id()?, Utc::now())?;
        let cid = self.gateway.publish(record.to_bytes()?).await?;

        if let Err(e) = self.index.record(&domain, &cid) {
            warn!(domain = %domain, cid = %cid, error = %e, "Failed to update local index");
        }
        {
            let mut manifest = self.manifest.write();
            manifest.set_root(&domain, &cid);
            if let Err(e) = manifest.save(&self.manifest_path) {
                warn!(domain = %domain, cid = %cid, error = %e, "Failed to save manifest");
            }
        }

        info!(
            domain = %domain,
            cid = %cid,
            count = record.subdomains.len(),
            "Published domain record"
        );
        Ok(cid)
    }

    /// Publish the current index view and record its address as `index_cid`.
    pub async fn publish_index(&self) -> VaultResult<String> {
        let view = self.index_view().await?;
        if let Some(reason) = &view.remote_error {
            warn!(error = %reason, "Publishing without the previous index");
        }

        let mut index = view.index;
        index.last_updated = Utc::now();
        index.peer_id = self.index.peer_id()?;

        let cid = self.gateway.publish(index.to_bytes()?).await?;

        let mut manifest = self.manifest.write();
        manifest.index_cid = Some(cid.clone());
        if let Err(e) = manifest.save(&self.manifest_path) {
            warn!(cid = %cid, error = %e, "Index published but manifest not saved");
            return Err(e);
        }

        info!(cid = %cid, domains = index.domains.len(), "Published global index");
        Ok(cid)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════════════════

    /// Pull every indexed domain missing from the store, giving up at `deadline`.
    pub async fn sync_all(&self, deadline: Duration) -> VaultResult<SyncReport> {
        let cancel = CancellationToken::new();
        let sync = self.sync_until(&cancel);
        tokio::pin!(sync);

        tokio::select! {
            report = &mut sync => report,
            _ = tokio::time::sleep(deadline) => {
                debug!(?deadline, "Sync deadline reached");
                cancel.cancel();
                sync.await
            }
        }
    }

    /// Pull every indexed domain missing from the store until `cancel` fires.
    ///
    /// Cancellation drops the in-flight fetch and returns what was reached so far.
    pub async fn sync_until(&self, cancel: &CancellationToken) -> VaultResult<SyncReport> {
        let mut report = SyncReport::default();

        let view = tokio::select! {
            _ = cancel.cancelled() => {
                report.cancelled = true;
                return Ok(report);
            }
            view = self.index_view() => view?,
        };
        report.index_error = view.remote_error;

        for (key, cid) in &view.index.domains {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let domain = match normalize_domain(key) {
                Ok(domain) => domain,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping malformed index key");
                    continue;
                }
            };
            match self.store.list(&domain) {
                Ok(existing) if !existing.is_empty() => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Skipping index entry");
                    continue;
                }
            }
            if cid.is_empty() {
                continue;
            }
            report.considered += 1;

            let fetched = tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                fetched = self.fetch_record(&domain, cid) => fetched,
            };

            let record = match fetched {
                Ok(record) => record,
                Err(e) => {
                    debug!(domain = %domain, cid = %cid, error = %e, "Sync fetch failed");
                    continue;
                }
            };
            let hostnames = record_hostnames(&record);
            if hostnames.is_empty() {
                continue;
            }
            match self.write_back(&domain, &hostnames) {
                Ok(true) => {
                    report.synced += 1;
                    debug!(domain = %domain, count = hostnames.len(), "Synced domain");
                }
                Ok(false) => debug!(domain = %domain, "Store filled during sync, skipped"),
                Err(e) => warn!(domain = %domain, error = %e, "Sync write-back failed"),
            }
        }

        info!(
            considered = report.considered,
            synced = report.synced,
            cancelled = report.cancelled,
            "Sync finished"
        );
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Status
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn network_status(&self) -> VaultResult<NetworkStatus> {
        let node_available = self.gateway.is_available().await;
        let view = self.index_view().await?;

        Ok(NetworkStatus {
            node_available,
            index_cid: self.manifest.read().index_cid.clone(),
            indexed_domains: view.index.domains.len(),
            index_updated: (view.index.last_updated != DateTime::<Utc>::default())
                .then_some(view.index.last_updated),
            index_error: view.remote_error,
            gateways: self.gateway.stats(),
        })
    }
}

/// Normalized, deduplicated, sorted hostnames of a fetched record.
fn record_hostnames(record: &DomainRecord) -> Vec<String> {
    let mut hostnames: Vec<String> = record
        .hostnames()
        .map(normalize_host)
        .filter(|h| !h.is_empty())
        .collect();
    hostnames.sort();
    hostnames.dedup();
    hostnames
}
