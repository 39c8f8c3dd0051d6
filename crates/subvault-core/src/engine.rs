//! SubVault - the primary entry point for subvault
//!
//! SubVault wires the DomainStore, MergeEngine, IndexCache and
//! NetworkResolver together and implements the lookup flow the CLI exposes:
//! network/local resolution, then a scan whose results are merged and
//! published.
//!
//! # Example
//!
//! ```ignore
//! use subvault_core::{LookupOptions, SubVault, SubfinderScanner, VaultConfig};
//!
//! let vault = SubVault::open(VaultConfig::default())?;
//! let report = vault
//!     .lookup("example.com", &SubfinderScanner::default(), &LookupOptions::default())
//!     .await?;
//! for host in &report.hostnames {
//!     println!("{}", host);
//! }
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::index::IndexCache;
use crate::manifest::Manifest;
use crate::merge::MergeEngine;
use crate::network::{
    GatewayClient, HttpTransport, NetworkResolver, NetworkStatus, ReqwestTransport,
    ResolutionSource, SyncReport,
};
use crate::normalize::normalize_domain;
use crate::scan::Scanner;
use crate::store::{DeltaBatch, DomainStore};
use crate::types::{SourceMask, SubdomainRecord};

/// How [`SubVault::lookup`] may answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupOptions {
    /// Skip cached answers and always scan
    pub rescan: bool,
    /// Consult the content network
    pub network: bool,
    /// Publish the snapshot after a scan that changed it
    pub publish: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            rescan: false,
            network: true,
            publish: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupSource {
    Local,
    Network,
    Scan,
}

impl From<ResolutionSource> for LookupSource {
    fn from(source: ResolutionSource) -> Self {
        match source {
            ResolutionSource::Local => LookupSource::Local,
            ResolutionSource::Network => LookupSource::Network,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum PublishOutcome {
    Skipped,
    Published(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupReport {
    pub domain: String,
    /// Sorted, deduplicated hostnames
    pub hostnames: Vec<String>,
    pub source: LookupSource,
    /// Hostnames that were new to the store in this lookup
    pub added: usize,
    pub publish: PublishOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub data_dir: PathBuf,
    pub cached_domains: usize,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub peer_id: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub cache: CacheStatus,
    pub network: NetworkStatus,
}

/// Main entry point for subvault
pub struct SubVault<T = ReqwestTransport> {
    config: VaultConfig,
    store: DomainStore,
    merger: MergeEngine,
    resolver: NetworkResolver<T>,
}

impl<T> std::fmt::Debug for SubVault<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubVault")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SubVault<ReqwestTransport> {
    /// Open the vault at `config.data_dir` talking HTTP through reqwest.
    pub fn open(config: VaultConfig) -> VaultResult<Self> {
        let transport = ReqwestTransport::new()?;
        Self::with_transport(config, transport)
    }
}

impl<T: HttpTransport> SubVault<T> {
    /// Open the vault with an explicit HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Io` if the data directories cannot be created.
    /// Returns a database error if the index cannot be opened.
    pub fn with_transport(config: VaultConfig, transport: T) -> VaultResult<Self> {
        info!(data_dir = %config.data_dir.display(), "Opening vault");

        let store = DomainStore::open(&config.data_dir)?;
        let index = IndexCache::open(config.index_path())?;
        let manifest = Manifest::load_or_default(config.manifest_path());

        let gateway_config = config.gateway.clone().with_primary(manifest.gateways.clone());
        let gateway = GatewayClient::new(transport, gateway_config);
        let resolver = NetworkResolver::new(
            store.clone(),
            index,
            gateway,
            manifest,
            config.manifest_path(),
        );

        Ok(Self {
            merger: MergeEngine::new(store.clone()),
            config,
            store,
            resolver,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn store(&self) -> &DomainStore {
        &self.store
    }

    pub fn resolver(&self) -> &NetworkResolver<T> {
        &self.resolver
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════════════════

    /// Resolve `domain` through the local store and the content network.
    pub async fn resolve(&self, domain: &str) -> VaultResult<Vec<String>> {
        Ok(self.resolver.resolve(domain).await?.hostnames)
    }

    /// Answer `domain` from the network or cache, scanning when neither has it.
    ///
    /// After a scan that added hostnames (or filled an empty cache) the
    /// snapshot is published; a publish failure is reported, not raised.
    pub async fn lookup<S: Scanner>(
        &self,
        domain: &str,
        scanner: &S,
        options: &LookupOptions,
    ) -> VaultResult<LookupReport> {
        let domain = normalize_domain(domain)?;

        if !options.rescan {
            if options.network {
                match self.resolver.resolve(&domain).await {
                    Ok(resolution) => {
                        return Ok(LookupReport {
                            domain,
                            hostnames: resolution.hostnames,
                            source: resolution.source.into(),
                            added: 0,
                            publish: PublishOutcome::Skipped,
                        });
                    }
                    Err(VaultError::NotFound(_)) => {}
                    Err(e) if e.is_recoverable() => {
                        warn!(
                            domain = %domain,
                            error = %e,
                            "Resolution failed, falling back to scan"
                        )
                    }
                    Err(e) => return Err(e),
                }
            } else {
                let cached = self.store.list(&domain)?;
                if !cached.is_empty() {
                    return Ok(LookupReport {
                        domain,
                        hostnames: cached,
                        source: LookupSource::Local,
                        added: 0,
                        publish: PublishOutcome::Skipped,
                    });
                }
            }
        }

        let had_cache = !self.store.list(&domain)?.is_empty();
        let found = scanner.scan(&domain).await?;
        let added = self.merger.merge(&domain, &found, SourceMask::SCAN)?;

        let publish = if options.network && options.publish && (!added.is_empty() || !had_cache) {
            match self.publish_domain(&domain).await {
                Ok(cid) => PublishOutcome::Published(cid),
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Publish failed, results kept locally");
                    PublishOutcome::Failed(e.to_string())
                }
            }
        } else {
            PublishOutcome::Skipped
        };

        Ok(LookupReport {
            hostnames: self.store.list(&domain)?,
            domain,
            source: LookupSource::Scan,
            added: added.len(),
            publish,
        })
    }

    /// Merge externally discovered hostnames into `domain`'s store.
    pub fn merge<I, S>(
        &self,
        domain: &str,
        found: I,
        source: SourceMask,
    ) -> VaultResult<Vec<SubdomainRecord>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.merger.merge(domain, found, source)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Publish
    // ═══════════════════════════════════════════════════════════════════════

    /// Publish `domain`'s stored snapshot, returning the new content address.
    pub async fn publish_domain(&self, domain: &str) -> VaultResult<String> {
        let records = self.store.load_records(domain)?;
        self.resolver.publish_domain(domain, records).await
    }

    /// Publish the global index view, returning its content address.
    pub async fn publish_index(&self) -> VaultResult<String> {
        self.resolver.publish_index().await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════════════════

    /// Pull indexed domains missing locally, within `deadline`.
    pub async fn sync(&self, deadline: Duration) -> VaultResult<SyncReport> {
        let report = self.resolver.sync_all(deadline).await?;
        self.resolver.index().mark_synced(Utc::now())?;
        Ok(report)
    }

    /// Whether the store is empty or the last sync is older than the configured interval.
    pub fn sync_due(&self) -> VaultResult<bool> {
        if self.store.list_domains().is_empty() {
            return Ok(true);
        }
        let Some(last_sync) = self.resolver.index().last_sync()? else {
            return Ok(true);
        };
        let age = Utc::now().signed_duration_since(last_sync);
        Ok(age.to_std().map_or(false, |age| age > self.config.auto_sync_interval))
    }

    /// Sync with the configured deadline if enabled and due.
    ///
    /// Failures are logged and swallowed.
    pub async fn auto_sync(&self) -> Option<SyncReport> {
        if !self.config.auto_sync {
            debug!("Auto-sync disabled");
            return None;
        }
        match self.sync_due() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!(error = %e, "Could not determine sync age");
                return None;
            }
        }

        info!(deadline = ?self.config.sync_deadline, "Auto-syncing with network");
        match self.sync(self.config.sync_deadline).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Auto-sync failed");
                None
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════

    pub fn cached_domains(&self) -> BTreeSet<String> {
        self.store.list_domains()
    }

    /// Delta batches for `domain`, oldest first.
    pub fn deltas(&self, domain: &str) -> VaultResult<Vec<DeltaBatch>> {
        self.store
            .list_deltas(domain)?
            .iter()
            .map(|id| self.store.read_delta(id))
            .collect()
    }

    pub async fn status(&self) -> VaultResult<StatusReport> {
        let domains: Vec<String> = self.cached_domains().into_iter().collect();
        let index = self.resolver.index();

        Ok(StatusReport {
            peer_id: index.peer_id()?,
            last_sync: index.last_sync()?,
            cache: CacheStatus {
                data_dir: self.config.data_dir.clone(),
                cached_domains: domains.len(),
                domains,
            },
            network: self.resolver.network_status().await?,
        })
    }
}
