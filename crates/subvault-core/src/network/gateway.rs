//! Tiered gateway client for the content network.
//!
//! Fetches walk the endpoint tiers strictly in order and stop at the first
//! success:
//!
//! 1. Local: the node's RPC API (`POST /api/v0/cat`) and its HTTP gateway,
//!    sharing one short budget
//! 2. Primary: the manifest's gateway list
//! 3. Decentralized: community-operated gateways
//! 4. Backup: last-resort gateways
//!
//! Publishing only ever goes through a local node. There is no public write
//! path, so a missing node is reported as [`VaultError::NodeUnavailable`].

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{VaultError, VaultResult};
use crate::manifest::DEFAULT_GATEWAYS;

use super::transport::{HttpTransport, TransportError};

pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(3);
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);
/// Hard cap on a fetched body
pub const MAX_CONTENT_BYTES: usize = 100 * 1024 * 1024;
/// Cap on RPC replies (version check, add result)
const MAX_RPC_REPLY_BYTES: usize = 64 * 1024;

const DECENTRALIZED_GATEWAYS: &[&str] = &[
    "https://dweb.link/ipfs/",
    "https://ipfs.eth.aragon.network/ipfs/",
    "https://hardbin.com/ipfs/",
    "https://gateway.temporal.cloud/ipfs/",
];

const BACKUP_GATEWAYS: &[&str] = &[
    "https://ipfs.fleek.co/ipfs/",
    "https://ipfs.infura.io/ipfs/",
    "https://gateway.originprotocol.com/ipfs/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayTier {
    Local,
    Primary,
    Decentralized,
    Backup,
}

impl std::fmt::Display for GatewayTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GatewayTier::Local => "local",
            GatewayTier::Primary => "primary",
            GatewayTier::Decentralized => "decentralized",
            GatewayTier::Backup => "backup",
        };
        f.write_str(name)
    }
}

/// Endpoints and timeouts for [`GatewayClient`].
///
/// Gateway URLs are prefixes the content address is appended to
/// (`https://ipfs.io/ipfs/`); API URLs are node base URLs (`http://127.0.0.1:5001`).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub local_api: Vec<String>,
    pub local_gateways: Vec<String>,
    pub primary: Vec<String>,
    pub decentralized: Vec<String>,
    pub backup: Vec<String>,
    /// Shared budget for every local candidate, also used for the publish check
    pub local_timeout: Duration,
    pub gateway_timeout: Duration,
    pub publish_timeout: Duration,
    pub max_content_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            local_api: owned(&["http://127.0.0.1:5001", "http://localhost:5001"]),
            local_gateways: owned(&["http://127.0.0.1:8080/ipfs/"]),
            primary: owned(DEFAULT_GATEWAYS),
            decentralized: owned(DECENTRALIZED_GATEWAYS),
            backup: owned(BACKUP_GATEWAYS),
            local_timeout: LOCAL_TIMEOUT,
            gateway_timeout: GATEWAY_TIMEOUT,
            publish_timeout: PUBLISH_TIMEOUT,
            max_content_bytes: MAX_CONTENT_BYTES,
        }
    }
}

impl GatewayConfig {
    /// Replace the primary tier, keeping the current one if `gateways` is empty.
    pub fn with_primary(mut self, gateways: Vec<String>) -> Self {
        let gateways: Vec<String> = gateways
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        if !gateways.is_empty() {
            self.primary = gateways;
        }
        self
    }

    /// Remote tiers in trial order.
    fn remote_tiers(&self) -> [(GatewayTier, &[String]); 3] {
        [
            (GatewayTier::Primary, self.primary.as_slice()),
            (GatewayTier::Decentralized, self.decentralized.as_slice()),
            (GatewayTier::Backup, self.backup.as_slice()),
        ]
    }
}

/// Outcome counters for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

/// One configured endpoint and its counters, for status reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayHealth {
    pub endpoint: String,
    pub tier: GatewayTier,
    #[serde(flatten)]
    pub stats: GatewayStats,
}

/// Reply of `POST /api/v0/add`
#[derive(Debug, Deserialize)]
struct AddReply {
    #[serde(rename = "Hash", default)]
    hash: String,
}

enum Method {
    Get,
    Post,
}

pub struct GatewayClient<T> {
    transport: T,
    config: GatewayConfig,
    stats: Mutex<HashMap<String, GatewayStats>>,
}

impl<T> std::fmt::Debug for GatewayClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: HttpTransport> GatewayClient<T> {
    pub fn new(transport: T, config: GatewayConfig) -> Self {
        Self {
            transport,
            config,
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Fetch
    // ═══════════════════════════════════════════════════════════════════════

    /// Fetch the content at `cid`, walking every tier until one endpoint answers 2xx.
    pub async fn fetch(&self, cid: &str) -> VaultResult<Bytes> {
        let cid = check_cid(cid)?;
        let max = self.config.max_content_bytes;
        let mut attempts = 0usize;
        let mut last_error: Option<TransportError> = None;

        let local_deadline = Instant::now() + self.config.local_timeout;
        let local = self
            .config
            .local_api
            .iter()
            .map(|api| {
                let url = format!("{}/api/v0/cat?arg={}", api.trim_end_matches('/'), cid);
                (api, url, Method::Post)
            })
            .chain(
                self.config
                    .local_gateways
                    .iter()
                    .map(|gw| (gw, format!("{}{}", gw, cid), Method::Get)),
            );

        for (endpoint, url, method) in local {
            let remaining = local_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(cid, "Local budget spent, moving to remote gateways");
                break;
            }
            attempts += 1;
            match self.try_endpoint(endpoint, &url, method, remaining, max).await {
                Ok(body) => {
                    debug!(
                        cid,
                        endpoint = %endpoint,
                        bytes = body.len(),
                        "Fetched from local node"
                    );
                    return Ok(body);
                }
                Err(e) => last_error = Some(e),
            }
        }

        for (tier, gateways) in self.config.remote_tiers() {
            for gateway in gateways {
                attempts += 1;
                let url = format!("{}{}", gateway, cid);
                match self
                    .try_endpoint(gateway, &url, Method::Get, self.config.gateway_timeout, max)
                    .await
                {
                    Ok(body) => {
                        info!(
                            cid,
                            gateway = %gateway,
                            %tier,
                            bytes = body.len(),
                            "Fetched from gateway"
                        );
                        return Ok(body);
                    }
                    Err(e) => last_error = Some(e),
                }
            }
        }

        warn!(cid, attempts, "All gateways failed");
        Err(VaultError::GatewaysExhausted {
            cid: cid.to_string(),
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no endpoints configured".to_string()),
        })
    }

    async fn try_endpoint(
        &self,
        endpoint: &str,
        url: &str,
        method: Method,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<Bytes, TransportError> {
        let response = match method {
            Method::Get => self.transport.get(url, timeout, max_bytes).await,
            Method::Post => self.transport.post(url, None, timeout, max_bytes).await,
        };

        match response.and_then(|r| r.into_success(url)) {
            Ok(body) => {
                self.record(endpoint, true);
                Ok(body)
            }
            Err(e) => {
                debug!(endpoint, error = %e, "Endpoint failed");
                self.record(endpoint, false);
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Publish
    // ═══════════════════════════════════════════════════════════════════════

    /// Add and pin `data` on the local node, returning its content address.
    pub async fn publish(&self, data: Bytes) -> VaultResult<String> {
        let Some(api) = self.available_api().await else {
            return Err(VaultError::NodeUnavailable(format!(
                "no content node answered at {}; start one with `ipfs daemon`",
                self.config.local_api.join(", ")
            )));
        };

        let url = format!("{}/api/v0/add?pin=true", api.trim_end_matches('/'));
        let size = data.len();
        let response = self
            .transport
            .post(&url, Some(data), self.config.publish_timeout, MAX_RPC_REPLY_BYTES)
            .await;

        let body = match response.and_then(|r| r.into_success(&url)) {
            Ok(body) => body,
            Err(e) => {
                self.record(api, false);
                return Err(e.into());
            }
        };

        // One JSON object per added file; the last one names the root
        let reply = body
            .split(|b| *b == b'\n')
            .filter(|line| !line.trim_ascii().is_empty())
            .last()
            .ok_or_else(|| VaultError::CorruptData("empty reply from add".to_string()))?;
        let reply: AddReply = serde_json::from_slice(reply)?;
        let cid = check_cid(&reply.hash)
            .map_err(|_| {
                VaultError::CorruptData("add reply carries no content address".to_string())
            })?
            .to_string();

        self.record(api, true);
        info!(cid = %cid, bytes = size, node = %api, "Published to content network");
        Ok(cid)
    }

    /// Whether any local node answers the version check.
    pub async fn is_available(&self) -> bool {
        self.available_api().await.is_some()
    }

    async fn available_api(&self) -> Option<&str> {
        for api in &self.config.local_api {
            let url = format!("{}/api/v0/version", api.trim_end_matches('/'));
            match self
                .transport
                .post(&url, None, self.config.local_timeout, MAX_RPC_REPLY_BYTES)
                .await
            {
                Ok(response) if response.is_success() => return Some(api.as_str()),
                Ok(response) => debug!(api = %api, status = response.status, "Node check refused"),
                Err(e) => debug!(api = %api, error = %e, "Node check failed"),
            }
        }
        None
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Health
    // ═══════════════════════════════════════════════════════════════════════

    fn record(&self, endpoint: &str, success: bool) {
        let now = Utc::now();
        let mut stats = self.stats.lock();
        let entry = stats.entry(endpoint.to_string()).or_default();
        if success {
            entry.success_count += 1;
            entry.last_success = Some(now);
        } else {
            entry.failure_count += 1;
            entry.last_failure = Some(now);
        }
    }

    /// Counters for `endpoint`, zeroed if it has never been tried.
    pub fn stats_for(&self, endpoint: &str) -> GatewayStats {
        self.stats.lock().get(endpoint).cloned().unwrap_or_default()
    }

    /// Every configured endpoint in trial order, with its counters.
    pub fn stats(&self) -> Vec<GatewayHealth> {
        let stats = self.stats.lock();
        let local = self
            .config
            .local_api
            .iter()
            .chain(&self.config.local_gateways)
            .map(|e| (GatewayTier::Local, e));
        let remote = self
            .config
            .remote_tiers()
            .into_iter()
            .flat_map(|(tier, endpoints)| endpoints.iter().map(move |e| (tier, e)));

        local
            .chain(remote)
            .map(|(tier, endpoint)| GatewayHealth {
                endpoint: endpoint.clone(),
                tier,
                stats: stats.get(endpoint).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// Content addresses are multibase strings; anything else would change the URL's meaning.
fn check_cid(cid: &str) -> VaultResult<&str> {
    let cid = cid.trim();
    let valid = !cid.is_empty()
        && cid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(cid)
    } else {
        Err(VaultError::InvalidContentId(cid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_primary() {
        let config = GatewayConfig::default()
            .with_primary(vec![" https://gw.example/ipfs/ ".to_string()]);
        assert_eq!(config.primary, vec!["https://gw.example/ipfs/"]);

        let config = GatewayConfig::default().with_primary(vec!["  ".to_string()]);
        assert_eq!(config.primary.len(), DEFAULT_GATEWAYS.len());
    }

    #[test]
    fn test_check_cid() {
        assert_eq!(check_cid(" bafybeigdyrzt ").unwrap(), "bafybeigdyrzt");
        assert!(check_cid("").is_err());
        assert!(check_cid("bafy/../etc").is_err());
        assert!(check_cid("bafy?x=1").is_err());
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(GatewayTier::Decentralized.to_string(), "decentralized");
        assert_eq!(serde_json::to_string(&GatewayTier::Backup).unwrap(), "\"backup\"");
    }
}
