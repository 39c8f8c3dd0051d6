//! In-memory content network for integration tests.
//!
//! `FakeNetwork` plays a local content node at `http://127.0.0.1:5001`
//! (version check, add, cat) and lets tests script any other URL.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use subvault_core::{
    GatewayConfig, HttpResponse, HttpTransport, Scanner, SubVault, TransportError, VaultConfig,
    VaultResult,
};

pub const NODE: &str = "http://127.0.0.1:5001";
pub const PRIMARY: &str = "https://primary.test/ipfs/";
pub const DWEB: &str = "https://dweb.test/ipfs/";
pub const BACKUP: &str = "https://backup.test/ipfs/";

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, Bytes),
    Refused,
    /// Never answers; the caller's timeout fires
    Hang,
}

#[derive(Default)]
struct NetState {
    node_up: bool,
    blobs: HashMap<String, Bytes>,
    overrides: HashMap<String, Reply>,
    calls: Vec<String>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct FakeNetwork {
    state: Arc<Mutex<NetState>>,
}

impl FakeNetwork {
    /// A network whose local node is running.
    pub fn with_node() -> Self {
        let net = Self::default();
        net.set_node_up(true);
        net
    }

    /// A network with no local node.
    pub fn without_node() -> Self {
        Self::default()
    }

    pub fn set_node_up(&self, up: bool) {
        self.state.lock().unwrap().node_up = up;
    }

    /// Store `data` on the node and return its address.
    pub fn put(&self, data: impl Into<Bytes>) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let cid = format!("bafytest{:04}", state.next_id);
        state.blobs.insert(cid.clone(), data.into());
        cid
    }

    pub fn blob(&self, cid: &str) -> Option<Bytes> {
        self.state.lock().unwrap().blobs.get(cid).cloned()
    }

    pub fn script(&self, url: impl Into<String>, reply: Reply) {
        self.state.lock().unwrap().overrides.insert(url.into(), reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn route(&self, url: &str, upload: Option<Bytes>) -> Reply {
        let mut state = self.state.lock().unwrap();
        state.calls.push(url.to_string());

        if let Some(reply) = state.overrides.get(url) {
            return reply.clone();
        }

        let Some(path) = url.strip_prefix(NODE) else {
            return Reply::Refused;
        };
        if !state.node_up {
            return Reply::Refused;
        }

        if path == "/api/v0/version" {
            return Reply::Status(200, Bytes::from_static(br#"{"Version":"0.29.0"}"#));
        }
        if path == "/api/v0/add?pin=true" {
            let Some(data) = upload else {
                return Reply::Status(400, Bytes::from_static(b"file argument required"));
            };
            state.next_id += 1;
            let cid = format!("bafytest{:04}", state.next_id);
            let size = data.len();
            state.blobs.insert(cid.clone(), data);
            let reply = format!(r#"{{"Name":"record.json","Hash":"{}","Size":"{}"}}"#, cid, size);
            return Reply::Status(200, Bytes::from(reply));
        }
        if let Some(cid) = path.strip_prefix("/api/v0/cat?arg=") {
            return match state.blobs.get(cid) {
                Some(data) => Reply::Status(200, data.clone()),
                None => Reply::Status(500, Bytes::from_static(b"block not found")),
            };
        }
        Reply::Status(404, Bytes::new())
    }

    async fn answer(
        &self,
        url: &str,
        upload: Option<Bytes>,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<HttpResponse, TransportError> {
        match self.route(url, upload) {
            Reply::Status(_, body) if body.len() > max_bytes => Err(TransportError::TooLarge {
                url: url.to_string(),
                limit: max_bytes,
            }),
            Reply::Status(status, body) => Ok(HttpResponse::new(status, body)),
            Reply::Refused => Err(TransportError::Request {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
            Reply::Hang => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout {
                    url: url.to_string(),
                })
            }
        }
    }
}

impl HttpTransport for FakeNetwork {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<HttpResponse, TransportError> {
        self.answer(url, None, timeout, max_bytes).await
    }

    async fn post(
        &self,
        url: &str,
        upload: Option<Bytes>,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<HttpResponse, TransportError> {
        self.answer(url, upload, timeout, max_bytes).await
    }
}

/// Gateway tiers pointing only at the fake network.
pub fn test_gateways() -> GatewayConfig {
    GatewayConfig {
        local_api: vec![NODE.to_string()],
        local_gateways: Vec::new(),
        primary: vec![PRIMARY.to_string()],
        decentralized: vec![DWEB.to_string()],
        backup: vec![BACKUP.to_string()],
        ..GatewayConfig::default()
    }
}

pub fn test_config(data_dir: &Path) -> VaultConfig {
    let mut config = VaultConfig::new(data_dir);
    config.gateway = test_gateways();
    config.auto_sync = false;
    config
}

/// Open a vault on the fake network. The manifest's gateway list (if any) is
/// ignored so lookups never leave the test endpoints.
pub fn open_vault(data_dir: &Path, net: &FakeNetwork) -> SubVault<FakeNetwork> {
    let manifest_path = data_dir.join("manifest.json");
    let mut manifest = subvault_core::Manifest::load_or_default(&manifest_path);
    manifest.gateways = vec![PRIMARY.to_string()];
    manifest.save(&manifest_path).unwrap();

    SubVault::with_transport(test_config(data_dir), net.clone()).unwrap()
}

/// Scanner returning a fixed set of hostnames.
pub struct StaticScanner(pub Vec<&'static str>);

impl Scanner for StaticScanner {
    async fn scan(&self, _domain: &str) -> VaultResult<BTreeSet<String>> {
        Ok(self.0.iter().map(|h| h.to_string()).collect())
    }
}
