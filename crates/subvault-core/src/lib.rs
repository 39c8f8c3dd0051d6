//! subvault Core Library
//!
//! Durable per-domain subdomain store with tiered resolution over a
//! content-addressed network.
//!
//! ## Overview
//!
//! Each root domain (`example.com`) owns a compressed JSON-lines snapshot of
//! every hostname ever discovered under it, with first/last-seen times and the
//! discovery methods that saw it. Lookups try the local store first, then the
//! content network (global index → domain record), and only then an external
//! scanner whose results are merged and published back.
//!
//! ## Core Principles
//!
//! - **Local-first**: the store answers without any network
//! - **Monotonic**: merges only add hostnames and provenance bits
//! - **Tiered failover**: local node, then public gateways, strictly in order
//!
//! ## Quick Start
//!
//! ```ignore
//! use subvault_core::{SourceMask, SubVault, VaultConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vault = SubVault::open(VaultConfig::default())?;
//!
//!     vault.merge("example.com", ["www.example.com", "api.example.com"], SourceMask::SCAN)?;
//!
//!     for host in vault.resolve("example.com").await? {
//!         println!("{}", host);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod manifest;
pub mod merge;
pub mod network;
pub mod normalize;
pub mod scan;
pub mod store;
pub mod types;

// Re-exports
pub use config::VaultConfig;
pub use engine::{
    CacheStatus, LookupOptions, LookupReport, LookupSource, PublishOutcome, StatusReport, SubVault,
};
pub use error::{VaultError, VaultResult};
pub use index::IndexCache;
pub use manifest::Manifest;
pub use merge::MergeEngine;
pub use network::{
    DomainRecord, GatewayClient, GatewayConfig, GlobalIndex, HttpResponse, HttpTransport,
    NetworkResolver, NetworkStatus, Resolution, ResolutionSource, ReqwestTransport, SyncReport,
    TransportError,
};
pub use normalize::{normalize_domain, normalize_host};
pub use scan::{Scanner, SubfinderScanner};
pub use store::{DeltaBatch, DomainStore};
pub use types::*;
