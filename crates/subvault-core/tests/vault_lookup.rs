//! End-to-end lookup, sync policy and status through the SubVault facade.

mod common;

use common::{open_vault, FakeNetwork, StaticScanner, NODE};
use subvault_core::{LookupOptions, LookupSource, PublishOutcome, SourceMask, VaultError};
use tempfile::TempDir;

fn offline() -> LookupOptions {
    LookupOptions {
        network: false,
        ..LookupOptions::default()
    }
}

// ============================================================================
// Lookup
// ============================================================================

#[tokio::test]
async fn test_scan_merge_publish_then_cache_hit() {
    let dir = TempDir::new().unwrap();
    let net = FakeNetwork::with_node();
    let vault = open_vault(dir.path(), &net);
    let scanner = StaticScanner(vec!["www.example.com", "api.example.com"]);

    let first = vault
        .lookup("example.com", &scanner, &LookupOptions::default())
        .await
        .unwrap();
    assert_eq!(first.source, LookupSource::Scan);
    assert_eq!(first.added, 2);
    assert_eq!(first.hostnames, vec!["api.example.com", "www.example.com"]);
    let PublishOutcome::Published(cid) = &first.publish else {
        panic!("expected publish, got {:?}", first.publish);
    };
    assert_eq!(vault.resolver().index().lookup("example.com").unwrap().as_ref(), Some(cid));

    let second = vault
        .lookup("example.com", &scanner, &LookupOptions::default())
        .await
        .unwrap();
    assert_eq!(second.source, LookupSource::Local);
    assert_eq!(second.added, 0);
    assert_eq!(second.publish, PublishOutcome::Skipped);
    assert_eq!(second.hostnames, first.hostnames);
}

#[tokio::test]
async fn test_publish_failure_keeps_results() {
    let dir = TempDir::new().unwrap();
    let net = FakeNetwork::without_node();
    let vault = open_vault(dir.path(), &net);

    let report = vault
        .lookup(
            "example.com",
            &StaticScanner(vec!["a.example.com"]),
            &LookupOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.hostnames, vec!["a.example.com"]);
    assert!(matches!(report.publish, PublishOutcome::Failed(_)));
    assert_eq!(vault.store().list("example.com").unwrap(), vec!["a.example.com"]);
}

#[tokio::test]
async fn test_offline_lookup_never_touches_network() {
    let dir = TempDir::new().unwrap();
    let net = FakeNetwork::with_node();
    let vault = open_vault(dir.path(), &net);

    let report = vault
        .lookup("example.com", &StaticScanner(vec!["a.example.com"]), &offline())
        .await
        .unwrap();
    assert_eq!(report.source, LookupSource::Scan);
    assert_eq!(report.publish, PublishOutcome::Skipped);

    let cached = vault
        .lookup("example.com", &StaticScanner(vec![]), &offline())
        .await
        .unwrap();
    assert_eq!(cached.source, LookupSource::Local);
    assert_eq!(cached.hostnames, vec!["a.example.com"]);

    assert!(net.calls().is_empty());
}

#[tokio::test]
async fn test_rescan_adds_only_new_hosts_and_publishes_again() {
    let dir = TempDir::new().unwrap();
    let net = FakeNetwork::with_node();
    let vault = open_vault(dir.path(), &net);

    vault
        .lookup(
            "example.com",
            &StaticScanner(vec!["a.example.com"]),
            &LookupOptions::default(),
        )
        .await
        .unwrap();

    let rescan = LookupOptions {
        rescan: true,
        ..LookupOptions::default()
    };
    let report = vault
        .lookup(
            "example.com",
            &StaticScanner(vec!["a.example.com", "b.example.com"]),
            &rescan,
        )
        .await
        .unwrap();
    assert_eq!(report.source, LookupSource::Scan);
    assert_eq!(report.added, 1);
    assert!(matches!(report.publish, PublishOutcome::Published(_)));

    // Nothing new: no republish
    let again = vault
        .lookup(
            "example.com",
            &StaticScanner(vec!["b.example.com"]),
            &rescan,
        )
        .await
        .unwrap();
    assert_eq!(again.added, 0);
    assert_eq!(again.publish, PublishOutcome::Skipped);
    assert_eq!(again.hostnames, vec!["a.example.com", "b.example.com"]);

    let deltas = vault.deltas("example.com").unwrap();
    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[1].records[0].sub, "b.example.com");
}

#[tokio::test]
async fn test_no_publish_option() {
    let dir = TempDir::new().unwrap();
    let net = FakeNetwork::with_node();
    let vault = open_vault(dir.path(), &net);
    let options = LookupOptions {
        publish: false,
        ..LookupOptions::default()
    };

    let report = vault
        .lookup("example.com", &StaticScanner(vec!["a.example.com"]), &options)
        .await
        .unwrap();
    assert_eq!(report.publish, PublishOutcome::Skipped);
    assert!(!net.calls().iter().any(|url| url.contains("/api/v0/add")));
}

#[tokio::test]
async fn test_lookup_rejects_bad_domain() {
    let dir = TempDir::new().unwrap();
    let vault = open_vault(dir.path(), &FakeNetwork::with_node());

    let err = vault
        .lookup("", &StaticScanner(vec![]), &LookupOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidDomain(_)));
}

// ============================================================================
// Sync Policy
// ============================================================================

#[tokio::test]
async fn test_sync_due_when_store_empty_or_never_synced() {
    let dir = TempDir::new().unwrap();
    let vault = open_vault(dir.path(), &FakeNetwork::with_node());

    assert!(vault.sync_due().unwrap());

    vault.merge("example.com", ["a.example.com"], SourceMask::SCAN).unwrap();
    assert!(vault.sync_due().unwrap(), "never synced");

    vault.sync(std::time::Duration::from_secs(5)).await.unwrap();
    assert!(!vault.sync_due().unwrap());
    assert!(vault.resolver().index().last_sync().unwrap().is_some());
}

#[tokio::test]
async fn test_auto_sync_respects_disable_flag() {
    let dir = TempDir::new().unwrap();
    let vault = open_vault(dir.path(), &FakeNetwork::with_node());
    // Test vaults are opened with auto-sync off
    assert!(vault.auto_sync().await.is_none());
    assert!(vault.resolver().index().last_sync().unwrap().is_none());
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_status_report() {
    let dir = TempDir::new().unwrap();
    let net = FakeNetwork::with_node();
    let vault = open_vault(dir.path(), &net);
    vault.merge("example.com", ["a.example.com"], SourceMask::SCAN).unwrap();
    vault.merge("example.org", ["a.example.org"], SourceMask::SCAN).unwrap();
    vault.publish_domain("example.com").await.unwrap();

    let status = vault.status().await.unwrap();
    assert!(status.network.node_available);
    assert_eq!(status.network.indexed_domains, 1);
    assert!(status.network.index_cid.is_none());
    assert_eq!(status.cache.cached_domains, 2);
    assert_eq!(status.cache.domains, vec!["example.com", "example.org"]);
    assert!(status.peer_id.starts_with("subvault-"));

    let node = status
        .network
        .gateways
        .iter()
        .find(|g| g.endpoint == NODE)
        .unwrap();
    assert_eq!(node.stats.success_count, 1);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["network"]["node_available"], true);
    assert_eq!(json["network"]["gateways"][0]["tier"], "local");
}

#[tokio::test]
async fn test_status_with_node_down() {
    let dir = TempDir::new().unwrap();
    let vault = open_vault(dir.path(), &FakeNetwork::without_node());

    let status = vault.status().await.unwrap();
    assert!(!status.network.node_available);
    assert_eq!(status.cache.cached_domains, 0);
    assert!(status.last_sync.is_none());
}
