//! JSON documents exchanged over the content network.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::types::SubdomainRecord;

/// Current [`DomainRecord`] format version
pub const RECORD_VERSION: u32 = 1;

fn default_version() -> u32 {
    RECORD_VERSION
}

/// Published content for one root domain.
///
/// `content_hash` is the BLAKE3 hex digest of the JSON-serialized
/// `subdomains` array. It lets a reader detect a record whose payload was
/// altered after publication. An empty hash is accepted as "unchecked".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub domain: String,
    pub subdomains: Vec<SubdomainRecord>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl DomainRecord {
    /// Build a record for `domain` from the store's records, sorted by hostname.
    pub fn build(
        domain: impl Into<String>,
        mut subdomains: Vec<SubdomainRecord>,
        contributor: impl Into<String>,
        now: DateTime<Utc>,
    ) -> VaultResult<Self> {
        subdomains.sort_by(|a, b| a.sub.cmp(&b.sub));
        let content_hash = Self::compute_hash(&subdomains)?;

        Ok(Self {
            domain: domain.into(),
            subdomains,
            last_updated: now,
            contributors: vec![contributor.into()],
            content_hash,
            version: RECORD_VERSION,
        })
    }

    pub fn compute_hash(subdomains: &[SubdomainRecord]) -> VaultResult<String> {
        let payload = serde_json::to_vec(subdomains)?;
        Ok(blake3::hash(&payload).to_hex().to_string())
    }

    /// Check the record belongs to `domain` and its payload matches its hash.
    pub fn verify(&self, domain: &str) -> VaultResult<()> {
        if self.domain != domain {
            return Err(VaultError::CorruptData(format!(
                "record is for {:?}, expected {:?}",
                self.domain, domain
            )));
        }
        if self.version > RECORD_VERSION {
            return Err(VaultError::CorruptData(format!(
                "unsupported record version {}",
                self.version
            )));
        }
        if !self.content_hash.is_empty()
            && self.content_hash != Self::compute_hash(&self.subdomains)?
        {
            return Err(VaultError::CorruptData(format!(
                "content hash mismatch for {}",
                self.domain
            )));
        }
        Ok(())
    }

    /// Hostnames carried by the record, in record order.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.subdomains.iter().map(|r| r.sub.as_str())
    }

    pub fn to_bytes(&self) -> VaultResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(data: &[u8]) -> VaultResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Published map from root domain to the content address of its latest record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalIndex {
    #[serde(default)]
    pub domains: BTreeMap<String, String>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub peer_id: String,
}

impl GlobalIndex {
    pub fn lookup(&self, domain: &str) -> Option<&str> {
        self.domains
            .get(domain)
            .map(String::as_str)
            .filter(|cid| !cid.is_empty())
    }

    /// Lay `entries` over this index; entries win on conflict.
    pub fn overlay<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (domain, cid) in entries {
            self.domains.insert(domain.into(), cid.into());
        }
    }

    pub fn to_bytes(&self) -> VaultResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(data: &[u8]) -> VaultResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceMask;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap()
    }

    fn sample() -> DomainRecord {
        let subs = vec![
            SubdomainRecord::new("www.example.com", at(), SourceMask::SCAN),
            SubdomainRecord::new("api.example.com", at(), SourceMask::SCAN),
        ];
        DomainRecord::build("example.com", subs, "subvault-test", at()).unwrap()
    }

    #[test]
    fn test_build_sorts_and_hashes() {
        let record = sample();
        assert_eq!(
            record.hostnames().collect::<Vec<_>>(),
            vec!["api.example.com", "www.example.com"]
        );
        assert_eq!(record.content_hash.len(), 64);
        assert_eq!(record.contributors, vec!["subvault-test"]);
        assert_eq!(record.version, RECORD_VERSION);
        record.verify("example.com").unwrap();
    }

    #[test]
    fn test_verify_survives_wire() {
        let record = sample();
        let decoded = DomainRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
        decoded.verify("example.com").unwrap();
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let mut record = sample();
        record.subdomains.push(SubdomainRecord::new("evil.example.com", at(), SourceMask::SCAN));
        assert!(matches!(record.verify("example.com"), Err(VaultError::CorruptData(_))));
    }

    #[test]
    fn test_wrong_domain_is_rejected() {
        assert!(sample().verify("example.org").is_err());
    }

    #[test]
    fn test_minimal_record_parses() {
        let json = br#"{
            "domain": "example.com",
            "subdomains": [{"sub":"a.example.com","first_seen":"2026-01-01T00:00:00Z","last_seen":"2026-01-01T00:00:00Z","src_bits":1}],
            "last_updated": "2026-01-01T00:00:00Z"
        }"#;
        let record = DomainRecord::from_bytes(json).unwrap();
        assert!(record.content_hash.is_empty());
        assert_eq!(record.version, 1);
        record.verify("example.com").unwrap();
    }

    #[test]
    fn test_index_overlay_and_lookup() {
        let mut index = GlobalIndex::from_bytes(
            br#"{"domains":{"example.com":"bafyold","example.org":""},"last_updated":"2026-01-01T00:00:00Z","peer_id":"p"}"#,
        )
        .unwrap();
        assert_eq!(index.lookup("example.com"), Some("bafyold"));
        assert_eq!(index.lookup("example.org"), None);

        index.overlay([("example.com", "bafynew"), ("example.net", "bafynet")]);
        assert_eq!(index.lookup("example.com"), Some("bafynew"));
        assert_eq!(index.lookup("example.net"), Some("bafynet"));
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        assert!(matches!(
            GlobalIndex::from_bytes(b"<html>rate limited</html>"),
            Err(VaultError::Serialization(_))
        ));
    }
}
