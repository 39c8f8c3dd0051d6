//! Core types for subvault

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of discovery methods that have observed a hostname.
///
/// Only ever combined with `|`, so a record never loses provenance it already has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceMask(pub u32);

impl SourceMask {
    /// External subdomain scanner (subfinder)
    pub const SCAN: SourceMask = SourceMask(1);
    /// Certificate transparency logs
    pub const CERT_TRANSPARENCY: SourceMask = SourceMask(2);
    /// DNS resolution proof
    pub const DNS_PROOF: SourceMask = SourceMask(4);
    /// Anything else
    pub const OTHER: SourceMask = SourceMask(8);
    /// Written back from a DomainRecord fetched off the network tier
    pub const NETWORK: SourceMask = SourceMask(16);

    pub const fn empty() -> Self {
        SourceMask(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: SourceMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Names of the known bits that are set, for display.
    pub fn labels(self) -> Vec<&'static str> {
        [
            (Self::SCAN, "scan"),
            (Self::CERT_TRANSPARENCY, "ct"),
            (Self::DNS_PROOF, "dns"),
            (Self::OTHER, "other"),
            (Self::NETWORK, "network"),
        ]
        .into_iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, name)| name)
        .collect()
    }
}

impl BitOr for SourceMask {
    type Output = SourceMask;

    fn bitor(self, rhs: SourceMask) -> SourceMask {
        SourceMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for SourceMask {
    fn bitor_assign(&mut self, rhs: SourceMask) {
        self.0 |= rhs.0;
    }
}

/// One distinct normalized hostname within a root domain's store.
///
/// Serialized as one JSON object per line: `{sub, first_seen, last_seen, src_bits}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainRecord {
    /// Normalized hostname, unique within its domain
    pub sub: String,
    /// Set at first observation, never changed afterwards
    pub first_seen: DateTime<Utc>,
    /// Bumped on every re-observation
    pub last_seen: DateTime<Utc>,
    /// Discovery methods that have seen this hostname
    pub src_bits: SourceMask,
}

impl SubdomainRecord {
    /// Create a record observed for the first time at `now`.
    pub fn new(sub: impl Into<String>, now: DateTime<Utc>, source: SourceMask) -> Self {
        Self {
            sub: sub.into(),
            first_seen: now,
            last_seen: now,
            src_bits: source,
        }
    }

    /// Record a re-observation: bump `last_seen` and accumulate the source bit.
    pub fn touch(&mut self, now: DateTime<Utc>, source: SourceMask) {
        self.last_seen = now;
        self.src_bits |= source;
    }
}
