//! Delta batches: immutable records of what one merge newly discovered.

use std::fs;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::info;

use crate::error::{VaultError, VaultResult};
use crate::normalize::normalize_domain;
use crate::types::SubdomainRecord;

use super::{codec, DomainStore};

const DELTA_MARKER: &str = ".delta-";
const DELTA_SUFFIX: &str = ".jsonl.zst";
/// Fixed-width UTC timestamp so ids sort in creation order
const DELTA_TS_FORMAT: &str = "%Y%m%dT%H%M%S%.9fZ";

/// Records newly created by a single merge, named `<domain>.delta-<utc-ts>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaBatch {
    pub id: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
    pub records: Vec<SubdomainRecord>,
}

impl DeltaBatch {
    /// Identifier for a batch of `domain` written at `at`.
    pub fn make_id(domain: &str, at: DateTime<Utc>) -> String {
        format!("{}{}{}", domain, DELTA_MARKER, at.format(DELTA_TS_FORMAT))
    }

    /// Split an id back into its domain and timestamp.
    pub fn parse_id(id: &str) -> Option<(String, DateTime<Utc>)> {
        let (domain, ts) = id.rsplit_once(DELTA_MARKER)?;
        let at = NaiveDateTime::parse_from_str(ts, DELTA_TS_FORMAT).ok()?;
        Some((domain.to_string(), at.and_utc()))
    }
}

impl DomainStore {
    /// Persist `records` as a new delta batch for `domain`.
    ///
    /// Returns `None` without touching disk when `records` is empty. The file is
    /// created exclusively, so an id collision fails instead of overwriting.
    pub fn append_delta(
        &self,
        domain: &str,
        records: &[SubdomainRecord],
        at: DateTime<Utc>,
    ) -> VaultResult<Option<String>> {
        if records.is_empty() {
            return Ok(None);
        }

        let domain = normalize_domain(domain)?;
        let id = DeltaBatch::make_id(&domain, at);
        let path = self.deltas_dir().join(format!("{}{}", id, DELTA_SUFFIX));

        codec::create_file(&path, records)?;
        info!(domain = %domain, delta = %id, records = records.len(), "Wrote delta batch");
        Ok(Some(id))
    }

    /// Delta ids for `domain`, oldest first.
    pub fn list_deltas(&self, domain: &str) -> VaultResult<Vec<String>> {
        let domain = normalize_domain(domain)?;
        let prefix = format!("{}{}", domain, DELTA_MARKER);

        let entries = match fs::read_dir(self.deltas_dir()) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };

        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| name.strip_suffix(DELTA_SUFFIX).map(str::to_string))
            .filter(|id| id.starts_with(&prefix) && DeltaBatch::parse_id(id).is_some())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Read one delta batch back by id.
    pub fn read_delta(&self, id: &str) -> VaultResult<DeltaBatch> {
        let (domain, created_at) = DeltaBatch::parse_id(id)
            .ok_or_else(|| VaultError::CorruptData(format!("malformed delta id: {}", id)))?;
        let domain = normalize_domain(&domain)?;

        let path = self.deltas_dir().join(format!("{}{}", id, DELTA_SUFFIX));
        if !path.is_file() {
            return Err(VaultError::NotFound(id.to_string()));
        }

        let mut records = Vec::new();
        codec::read_file(&path, |record| records.push(record))?;

        Ok(DeltaBatch {
            id: id.to_string(),
            domain,
            created_at,
            records,
        })
    }
}
