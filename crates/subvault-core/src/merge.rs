//! Merging newly discovered hostnames into a domain's store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::VaultResult;
use crate::normalize::normalize_host;
use crate::store::DomainStore;
use crate::types::{SourceMask, SubdomainRecord};

/// Reconciles discovered hostnames against the [`DomainStore`].
#[derive(Clone, Debug)]
pub struct MergeEngine {
    store: DomainStore,
}

impl MergeEngine {
    pub fn new(store: DomainStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DomainStore {
        &self.store
    }

    /// Merge `found` into `domain`'s store, observed now by `source`.
    ///
    /// Returns the records that did not exist before. See [`merge_at`](Self::merge_at).
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
        let lock = self.store.domain_lock(domain)?;
        let _guard = lock.lock();
        // Read the clock under the lock so delta ids follow write order
        self.merge_locked(domain, found, source, Utc::now())
    }

    /// Merge `found` into `domain`'s store with an explicit observation time.
    ///
    /// Known hostnames get `last_seen = now` and `source` OR'ed into their mask;
    /// unknown ones become new records. The full set is written back as one
    /// snapshot, and if anything was new a delta batch is written too.
    pub fn merge_at<I, S>(
        &self,
        domain: &str,
        found: I,
        source: SourceMask,
        now: DateTime<Utc>,
    ) -> VaultResult<Vec<SubdomainRecord>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lock = self.store.domain_lock(domain)?;
        let _guard = lock.lock();
        self.merge_locked(domain, found, source, now)
    }

    fn merge_locked<I, S>(
        &self,
        domain: &str,
        found: I,
        source: SourceMask,
        now: DateTime<Utc>,
    ) -> VaultResult<Vec<SubdomainRecord>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut existing: HashMap<String, SubdomainRecord> = HashMap::new();
        self.store.iter_records(domain, |record| {
            existing.insert(record.sub.clone(), record);
        })?;
        let known_before = existing.len();

        let mut added = Vec::new();
        let mut touched = 0usize;

        for raw in found {
            let sub = normalize_host(raw.as_ref());
            if sub.is_empty() {
                continue;
            }

            match existing.get_mut(&sub) {
                Some(record) => {
                    record.touch(now, source);
                    touched += 1;
                }
                None => {
                    let record = SubdomainRecord::new(sub.clone(), now, source);
                    added.push(record.clone());
                    existing.insert(sub, record);
                }
            }
        }

        let records: Vec<SubdomainRecord> = existing.into_values().collect();
        self.store.write_snapshot_locked(domain, records)?;
        self.store.append_delta(domain, &added, now)?;

        if added.is_empty() {
            debug!(domain, touched, "Merge found nothing new");
        } else {
            info!(
                domain,
                added = added.len(),
                touched,
                known_before,
                "Merged new subdomains"
            );
        }

        Ok(added)
    }
}
