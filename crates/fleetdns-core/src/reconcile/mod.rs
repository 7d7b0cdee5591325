//! Record reconciliation
//!
//! [`diff`] compares the records a zone *should* publish with the records the
//! provider *does* publish and returns the minimal set of creates and deletes
//! that closes the gap. It performs no I/O.
//!
//! ## Rules
//!
//! For every configured IP that is healthy, exactly `weight` records must
//! exist. Configured IPs that are unhealthy, and IPs that are not configured
//! at all, must have no records.
//!
//! When an IP has more records than its weight, the excess is taken from the
//! front of that IP's records in provider order, so repeated cycles always
//! trim the same (earliest listed) duplicates.
//!
//! Applying the result and diffing again yields an empty result.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;

use crate::traits::DnsRecord;

/// Actions needed to converge one zone, plus status for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// One entry per record to create (an IP may repeat)
    pub to_create: Vec<IpAddr>,
    /// Records selected for deletion
    pub to_remove: Vec<DnsRecord>,
    /// Healthy configured IPs already published at their weight
    pub in_sync: Vec<IpAddr>,
    /// Configured IPs that are currently unhealthy
    pub unhealthy: Vec<IpAddr>,
    /// Number of configured IPs that are healthy
    pub online: usize,
    /// Number of configured IPs
    pub configured: usize,
}

impl DiffResult {
    /// True when no create or delete is required
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of provider actions
    pub fn action_count(&self) -> usize {
        self.to_create.len() + self.to_remove.len()
    }

    /// True when nothing is configured for the zone at all
    ///
    /// Distinguishes an empty config from a zone in steady state.
    pub fn is_unconfigured(&self) -> bool {
        self.configured == 0
    }
}

/// Compute the creates and deletes that converge `existing` on the desired state
///
/// - `desired`: configured IP -> weight
/// - `healthy`: IPs currently reported healthy
/// - `existing`: records under the managed name, in provider order
pub fn diff(
    desired: &BTreeMap<IpAddr, u32>,
    healthy: &HashSet<IpAddr>,
    existing: &[DnsRecord],
) -> DiffResult {
    let groups = group_by_ip(existing);
    let mut result = DiffResult {
        configured: desired.len(),
        ..Default::default()
    };

    for (ip, weight) in desired {
        let records = groups.get(ip).map(Vec::as_slice).unwrap_or(&[]);
        let weight = *weight as usize;

        if healthy.contains(ip) {
            result.online += 1;
            let count = records.len();
            if count < weight {
                result
                    .to_create
                    .extend(std::iter::repeat_n(*ip, weight - count));
            } else if count > weight {
                result
                    .to_remove
                    .extend(records[..count - weight].iter().map(|r| (*r).clone()));
            } else {
                result.in_sync.push(*ip);
            }
        } else {
            result.unhealthy.push(*ip);
            result.to_remove.extend(records.iter().map(|r| (*r).clone()));
        }
    }

    // Records for IPs that are no longer configured, in first-seen order
    let mut seen = HashSet::new();
    for record in existing {
        if !desired.contains_key(&record.ip)
            && seen.insert(record.ip)
            && let Some(records) = groups.get(&record.ip)
        {
            result.to_remove.extend(records.iter().map(|r| (*r).clone()));
        }
    }

    result
}

/// Group records by IP, keeping provider order within each group
fn group_by_ip(existing: &[DnsRecord]) -> HashMap<IpAddr, Vec<&DnsRecord>> {
    let mut groups: HashMap<IpAddr, Vec<&DnsRecord>> = HashMap::new();
    for record in existing {
        groups.entry(record.ip).or_default().push(record);
    }
    groups
}
