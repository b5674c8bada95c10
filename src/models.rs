//! Core Data Models
//!
//! This module defines the data structures that flow through one monitoring
//! cycle, from the raw status file to the persisted state file.
//!
//! ## Data Flow
//!
//! 1. **Observation**: [`Observation`] - one client row extracted from a status file read
//! 2. **Snapshot**: [`Snapshot`] - every observation from one read, stamped with the read time
//! 3. **Accounting**: [`AccountingRecord`] - per-client baseline and lifetime totals
//! 4. **Record set**: [`RecordSet`] - all records keyed by identity, owned by the run loop
//!
//! Observations are ephemeral; records live for as long as the state file does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All accounting records keyed by client identity.
///
/// Iteration order is the identity order, which is also the tie-break order
/// when the table is sorted by traffic.
pub type RecordSet = BTreeMap<String, AccountingRecord>;

/// One client as seen in a single read of the status file.
///
/// Counters are already in the client's perspective: `received` is what the
/// client downloaded, `sent` is what it uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    pub real_address: String,
    pub virtual_address: String,
    pub received: u64,
    pub sent: u64,
    pub session_start: Option<DateTime<Utc>>,
    pub session_id: Option<u64>,
}

/// One full parse of the status source at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub observations: BTreeMap<String, Observation>,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            observations: BTreeMap::new(),
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.observations.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Persistent per-client accounting state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountingRecord {
    /// Raw counters at the start of the current accounting interval.
    pub baseline_received: u64,
    pub baseline_sent: u64,
    /// Lifetime totals across every session ever observed. Never decrease.
    pub accumulated_received: u64,
    pub accumulated_sent: u64,
    /// Display cache, refreshed from the latest non-empty observation.
    pub last_real_address: String,
    pub last_virtual_address: String,
    /// Session the baseline belongs to.
    pub session_start: Option<DateTime<Utc>>,
    pub session_id: Option<u64>,
    /// Read time of the latest snapshot that contained this identity.
    pub last_seen: Option<DateTime<Utc>>,
}

impl AccountingRecord {
    /// Record for an identity seen for the first time: the raw counters become
    /// the starting line and nothing is credited.
    pub fn first_sighting(observation: &Observation, seen_at: DateTime<Utc>) -> Self {
        Self {
            baseline_received: observation.received,
            baseline_sent: observation.sent,
            accumulated_received: 0,
            accumulated_sent: 0,
            last_real_address: observation.real_address.clone(),
            last_virtual_address: observation.virtual_address.clone(),
            session_start: observation.session_start,
            session_id: observation.session_id,
            last_seen: Some(seen_at),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.accumulated_received.saturating_add(self.accumulated_sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sighting_starts_at_zero() {
        let observation = Observation {
            real_address: "203.0.113.7:51234".to_string(),
            virtual_address: "10.8.0.6".to_string(),
            received: 1000,
            sent: 2000,
            session_start: None,
            session_id: Some(4),
        };
        let record = AccountingRecord::first_sighting(&observation, Utc::now());

        assert_eq!(record.baseline_received, 1000);
        assert_eq!(record.baseline_sent, 2000);
        assert_eq!(record.total_bytes(), 0);
        assert_eq!(record.session_id, Some(4));
    }

    #[test]
    fn test_total_bytes_saturates() {
        let record = AccountingRecord {
            accumulated_received: u64::MAX,
            accumulated_sent: 10,
            ..Default::default()
        };
        assert_eq!(record.total_bytes(), u64::MAX);
    }
}
