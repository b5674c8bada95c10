//! Accounting Engine
//!
//! Folds a [`Snapshot`] into the [`RecordSet`], turning raw per-session byte
//! counters into lifetime totals that survive reconnects and counter resets.
//!
//! ## Session continuity
//!
//! For an identity that already has a record, the observation starts a new
//! session when, checked in order:
//!
//! 1. the record has a session id and the observation's id differs,
//! 2. both sides have a session start and they differ,
//! 3. either raw counter is below its baseline.
//!
//! Otherwise the session continues and the counter deltas are credited.
//!
//! A first sighting and a new session both move the baseline to the raw
//! counters without crediting anything. Traffic a new session already carries
//! when first observed is therefore never counted; this is an accepted
//! approximation.
//!
//! Identities missing from the snapshot are carried forward untouched.
//! The fold does no I/O and has no failure mode.

use chrono::{DateTime, Utc};

use crate::models::{AccountingRecord, Observation, RecordSet, Snapshot};

/// Why an observation was or was not treated as the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    Continuing,
    NewSession(SessionChange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    SessionIdChanged,
    SessionStartChanged,
    CounterRollback,
}

/// Per-cycle counts, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldReport {
    pub new_identities: usize,
    pub continuing: usize,
    pub session_resets: usize,
    pub carried_forward: usize,
    pub credited_received: u64,
    pub credited_sent: u64,
}

/// Decide whether `observation` continues the session `record` is tracking
pub fn classify(record: &AccountingRecord, observation: &Observation) -> Continuity {
    if let Some(known_id) = record.session_id {
        if observation.session_id != Some(known_id) {
            return Continuity::NewSession(SessionChange::SessionIdChanged);
        }
    }

    if let (Some(known_start), Some(observed_start)) =
        (record.session_start, observation.session_start)
    {
        if known_start != observed_start {
            return Continuity::NewSession(SessionChange::SessionStartChanged);
        }
    }

    if observation.received < record.baseline_received || observation.sent < record.baseline_sent
    {
        return Continuity::NewSession(SessionChange::CounterRollback);
    }

    Continuity::Continuing
}

/// Fold one snapshot into the previous record set
pub fn fold(previous: RecordSet, snapshot: &Snapshot) -> RecordSet {
    fold_with_report(previous, snapshot).0
}

/// [`fold`], also returning what happened this cycle
pub fn fold_with_report(mut records: RecordSet, snapshot: &Snapshot) -> (RecordSet, FoldReport) {
    let mut report = FoldReport::default();

    for (identity, observation) in &snapshot.observations {
        match records.get_mut(identity) {
            None => {
                records.insert(
                    identity.clone(),
                    AccountingRecord::first_sighting(observation, snapshot.taken_at),
                );
                report.new_identities += 1;
            }
            Some(record) => match classify(record, observation) {
                Continuity::Continuing => {
                    let (received, sent) = credit(record, observation);
                    report.continuing += 1;
                    report.credited_received += received;
                    report.credited_sent += sent;
                    refresh(record, observation, snapshot.taken_at);
                }
                Continuity::NewSession(_) => {
                    restart(record, observation);
                    report.session_resets += 1;
                    refresh(record, observation, snapshot.taken_at);
                }
            },
        }
    }

    report.carried_forward = records.len() - snapshot.observations.len();

    (records, report)
}

/// Add the deltas since the baseline and advance it. Only called once
/// continuity holds, so neither subtraction can underflow.
fn credit(record: &mut AccountingRecord, observation: &Observation) -> (u64, u64) {
    let delta_received = observation.received - record.baseline_received;
    let delta_sent = observation.sent - record.baseline_sent;

    record.accumulated_received = record.accumulated_received.saturating_add(delta_received);
    record.accumulated_sent = record.accumulated_sent.saturating_add(delta_sent);
    record.baseline_received = observation.received;
    record.baseline_sent = observation.sent;

    (delta_received, delta_sent)
}

fn restart(record: &mut AccountingRecord, observation: &Observation) {
    record.baseline_received = observation.received;
    record.baseline_sent = observation.sent;
    record.session_start = observation.session_start;
    record.session_id = observation.session_id;
}

fn refresh(record: &mut AccountingRecord, observation: &Observation, seen_at: DateTime<Utc>) {
    if !observation.real_address.is_empty() {
        record.last_real_address.clone_from(&observation.real_address);
    }
    if !observation.virtual_address.is_empty() {
        record.last_virtual_address.clone_from(&observation.virtual_address);
    }
    // A dialect without the marker must not erase one learned earlier
    if record.session_start.is_none() {
        record.session_start = observation.session_start;
    }
    if record.session_id.is_none() {
        record.session_id = observation.session_id;
    }
    record.last_seen = Some(seen_at);
}
