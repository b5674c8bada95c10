//! Table Rendering
//!
//! Renders the record set as a fixed-width table, busiest client first.
//!
//! ```text
//! St    Client                       Real Address             Virtual Address  Session      RX Total     TX Total  Last Seen
//! ---------------------------------------------------------------------------------------------------------------------------
//! ●     alice                        203.0.113.7:51234        10.8.0.6               7     1.50 MB    200.00 KB  2024-01-15 10:59:58
//! ○     bob                          -                        -                      -    12.00 KB      3.00 KB  -
//! ```
//!
//! Online means "present in the latest snapshot". Offline rows keep their
//! totals and show placeholders for everything that is only meaningful live.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;

use crate::models::{AccountingRecord, RecordSet, Snapshot};

const PLACEHOLDER: &str = "-";
const WAITING: &str = "(waiting for clients...)";
const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with a 1024-based unit and two decimals
pub fn human_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// How the status column is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayStyle {
    pub color: bool,
    pub ascii: bool,
}

impl Default for DisplayStyle {
    fn default() -> Self {
        Self {
            color: true,
            ascii: false,
        }
    }
}

impl DisplayStyle {
    /// ASCII symbols imply plain output
    pub fn new(color: bool, ascii: bool) -> Self {
        Self {
            color: color && !ascii,
            ascii,
        }
    }

    fn symbol(&self, online: bool) -> &'static str {
        match (self.ascii, self.color, online) {
            (true, _, true) => "[ON]",
            (true, _, false) => "[OFF]",
            (false, true, true) => "●",
            (false, true, false) => "○",
            (false, false, true) => "ON",
            (false, false, false) => "OFF",
        }
    }

    fn status(&self, online: bool) -> String {
        let symbol = format!("{:<5}", self.symbol(online));
        match (self.color, online) {
            (false, _) => symbol,
            (true, true) => symbol.bright_green().bold().to_string(),
            (true, false) => symbol.bright_black().to_string(),
        }
    }
}

/// One rendered row, also the JSON shape of `--once --json`.
#[derive(Debug, Clone, Serialize)]
pub struct ClientRow<'a> {
    pub identity: &'a str,
    pub online: bool,
    pub real_address: Option<&'a str>,
    pub virtual_address: Option<&'a str>,
    pub session_id: Option<u64>,
    pub last_seen: Option<String>,
    pub received: u64,
    pub sent: u64,
}

/// Rows sorted by descending lifetime total; ties keep identity order
pub fn client_rows<'a>(records: &'a RecordSet, snapshot: &Snapshot) -> Vec<ClientRow<'a>> {
    let mut rows: Vec<(&'a String, &'a AccountingRecord)> = records.iter().collect();
    rows.sort_by(|a, b| b.1.total_bytes().cmp(&a.1.total_bytes()));

    rows.into_iter()
        .map(|(identity, record)| {
            let online = snapshot.contains(identity);
            let live = |value: &'a str| (online && !value.is_empty()).then_some(value);
            ClientRow {
                identity,
                online,
                real_address: live(record.last_real_address.as_str()),
                virtual_address: live(record.last_virtual_address.as_str()),
                session_id: record.session_id.filter(|_| online),
                last_seen: record
                    .last_seen
                    .filter(|_| online)
                    .map(|seen| seen.format("%Y-%m-%d %H:%M:%S").to_string()),
                received: record.accumulated_received,
                sent: record.accumulated_sent,
            }
        })
        .collect()
}

pub struct TableRenderer {
    style: DisplayStyle,
}

impl TableRenderer {
    pub fn new(style: DisplayStyle) -> Self {
        Self { style }
    }

    pub fn render(&self, records: &RecordSet, snapshot: &Snapshot) -> String {
        let mut out = String::new();

        let header = format!(
            "{:<5} {:<28} {:<24} {:<16} {:>7} {:>12} {:>12}  {:<19}",
            "St", "Client", "Real Address", "Virtual Address", "Session", "RX Total", "TX Total",
            "Last Seen"
        );
        let rule = "-".repeat(header.chars().count());
        if self.style.color {
            let _ = writeln!(out, "{}", header.bold());
        } else {
            let _ = writeln!(out, "{}", header);
        }
        let _ = writeln!(out, "{}", rule);

        let rows = client_rows(records, snapshot);
        for row in &rows {
            let session = row
                .session_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            let _ = writeln!(
                out,
                "{} {:<28} {:<24} {:<16} {:>7} {:>12} {:>12}  {:<19}",
                self.style.status(row.online),
                row.identity,
                row.real_address.unwrap_or(PLACEHOLDER),
                row.virtual_address.unwrap_or(PLACEHOLDER),
                session,
                human_bytes(row.received),
                human_bytes(row.sent),
                row.last_seen.as_deref().unwrap_or(PLACEHOLDER),
            );
        }

        if rows.is_empty() {
            let _ = writeln!(out, "{}", WAITING);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Observation;
    use chrono::{TimeZone, Utc};

    fn record(received: u64, sent: u64) -> AccountingRecord {
        AccountingRecord {
            accumulated_received: received,
            accumulated_sent: sent,
            last_real_address: "203.0.113.7:51234".to_string(),
            last_virtual_address: "10.8.0.6".to_string(),
            session_id: Some(7),
            last_seen: Some(Utc.timestamp_opt(1_705_316_398, 0).unwrap()),
            ..Default::default()
        }
    }

    fn online(identities: &[&str]) -> Snapshot {
        let mut snapshot = Snapshot::new(Utc::now());
        for identity in identities {
            snapshot
                .observations
                .insert(identity.to_string(), Observation::default());
        }
        snapshot
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0.00 B");
        assert_eq!(human_bytes(1023), "1023.00 B");
        assert_eq!(human_bytes(1024), "1.00 KB");
        assert_eq!(human_bytes(1536), "1.50 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_human_bytes_caps_at_largest_unit() {
        let two_pb = 2 * 1024u64.pow(5);
        assert_eq!(human_bytes(two_pb), "2048.00 TB");
    }

    #[test]
    fn test_rows_sorted_by_total_then_identity() {
        let mut records = RecordSet::new();
        records.insert("carol".to_string(), record(10, 10));
        records.insert("alice".to_string(), record(5, 5));
        records.insert("bob".to_string(), record(1, 9));
        records.insert("dave".to_string(), record(100, 0));

        let rows = client_rows(&records, &online(&[]));
        let order: Vec<&str> = rows.iter().map(|row| row.identity).collect();
        assert_eq!(order, vec!["dave", "carol", "alice", "bob"]);
    }

    #[test]
    fn test_offline_rows_use_placeholders() {
        let mut records = RecordSet::new();
        records.insert("alice".to_string(), record(2048, 1024));
        records.insert("bob".to_string(), record(1, 1));

        let rows = client_rows(&records, &online(&["alice"]));
        let alice = &rows[0];
        assert!(alice.online);
        assert_eq!(alice.real_address, Some("203.0.113.7:51234"));
        assert_eq!(alice.session_id, Some(7));
        assert_eq!(alice.last_seen.as_deref(), Some("2024-01-15 10:59:58"));

        let bob = &rows[1];
        assert!(!bob.online);
        assert_eq!(bob.real_address, None);
        assert_eq!(bob.session_id, None);
        assert_eq!(bob.last_seen, None);
        assert_eq!(bob.received, 1);
    }

    #[test]
    fn test_render_plain() {
        let mut records = RecordSet::new();
        records.insert("alice".to_string(), record(2048, 1024));
        records.insert("bob".to_string(), record(1, 1));

        let renderer = TableRenderer::new(DisplayStyle::new(false, false));
        let table = renderer.render(&records, &online(&["alice"]));
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("St "));
        assert!(lines[2].starts_with("ON    alice"));
        assert!(lines[2].contains("2.00 KB"));
        assert!(lines[3].starts_with("OFF   bob"));
        assert!(!lines[3].contains("203.0.113.7"));
        assert!(!table.contains('\u{1b}'));
    }

    #[test]
    fn test_render_ascii_symbols() {
        let mut records = RecordSet::new();
        records.insert("alice".to_string(), record(1, 1));

        let renderer = TableRenderer::new(DisplayStyle::new(true, true));
        let table = renderer.render(&records, &online(&[]));
        assert!(table.contains("[OFF] alice"));
        assert!(!table.contains('\u{1b}'));
    }

    #[test]
    fn test_render_empty_shows_waiting() {
        let renderer = TableRenderer::new(DisplayStyle::new(false, false));
        let table = renderer.render(&RecordSet::new(), &online(&[]));
        assert_eq!(table.lines().last(), Some(WAITING));
    }
}
