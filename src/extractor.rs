//! Snapshot Extraction
//!
//! Turns one read of an OpenVPN status file into a [`Snapshot`]. Extraction is
//! total: malformed rows are skipped or degraded, an unrecognised file yields
//! an empty snapshot, and nothing here returns an error.
//!
//! ## Dialects
//!
//! The canonical dialect is the `CLIENT_LIST` row written by `--status-version 2`
//! (comma separated) and `--status-version 3` (tab separated):
//!
//! ```text
//! CLIENT_LIST,alice,203.0.113.7:51234,10.8.0.6,,1841,2210,2024-01-15 10:30:00,1705314600,UNDEF,7,0,AES-256-GCM
//! ```
//!
//! Fields (2.4+): common name, real address, virtual address, virtual IPv6
//! address, bytes received, bytes sent, connected since, connected since
//! (time_t), username, client id, peer id, cipher. Column positions are taken
//! from the `HEADER,CLIENT_LIST` line when present, so older layouts without
//! the IPv6 and client id columns are read correctly too.
//!
//! The legacy `--status-version 1` CSV block is also understood. It carries no
//! client id; virtual addresses are joined in from its routing table.
//!
//! ## Strategies
//!
//! Each dialect is an [`ExtractionStrategy`]. [`SnapshotExtractor`] tries them in
//! order and keeps the first non-empty result.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::models::{Observation, Snapshot};
use crate::timestamp_parser::TimestampParser;

/// Identity the server writes for clients that have not finished authenticating.
pub const UNDEFINED_IDENTITY: &str = "UNDEF";

/// A byte counter column as labelled by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCounter {
    BytesReceived,
    BytesSent,
}

/// Which server column feeds which client-facing counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterMapping {
    pub client_received: ServerCounter,
    pub client_sent: ServerCounter,
}

/// The server counts from its own side: what it sent is what the client
/// received, and what it received is what the client sent.
pub const CLIENT_COUNTER_MAPPING: CounterMapping = CounterMapping {
    client_received: ServerCounter::BytesSent,
    client_sent: ServerCounter::BytesReceived,
};

impl CounterMapping {
    /// Map server `(bytes received, bytes sent)` to client `(received, sent)`
    pub fn apply(&self, server_received: u64, server_sent: u64) -> (u64, u64) {
        let pick = |counter: ServerCounter| match counter {
            ServerCounter::BytesReceived => server_received,
            ServerCounter::BytesSent => server_sent,
        };
        (pick(self.client_received), pick(self.client_sent))
    }
}

/// One status-file dialect.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extract every valid client row. Returns an empty map when the dialect
    /// does not match.
    fn extract(&self, text: &str) -> HashMap<String, Observation>;
}

/// Column positions within a `CLIENT_LIST` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientListLayout {
    pub identity: usize,
    pub real_address: usize,
    pub virtual_address: Option<usize>,
    pub bytes_received: usize,
    pub bytes_sent: usize,
    pub connected_since: usize,
    pub connected_since_unix: Option<usize>,
    pub client_id: Option<usize>,
}

impl Default for ClientListLayout {
    /// OpenVPN 2.4+ layout, used when the file carries no `HEADER,CLIENT_LIST` line
    fn default() -> Self {
        Self {
            identity: 1,
            real_address: 2,
            virtual_address: Some(3),
            bytes_received: 5,
            bytes_sent: 6,
            connected_since: 7,
            connected_since_unix: Some(8),
            client_id: Some(10),
        }
    }
}

impl ClientListLayout {
    /// Build from the fields of a `HEADER,CLIENT_LIST,...` line. Row index is
    /// header index minus one, since rows have no leading `HEADER` field.
    /// `None` when a required column is missing.
    pub fn from_header(fields: &[&str]) -> Option<Self> {
        if fields.len() < 2 || fields[0] != "HEADER" || fields[1] != "CLIENT_LIST" {
            return None;
        }
        let column = |name: &str| {
            fields
                .iter()
                .skip(2)
                .position(|field| *field == name)
                .map(|position| position + 1)
        };

        Some(Self {
            identity: column("Common Name")?,
            real_address: column("Real Address")?,
            virtual_address: column("Virtual Address"),
            bytes_received: column("Bytes Received")?,
            bytes_sent: column("Bytes Sent")?,
            connected_since: column("Connected Since")?,
            connected_since_unix: column("Connected Since (time_t)"),
            client_id: column("Client ID"),
        })
    }

    fn min_fields(&self) -> usize {
        [
            self.identity,
            self.real_address,
            self.bytes_received,
            self.bytes_sent,
            self.connected_since,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// `CLIENT_LIST` rows, tab or comma separated (status-version 2 and 3).
///
/// Column positions come from the file's `HEADER,CLIENT_LIST` line, so both
/// the 2.3 layout (no IPv6 or client id columns) and 2.4+ are read correctly.
/// A header lacking a required column rejects the whole file.
#[derive(Debug, Default)]
pub struct ClientListStrategy;

impl ClientListStrategy {
    /// Split a line into fields if it starts with `tag` followed by a tab or comma
    fn split_tagged<'a>(line: &'a str, tag: &str) -> Option<Vec<&'a str>> {
        let line = line.trim_start();
        let rest = line.strip_prefix(tag)?;
        let separator = rest.chars().next()?;
        if separator != '\t' && separator != ',' {
            return None;
        }
        Some(line.split(separator).map(str::trim).collect())
    }

    fn parse_row(layout: &ClientListLayout, fields: &[&str]) -> Option<(String, Observation)> {
        if fields.len() < layout.min_fields() || fields[0] != "CLIENT_LIST" {
            return None;
        }

        let identity = fields[layout.identity];
        if !is_valid_identity(identity) {
            return None;
        }

        let optional = |index: Option<usize>| index.and_then(|i| fields.get(i).copied());

        let (received, sent) = CLIENT_COUNTER_MAPPING.apply(
            parse_counter(fields[layout.bytes_received]),
            parse_counter(fields[layout.bytes_sent]),
        );

        let observation = Observation {
            real_address: fields[layout.real_address].to_string(),
            virtual_address: optional(layout.virtual_address)
                .unwrap_or_default()
                .to_string(),
            received,
            sent,
            session_start: TimestampParser::parse_session_start(
                fields[layout.connected_since],
                optional(layout.connected_since_unix),
            ),
            session_id: optional(layout.client_id).and_then(|id| id.parse().ok()),
        };

        Some((identity.to_string(), observation))
    }
}

impl ExtractionStrategy for ClientListStrategy {
    fn name(&self) -> &'static str {
        "client-list"
    }

    fn extract(&self, text: &str) -> HashMap<String, Observation> {
        let header = text.lines().find_map(|line| {
            Self::split_tagged(line, "HEADER")
                .filter(|fields| fields.get(1) == Some(&"CLIENT_LIST"))
        });

        let layout = match header {
            Some(fields) => match ClientListLayout::from_header(&fields) {
                Some(layout) => layout,
                None => {
                    debug!("CLIENT_LIST header lacks required columns, skipping");
                    return HashMap::new();
                }
            },
            None => ClientListLayout::default(),
        };

        text.lines()
            .filter_map(|line| Self::split_tagged(line, "CLIENT_LIST"))
            .filter_map(|fields| Self::parse_row(&layout, &fields))
            .collect()
    }
}

/// The status-version 1 CSV block framed by a column header and either the
/// routing table header or end of input.
#[derive(Debug, Default)]
pub struct ClientCsvStrategy;

impl ClientCsvStrategy {
    const CLIENT_HEADER: &'static str =
        "Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since";
    const ROUTING_HEADER: &'static str = "Virtual Address,Common Name,Real Address,Last Ref";

    fn is_routing_table(line: &str) -> bool {
        line.starts_with("ROUTING TABLE") || line.starts_with("ROUTING_TABLE")
    }

    /// Common name to virtual address, from the routing table block.
    fn virtual_addresses<'a>(lines: &[&'a str]) -> HashMap<&'a str, &'a str> {
        let Some(start) = lines.iter().position(|line| *line == Self::ROUTING_HEADER) else {
            return HashMap::new();
        };

        lines[start + 1..]
            .iter()
            .take_while(|line| !line.starts_with("GLOBAL STATS") && **line != "END")
            .filter_map(|line| {
                let mut fields = line.split(',').map(str::trim);
                let virtual_address = fields.next()?;
                let identity = fields.next()?;
                // The first route for a client is its tunnel address; later ones are iroutes.
                Some((identity, virtual_address))
            })
            .fold(HashMap::new(), |mut map, (identity, address)| {
                map.entry(identity).or_insert(address);
                map
            })
    }
}

impl ExtractionStrategy for ClientCsvStrategy {
    fn name(&self) -> &'static str {
        "client-csv"
    }

    fn extract(&self, text: &str) -> HashMap<String, Observation> {
        let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
        let Some(start) = lines.iter().position(|line| *line == Self::CLIENT_HEADER) else {
            return HashMap::new();
        };

        let virtual_addresses = Self::virtual_addresses(&lines);

        lines[start + 1..]
            .iter()
            .take_while(|line| !Self::is_routing_table(line))
            .filter_map(|line| {
                let fields: Vec<&str> = line.split(',').map(str::trim).collect();
                if fields.len() < 5 {
                    return None;
                }
                let identity = fields[0];
                if !is_valid_identity(identity) || identity == "Common Name" {
                    return None;
                }

                let (received, sent) = CLIENT_COUNTER_MAPPING
                    .apply(parse_counter(fields[2]), parse_counter(fields[3]));

                let observation = Observation {
                    real_address: fields[1].to_string(),
                    virtual_address: virtual_addresses
                        .get(identity)
                        .map(|address| address.to_string())
                        .unwrap_or_default(),
                    received,
                    sent,
                    session_start: TimestampParser::parse_text(fields[4]),
                    session_id: None,
                };
                Some((identity.to_string(), observation))
            })
            .collect()
    }
}

/// Ordered list of strategies; the first one producing rows wins.
pub struct SnapshotExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for SnapshotExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotExtractor {
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(ClientListStrategy),
            Box::new(ClientCsvStrategy),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Extract a snapshot from raw text, stamped with `taken_at`
    pub fn extract(&self, text: &str, taken_at: DateTime<Utc>) -> Snapshot {
        let mut snapshot = Snapshot::new(taken_at);

        for strategy in &self.strategies {
            let observations = strategy.extract(text);
            if !observations.is_empty() {
                debug!(
                    strategy = strategy.name(),
                    clients = observations.len(),
                    "Extracted status snapshot"
                );
                snapshot.observations.extend(observations);
                return snapshot;
            }
        }

        snapshot
    }
}

/// Read the status file in full. A missing file is `Ok(None)`, not an error.
pub fn read_status(path: &Path) -> Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read status file: {}", path.display())),
    }
}

fn is_valid_identity(identity: &str) -> bool {
    !identity.is_empty() && identity != UNDEFINED_IDENTITY
}

fn parse_counter(value: &str) -> u64 {
    value.trim().parse().unwrap_or(0)
}
