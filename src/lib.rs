//! OpenVPN Usage Library
//!
//! Live per-client traffic accounting for an OpenVPN server. The server
//! periodically rewrites a status file with per-session byte counters; this
//! library turns repeated reads of it into lifetime totals per client that
//! survive disconnects, reconnects and counter resets, and keeps those totals
//! across restarts.
//!
//! ## Architecture Overview
//!
//! - [`extractor`] - status-file dialects and the snapshot extractor
//! - [`engine`] - session-aware delta accounting (`fold`)
//! - [`store`] - versioned, atomically written state file
//! - [`display`] - sorted fixed-width table
//! - [`monitor`] - the polling loop tying them together
//! - [`config`] - configuration from file, environment and flags
//! - [`logging`] - structured logging with JSON and pretty formats
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use ovpn_usage::{engine, extractor::SnapshotExtractor, RecordSet};
//!
//! let extractor = SnapshotExtractor::new();
//! let first = "CLIENT_LIST,alice,203.0.113.7:51234,10.8.0.6,,1000,2000,2024-01-15 10:30:00,1705314600,UNDEF,7,0,AES-256-GCM\n";
//! let later = "CLIENT_LIST,alice,203.0.113.7:51234,10.8.0.6,,1100,2500,2024-01-15 10:30:00,1705314600,UNDEF,7,0,AES-256-GCM\n";
//!
//! let records = engine::fold(RecordSet::new(), &extractor.extract(first, Utc::now()));
//! let records = engine::fold(records, &extractor.extract(later, Utc::now()));
//!
//! assert_eq!(records["alice"].accumulated_received, 500);
//! assert_eq!(records["alice"].accumulated_sent, 100);
//! ```

pub mod config;
pub mod display;
pub mod engine;
pub mod extractor;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod store;
pub mod timestamp_parser;

pub use models::*;
