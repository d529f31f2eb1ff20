//! Record parser contract.
//!
//! Parsers turn raw source bytes into structured records. Concrete parsers
//! (single-line, timestamped, JSON, W3C logs) ship in plugin crates and
//! register into the parser catalog; parsing components resolve them by
//! name through the read-only catalog view exposed in the plugin-context
//! side channel under [`context_keys::PARSER_CATALOG`].
//!
//! [`context_keys::PARSER_CATALOG`]: crate::context::context_keys::PARSER_CATALOG

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::ComponentResult;

/// One structured record produced by a parser.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    /// The record body.
    pub data: serde_json::Value,
    /// Timestamp extracted from the record, when the format carries one.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Turns raw bytes into structured records.
pub trait RecordParser: Send + Sync {
    /// Parses one chunk of input into zero or more records.
    fn parse(&self, input: &[u8]) -> ComponentResult<Vec<ParsedRecord>>;
}

/// A boxed record parser.
pub type BoxedRecordParser = Arc<dyn RecordParser>;
