//! # Temporal Types — Document Timestamps
//!
//! Defines `Timestamp`, the UTC instant stamped into every exported
//! document name.
//!
//! ## Format
//!
//! Document names sort chronologically, so the stamp is ISO-8601 UTC with
//! a `Z` suffix and a fixed seven fractional digits (100 ns ticks):
//! `YYYY-MM-DDTHH:MM:SS.fffffffZ`. Sub-tick precision is discarded at
//! construction so two timestamps that render equal also compare equal.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Nanoseconds per rendered fractional tick.
const NANOS_PER_TICK: u32 = 100;

/// A UTC timestamp truncated to 100 ns ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// Wrap a `DateTime<Utc>`, truncating below the tick.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        let nanos = dt.nanosecond() - dt.nanosecond() % NANOS_PER_TICK;
        Self(dt.with_nanosecond(nanos).unwrap_or(dt))
    }

    /// Parse an RFC 3339 string, converting any offset to UTC.
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)?;
        Ok(Self::from_utc(dt.with_timezone(&Utc)))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Render as `YYYY-MM-DDTHH:MM:SS.fffffffZ`.
    pub fn to_iso8601(&self) -> String {
        // Leap seconds are reported as nanosecond >= 1e9; clamp to the last tick.
        let ticks = (self.0.nanosecond() / NANOS_PER_TICK).min(9_999_999);
        format!("{}.{ticks:07}Z", self.0.format("%Y-%m-%dT%H:%M:%S"))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}
