//! RECURRENCE-ID keys (RFC 5545 §3.8.4.4).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventTime;
use crate::error::RfcError;

/// Stable identity of one occurrence: its nominal start in RFC 5545 text form.
///
/// - date-only events: `YYYYMMDD`
/// - floating events: `YYYYMMDDTHHMMSS`
/// - UTC and zoned events: `YYYYMMDDTHHMMSSZ`
///
/// Within one master every key uses the same form, so string ordering is
/// chronological ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecurrenceId(String);

impl RecurrenceId {
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%Y%m%d").to_string())
    }

    #[must_use]
    pub fn from_floating(local: NaiveDateTime) -> Self {
        Self(local.format("%Y%m%dT%H%M%S").to_string())
    }

    #[must_use]
    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        Self(instant.format("%Y%m%dT%H%M%SZ").to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key read back as a value. Never `EventTime::Zoned`.
    ///
    /// ## Errors
    /// Only fails if the key was not built by this type.
    pub fn to_event_time(&self) -> Result<EventTime, RfcError> {
        self.0.parse()
    }
}

impl fmt::Display for RecurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecurrenceId {
    type Err = RfcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<EventTime>()? {
            EventTime::Date(date) => Ok(Self::from_date(date)),
            EventTime::Floating(local) => Ok(Self::from_floating(local)),
            EventTime::Utc(instant) => Ok(Self::from_utc(instant)),
            EventTime::Zoned { .. } => Err(RfcError::invalid("RECURRENCE-ID", s)),
        }
    }
}

impl TryFrom<String> for RecurrenceId {
    type Error = RfcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecurrenceId> for String {
    fn from(value: RecurrenceId) -> Self {
        value.0
    }
}
