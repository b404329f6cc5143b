//! RDATE values (RFC 5545 §3.8.5.2).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EventDuration, EventTime};
use crate::error::RfcError;

/// End of an explicit PERIOD value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodEnd {
    Explicit(EventTime),
    Duration(EventDuration),
}

/// One RDATE entry: a DATE/DATE-TIME, or a PERIOD with its own end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RDate {
    Instant(EventTime),
    Period { start: EventTime, end: PeriodEnd },
}

impl RDate {
    /// ## Summary
    /// Parses one RDATE value, applying the property's TZID to every date-time it contains.
    ///
    /// ## Errors
    /// Returns `RfcError::InvalidValue` if either half of a PERIOD is invalid.
    pub fn parse_with_tzid(value: &str, tzid: Option<&str>) -> Result<Self, RfcError> {
        crate::rfc::ical::parse::parse_rdate(value, tzid)
    }

    #[must_use]
    pub const fn start(&self) -> &EventTime {
        match self {
            Self::Instant(start) | Self::Period { start, .. } => start,
        }
    }

    #[must_use]
    pub const fn period_end(&self) -> Option<&PeriodEnd> {
        match self {
            Self::Instant(_) => None,
            Self::Period { end, .. } => Some(end),
        }
    }
}

impl From<EventTime> for RDate {
    fn from(value: EventTime) -> Self {
        Self::Instant(value)
    }
}

impl fmt::Display for RDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instant(value) => write!(f, "{value}"),
            Self::Period {
                start,
                end: PeriodEnd::Explicit(end),
            } => write!(f, "{start}/{end}"),
            Self::Period {
                start,
                end: PeriodEnd::Duration(duration),
            } => write!(f, "{start}/{duration}"),
        }
    }
}
