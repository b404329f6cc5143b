//! DATE and DATE-TIME values (RFC 5545 §3.3.4, §3.3.5).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RfcError;

/// A DTSTART/DTEND/RDATE/EXDATE style value.
///
/// The four forms are mutually exclusive: a value is date-only, floating
/// wall-clock, an absolute UTC instant, or a wall-clock time in a named zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTime {
    /// `VALUE=DATE`, e.g. `20240101`.
    Date(NaiveDate),
    /// No zone and no `Z`, e.g. `20240101T090000`.
    Floating(NaiveDateTime),
    /// `Z` suffix, e.g. `20240101T090000Z`.
    Utc(DateTime<Utc>),
    /// `TZID=...` parameter with a local wall-clock value.
    Zoned { local: NaiveDateTime, tzid: String },
}

impl EventTime {
    /// ## Summary
    /// Parses a value, applying the property's TZID parameter if present.
    ///
    /// A TZID on a DATE or UTC value is ignored, as RFC 5545 gives it no meaning there.
    ///
    /// ## Errors
    /// Returns `RfcError::InvalidValue` if the text is neither DATE nor DATE-TIME.
    pub fn parse_with_tzid(value: &str, tzid: Option<&str>) -> Result<Self, RfcError> {
        crate::rfc::ical::parse::parse_event_time(value, tzid)
    }

    #[must_use]
    pub fn date(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self::Date)
    }

    #[must_use]
    pub fn floating(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<Self> {
        naive(year, month, day, hour, minute, second).map(Self::Floating)
    }

    #[must_use]
    pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<Self> {
        naive(year, month, day, hour, minute, second).map(|n| Self::Utc(n.and_utc()))
    }

    #[must_use]
    pub fn zoned(local: NaiveDateTime, tzid: impl Into<String>) -> Self {
        Self::Zoned {
            local,
            tzid: tzid.into(),
        }
    }

    #[must_use]
    pub const fn is_date_only(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    #[must_use]
    pub const fn is_floating(&self) -> bool {
        matches!(self, Self::Date(_) | Self::Floating(_))
    }

    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        match self {
            Self::Zoned { tzid, .. } => Some(tzid),
            _ => None,
        }
    }

    /// Wall-clock fields as written. DATE values become midnight; UTC values keep their UTC fields.
    #[must_use]
    pub fn naive(&self) -> NaiveDateTime {
        match self {
            Self::Date(date) => date.and_time(NaiveTime::MIN),
            Self::Floating(local) | Self::Zoned { local, .. } => *local,
            Self::Utc(instant) => instant.naive_utc(),
        }
    }
}

fn naive(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y%m%d")),
            Self::Floating(local) | Self::Zoned { local, .. } => {
                write!(f, "{}", local.format("%Y%m%dT%H%M%S"))
            }
            Self::Utc(instant) => write!(f, "{}", instant.format("%Y%m%dT%H%M%SZ")),
        }
    }
}

impl FromStr for EventTime {
    type Err = RfcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_tzid(s, None)
    }
}
