//! DURATION value (RFC 5545 §3.3.6).

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::RfcError;

/// Duration value.
///
/// Week form (`P2W`) and day/time form (`P1DT2H30M`) are both kept as
/// written so that week granularity can be detected after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EventDuration {
    pub negative: bool,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl EventDuration {
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            negative: false,
            weeks: 0,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    #[must_use]
    pub const fn weeks(weeks: u32) -> Self {
        Self {
            weeks,
            ..Self::zero()
        }
    }

    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self {
            days,
            ..Self::zero()
        }
    }

    #[must_use]
    pub const fn hours(hours: u32) -> Self {
        Self {
            hours,
            ..Self::zero()
        }
    }

    #[must_use]
    pub const fn minutes(minutes: u32) -> Self {
        Self {
            minutes,
            ..Self::zero()
        }
    }

    /// True for the `PnW` form.
    #[must_use]
    pub const fn is_week_granular(&self) -> bool {
        self.weeks > 0 && self.days == 0 && self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }

    #[must_use]
    pub fn to_time_delta(&self) -> TimeDelta {
        let total = TimeDelta::weeks(i64::from(self.weeks))
            + TimeDelta::days(i64::from(self.days))
            + TimeDelta::hours(i64::from(self.hours))
            + TimeDelta::minutes(i64::from(self.minutes))
            + TimeDelta::seconds(i64::from(self.seconds));

        if self.negative { -total } else { total }
    }
}

impl fmt::Display for EventDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str("P")?;
        if self.is_week_granular() {
            return write!(f, "{}W", self.weeks);
        }

        let days = self.days + self.weeks * 7;
        if days > 0 {
            write!(f, "{days}D")?;
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            f.write_str("T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0 {
                write!(f, "{}S", self.seconds)?;
            }
        } else if days == 0 {
            f.write_str("T0S")?;
        }
        Ok(())
    }
}

impl FromStr for EventDuration {
    type Err = RfcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::rfc::ical::parse::parse_duration(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_form_is_week_granular() {
        let dur: EventDuration = "P2W".parse().expect("valid duration");
        assert!(dur.is_week_granular());
        assert_eq!(dur.to_time_delta(), TimeDelta::weeks(2));
        assert_eq!(dur.to_string(), "P2W");
    }

    #[test]
    fn day_time_form() {
        let dur: EventDuration = "P1DT2H30M".parse().expect("valid duration");
        assert!(!dur.is_week_granular());
        assert_eq!(
            dur.to_time_delta(),
            TimeDelta::days(1) + TimeDelta::hours(2) + TimeDelta::minutes(30)
        );
        assert_eq!(dur.to_string(), "P1DT2H30M");
    }

    #[test]
    fn negative_and_zero() {
        let dur: EventDuration = "-PT15M".parse().expect("valid duration");
        assert_eq!(dur.to_time_delta(), -TimeDelta::minutes(15));
        assert_eq!(EventDuration::zero().to_string(), "PT0S");
    }
}
