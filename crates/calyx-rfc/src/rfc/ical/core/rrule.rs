//! Parsed RRULE / EXRULE value (RFC 5545 §3.3.10).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EventTime;
use crate::error::RfcError;

/// Recurrence frequency (RFC 5545 §3.3.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Secondly => "SECONDLY",
            Self::Minutely => "MINUTELY",
            Self::Hourly => "HOURLY",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    /// Parses a frequency from a string (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "SECONDLY" => Self::Secondly,
            "MINUTELY" => Self::Minutely,
            "HOURLY" => Self::Hourly,
            "DAILY" => Self::Daily,
            "WEEKLY" => Self::Weekly,
            "MONTHLY" => Self::Monthly,
            "YEARLY" => Self::Yearly,
            _ => return None,
        })
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// Returns the two-letter abbreviation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "MO",
            Self::Tuesday => "TU",
            Self::Wednesday => "WE",
            Self::Thursday => "TH",
            Self::Friday => "FR",
            Self::Saturday => "SA",
            Self::Sunday => "SU",
        }
    }

    /// Parses a weekday from a two-letter abbreviation (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "MO" => Self::Monday,
            "TU" => Self::Tuesday,
            "WE" => Self::Wednesday,
            "TH" => Self::Thursday,
            "FR" => Self::Friday,
            "SA" => Self::Saturday,
            "SU" => Self::Sunday,
            _ => return None,
        })
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BYDAY entry: a weekday with an optional signed ordinal.
///
/// - `MO` - every Monday in the period
/// - `2TU` - second Tuesday of the month/year
/// - `-1FR` - last Friday of the month/year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekdayNum {
    /// Position within the period (-53..=53, never 0).
    pub ordinal: Option<i8>,
    pub weekday: Weekday,
}

impl WeekdayNum {
    #[must_use]
    pub const fn every(weekday: Weekday) -> Self {
        Self {
            ordinal: None,
            weekday,
        }
    }

    /// Returns `None` when `ordinal` is 0 or outside -53..=53.
    #[must_use]
    pub fn nth(ordinal: i8, weekday: Weekday) -> Option<Self> {
        (ordinal != 0 && (-53..=53).contains(&ordinal)).then_some(Self {
            ordinal: Some(ordinal),
            weekday,
        })
    }
}

impl fmt::Display for WeekdayNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.ordinal {
            write!(f, "{n}")?;
        }
        write!(f, "{}", self.weekday)
    }
}

/// How a rule terminates. UNTIL and COUNT are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleEnd {
    /// Neither UNTIL nor COUNT: the rule never ends.
    #[default]
    Forever,
    Count(u32),
    /// Inclusive bound. Never carries a TZID.
    Until(EventTime),
}

/// Recurrence rule (RFC 5545 §3.3.10).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    /// Always at least 1.
    pub interval: u32,
    pub end: RuleEnd,
    /// WKST exactly as given; see [`RecurrenceRule::week_start`].
    pub wkst: Option<Weekday>,
    pub by_second: Vec<u8>,
    pub by_minute: Vec<u8>,
    pub by_hour: Vec<u8>,
    pub by_day: Vec<WeekdayNum>,
    pub by_monthday: Vec<i8>,
    pub by_yearday: Vec<i16>,
    pub by_weekno: Vec<i8>,
    pub by_month: Vec<u8>,
    pub by_setpos: Vec<i16>,
}

impl RecurrenceRule {
    /// Creates an unbounded rule with interval 1 and no BY* parts.
    #[must_use]
    pub const fn new(freq: Frequency) -> Self {
        Self {
            freq,
            interval: 1,
            end: RuleEnd::Forever,
            wkst: None,
            by_second: Vec::new(),
            by_minute: Vec::new(),
            by_hour: Vec::new(),
            by_day: Vec::new(),
            by_monthday: Vec::new(),
            by_yearday: Vec::new(),
            by_weekno: Vec::new(),
            by_month: Vec::new(),
            by_setpos: Vec::new(),
        }
    }

    #[must_use]
    pub const fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    #[must_use]
    pub const fn weekly() -> Self {
        Self::new(Frequency::Weekly)
    }

    #[must_use]
    pub const fn monthly() -> Self {
        Self::new(Frequency::Monthly)
    }

    #[must_use]
    pub const fn yearly() -> Self {
        Self::new(Frequency::Yearly)
    }

    /// Sets the interval. Zero is clamped to 1.
    #[must_use]
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Sets COUNT, replacing any UNTIL.
    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.end = RuleEnd::Count(count);
        self
    }

    /// Sets UNTIL, replacing any COUNT.
    #[must_use]
    pub fn with_until(mut self, until: EventTime) -> Self {
        self.end = RuleEnd::Until(until);
        self
    }

    #[must_use]
    pub fn with_by_day(mut self, days: Vec<WeekdayNum>) -> Self {
        self.by_day = days;
        self
    }

    #[must_use]
    pub fn with_by_month(mut self, months: Vec<u8>) -> Self {
        self.by_month = months;
        self
    }

    #[must_use]
    pub fn with_by_monthday(mut self, days: Vec<i8>) -> Self {
        self.by_monthday = days;
        self
    }

    #[must_use]
    pub fn with_by_setpos(mut self, positions: Vec<i16>) -> Self {
        self.by_setpos = positions;
        self
    }

    #[must_use]
    pub fn with_wkst(mut self, wkst: Weekday) -> Self {
        self.wkst = Some(wkst);
        self
    }

    /// Effective week start: WKST if present, Monday otherwise.
    #[must_use]
    pub fn week_start(&self) -> Weekday {
        self.wkst.unwrap_or(Weekday::Monday)
    }

    #[must_use]
    pub fn count(&self) -> Option<u32> {
        match self.end {
            RuleEnd::Count(count) => Some(count),
            _ => None,
        }
    }

    #[must_use]
    pub fn until(&self) -> Option<&EventTime> {
        match &self.end {
            RuleEnd::Until(until) => Some(until),
            _ => None,
        }
    }

    /// True when the rule has neither UNTIL nor COUNT.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        matches!(self.end, RuleEnd::Forever)
    }

    /// ## Summary
    /// Groups BYDAY entries by ordinal.
    ///
    /// `BYDAY=TU,TH,-1FR` yields `[(None, [TU, TH]), (Some(-1), [FR])]`.
    /// Unordinaled weekdays come first, then ordinals in ascending order.
    #[must_use]
    pub fn by_day_groups(&self) -> Vec<(Option<i8>, Vec<Weekday>)> {
        let mut groups: BTreeMap<Option<i8>, Vec<Weekday>> = BTreeMap::new();
        for entry in &self.by_day {
            let days = groups.entry(entry.ordinal).or_default();
            if !days.contains(&entry.weekday) {
                days.push(entry.weekday);
            }
        }
        groups.into_iter().collect()
    }
}

fn push_list<T: fmt::Display>(parts: &mut Vec<String>, name: &str, values: &[T]) {
    if !values.is_empty() {
        let joined: Vec<_> = values.iter().map(ToString::to_string).collect();
        parts.push(format!("{name}={}", joined.join(",")));
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("FREQ={}", self.freq)];

        match &self.end {
            RuleEnd::Forever => {}
            RuleEnd::Count(count) => parts.push(format!("COUNT={count}")),
            RuleEnd::Until(until) => parts.push(format!("UNTIL={until}")),
        }

        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }

        push_list(&mut parts, "BYSECOND", &self.by_second);
        push_list(&mut parts, "BYMINUTE", &self.by_minute);
        push_list(&mut parts, "BYHOUR", &self.by_hour);
        push_list(&mut parts, "BYDAY", &self.by_day);
        push_list(&mut parts, "BYMONTHDAY", &self.by_monthday);
        push_list(&mut parts, "BYYEARDAY", &self.by_yearday);
        push_list(&mut parts, "BYWEEKNO", &self.by_weekno);
        push_list(&mut parts, "BYMONTH", &self.by_month);
        push_list(&mut parts, "BYSETPOS", &self.by_setpos);

        if let Some(wkst) = self.wkst {
            parts.push(format!("WKST={wkst}"));
        }

        f.write_str(&parts.join(";"))
    }
}

impl FromStr for RecurrenceRule {
    type Err = RfcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::rfc::ical::parse::parse_rrule(s)
    }
}
