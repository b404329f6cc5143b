//! Master / instance / override records and the ephemeral values produced by expansion.
//!
//! Records reference each other only through `MasterId` and `RecurrenceId`;
//! nothing here holds a pointer back to its owner.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use calyx_rfc::rfc::ical::core::{EventDuration, EventTime, RDate, RecurrenceId, RecurrenceRule};

/// Arena key of a stored master event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasterId(pub uuid::Uuid);

impl MasterId {
    /// Time-ordered identifier (UUIDv7).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for MasterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DTEND or DURATION of a master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventEnd {
    At(EventTime),
    Duration(EventDuration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Tentative,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attendee {
    /// Calendar user address, e.g. `mailto:alice@example.com`.
    pub address: String,
    pub common_name: Option<String>,
}

impl Attendee {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            common_name: None,
        }
    }
}

/// The canonical recurring entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterEvent {
    pub uid: String,
    pub start: EventTime,
    pub end: Option<EventEnd>,
    pub rrules: Vec<RecurrenceRule>,
    pub rdates: Vec<RDate>,
    pub exrules: Vec<RecurrenceRule>,
    pub exdates: Vec<EventTime>,
    pub sequence: u32,
    /// The master's own period is not an occurrence; only rule/RDATE output is.
    pub suppressed: bool,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub categories: Vec<String>,
    pub attendees: Vec<Attendee>,
    pub comments: Vec<String>,
}

impl MasterEvent {
    #[must_use]
    pub fn new(uid: impl Into<String>, start: EventTime) -> Self {
        Self {
            uid: uid.into(),
            start,
            end: None,
            rrules: Vec::new(),
            rdates: Vec::new(),
            exrules: Vec::new(),
            exdates: Vec::new(),
            sequence: 0,
            suppressed: false,
            summary: None,
            description: None,
            location: None,
            status: None,
            categories: Vec::new(),
            attendees: Vec::new(),
            comments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_end(mut self, end: EventTime) -> Self {
        self.end = Some(EventEnd::At(end));
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: EventDuration) -> Self {
        self.end = Some(EventEnd::Duration(duration));
        self
    }

    #[must_use]
    pub fn with_rrule(mut self, rule: RecurrenceRule) -> Self {
        self.rrules.push(rule);
        self
    }

    #[must_use]
    pub fn with_exrule(mut self, rule: RecurrenceRule) -> Self {
        self.exrules.push(rule);
        self
    }

    #[must_use]
    pub fn with_rdate(mut self, rdate: impl Into<RDate>) -> Self {
        self.rdates.push(rdate.into());
        self
    }

    #[must_use]
    pub fn with_exdate(mut self, exdate: EventTime) -> Self {
        self.exdates.push(exdate);
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn suppressed(mut self) -> Self {
        self.suppressed = true;
        self
    }

    /// True when any RRULE or RDATE exists.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        !self.rrules.is_empty() || !self.rdates.is_empty()
    }

    /// Strips every recurrence property, leaving a single event.
    pub fn demote(&mut self) {
        self.rrules.clear();
        self.rdates.clear();
        self.exrules.clear();
        self.exdates.clear();
        self.suppressed = false;
    }
}

/// One overridable field.
///
/// `Cleared` and `Absent` are distinct: a cleared field hides the master's
/// value, an absent one inherits it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum OverrideField<T> {
    #[default]
    Absent,
    Cleared,
    Value(T),
}

impl<T> OverrideField<T> {
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The effective value given what the master holds.
    #[must_use]
    pub fn apply<'a>(&'a self, inherited: Option<&'a T>) -> Option<&'a T> {
        match self {
            Self::Absent => inherited,
            Self::Cleared => None,
            Self::Value(value) => Some(value),
        }
    }
}

impl<T: Clone> OverrideField<Vec<T>> {
    /// An empty list is stored as `Cleared`.
    #[must_use]
    pub fn list(values: Vec<T>) -> Self {
        if values.is_empty() {
            Self::Cleared
        } else {
            Self::Value(values)
        }
    }

    #[must_use]
    pub fn apply_list(&self, inherited: &[T]) -> Vec<T> {
        match self {
            Self::Absent => inherited.to_vec(),
            Self::Cleared => Vec::new(),
            Self::Value(values) => values.clone(),
        }
    }
}

/// Per-occurrence partial record, keyed by recurrence-id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    pub recurrence_id: RecurrenceId,
    /// Moved start; `None` keeps the instance's own timing.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: OverrideField<String>,
    #[serde(default)]
    pub description: OverrideField<String>,
    #[serde(default)]
    pub location: OverrideField<String>,
    #[serde(default)]
    pub status: OverrideField<EventStatus>,
    #[serde(default)]
    pub categories: OverrideField<Vec<String>>,
    #[serde(default)]
    pub attendees: OverrideField<Vec<Attendee>>,
    #[serde(default)]
    pub comments: OverrideField<Vec<String>>,
}

impl Override {
    #[must_use]
    pub fn new(recurrence_id: RecurrenceId) -> Self {
        Self {
            recurrence_id,
            start: None,
            end: None,
            summary: OverrideField::Absent,
            description: OverrideField::Absent,
            location: OverrideField::Absent,
            status: OverrideField::Absent,
            categories: OverrideField::Absent,
            attendees: OverrideField::Absent,
            comments: OverrideField::Absent,
        }
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = OverrideField::Value(summary.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = OverrideField::Value(location.into());
        self
    }

    #[must_use]
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = OverrideField::list(categories);
        self
    }

    #[must_use]
    pub fn with_attendees(mut self, attendees: Vec<Attendee>) -> Self {
        self.attendees = OverrideField::list(attendees);
        self
    }

    #[must_use]
    pub fn with_timing(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
}

/// One materialized occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceInstance {
    pub master_id: MasterId,
    pub recurrence_id: RecurrenceId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub overrides: Option<Override>,
}

impl RecurrenceInstance {
    #[must_use]
    pub const fn period(&self) -> OccurrencePeriod {
        OccurrencePeriod {
            start: self.start,
            end: self.end,
        }
    }
}

/// `(start, end)` of one occurrence. Ordered by start, then end.
///
/// Floating and date-only events place their wall-clock fields directly on the
/// UTC time line, so periods of one master always compare consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OccurrencePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl OccurrencePeriod {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Half-open overlap with `[range_start, range_end)`.
    ///
    /// A zero-length period exactly at `range_start` counts as overlapping.
    #[must_use]
    pub fn overlaps(&self, range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> bool {
        if self.start >= range_end {
            return false;
        }
        self.end > range_start || (self.start == self.end && self.start == range_start)
    }
}

/// Outer bound of a master's occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Some rule is unbounded; `end` is the horizon cap, not a true last end.
    pub infinite: bool,
}

impl RecurrenceRange {
    /// ## Summary
    /// Answers whether the master may have an occurrence touching `[start, end)`.
    ///
    /// A `true` answer means expansion is needed; `false` is definitive.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        OccurrencePeriod::new(self.start, self.end).overlaps(start, end)
            || (start == end && self.start <= start && start < self.end)
    }
}

/// The view of one occurrence after applying its override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveOccurrence {
    pub master_id: MasterId,
    pub uid: String,
    pub recurrence_id: RecurrenceId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sequence: u32,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub categories: Vec<String>,
    pub attendees: Vec<Attendee>,
    pub comments: Vec<String>,
    pub overridden: bool,
}
