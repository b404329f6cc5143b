//! Placement of event values on one comparable time line.
//!
//! Every master is expanded on a single basis chosen from its DTSTART:
//!
//! - date-only and floating masters keep wall-clock fields, stored as if UTC
//! - UTC and zoned masters use true UTC instants
//!
//! Values of the other kind are converted explicitly through the configured
//! floating zone, never by reinterpreting their fields.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use calyx_rfc::rfc::ical::core::{EventTime, PeriodEnd, RDate, RecurrenceId};
use calyx_rfc::rfc::ical::expand::{ResolveTimeZone, localize_lenient};

use crate::caldav::model::{EventEnd, MasterEvent, OccurrencePeriod};
use crate::error::{ServiceError, ServiceResult};

/// Serialization used for the recurrence-ids of one master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecurrenceIdForm {
    /// `YYYYMMDD`
    Date,
    /// `YYYYMMDDTHHMMSS`
    Floating,
    /// `YYYYMMDDTHHMMSSZ`
    Utc,
}

impl RecurrenceIdForm {
    /// Derives the key of the occurrence starting at `start`.
    #[must_use]
    pub fn key(self, start: DateTime<Utc>) -> RecurrenceId {
        match self {
            Self::Date => RecurrenceId::from_date(start.date_naive()),
            Self::Floating => RecurrenceId::from_floating(start.naive_utc()),
            Self::Utc => RecurrenceId::from_utc(start),
        }
    }
}

/// Where a rule generator starts: an instant on the basis line and the
/// wall clock the rule iterates from.
///
/// The two differ only for a zoned DTSTART inside a DST gap, whose wall clock
/// has no instant of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub instant: DateTime<Utc>,
    pub wall: NaiveDateTime,
}

/// Start handed to `rrule`, plus the zone results must be placed in when the
/// generator iterates wall clocks on the UTC line.
#[derive(Debug, Clone)]
pub struct GeneratorStart {
    pub start: DateTime<rrule::Tz>,
    pub relocalize: Option<Tz>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisKind {
    Date,
    Floating,
    Utc,
    Zoned(Tz),
}

/// The time line of one master plus what is needed to convert onto it.
#[derive(Clone, Copy)]
pub struct TimeBasis<'r> {
    kind: BasisKind,
    floating_zone: Tz,
    resolver: &'r dyn ResolveTimeZone,
}

impl std::fmt::Debug for TimeBasis<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeBasis")
            .field("kind", &self.kind)
            .field("floating_zone", &self.floating_zone)
            .finish_non_exhaustive()
    }
}

impl<'r> TimeBasis<'r> {
    /// ## Summary
    /// Picks the basis from a master's DTSTART.
    ///
    /// ## Errors
    /// Returns `ServiceError::TimezoneResolutionFailure` if DTSTART names an unknown zone.
    pub fn for_start(
        start: &EventTime,
        floating_zone: Tz,
        resolver: &'r dyn ResolveTimeZone,
    ) -> ServiceResult<Self> {
        let kind = match start {
            EventTime::Date(_) => BasisKind::Date,
            EventTime::Floating(_) => BasisKind::Floating,
            EventTime::Utc(_) => BasisKind::Utc,
            EventTime::Zoned { tzid, .. } => BasisKind::Zoned(
                resolver
                    .resolve(tzid)
                    .map_err(|e| ServiceError::timezone(tzid, e))?,
            ),
        };

        Ok(Self {
            kind,
            floating_zone,
            resolver,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> BasisKind {
        self.kind
    }

    #[must_use]
    pub const fn is_wall_clock(&self) -> bool {
        matches!(self.kind, BasisKind::Date | BasisKind::Floating)
    }

    #[must_use]
    pub const fn recurrence_id_form(&self) -> RecurrenceIdForm {
        match self.kind {
            BasisKind::Date => RecurrenceIdForm::Date,
            BasisKind::Floating => RecurrenceIdForm::Floating,
            BasisKind::Utc | BasisKind::Zoned(_) => RecurrenceIdForm::Utc,
        }
    }

    /// ## Summary
    /// Places a value on this basis' time line.
    ///
    /// A zoned or floating time inside a DST gap is read with the offset in
    /// force before the gap.
    ///
    /// ## Errors
    /// Returns `ServiceError::TimezoneResolutionFailure` for an unknown zone.
    pub fn instant(&self, value: &EventTime) -> ServiceResult<DateTime<Utc>> {
        match value {
            EventTime::Date(date) => self.wall_clock(date.and_time(NaiveTime::MIN)),
            EventTime::Floating(local) => self.wall_clock(*local),
            EventTime::Utc(instant) => Ok(self.absolute(*instant)),
            EventTime::Zoned { local, tzid } => {
                let tz = self
                    .resolver
                    .resolve(tzid)
                    .map_err(|e| ServiceError::timezone(tzid, e))?;
                let instant =
                    localize_lenient(*local, tz).map_err(|e| ServiceError::timezone(tzid, e))?;
                Ok(self.absolute(instant))
            }
        }
    }

    /// ## Summary
    /// Inclusive upper bound for an UNTIL value.
    ///
    /// An UNTIL without a zone of its own, date-only or floating, is read in
    /// the master's zone. A date-only UNTIL on a date-time master covers the
    /// whole day.
    ///
    /// ## Errors
    /// As for [`TimeBasis::instant`].
    pub fn until_instant(&self, until: &EventTime) -> ServiceResult<DateTime<Utc>> {
        let local = match until {
            EventTime::Date(date) => {
                let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
                date.and_time(last_second)
            }
            EventTime::Floating(local) => *local,
            EventTime::Utc(_) | EventTime::Zoned { .. } => return self.instant(until),
        };
        self.on_own_line(local)
    }

    /// ## Summary
    /// Anchor of the master's own DTSTART.
    ///
    /// ## Errors
    /// As for [`TimeBasis::instant`].
    pub fn anchor(&self, start: &EventTime) -> ServiceResult<Anchor> {
        Ok(Anchor {
            instant: self.instant(start)?,
            wall: start.naive(),
        })
    }

    /// ## Summary
    /// Anchor at a wall clock in the master's own zone.
    ///
    /// ## Errors
    /// As for [`TimeBasis::instant`].
    pub fn anchor_at(&self, wall: NaiveDateTime) -> ServiceResult<Anchor> {
        Ok(Anchor {
            instant: self.on_own_line(wall)?,
            wall,
        })
    }

    /// Wall clock of an instant in the master's own zone.
    #[must_use]
    pub fn wall_clock_of(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self.kind {
            BasisKind::Zoned(tz) => instant.with_timezone(&tz).naive_local(),
            _ => instant.naive_utc(),
        }
    }

    /// Calendar date of an instant as the master's attendees see it.
    #[must_use]
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self.kind {
            BasisKind::Zoned(tz) => instant.with_timezone(&tz).date_naive(),
            _ => instant.date_naive(),
        }
    }

    /// ## Summary
    /// Start handed to the rule generator for a wall clock.
    ///
    /// Zoned masters iterate in their zone. When the wall clock falls in a DST
    /// gap the generator instead iterates wall clocks on the UTC line and each
    /// result is placed in the zone afterwards, so later occurrences keep the
    /// nominal time of day.
    #[must_use]
    pub fn generator_start(&self, wall: NaiveDateTime) -> GeneratorStart {
        let on_utc_line = |relocalize| GeneratorStart {
            start: wall.and_utc().with_timezone(&rrule::Tz::UTC),
            relocalize,
        };

        match self.kind {
            BasisKind::Zoned(tz) => match tz.from_local_datetime(&wall).earliest() {
                Some(start) => GeneratorStart {
                    start: start.with_timezone(&rrule::Tz::Tz(tz)),
                    relocalize: None,
                },
                None => on_utc_line(Some(tz)),
            },
            BasisKind::Date | BasisKind::Floating | BasisKind::Utc => on_utc_line(None),
        }
    }

    /// ## Summary
    /// Length of the master's own period.
    ///
    /// DTEND minus DTSTART, or DURATION. Without either, one day for a
    /// date-only master and zero otherwise.
    ///
    /// ## Errors
    /// As for [`TimeBasis::instant`]; also rejects a DTEND before DTSTART.
    pub fn duration(&self, master: &MasterEvent, start: DateTime<Utc>) -> ServiceResult<TimeDelta> {
        let duration = match &master.end {
            Some(EventEnd::At(end)) => self.instant(end)? - start,
            Some(EventEnd::Duration(duration)) => duration.to_time_delta(),
            None if master.start.is_date_only() => TimeDelta::days(1),
            None => TimeDelta::zero(),
        };

        if duration < TimeDelta::zero() {
            return Err(ServiceError::ValidationError(format!(
                "event {} ends before it starts",
                master.uid
            )));
        }
        Ok(duration)
    }

    /// ## Summary
    /// Period of an RDATE. A plain RDATE lasts `duration`; an RDATE period
    /// keeps its own end, clamped so it never precedes its start.
    ///
    /// ## Errors
    /// As for [`TimeBasis::instant`].
    pub fn rdate_period(&self, rdate: &RDate, duration: TimeDelta) -> ServiceResult<OccurrencePeriod> {
        let start = self.instant(rdate.start())?;
        let end = match rdate.period_end() {
            Some(PeriodEnd::Explicit(end)) => self.instant(end)?,
            Some(PeriodEnd::Duration(length)) => start + length.to_time_delta(),
            None => start + duration,
        };
        Ok(OccurrencePeriod::new(start, end.max(start)))
    }

    fn wall_clock(&self, local: NaiveDateTime) -> ServiceResult<DateTime<Utc>> {
        if self.is_wall_clock() {
            return Ok(local.and_utc());
        }
        localize_lenient(local, self.floating_zone)
            .map_err(|e| ServiceError::timezone(self.floating_zone.name(), e))
    }

    /// Places a wall clock in the master's own zone.
    fn on_own_line(&self, local: NaiveDateTime) -> ServiceResult<DateTime<Utc>> {
        match self.kind {
            BasisKind::Zoned(tz) => {
                localize_lenient(local, tz).map_err(|e| ServiceError::timezone(tz.name(), e))
            }
            BasisKind::Date | BasisKind::Floating | BasisKind::Utc => Ok(local.and_utc()),
        }
    }

    fn absolute(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_wall_clock() {
            self.floating_zone
                .from_utc_datetime(&instant.naive_utc())
                .naive_local()
                .and_utc()
        } else {
            instant
        }
    }
}
