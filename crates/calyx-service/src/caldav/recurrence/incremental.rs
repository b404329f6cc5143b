//! Fast path for edits that only add RDATEs or EXDATEs.
//!
//! Such an edit cannot move any surviving occurrence, so the new set is the
//! stored instances minus the new exclusions plus the new RDATE periods.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use calyx_core::config::ExpansionLimits;
use calyx_rfc::rfc::ical::core::{EventTime, RDate};

use super::basis::TimeBasis;
use super::exclusion::Exclusions;
use super::expand::ExpansionWindow;
use super::range::{compute_range, horizon};
use crate::caldav::model::{MasterEvent, OccurrencePeriod, RecurrenceInstance};
use crate::error::{ServiceError, ServiceResult};

/// How far an edit of a master reaches into its occurrence set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeScope {
    /// No recurrence property changed.
    Unchanged,
    /// Only RDATEs and EXDATEs were added.
    DatesOnly {
        added_rdates: Vec<RDate>,
        added_exdates: Vec<EventTime>,
    },
    /// Anything else; the set must be expanded again.
    Full,
}

impl ChangeScope {
    /// ## Summary
    /// Compares the recurrence properties of two versions of a master.
    ///
    /// `DatesOnly` requires the old version to be recurring already, with
    /// identical DTSTART, end, rules and suppression, and both date lists only
    /// growing.
    #[must_use]
    pub fn classify(old: &MasterEvent, new: &MasterEvent) -> Self {
        if old.start != new.start
            || old.end != new.end
            || old.rrules != new.rrules
            || old.exrules != new.exrules
            || old.suppressed != new.suppressed
        {
            return Self::Full;
        }
        if old.rdates == new.rdates && old.exdates == new.exdates {
            return Self::Unchanged;
        }
        if !old.is_recurring()
            || !old.rdates.iter().all(|rdate| new.rdates.contains(rdate))
            || !old.exdates.iter().all(|exdate| new.exdates.contains(exdate))
        {
            return Self::Full;
        }

        Self::DatesOnly {
            added_rdates: added(&old.rdates, &new.rdates),
            added_exdates: added(&old.exdates, &new.exdates),
        }
    }
}

fn added<T: PartialEq + Clone>(old: &[T], new: &[T]) -> Vec<T> {
    new.iter()
        .filter(|value| !old.contains(value))
        .cloned()
        .collect()
}

/// ## Summary
/// New occurrence set for a `DatesOnly` edit, derived from `existing`.
///
/// Returns `Ok(None)` when the stored set may have been truncated or the
/// result would exceed `max_instances`; the caller then expands fully.
///
/// ## Errors
/// - `ServiceError::NoInstancesForRecurringEvent` when nothing survives
/// - timezone failures from placing the new dates
#[tracing::instrument(skip_all, fields(uid = %master.uid, existing = existing.len()))]
pub fn incremental_periods(
    master: &MasterEvent,
    basis: &TimeBasis<'_>,
    limits: ExpansionLimits,
    window: &ExpansionWindow,
    existing: &[RecurrenceInstance],
    added_rdates: &[RDate],
) -> ServiceResult<Option<Vec<OccurrencePeriod>>> {
    if existing.len() >= limits.max_instances {
        tracing::debug!("Stored set may be truncated, falling back to full expansion");
        return Ok(None);
    }

    let origin = basis.anchor(&master.start)?;
    let start = origin.instant;
    let duration = basis.duration(master, start)?;
    let cap = horizon(start, limits.max_years);
    let Some(range) = compute_range(master, basis, limits.max_years, window.parent_end)? else {
        return Ok(None);
    };
    let exclusions = Exclusions::new(master, basis, origin, range.start)?;

    let mut periods: BTreeMap<DateTime<Utc>, OccurrencePeriod> = existing
        .iter()
        .map(|instance| (instance.start, instance.period()))
        .collect();

    for rdate in added_rdates {
        let period = basis.rdate_period(rdate, duration)?;
        if period.start < cap && period.overlaps(range.start, range.end) {
            periods.entry(period.start).or_insert(period);
        }
    }

    let mut cursor = exclusions.cursor(basis);
    let mut kept = Vec::with_capacity(periods.len());
    for period in periods.into_values() {
        if !cursor.excludes(period.start)? {
            kept.push(period);
        }
    }
    let periods = kept;

    if periods.len() > limits.max_instances {
        return Ok(None);
    }
    if periods.is_empty() {
        return Err(ServiceError::NoInstancesForRecurringEvent {
            uid: master.uid.clone(),
        });
    }

    tracing::debug!(count = periods.len(), "Derived occurrence set incrementally");
    Ok(Some(periods))
}
