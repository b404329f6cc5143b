//! Expansion of a master into its ordered, bounded set of occurrence periods.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use calyx_core::config::ExpansionLimits;
use calyx_rfc::rfc::ical::core::RecurrenceId;

use super::basis::{RecurrenceIdForm, TimeBasis};
use super::exclusion::Exclusions;
use super::generator::{RuleGenerator, WALK_BUDGET};
use super::range::{compute_range, horizon};
use crate::caldav::model::{MasterEvent, OccurrencePeriod, RecurrenceRange};
use crate::error::{ServiceError, ServiceResult};

/// Caller-supplied bounds. Missing ends are computed from the master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// End of a containing entity's horizon, applied to computed ranges.
    pub parent_end: Option<DateTime<Utc>>,
}

impl ExpansionWindow {
    #[must_use]
    pub const fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            parent_end: None,
        }
    }

    const fn is_explicit(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

/// Result of one expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expansion {
    /// Ascending by start, unique starts, at most `max_instances` entries.
    pub periods: Vec<OccurrencePeriod>,
    pub range: RecurrenceRange,
    /// Stand-in period before `range.start` for a suppressed master.
    pub anchor: Option<OccurrencePeriod>,
    /// The set is incomplete: more occurrences exist than `max_instances`
    /// allowed, or a rule stepped over too many starts outside the range.
    pub truncated: bool,
    #[serde(skip)]
    pub recurrence_id_form: RecurrenceIdForm,
}

impl Expansion {
    /// Periods keyed by recurrence-id.
    pub fn keyed(&self) -> impl Iterator<Item = (RecurrenceId, OccurrencePeriod)> + '_ {
        let form = self.recurrence_id_form;
        self.periods.iter().map(move |period| (form.key(period.start), *period))
    }
}

/// ## Summary
/// Expands `master` into its occurrence periods.
///
/// 1. The range is taken from `window`, completing missing ends from
///    [`compute_range`]. Explicit ends are still capped at DTSTART + `max_years`.
/// 2. Candidates are every RRULE start and every RDATE, minus EXRULE starts and
///    EXDATEs (exact instant, or same local date for date-only EXDATEs).
/// 3. The master's own period is included unless suppressed; a suppressed
///    master gets an [`Expansion::anchor`] instead.
/// 4. Duplicate starts collapse, periods are ordered and the earliest
///    `max_instances` are kept.
///
/// Periods overlap the range half-open, with a zero-length period exactly at
/// the range start included. Rules without COUNT are generated from the range
/// start rather than from DTSTART; every other pass steps over at most
/// [`WALK_BUDGET`] starts it does not keep before reporting truncation.
///
/// ## Errors
/// - `ServiceError::NoInstancesForRecurringEvent` when a recurring master has
///   no occurrence in its computed range
/// - `ServiceError::TimezoneResolutionFailure` for unresolvable zones
/// - `RfcError::MalformedRule` (wrapped) for rules the generator rejects
#[tracing::instrument(skip(master, basis), fields(uid = %master.uid))]
pub fn expand(
    master: &MasterEvent,
    basis: &TimeBasis<'_>,
    limits: ExpansionLimits,
    window: &ExpansionWindow,
) -> ServiceResult<Expansion> {
    let origin = basis.anchor(&master.start)?;
    let start = origin.instant;
    let duration = basis.duration(master, start)?;
    let own = OccurrencePeriod::new(start, start + duration);
    let cap = horizon(start, limits.max_years);

    let range = resolve_range(master, basis, limits, window, own, cap)?;
    // earlier starts end before the range does
    let near = range.start.checked_sub_signed(duration).unwrap_or(range.start);
    let exclusions = Exclusions::new(master, basis, origin, near)?;

    let mut candidates: BTreeMap<DateTime<Utc>, OccurrencePeriod> = BTreeMap::new();
    let mut anchor = None;
    let mut walk_cut = false;

    if master.suppressed {
        let anchor_start = range.start - (duration + TimeDelta::days(1));
        anchor = Some(OccurrencePeriod::new(anchor_start, anchor_start + duration));
    } else if own.overlaps(range.start, range.end) && !exclusions.cursor(basis).excludes(start)? {
        candidates.insert(start, own);
    }

    if master.is_recurring() {
        let keep = limits.max_instances.saturating_add(1);

        for rule in &master.rrules {
            let Some(generator) = RuleGenerator::build_near(rule, basis, origin, near)? else {
                continue;
            };
            let mut cursor = exclusions.cursor(basis);
            let mut kept = 0_usize;
            let mut stepped = 0_usize;

            for occurrence in generator.iter() {
                let occurrence = occurrence?;
                if occurrence >= range.end || kept >= keep {
                    break;
                }
                let period = OccurrencePeriod::new(occurrence, occurrence + duration);
                if !period.overlaps(range.start, range.end) || cursor.excludes(occurrence)? {
                    stepped += 1;
                    if stepped >= WALK_BUDGET {
                        tracing::warn!(rule = %rule, stepped, "Stopped stepping over starts outside the range");
                        walk_cut = true;
                        break;
                    }
                    continue;
                }
                candidates.entry(occurrence).or_insert(period);
                kept += 1;
            }
        }

        let mut rdate_periods = master
            .rdates
            .iter()
            .map(|rdate| basis.rdate_period(rdate, duration))
            .collect::<ServiceResult<Vec<_>>>()?;
        rdate_periods.sort();

        let mut cursor = exclusions.cursor(basis);
        for period in rdate_periods {
            if period.start >= cap
                || !period.overlaps(range.start, range.end)
                || cursor.excludes(period.start)?
            {
                continue;
            }
            candidates.entry(period.start).or_insert(period);
        }
    }

    let mut periods: Vec<OccurrencePeriod> = candidates.into_values().collect();
    let over_limit = periods.len() > limits.max_instances;
    if over_limit {
        tracing::warn!(
            max_instances = limits.max_instances,
            "Recurrence set truncated to the instance limit"
        );
        periods.truncate(limits.max_instances);
    }
    let truncated = over_limit || walk_cut;

    if periods.is_empty() && master.is_recurring() && !window.is_explicit() {
        tracing::warn!("Recurring event expands to no instances");
        return Err(ServiceError::NoInstancesForRecurringEvent {
            uid: master.uid.clone(),
        });
    }

    tracing::debug!(count = periods.len(), truncated, "Expanded recurrence set");

    Ok(Expansion {
        periods,
        range,
        anchor,
        truncated,
        recurrence_id_form: basis.recurrence_id_form(),
    })
}

fn resolve_range(
    master: &MasterEvent,
    basis: &TimeBasis<'_>,
    limits: ExpansionLimits,
    window: &ExpansionWindow,
    own: OccurrencePeriod,
    cap: DateTime<Utc>,
) -> ServiceResult<RecurrenceRange> {
    if let (Some(start), Some(end)) = (window.start, window.end) {
        return Ok(RecurrenceRange {
            start,
            end: end.min(cap),
            infinite: false,
        });
    }

    let computed = compute_range(master, basis, limits.max_years, window.parent_end)?.unwrap_or(
        RecurrenceRange {
            start: own.start,
            end: own.end,
            infinite: false,
        },
    );

    Ok(RecurrenceRange {
        start: window.start.unwrap_or(computed.start),
        end: window.end.map_or(computed.end, |end| end.min(cap)),
        infinite: computed.infinite,
    })
}
