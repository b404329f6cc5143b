//! EXDATE / EXRULE matching.

use std::collections::HashSet;
use std::iter::Peekable;

use chrono::{DateTime, NaiveDate, Utc};

use calyx_rfc::rfc::ical::core::EventTime;

use super::basis::{Anchor, TimeBasis};
use super::generator::{Occurrences, RuleGenerator};
use crate::caldav::model::MasterEvent;
use crate::error::ServiceResult;

/// Exclusions of one master, placed on its basis.
pub(crate) struct Exclusions {
    instants: HashSet<DateTime<Utc>>,
    /// Date-only EXDATEs match any start on that local date.
    dates: HashSet<NaiveDate>,
    rules: Vec<RuleGenerator>,
}

impl Exclusions {
    /// EXRULEs are generated from `near` on; earlier candidates are never asked.
    pub(crate) fn new(
        master: &MasterEvent,
        basis: &TimeBasis<'_>,
        anchor: Anchor,
        near: DateTime<Utc>,
    ) -> ServiceResult<Self> {
        let mut instants = HashSet::new();
        let mut dates = HashSet::new();
        for exdate in &master.exdates {
            if let EventTime::Date(date) = exdate {
                dates.insert(*date);
            } else {
                instants.insert(basis.instant(exdate)?);
            }
        }

        let mut rules = Vec::with_capacity(master.exrules.len());
        for rule in &master.exrules {
            if let Some(generator) = RuleGenerator::build_near(rule, basis, anchor, near)? {
                rules.push(generator);
            }
        }

        Ok(Self {
            instants,
            dates,
            rules,
        })
    }

    /// Starts a pass over ascending candidates.
    pub(crate) fn cursor<'e>(&'e self, basis: &'e TimeBasis<'e>) -> ExclusionCursor<'e> {
        ExclusionCursor {
            exclusions: self,
            basis,
            rules: self.rules.iter().map(|rule| rule.iter().peekable()).collect(),
        }
    }
}

pub(crate) struct ExclusionCursor<'e> {
    exclusions: &'e Exclusions,
    basis: &'e TimeBasis<'e>,
    rules: Vec<Peekable<Occurrences<'e>>>,
}

impl ExclusionCursor<'_> {
    /// Candidates must be queried in ascending order.
    pub(crate) fn excludes(&mut self, start: DateTime<Utc>) -> ServiceResult<bool> {
        if self.exclusions.instants.contains(&start)
            || (!self.exclusions.dates.is_empty()
                && self.exclusions.dates.contains(&self.basis.local_date(start)))
        {
            return Ok(true);
        }

        for rule in &mut self.rules {
            while let Some(skipped) =
                rule.next_if(|next| !matches!(next, Ok(excluded) if *excluded >= start))
            {
                skipped?;
            }
            if matches!(rule.peek(), Some(Ok(excluded)) if *excluded == start) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
