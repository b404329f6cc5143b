//! Diffing a fresh occurrence set against stored instances.
//!
//! Instances and overrides are matched by recurrence-id only, never by position.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use calyx_rfc::rfc::ical::core::RecurrenceId;

use super::basis::RecurrenceIdForm;
use crate::caldav::model::{MasterId, OccurrencePeriod, Override, RecurrenceInstance};
use crate::caldav::notify::{ChangeKind, InstanceChange};

/// Why a pending override was not attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidOverrideReason {
    /// No produced occurrence has this recurrence-id.
    NoSuchOccurrence,
    /// An earlier pending override already claimed this recurrence-id.
    Duplicate,
}

/// A pending override reported back instead of applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidOverride {
    pub recurrence_id: RecurrenceId,
    pub reason: InvalidOverrideReason,
}

/// Deltas that turn the stored instances into the fresh occurrence set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub master_id: MasterId,
    pub to_add: Vec<RecurrenceInstance>,
    /// Replacement records, carrying their override.
    pub to_update: Vec<RecurrenceInstance>,
    /// Removed instances as they were stored, override included.
    pub to_remove: Vec<RecurrenceInstance>,
    pub invalid_overrides: Vec<InvalidOverride>,
}

impl Reconciliation {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }

    /// Overrides dropped together with their instance.
    pub fn removed_overrides(&self) -> impl Iterator<Item = &Override> {
        self.to_remove
            .iter()
            .filter_map(|instance| instance.overrides.as_ref())
    }

    /// One notification per added, updated and removed instance.
    #[must_use]
    pub fn changes(&self) -> Vec<InstanceChange> {
        let change = |kind, instance: &RecurrenceInstance| InstanceChange {
            kind,
            master_id: self.master_id,
            recurrence_id: instance.recurrence_id.clone(),
        };

        self.to_add
            .iter()
            .map(|instance| change(ChangeKind::Added, instance))
            .chain(
                self.to_update
                    .iter()
                    .map(|instance| change(ChangeKind::Updated, instance)),
            )
            .chain(
                self.to_remove
                    .iter()
                    .map(|instance| change(ChangeKind::Removed, instance)),
            )
            .collect()
    }
}

/// ## Summary
/// Computes the add / update / remove deltas for `master_id`.
///
/// - an existing instance whose recurrence-id is not produced any more is
///   removed, its override with it
/// - an existing instance whose period moved is updated, override kept
/// - every produced recurrence-id without an instance is added
/// - a pending override attaches to the added or surviving instance with its
///   recurrence-id (replacing any previous override); otherwise it is reported
///   in `invalid_overrides`
///
/// `new_periods` must have unique starts.
#[tracing::instrument(skip_all, fields(master_id = %master_id, periods = new_periods.len()))]
pub fn reconcile(
    master_id: MasterId,
    new_periods: &[OccurrencePeriod],
    form: RecurrenceIdForm,
    existing: &[RecurrenceInstance],
    pending: Vec<Override>,
) -> Reconciliation {
    let mut fresh: BTreeMap<RecurrenceId, OccurrencePeriod> = new_periods
        .iter()
        .map(|period| (form.key(period.start), *period))
        .collect();

    let mut invalid_overrides = Vec::new();
    let mut pending_by_rid: BTreeMap<RecurrenceId, Override> = BTreeMap::new();
    for item in pending {
        if pending_by_rid.contains_key(&item.recurrence_id) {
            invalid_overrides.push(InvalidOverride {
                recurrence_id: item.recurrence_id,
                reason: InvalidOverrideReason::Duplicate,
            });
        } else {
            pending_by_rid.insert(item.recurrence_id.clone(), item);
        }
    }

    let mut to_update = Vec::new();
    let mut to_remove = Vec::new();
    let mut seen = HashSet::new();

    for instance in existing {
        seen.insert(&instance.recurrence_id);
        let Some(period) = fresh.remove(&instance.recurrence_id) else {
            to_remove.push(instance.clone());
            continue;
        };

        let replacement = pending_by_rid.remove(&instance.recurrence_id);
        let moved = instance.period() != period;
        if !moved && replacement.is_none() {
            continue;
        }

        to_update.push(RecurrenceInstance {
            master_id,
            recurrence_id: instance.recurrence_id.clone(),
            start: period.start,
            end: period.end,
            overrides: replacement.or_else(|| instance.overrides.clone()),
        });
    }

    let to_add: Vec<RecurrenceInstance> = fresh
        .into_iter()
        .map(|(recurrence_id, period)| RecurrenceInstance {
            master_id,
            overrides: pending_by_rid.remove(&recurrence_id),
            recurrence_id,
            start: period.start,
            end: period.end,
        })
        .collect();

    for (recurrence_id, _) in pending_by_rid {
        tracing::warn!(%recurrence_id, removed = seen.contains(&recurrence_id), "Override matches no occurrence");
        invalid_overrides.push(InvalidOverride {
            recurrence_id,
            reason: InvalidOverrideReason::NoSuchOccurrence,
        });
    }

    tracing::debug!(
        added = to_add.len(),
        updated = to_update.len(),
        removed = to_remove.len(),
        invalid = invalid_overrides.len(),
        "Reconciled instances"
    );

    Reconciliation {
        master_id,
        to_add,
        to_update,
        to_remove,
        invalid_overrides,
    }
}
