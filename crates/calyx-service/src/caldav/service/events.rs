use serde::Serialize;

use calyx_core::config::ZeroInstancePolicy;
use calyx_rfc::rfc::ical::core::RecurrenceId;

use super::RecurrenceContext;
use crate::caldav::model::{
    EffectiveOccurrence, MasterEvent, MasterId, OccurrencePeriod, Override, RecurrenceInstance,
};
use crate::caldav::notify::{ChangeKind, ChangeSink, InstanceChange};
use crate::caldav::recurrence::{
    ChangeScope, ExpansionWindow, InvalidOverride, RecurrenceIdForm, Reconciliation, expand,
    incremental_periods, reconcile, resolve, resolve_instance,
};
use crate::caldav::store::RecurrenceStore;
use crate::error::{ServiceError, ServiceResult};

/// Result of an add or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub master_id: MasterId,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Overrides that were reported instead of applied.
    pub invalid_overrides: Vec<InvalidOverride>,
    /// The event expanded to nothing and was stored as a single event.
    pub demoted: bool,
    /// The occurrence set was derived from the stored instances.
    pub fast_path: bool,
}

impl SaveOutcome {
    fn new(reconciliation: &Reconciliation, demoted: bool, fast_path: bool) -> Self {
        Self {
            master_id: reconciliation.master_id,
            added: reconciliation.to_add.len(),
            updated: reconciliation.to_update.len(),
            removed: reconciliation.to_remove.len(),
            invalid_overrides: reconciliation.invalid_overrides.clone(),
            demoted,
            fast_path,
        }
    }
}

/// Occurrence set chosen for a save.
struct Planned {
    periods: Vec<OccurrencePeriod>,
    form: RecurrenceIdForm,
    demoted: bool,
    fast_path: bool,
}

/// ## Summary
/// Full expansion for a save, applying the zero-instance policy.
///
/// Non-recurring masters materialize no instances.
fn plan_full(ctx: &RecurrenceContext<'_>, master: &mut MasterEvent) -> ServiceResult<Planned> {
    let basis = ctx.basis(master)?;
    let form = basis.recurrence_id_form();
    if !master.is_recurring() {
        return Ok(Planned {
            periods: Vec::new(),
            form,
            demoted: false,
            fast_path: false,
        });
    }

    match expand(master, &basis, ctx.limits, &ctx.save_window()) {
        Ok(expansion) => Ok(Planned {
            periods: expansion.periods,
            form,
            demoted: false,
            fast_path: false,
        }),
        Err(err @ ServiceError::NoInstancesForRecurringEvent { .. }) => {
            demote_or_reject(ctx, master, form, err)
        }
        Err(err) => Err(err),
    }
}

fn demote_or_reject(
    ctx: &RecurrenceContext<'_>,
    master: &mut MasterEvent,
    form: RecurrenceIdForm,
    err: ServiceError,
) -> ServiceResult<Planned> {
    match ctx.zero_instance_policy {
        ZeroInstancePolicy::Reject => Err(err),
        ZeroInstancePolicy::Demote => {
            tracing::warn!(uid = %master.uid, "Demoting recurring event without instances");
            master.demote();
            Ok(Planned {
                periods: Vec::new(),
                form,
                demoted: true,
                fast_path: false,
            })
        }
    }
}

fn emit(sink: &dyn ChangeSink, changes: &[InstanceChange]) {
    for change in changes {
        sink.notify(change);
    }
}

/// ## Summary
/// Stores a new master and materializes its instances.
///
/// ## Side Effects
/// - Inserts the master and its instances into `store`
/// - Notifies `sink` once per added instance
///
/// ## Errors
/// - `ServiceError::Conflict` if the UID is taken
/// - `ServiceError::NoInstancesForRecurringEvent` under the reject policy
/// - parse and timezone failures from expansion
#[tracing::instrument(skip_all, fields(uid = %master.uid, overrides = overrides.len()))]
pub fn add_event(
    store: &mut dyn RecurrenceStore,
    sink: &dyn ChangeSink,
    ctx: &RecurrenceContext<'_>,
    mut master: MasterEvent,
    overrides: Vec<Override>,
) -> ServiceResult<SaveOutcome> {
    if store.master_by_uid(&master.uid).is_some() {
        return Err(ServiceError::Conflict(format!(
            "event {} already exists",
            master.uid
        )));
    }

    let planned = plan_full(ctx, &mut master)?;
    let master_id = store.insert_master(master)?;

    let reconciliation = reconcile(master_id, &planned.periods, planned.form, &[], overrides);
    if let Err(err) = store.apply_reconciliation(&reconciliation) {
        store.delete_master(master_id)?;
        return Err(err);
    }

    emit(sink, &reconciliation.changes());
    tracing::info!(%master_id, added = reconciliation.to_add.len(), "Event added");
    Ok(SaveOutcome::new(&reconciliation, planned.demoted, false))
}

/// ## Summary
/// Replaces a stored master and reconciles its instances.
///
/// The sequence number is bumped. Edits that only add RDATEs or EXDATEs
/// derive the new occurrence set from the stored instances; anything else
/// expands again.
///
/// ## Side Effects
/// - Updates the master and applies instance deltas in `store`
/// - Notifies `sink` once per added, updated and removed instance
///
/// ## Errors
/// - `ServiceError::NotFound` for an unknown master
/// - `ServiceError::Conflict` if the UID differs from the stored one
/// - `ServiceError::NoInstancesForRecurringEvent` under the reject policy,
///   leaving the store untouched
#[tracing::instrument(skip_all, fields(%master_id, overrides = overrides.len()))]
pub fn update_event(
    store: &mut dyn RecurrenceStore,
    sink: &dyn ChangeSink,
    ctx: &RecurrenceContext<'_>,
    master_id: MasterId,
    mut master: MasterEvent,
    overrides: Vec<Override>,
) -> ServiceResult<SaveOutcome> {
    let old = store
        .master(master_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("master {master_id}")))?;
    if old.uid != master.uid {
        return Err(ServiceError::Conflict(format!(
            "event {} cannot change its UID to {}",
            old.uid, master.uid
        )));
    }
    master.sequence = old.sequence.saturating_add(1);

    let existing = store.instances(master_id);
    let scope = ChangeScope::classify(&old, &master);
    tracing::debug!(?scope, "Classified edit");

    let planned = match scope {
        ChangeScope::Unchanged => Planned {
            periods: existing.iter().map(RecurrenceInstance::period).collect(),
            form: ctx.basis(&master)?.recurrence_id_form(),
            demoted: false,
            fast_path: true,
        },
        ChangeScope::DatesOnly { added_rdates, .. } => {
            let basis = ctx.basis(&master)?;
            let form = basis.recurrence_id_form();
            match incremental_periods(
                &master,
                &basis,
                ctx.limits,
                &ctx.save_window(),
                &existing,
                &added_rdates,
            ) {
                Ok(Some(periods)) => Planned {
                    periods,
                    form,
                    demoted: false,
                    fast_path: true,
                },
                Ok(None) => plan_full(ctx, &mut master)?,
                Err(err @ ServiceError::NoInstancesForRecurringEvent { .. }) => {
                    demote_or_reject(ctx, &mut master, form, err)?
                }
                Err(err) => return Err(err),
            }
        }
        ChangeScope::Full => plan_full(ctx, &mut master)?,
    };
    tracing::debug!(fast_path = planned.fast_path, "Chose reconciliation path");

    let reconciliation = reconcile(master_id, &planned.periods, planned.form, &existing, overrides);
    store.apply_reconciliation(&reconciliation)?;
    store.update_master(master_id, master)?;

    emit(sink, &reconciliation.changes());
    tracing::info!(
        added = reconciliation.to_add.len(),
        updated = reconciliation.to_update.len(),
        removed = reconciliation.to_remove.len(),
        "Event updated"
    );
    Ok(SaveOutcome::new(
        &reconciliation,
        planned.demoted,
        planned.fast_path,
    ))
}

/// ## Summary
/// Deletes a master with all of its instances and overrides.
///
/// ## Side Effects
/// Notifies `sink` once per removed instance.
///
/// ## Errors
/// `ServiceError::NotFound` for an unknown master.
#[tracing::instrument(skip(store, sink))]
pub fn remove_event(
    store: &mut dyn RecurrenceStore,
    sink: &dyn ChangeSink,
    master_id: MasterId,
) -> ServiceResult<MasterEvent> {
    let instances = store.instances(master_id);
    let master = store.delete_master(master_id)?;

    for instance in instances {
        sink.notify(&InstanceChange {
            kind: ChangeKind::Removed,
            master_id,
            recurrence_id: instance.recurrence_id,
        });
    }
    tracing::info!(uid = %master.uid, "Event removed");
    Ok(master)
}

/// ## Summary
/// Effective occurrences of a master within `window`, stored overrides applied.
///
/// Occurrences are computed afresh, so the result does not depend on how many
/// instances are materialized.
///
/// ## Errors
/// `ServiceError::NotFound` for an unknown master, plus expansion failures.
#[tracing::instrument(skip(store, ctx))]
pub fn get_recurrences(
    store: &dyn RecurrenceStore,
    ctx: &RecurrenceContext<'_>,
    master_id: MasterId,
    window: &ExpansionWindow,
) -> ServiceResult<Vec<EffectiveOccurrence>> {
    let master = store
        .master(master_id)
        .ok_or_else(|| ServiceError::NotFound(format!("master {master_id}")))?;
    let basis = ctx.basis(master)?;
    let expansion = expand(master, &basis, ctx.limits, window)?;

    Ok(expansion
        .keyed()
        .map(|(recurrence_id, period)| {
            let stored = store
                .instance(master_id, &recurrence_id)
                .and_then(|instance| instance.overrides.as_ref());
            resolve(master_id, master, &recurrence_id, period, stored)
        })
        .collect())
}

/// ## Summary
/// One effective occurrence by recurrence-id.
///
/// A non-recurring master answers for its own start.
///
/// ## Errors
/// `ServiceError::NotFound` if no such master or occurrence exists.
#[tracing::instrument(skip(store, ctx))]
pub fn get_occurrence(
    store: &dyn RecurrenceStore,
    ctx: &RecurrenceContext<'_>,
    master_id: MasterId,
    recurrence_id: &RecurrenceId,
) -> ServiceResult<EffectiveOccurrence> {
    let master = store
        .master(master_id)
        .ok_or_else(|| ServiceError::NotFound(format!("master {master_id}")))?;

    if let Some(instance) = store.instance(master_id, recurrence_id) {
        return Ok(resolve_instance(master, instance));
    }

    if !master.is_recurring() {
        let basis = ctx.basis(master)?;
        let start = basis.instant(&master.start)?;
        if basis.recurrence_id_form().key(start) == *recurrence_id {
            let period = OccurrencePeriod::new(start, start + basis.duration(master, start)?);
            return Ok(resolve(master_id, master, recurrence_id, period, None));
        }
    }

    Err(ServiceError::NotFound(format!(
        "occurrence {recurrence_id} of master {master_id}"
    )))
}
