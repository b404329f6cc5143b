//! Persistence seam for masters and their materialized instances.
//!
//! Masters live in an arena keyed by [`MasterId`]; instances are keyed by
//! `(MasterId, RecurrenceId)` and never hold a reference to their master.

use std::collections::{BTreeMap, HashMap};

use calyx_rfc::rfc::ical::core::RecurrenceId;

use super::model::{MasterEvent, MasterId, RecurrenceInstance};
use super::recurrence::Reconciliation;
use crate::error::{ServiceError, ServiceResult};

/// Storage operations the recurrence workflows need.
pub trait RecurrenceStore {
    /// ## Errors
    /// `ServiceError::Conflict` if a master with the same UID exists.
    fn insert_master(&mut self, master: MasterEvent) -> ServiceResult<MasterId>;

    /// ## Errors
    /// `ServiceError::NotFound` for an unknown id, `Conflict` if the UID changes.
    fn update_master(&mut self, id: MasterId, master: MasterEvent) -> ServiceResult<()>;

    /// Removes the master together with all of its instances.
    ///
    /// ## Errors
    /// `ServiceError::NotFound` for an unknown id.
    fn delete_master(&mut self, id: MasterId) -> ServiceResult<MasterEvent>;

    fn master(&self, id: MasterId) -> Option<&MasterEvent>;

    fn master_by_uid(&self, uid: &str) -> Option<MasterId>;

    /// ## Errors
    /// `NotFound` for an unknown master, `Conflict` for a taken recurrence-id.
    fn insert_instance(&mut self, instance: RecurrenceInstance) -> ServiceResult<()>;

    /// ## Errors
    /// `NotFound` unless the instance exists.
    fn update_instance(&mut self, instance: RecurrenceInstance) -> ServiceResult<()>;

    /// ## Errors
    /// `NotFound` unless the instance exists.
    fn remove_instance(
        &mut self,
        id: MasterId,
        recurrence_id: &RecurrenceId,
    ) -> ServiceResult<RecurrenceInstance>;

    fn instance(&self, id: MasterId, recurrence_id: &RecurrenceId) -> Option<&RecurrenceInstance>;

    /// Instances of one master ordered by recurrence-id.
    fn instances(&self, id: MasterId) -> Vec<RecurrenceInstance>;

    /// ## Summary
    /// Applies a reconciliation as one unit.
    ///
    /// ## Errors
    /// Fails without changing anything if any delta does not fit the stored
    /// state.
    fn apply_reconciliation(&mut self, reconciliation: &Reconciliation) -> ServiceResult<()>;
}

/// In-memory arena store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    masters: HashMap<MasterId, MasterEvent>,
    uids: HashMap<String, MasterId>,
    instances: HashMap<MasterId, BTreeMap<RecurrenceId, RecurrenceInstance>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(id: MasterId) -> ServiceError {
        ServiceError::NotFound(format!("master {id}"))
    }

    fn missing_instance(id: MasterId, recurrence_id: &RecurrenceId) -> ServiceError {
        ServiceError::NotFound(format!("instance {recurrence_id} of master {id}"))
    }

    fn check(&self, reconciliation: &Reconciliation) -> ServiceResult<()> {
        let id = reconciliation.master_id;
        if !self.masters.contains_key(&id) {
            return Err(Self::not_found(id));
        }
        let stored = self.instances.get(&id);
        let exists = |recurrence_id: &RecurrenceId| {
            stored.is_some_and(|instances| instances.contains_key(recurrence_id))
        };

        for instance in &reconciliation.to_add {
            if instance.master_id != id {
                return Err(ServiceError::InvariantViolation(
                    "reconciliation delta for another master",
                ));
            }
            if exists(&instance.recurrence_id) {
                return Err(ServiceError::Conflict(format!(
                    "instance {} of master {id} already exists",
                    instance.recurrence_id
                )));
            }
        }
        for instance in reconciliation
            .to_update
            .iter()
            .chain(&reconciliation.to_remove)
        {
            if instance.master_id != id {
                return Err(ServiceError::InvariantViolation(
                    "reconciliation delta for another master",
                ));
            }
            if !exists(&instance.recurrence_id) {
                return Err(Self::missing_instance(id, &instance.recurrence_id));
            }
        }
        Ok(())
    }
}

impl RecurrenceStore for MemoryStore {
    fn insert_master(&mut self, master: MasterEvent) -> ServiceResult<MasterId> {
        if self.uids.contains_key(&master.uid) {
            return Err(ServiceError::Conflict(format!(
                "event {} already exists",
                master.uid
            )));
        }
        let id = MasterId::new();
        self.uids.insert(master.uid.clone(), id);
        self.masters.insert(id, master);
        self.instances.insert(id, BTreeMap::new());
        tracing::trace!(%id, "Inserted master");
        Ok(id)
    }

    fn update_master(&mut self, id: MasterId, master: MasterEvent) -> ServiceResult<()> {
        let slot = self.masters.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        if slot.uid != master.uid {
            return Err(ServiceError::Conflict(format!(
                "event {} cannot change its UID to {}",
                slot.uid, master.uid
            )));
        }
        *slot = master;
        Ok(())
    }

    fn delete_master(&mut self, id: MasterId) -> ServiceResult<MasterEvent> {
        let master = self.masters.remove(&id).ok_or_else(|| Self::not_found(id))?;
        self.uids.remove(&master.uid);
        let removed = self.instances.remove(&id).map_or(0, |instances| instances.len());
        tracing::trace!(%id, removed, "Deleted master");
        Ok(master)
    }

    fn master(&self, id: MasterId) -> Option<&MasterEvent> {
        self.masters.get(&id)
    }

    fn master_by_uid(&self, uid: &str) -> Option<MasterId> {
        self.uids.get(uid).copied()
    }

    fn insert_instance(&mut self, instance: RecurrenceInstance) -> ServiceResult<()> {
        let id = instance.master_id;
        let instances = self
            .instances
            .get_mut(&id)
            .ok_or_else(|| Self::not_found(id))?;
        if instances.contains_key(&instance.recurrence_id) {
            return Err(ServiceError::Conflict(format!(
                "instance {} of master {id} already exists",
                instance.recurrence_id
            )));
        }
        instances.insert(instance.recurrence_id.clone(), instance);
        Ok(())
    }

    fn update_instance(&mut self, instance: RecurrenceInstance) -> ServiceResult<()> {
        let id = instance.master_id;
        let slot = self
            .instances
            .get_mut(&id)
            .and_then(|instances| instances.get_mut(&instance.recurrence_id))
            .ok_or_else(|| Self::missing_instance(id, &instance.recurrence_id))?;
        *slot = instance;
        Ok(())
    }

    fn remove_instance(
        &mut self,
        id: MasterId,
        recurrence_id: &RecurrenceId,
    ) -> ServiceResult<RecurrenceInstance> {
        self.instances
            .get_mut(&id)
            .and_then(|instances| instances.remove(recurrence_id))
            .ok_or_else(|| Self::missing_instance(id, recurrence_id))
    }

    fn instance(&self, id: MasterId, recurrence_id: &RecurrenceId) -> Option<&RecurrenceInstance> {
        self.instances
            .get(&id)
            .and_then(|instances| instances.get(recurrence_id))
    }

    fn instances(&self, id: MasterId) -> Vec<RecurrenceInstance> {
        self.instances
            .get(&id)
            .map(|instances| instances.values().cloned().collect())
            .unwrap_or_default()
    }

    fn apply_reconciliation(&mut self, reconciliation: &Reconciliation) -> ServiceResult<()> {
        self.check(reconciliation)?;

        let id = reconciliation.master_id;
        let instances = self.instances.entry(id).or_default();
        for instance in &reconciliation.to_remove {
            instances.remove(&instance.recurrence_id);
        }
        for instance in reconciliation
            .to_update
            .iter()
            .chain(&reconciliation.to_add)
        {
            instances.insert(instance.recurrence_id.clone(), instance.clone());
        }

        tracing::debug!(
            %id,
            added = reconciliation.to_add.len(),
            updated = reconciliation.to_update.len(),
            removed = reconciliation.to_remove.len(),
            "Applied reconciliation"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caldav::model::OccurrencePeriod;
    use crate::caldav::recurrence::{RecurrenceIdForm, reconcile};
    use chrono::{DateTime, TimeDelta, Utc};

    fn instant(text: &str) -> DateTime<Utc> {
        text.parse::<calyx_rfc::rfc::ical::core::EventTime>()
            .expect("valid value")
            .naive()
            .and_utc()
    }

    fn period(text: &str) -> OccurrencePeriod {
        let start = instant(text);
        OccurrencePeriod::new(start, start + TimeDelta::hours(1))
    }

    fn master() -> MasterEvent {
        MasterEvent::new("meeting", "20240101T090000Z".parse().expect("valid value"))
    }

    #[test_log::test]
    fn uid_is_unique() {
        let mut store = MemoryStore::new();
        store.insert_master(master()).expect("first insert");
        let err = store.insert_master(master()).expect_err("duplicate uid");
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test_log::test]
    fn reconciliation_is_applied_atomically() {
        let mut store = MemoryStore::new();
        let id = store.insert_master(master()).expect("insert");

        let first = reconcile(
            id,
            &[period("20240101T090000Z"), period("20240108T090000Z")],
            RecurrenceIdForm::Utc,
            &[],
            Vec::new(),
        );
        store.apply_reconciliation(&first).expect("apply");
        assert_eq!(store.instances(id).len(), 2);

        // replaying the same additions must fail without touching anything
        let err = store.apply_reconciliation(&first).expect_err("already added");
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(store.instances(id).len(), 2);

        let second = reconcile(
            id,
            &[period("20240108T090000Z")],
            RecurrenceIdForm::Utc,
            &store.instances(id),
            Vec::new(),
        );
        store.apply_reconciliation(&second).expect("apply");
        let remaining: Vec<String> = store
            .instances(id)
            .into_iter()
            .map(|instance| instance.recurrence_id.to_string())
            .collect();
        assert_eq!(remaining, vec!["20240108T090000Z".to_owned()]);
    }

    #[test_log::test]
    fn deleting_master_drops_instances() {
        let mut store = MemoryStore::new();
        let id = store.insert_master(master()).expect("insert");
        store
            .insert_instance(RecurrenceInstance {
                master_id: id,
                recurrence_id: "20240101T090000Z".parse().expect("valid rid"),
                start: instant("20240101T090000Z"),
                end: instant("20240101T100000Z"),
                overrides: None,
            })
            .expect("insert instance");

        store.delete_master(id).expect("delete");
        assert!(store.instances(id).is_empty());
        assert_eq!(store.master_by_uid("meeting"), None);
        assert!(store.insert_master(master()).is_ok());
    }
}
