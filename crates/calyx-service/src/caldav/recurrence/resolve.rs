//! Effective view of one occurrence: master values with the override applied.

use calyx_rfc::rfc::ical::core::RecurrenceId;

use crate::caldav::model::{
    EffectiveOccurrence, MasterEvent, MasterId, OccurrencePeriod, Override, OverrideField,
    RecurrenceInstance,
};

/// ## Summary
/// Merges `overrides` over `master` for the occurrence at `period`.
///
/// Each overridable field resolves independently: absent inherits, cleared
/// yields nothing, a value replaces. A moved start or end in the override wins
/// over the computed period.
#[must_use]
pub fn resolve(
    master_id: MasterId,
    master: &MasterEvent,
    recurrence_id: &RecurrenceId,
    period: OccurrencePeriod,
    overrides: Option<&Override>,
) -> EffectiveOccurrence {
    let absent = Override::new(recurrence_id.clone());
    let item = overrides.unwrap_or(&absent);

    let start = item.start.unwrap_or(period.start);
    let end = item.end.unwrap_or(period.end).max(start);

    EffectiveOccurrence {
        master_id,
        uid: master.uid.clone(),
        recurrence_id: recurrence_id.clone(),
        start,
        end,
        sequence: master.sequence,
        summary: text(&item.summary, master.summary.as_ref()),
        description: text(&item.description, master.description.as_ref()),
        location: text(&item.location, master.location.as_ref()),
        status: item.status.apply(master.status.as_ref()).copied(),
        categories: item.categories.apply_list(&master.categories),
        attendees: item.attendees.apply_list(&master.attendees),
        comments: item.comments.apply_list(&master.comments),
        overridden: overrides.is_some(),
    }
}

/// [`resolve`] for a stored instance, using its own period and override.
#[must_use]
pub fn resolve_instance(master: &MasterEvent, instance: &RecurrenceInstance) -> EffectiveOccurrence {
    resolve(
        instance.master_id,
        master,
        &instance.recurrence_id,
        instance.period(),
        instance.overrides.as_ref(),
    )
}

fn text(field: &OverrideField<String>, inherited: Option<&String>) -> Option<String> {
    field.apply(inherited).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caldav::model::{Attendee, EventStatus};
    use calyx_rfc::rfc::ical::core::EventTime;
    use chrono::{DateTime, TimeDelta, Utc};

    fn instant(text: &str) -> DateTime<Utc> {
        text.parse::<EventTime>().expect("valid value").naive().and_utc()
    }

    fn master() -> MasterEvent {
        let mut master = MasterEvent::new("standup", "20240101T090000Z".parse().expect("valid"))
            .with_summary("Standup");
        master.location = Some("Room 1".to_owned());
        master.status = Some(EventStatus::Confirmed);
        master.categories = vec!["work".to_owned()];
        master.attendees = vec![Attendee::new("mailto:alice@example.com")];
        master.sequence = 3;
        master
    }

    fn slot() -> (RecurrenceId, OccurrencePeriod) {
        let start = instant("20240108T090000Z");
        (
            "20240108T090000Z".parse().expect("valid rid"),
            OccurrencePeriod::new(start, start + TimeDelta::minutes(15)),
        )
    }

    #[test_log::test]
    fn no_override_inherits_everything() {
        let (rid, period) = slot();
        let view = resolve(MasterId::new(), &master(), &rid, period, None);

        assert_eq!(view.summary.as_deref(), Some("Standup"));
        assert_eq!(view.location.as_deref(), Some("Room 1"));
        assert_eq!(view.status, Some(EventStatus::Confirmed));
        assert_eq!(view.start, period.start);
        assert_eq!(view.sequence, 3);
        assert!(!view.overridden);
    }

    #[test_log::test]
    fn absent_cleared_and_value_are_distinct() {
        let (rid, period) = slot();
        let mut item = Override::new(rid.clone()).with_summary("Retro");
        item.location = OverrideField::Cleared;
        item.categories = OverrideField::list(Vec::new());

        let view = resolve(MasterId::new(), &master(), &rid, period, Some(&item));

        assert_eq!(view.summary.as_deref(), Some("Retro"));
        assert_eq!(view.location, None);
        assert!(view.categories.is_empty());
        assert_eq!(view.attendees.len(), 1);
        assert_eq!(view.status, Some(EventStatus::Confirmed));
        assert!(view.overridden);
    }

    #[test_log::test]
    fn override_timing_wins() {
        let (rid, period) = slot();
        let moved_start = instant("20240108T140000Z");
        let moved_end = instant("20240108T150000Z");
        let item = Override::new(rid.clone()).with_timing(moved_start, moved_end);

        let view = resolve(MasterId::new(), &master(), &rid, period, Some(&item));
        assert_eq!((view.start, view.end), (moved_start, moved_end));
        assert_eq!(view.recurrence_id, rid);
    }
}
