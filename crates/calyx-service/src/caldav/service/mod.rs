//! Add / update / remove / read workflows over a [`RecurrenceStore`](super::store::RecurrenceStore).

pub mod events;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use calyx_core::config::{ExpansionLimits, RecurrenceConfig, ZeroInstancePolicy};
use calyx_rfc::rfc::ical::expand::ResolveTimeZone;

use super::model::MasterEvent;
use super::recurrence::{ExpansionWindow, TimeBasis};
use crate::error::{ServiceError, ServiceResult};

pub use events::{
    SaveOutcome, add_event, get_occurrence, get_recurrences, remove_event, update_event,
};

/// Everything one workflow call needs besides the store.
#[derive(Clone, Copy)]
pub struct RecurrenceContext<'r> {
    pub limits: ExpansionLimits,
    pub zero_instance_policy: ZeroInstancePolicy,
    /// Zone bridging floating and absolute values.
    pub floating_zone: Tz,
    pub resolver: &'r dyn ResolveTimeZone,
    /// Horizon of a containing entity, if any.
    pub parent_end: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for RecurrenceContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurrenceContext")
            .field("limits", &self.limits)
            .field("zero_instance_policy", &self.zero_instance_policy)
            .field("floating_zone", &self.floating_zone)
            .field("parent_end", &self.parent_end)
            .finish_non_exhaustive()
    }
}

impl<'r> RecurrenceContext<'r> {
    /// ## Summary
    /// Builds the context for `principal` from configuration.
    ///
    /// ## Errors
    /// Returns `ServiceError::TimezoneResolutionFailure` if the configured
    /// floating zone is unknown.
    pub fn from_config(
        config: &RecurrenceConfig,
        principal: Option<&str>,
        resolver: &'r dyn ResolveTimeZone,
    ) -> ServiceResult<Self> {
        let floating_zone = resolver
            .resolve(&config.floating_timezone)
            .map_err(|e| ServiceError::timezone(&config.floating_timezone, e))?;

        Ok(Self {
            limits: config.limits_for(principal),
            zero_instance_policy: config.zero_instance_policy,
            floating_zone,
            resolver,
            parent_end: None,
        })
    }

    /// Default limits, rejecting empty recurrences, floating values in UTC.
    #[must_use]
    pub fn with_resolver(resolver: &'r dyn ResolveTimeZone) -> Self {
        Self {
            limits: ExpansionLimits::default(),
            zero_instance_policy: ZeroInstancePolicy::Reject,
            floating_zone: Tz::UTC,
            resolver,
            parent_end: None,
        }
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: ExpansionLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: ZeroInstancePolicy) -> Self {
        self.zero_instance_policy = policy;
        self
    }

    /// ## Errors
    /// Fails if the master's DTSTART names an unknown zone.
    pub fn basis(&self, master: &MasterEvent) -> ServiceResult<TimeBasis<'r>> {
        TimeBasis::for_start(&master.start, self.floating_zone, self.resolver)
    }

    /// The computed, non-explicit window used when saving.
    #[must_use]
    pub const fn save_window(&self) -> ExpansionWindow {
        ExpansionWindow {
            start: None,
            end: None,
            parent_end: self.parent_end,
        }
    }
}
