//! Recurrence expansion and instance reconciliation for calendar events.

pub mod caldav;
pub mod error;
