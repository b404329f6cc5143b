//! iCalendar (RFC 5545) values that feed recurrence computation.

pub mod core;
pub mod expand;
pub mod parse;
