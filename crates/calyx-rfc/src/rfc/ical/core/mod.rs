//! iCalendar value models (RFC 5545).
//!
//! These are plain values: they carry no timezone database and perform no
//! conversion. Conversion to instants happens in the service layer.

mod datetime;
mod duration;
mod recurrence_id;
mod rrule;
mod value;

pub use datetime::EventTime;
pub use duration::EventDuration;
pub use recurrence_id::RecurrenceId;
pub use rrule::{Frequency, RecurrenceRule, RuleEnd, Weekday, WeekdayNum};
pub use value::{PeriodEnd, RDate};
