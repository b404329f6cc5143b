//! Text parsers for the iCalendar values used by recurrence.

mod values;

pub use values::{
    parse_date, parse_datetime, parse_duration, parse_event_time, parse_rdate, parse_rrule,
};
