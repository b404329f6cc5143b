//! Conversion of wall-clock values to instants.

pub mod timezone;

pub use timezone::{
    ConversionError, ResolveTimeZone, TimeZoneResolver, convert_to_utc, localize, localize_lenient,
    normalize_tzid,
};
