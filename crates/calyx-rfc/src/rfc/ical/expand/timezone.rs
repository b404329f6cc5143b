//! Timezone resolution and UTC conversion for iCalendar date-times.
//!
//! Uses ICU4X for Windows timezone ID to IANA mapping and timezone canonicalization.

use chrono::{DateTime, LocalResult, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use icu::time::zone::WindowsParser;
use icu::time::zone::iana::IanaParserExtended;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

/// Error during timezone conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// Unknown or invalid timezone identifier.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Ambiguous time during DST fold.
    #[error("Ambiguous time (DST fold): {0}")]
    AmbiguousTime(String),

    /// Non-existent time during DST gap.
    #[error("Non-existent time (DST gap): {0}")]
    NonExistentTime(String),

    /// Invalid datetime format.
    #[error("Invalid datetime: {0}")]
    InvalidDateTime(String),
}

/// Maps a TZID to a timezone definition.
///
/// The engine only sees zones through this trait, so callers can plug in
/// zones that the IANA database does not know.
pub trait ResolveTimeZone {
    /// ## Errors
    /// Returns `ConversionError::UnknownTimezone` if the TZID cannot be resolved.
    fn resolve(&self, tzid: &str) -> Result<Tz, ConversionError>;
}

/// Resolver for timezone identifiers backed by the IANA database.
///
/// Maintains a cache of resolved timezones. Safe to share between threads.
#[derive(Debug, Default)]
pub struct TimeZoneResolver {
    /// Cache of resolved IANA timezones by TZID.
    cache: RwLock<HashMap<String, Tz>>,
}

impl TimeZoneResolver {
    /// Creates a new timezone resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, tzid: &str) -> Option<Tz> {
        self.cache.read().ok()?.get(tzid).copied()
    }
}

impl ResolveTimeZone for TimeZoneResolver {
    /// ## Summary
    /// Resolves a timezone identifier to a `chrono_tz::Tz`.
    ///
    /// Windows names and vendor-prefixed TZIDs are mapped to their IANA equivalents.
    ///
    /// ## Errors
    ///
    /// Returns `ConversionError::UnknownTimezone` if the TZID cannot be resolved.
    ///
    /// ## Side Effects
    ///
    /// Caches successful resolutions to avoid repeated parsing.
    fn resolve(&self, tzid: &str) -> Result<Tz, ConversionError> {
        if let Some(tz) = self.cached(tzid) {
            return Ok(tz);
        }

        let normalized = normalize_tzid(tzid);
        let tz = Tz::from_str(&normalized)
            .map_err(|_e| ConversionError::UnknownTimezone(tzid.to_string()))?;

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(tzid.to_string(), tz);
        }
        tracing::trace!(tzid, resolved = %tz, "Resolved timezone");

        Ok(tz)
    }
}

/// Normalizes common CalDAV/iCalendar timezone identifiers to IANA names.
///
/// Uses ICU4X for Windows timezone ID mapping and IANA canonicalization.
#[must_use]
pub fn normalize_tzid(tzid: &str) -> String {
    let trimmed = tzid.trim();
    let stripped = trimmed
        .strip_prefix("/mozilla.org/")
        .or_else(|| trimmed.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(trimmed);

    let iana_parser = IanaParserExtended::new();

    if let Some(tz) = WindowsParser::new().parse(stripped, None) {
        for entry in iana_parser.iter() {
            if entry.time_zone == tz {
                return entry.canonical.to_string();
            }
        }
    }

    // Handles aliases like Europe/Kiev -> Europe/Kyiv
    let parsed = iana_parser.parse(stripped);
    if parsed.time_zone != icu::time::TimeZone::UNKNOWN {
        return parsed.canonical.to_string();
    }

    stripped.to_string()
}

/// ## Summary
/// Places a wall-clock time in a resolved zone.
///
/// A wall-clock time inside a DST fold resolves to its earlier instant.
///
/// ## Errors
///
/// Returns `ConversionError::NonExistentTime` for a time inside a DST gap.
pub fn localize(local_time: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, ConversionError> {
    match tz.from_local_datetime(&local_time) {
        LocalResult::None => Err(ConversionError::NonExistentTime(format!(
            "{local_time} in timezone {tz}"
        ))),
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, _later) => Ok(earlier.with_timezone(&Utc)),
    }
}

/// ## Summary
/// Places a wall-clock time in a resolved zone, accepting times inside a DST gap.
///
/// A gap time is read with the offset in force before the transition, so
/// `02:30` in a one-hour spring-forward gap lands on `03:30` of the new offset.
/// Folds resolve to the earlier instant as in [`localize`].
///
/// ## Errors
///
/// Returns `ConversionError::NonExistentTime` only when no offset precedes the gap.
pub fn localize_lenient(
    local_time: NaiveDateTime,
    tz: Tz,
) -> Result<DateTime<Utc>, ConversionError> {
    match localize(local_time, tz) {
        Err(ConversionError::NonExistentTime(reason)) => {
            let offset = local_time
                .checked_sub_signed(TimeDelta::days(1))
                .and_then(|before| tz.offset_from_local_datetime(&before).earliest())
                .map(|offset| offset.fix())
                .ok_or(ConversionError::NonExistentTime(reason))?;
            let shifted = local_time - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
            tracing::trace!(%local_time, %tz, %shifted, "Moved wall-clock time out of DST gap");
            Ok(shifted.and_utc())
        }
        other => other,
    }
}

/// ## Summary
/// Converts a local datetime to UTC using the specified timezone.
///
/// ## Errors
///
/// Returns an error if:
/// - The timezone cannot be resolved
/// - The datetime is non-existent (DST gap)
///
/// ## Side Effects
///
/// May populate the resolver's cache.
pub fn convert_to_utc(
    local_time: NaiveDateTime,
    tzid: &str,
    resolver: &impl ResolveTimeZone,
) -> Result<DateTime<Utc>, ConversionError> {
    let tz = resolver.resolve(tzid)?;
    localize(local_time, tz)
}
