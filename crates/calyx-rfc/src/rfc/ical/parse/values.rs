//! Value type parsers for iCalendar (RFC 5545 §3.3).
#![expect(
    clippy::map_err_ignore,
    reason = "Value parsers report the offending text rather than the numeric parse error"
)]

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{RfcError, RfcResult};
use crate::rfc::ical::core::{
    EventDuration, EventTime, Frequency, PeriodEnd, RDate, RecurrenceRule, RuleEnd, Weekday,
    WeekdayNum,
};

/// Parses a DATE value (RFC 5545 §3.3.4).
///
/// Format: YYYYMMDD (e.g., "19970714")
///
/// ## Errors
/// Returns an error if the string is not a valid 8-digit calendar date.
pub fn parse_date(s: &str) -> RfcResult<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RfcError::invalid("DATE", s));
    }

    let year = s[0..4]
        .parse::<i32>()
        .map_err(|_| RfcError::invalid("DATE", s))?;
    let month = s[4..6]
        .parse::<u32>()
        .map_err(|_| RfcError::invalid("DATE", s))?;
    let day = s[6..8]
        .parse::<u32>()
        .map_err(|_| RfcError::invalid("DATE", s))?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| RfcError::invalid("DATE", s))
}

/// Parses a DATE-TIME value without its `Z` suffix (RFC 5545 §3.3.5).
///
/// Format: YYYYMMDD"T"HHMMSS
///
/// ## Errors
/// Returns an error if either half is malformed or out of range.
pub fn parse_datetime(s: &str) -> RfcResult<NaiveDateTime> {
    let (date_part, time_part) = s
        .split_once(['T', 't'])
        .ok_or_else(|| RfcError::invalid("DATE-TIME", s))?;

    let date = parse_date(date_part).map_err(|_| RfcError::invalid("DATE-TIME", s))?;

    if time_part.len() != 6 || !time_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RfcError::invalid("DATE-TIME", s));
    }
    let hour = time_part[0..2]
        .parse::<u32>()
        .map_err(|_| RfcError::invalid("DATE-TIME", s))?;
    let minute = time_part[2..4]
        .parse::<u32>()
        .map_err(|_| RfcError::invalid("DATE-TIME", s))?;
    // Leap second 60 is clamped to 59
    let second = time_part[4..6]
        .parse::<u32>()
        .map_err(|_| RfcError::invalid("DATE-TIME", s))?
        .min(59);

    date.and_hms_opt(hour, minute, second)
        .ok_or_else(|| RfcError::invalid("DATE-TIME", s))
}

/// ## Summary
/// Parses a DATE or DATE-TIME value with the property's TZID parameter.
///
/// A TZID is meaningless on DATE and UTC values and is dropped there.
///
/// ## Errors
/// Returns an error if the value is neither DATE nor DATE-TIME.
pub fn parse_event_time(s: &str, tzid: Option<&str>) -> RfcResult<EventTime> {
    let s = s.trim();
    if !s.contains(['T', 't']) {
        return parse_date(s).map(EventTime::Date);
    }

    if let Some(stripped) = s.strip_suffix(['Z', 'z']) {
        return parse_datetime(stripped).map(|local| EventTime::Utc(local.and_utc()));
    }

    let local = parse_datetime(s)?;
    Ok(match tzid.map(str::trim).filter(|t| !t.is_empty()) {
        Some(tzid) => EventTime::zoned(local, tzid),
        None => EventTime::Floating(local),
    })
}

/// Parses a DURATION value (RFC 5545 §3.3.6).
///
/// Format: [+|-]P[nW] or [+|-]P[nD][T[nH][nM][nS]]
///
/// ## Errors
/// Returns an error if the string is not a valid duration format.
pub fn parse_duration(s: &str) -> RfcResult<EventDuration> {
    let text = s.trim();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let rest = rest
        .strip_prefix(['P', 'p'])
        .ok_or_else(|| RfcError::invalid("DURATION", s))?;
    if rest.is_empty() {
        return Err(RfcError::invalid("DURATION", s));
    }

    let mut duration = EventDuration {
        negative,
        ..EventDuration::zero()
    };
    let mut in_time = false;
    let mut digits = String::new();
    let mut saw_component = false;

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            '0'..='9' => digits.push(c),
            'T' if !in_time && digits.is_empty() => in_time = true,
            unit @ ('W' | 'D' | 'H' | 'M' | 'S') => {
                let value = digits
                    .parse::<u32>()
                    .map_err(|_| RfcError::invalid("DURATION", s))?;
                digits.clear();
                apply_duration_component(&mut duration, unit, in_time, value)
                    .ok_or_else(|| RfcError::invalid("DURATION", s))?;
                saw_component = true;
            }
            _ => return Err(RfcError::invalid("DURATION", s)),
        }
    }

    if !digits.is_empty() || !saw_component {
        return Err(RfcError::invalid("DURATION", s));
    }

    Ok(duration)
}

/// Applies a parsed component value to the duration.
fn apply_duration_component(
    duration: &mut EventDuration,
    unit: char,
    in_time: bool,
    value: u32,
) -> Option<()> {
    match (unit, in_time) {
        ('W', false) => duration.weeks = value,
        ('D', false) => duration.days = value,
        ('H', true) => duration.hours = value,
        ('M', true) => duration.minutes = value,
        ('S', true) => duration.seconds = value,
        _ => return None,
    }
    Some(())
}

/// ## Summary
/// Parses one RDATE value: DATE, DATE-TIME, or PERIOD (RFC 5545 §3.3.9).
///
/// PERIOD format: start"/"end or start"/"duration
///
/// ## Errors
/// Returns an error if any part is invalid.
pub fn parse_rdate(s: &str, tzid: Option<&str>) -> RfcResult<RDate> {
    let Some((start, end)) = s.trim().split_once('/') else {
        return parse_event_time(s, tzid).map(RDate::Instant);
    };

    let start = parse_event_time(start, tzid).map_err(|_| RfcError::invalid("PERIOD", s))?;
    if start.is_date_only() {
        return Err(RfcError::invalid("PERIOD", s));
    }

    let end = if end.trim_start_matches(['+', '-']).starts_with(['P', 'p']) {
        PeriodEnd::Duration(parse_duration(end).map_err(|_| RfcError::invalid("PERIOD", s))?)
    } else {
        PeriodEnd::Explicit(
            parse_event_time(end, tzid).map_err(|_| RfcError::invalid("PERIOD", s))?,
        )
    };

    Ok(RDate::Period { start, end })
}

/// ## Summary
/// Parses a RECUR (RRULE / EXRULE) value (RFC 5545 §3.3.10).
///
/// An `RRULE:` or `EXRULE:` prefix is accepted. Unknown parts are ignored.
///
/// ## Errors
/// Returns `RfcError::MalformedRule` for a missing FREQ, duplicate parts,
/// UNTIL together with COUNT, a non-positive INTERVAL or COUNT, and any
/// unparseable or out-of-range value.
pub fn parse_rrule(s: &str) -> RfcResult<RecurrenceRule> {
    let text = strip_rule_prefix(s.trim());
    let mut rule = RecurrenceRule::daily();
    let mut freq: Option<Frequency> = None;
    let mut seen = HashSet::new();

    for part in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| RfcError::malformed(s, format!("part {part:?} is not KEY=VALUE")))?;

        let key = key.trim().to_ascii_uppercase();
        if !seen.insert(key.clone()) {
            return Err(RfcError::malformed(s, format!("{key} given more than once")));
        }

        parse_rrule_part(&mut rule, &mut freq, &key, value.trim())
            .map_err(|reason| RfcError::malformed(s, reason))?;
    }

    rule.freq = freq.ok_or_else(|| RfcError::malformed(s, "FREQ is required"))?;
    Ok(rule)
}

fn strip_rule_prefix(s: &str) -> &str {
    for prefix in ["RRULE:", "EXRULE:"] {
        if s.len() >= prefix.len()
            && s.is_char_boundary(prefix.len())
            && s[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return &s[prefix.len()..];
        }
    }
    s
}

/// Parses a single RRULE key-value pair.
fn parse_rrule_part(
    rule: &mut RecurrenceRule,
    freq: &mut Option<Frequency>,
    key: &str,
    value: &str,
) -> Result<(), String> {
    match key {
        "FREQ" => {
            *freq = Some(Frequency::parse(value).ok_or_else(|| format!("unknown FREQ {value:?}"))?);
        }
        "INTERVAL" => {
            let interval: u32 = parse_number(key, value)?;
            if interval == 0 {
                return Err("INTERVAL must be positive".to_string());
            }
            rule.interval = interval;
        }
        "COUNT" => {
            if matches!(rule.end, RuleEnd::Until(_)) {
                return Err("UNTIL and COUNT are mutually exclusive".to_string());
            }
            let count: u32 = parse_number(key, value)?;
            if count == 0 {
                return Err("COUNT must be positive".to_string());
            }
            rule.end = RuleEnd::Count(count);
        }
        "UNTIL" => {
            if matches!(rule.end, RuleEnd::Count(_)) {
                return Err("UNTIL and COUNT are mutually exclusive".to_string());
            }
            let until = parse_event_time(value, None).map_err(|e| e.to_string())?;
            rule.end = RuleEnd::Until(until);
        }
        "WKST" => {
            rule.wkst = Some(Weekday::parse(value).ok_or_else(|| format!("unknown WKST {value:?}"))?);
        }
        "BYSECOND" => rule.by_second = parse_list(key, value, |v: &u8| *v <= 60)?,
        "BYMINUTE" => rule.by_minute = parse_list(key, value, |v: &u8| *v <= 59)?,
        "BYHOUR" => rule.by_hour = parse_list(key, value, |v: &u8| *v <= 23)?,
        "BYDAY" => rule.by_day = parse_byday(value)?,
        "BYMONTHDAY" => rule.by_monthday = parse_list(key, value, |v: &i8| signed_in(*v, 31))?,
        "BYYEARDAY" => {
            rule.by_yearday = parse_list(key, value, |v: &i16| *v != 0 && v.unsigned_abs() <= 366)?;
        }
        "BYWEEKNO" => rule.by_weekno = parse_list(key, value, |v: &i8| signed_in(*v, 53))?,
        "BYMONTH" => rule.by_month = parse_list(key, value, |v: &u8| (1..=12).contains(v))?,
        "BYSETPOS" => {
            rule.by_setpos = parse_list(key, value, |v: &i16| *v != 0 && v.unsigned_abs() <= 366)?;
        }
        other => tracing::trace!(part = other, "Ignoring unknown recurrence rule part"),
    }
    Ok(())
}

fn signed_in(value: i8, max: u8) -> bool {
    value != 0 && value.unsigned_abs() <= max
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{key} value {value:?} is not a number"))
}

/// Parses a comma-separated list, checking each member with `valid`.
fn parse_list<T: FromStr>(key: &str, s: &str, valid: impl Fn(&T) -> bool) -> Result<Vec<T>, String> {
    s.split(',')
        .map(|v| {
            let v = v.trim();
            let parsed: T = parse_number(key, v)?;
            if valid(&parsed) {
                Ok(parsed)
            } else {
                Err(format!("{key} value {v} is out of range"))
            }
        })
        .collect()
}

/// Parses a BYDAY value (weekdays with optional ordinals).
fn parse_byday(s: &str) -> Result<Vec<WeekdayNum>, String> {
    s.split(',').map(|v| parse_weekday_num(v.trim())).collect()
}

/// Parses a single weekday with optional ordinal (e.g., "MO", "1MO", "-1FR").
fn parse_weekday_num(s: &str) -> Result<WeekdayNum, String> {
    if s.len() < 2 || !s.is_ascii() {
        return Err(format!("invalid BYDAY entry {s:?}"));
    }

    let (ordinal_str, weekday_str) = s.split_at(s.len() - 2);
    let weekday = Weekday::parse(weekday_str).ok_or_else(|| format!("invalid BYDAY entry {s:?}"))?;

    if ordinal_str.is_empty() {
        return Ok(WeekdayNum::every(weekday));
    }

    let ordinal: i8 = ordinal_str
        .trim_start_matches('+')
        .parse()
        .map_err(|_| format!("invalid BYDAY ordinal in {s:?}"))?;
    WeekdayNum::nth(ordinal, weekday).ok_or_else(|| format!("BYDAY ordinal out of range in {s:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn parse_date_rejects_impossible_days() {
        assert!(parse_date("20240229").is_ok());
        assert!(parse_date("20230229").is_err());
        assert!(parse_date("2024011").is_err());
        assert!(parse_date("2024-1-01").is_err());
    }

    #[test_log::test]
    fn parse_datetime_validates_time() {
        assert!(parse_datetime("20240101T235959").is_ok());
        assert!(parse_datetime("20240101T240000").is_err());
        assert!(parse_datetime("20240101T0900").is_err());
    }

    #[test_log::test]
    fn event_time_drops_tzid_on_utc() {
        let value = parse_event_time("20240101T090000Z", Some("Europe/Paris")).expect("valid");
        assert!(matches!(value, EventTime::Utc(_)));
    }

    #[test_log::test]
    fn duration_forms() {
        assert_eq!(parse_duration("P1W").expect("valid"), EventDuration::weeks(1));
        assert_eq!(parse_duration("PT1H").expect("valid"), EventDuration::hours(1));
        assert_eq!(parse_duration("+P3D").expect("valid"), EventDuration::days(3));
        assert!(parse_duration("P").is_err());
        assert!(parse_duration("PT").is_err());
        assert!(parse_duration("P1H").is_err());
        assert!(parse_duration("PT5").is_err());
        assert!(parse_duration("1D").is_err());
    }

    #[test_log::test]
    fn rdate_period_with_duration() {
        let rdate = parse_rdate("20240110T120000Z/PT3H", None).expect("valid period");
        match rdate {
            RDate::Period {
                end: PeriodEnd::Duration(duration),
                ..
            } => assert_eq!(duration, EventDuration::hours(3)),
            other => panic!("expected duration period, got {other:?}"),
        }
        assert!(parse_rdate("20240110/PT3H", None).is_err());
    }

    #[test_log::test]
    fn rdate_period_with_explicit_end_keeps_tzid() {
        let rdate = parse_rdate("20240110T120000/20240110T140000", Some("Europe/Berlin"))
            .expect("valid period");
        let RDate::Period {
            start,
            end: PeriodEnd::Explicit(end),
        } = rdate
        else {
            panic!("expected explicit period");
        };
        assert_eq!(start.tzid(), Some("Europe/Berlin"));
        assert_eq!(end.tzid(), Some("Europe/Berlin"));
    }

    #[test_log::test]
    fn parse_rrule_basic() {
        let rule = parse_rrule("FREQ=WEEKLY;COUNT=10;BYDAY=MO,WE,FR").expect("valid rule");
        assert_eq!(rule.freq, Frequency::Weekly);
        assert_eq!(rule.count(), Some(10));
        assert_eq!(rule.by_day.len(), 3);
        assert_eq!(rule.interval, 1);
    }

    #[test_log::test]
    fn parse_rrule_accepts_prefix_and_case() {
        let rule = parse_rrule("RRULE:freq=monthly;byday=-1fr").expect("valid rule");
        assert_eq!(rule.freq, Frequency::Monthly);
        assert_eq!(rule.by_day, vec![WeekdayNum {
            ordinal: Some(-1),
            weekday: Weekday::Friday,
        }]);

        let rule = parse_rrule("EXRULE:FREQ=DAILY").expect("valid rule");
        assert!(rule.is_infinite());
    }

    #[test_log::test]
    fn parse_rrule_ignores_unknown_parts_and_trailing_separator() {
        let rule = parse_rrule("FREQ=DAILY;X-NAME=foo;INTERVAL=2;").expect("valid rule");
        assert_eq!(rule.interval, 2);
    }

    #[test_log::test]
    fn parse_rrule_until_date_only() {
        let rule = parse_rrule("FREQ=DAILY;UNTIL=20240105").expect("valid rule");
        assert_eq!(rule.until(), Some(&EventTime::Date(
            NaiveDate::from_ymd_opt(2024, 1, 5).expect("valid date")
        )));
    }

    #[test_log::test]
    fn parse_rrule_rejects_malformed() {
        for text in [
            "",
            "INTERVAL=2",
            "FREQ=FORTNIGHTLY",
            "FREQ=DAILY;COUNT=3;UNTIL=20240105T000000Z",
            "FREQ=DAILY;UNTIL=20240105T000000Z;COUNT=3",
            "FREQ=DAILY;COUNT=0",
            "FREQ=DAILY;INTERVAL=0",
            "FREQ=DAILY;INTERVAL=-1",
            "FREQ=DAILY;FREQ=WEEKLY",
            "FREQ=DAILY;BYHOUR=24",
            "FREQ=MONTHLY;BYMONTHDAY=0",
            "FREQ=MONTHLY;BYMONTHDAY=32",
            "FREQ=YEARLY;BYMONTH=13",
            "FREQ=MONTHLY;BYDAY=0MO",
            "FREQ=MONTHLY;BYDAY=XX",
            "FREQ=MONTHLY;BYDAY=1ÉÉ",
            "FREQ=DAILY;UNTIL=tomorrow",
            "FREQ",
        ] {
            assert!(
                matches!(parse_rrule(text), Err(RfcError::MalformedRule { .. })),
                "expected MalformedRule for {text:?}"
            );
        }
    }
}
