//! `calyx-expand DTSTART RRULE [DURATION]`
//!
//! Expands one rule with the configured limits and prints the range and the
//! periods as JSON. DTSTART may carry a zone as `TZID=Europe/Berlin:20240101T090000`.

use anyhow::Context;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

use calyx_core::config::load_config;
use calyx_rfc::rfc::ical::core::{EventDuration, EventTime, RecurrenceRule};
use calyx_rfc::rfc::ical::expand::TimeZoneResolver;
use calyx_service::caldav::model::{MasterEvent, OccurrencePeriod, RecurrenceRange};
use calyx_service::caldav::recurrence::{ExpansionWindow, expand};
use calyx_service::caldav::service::RecurrenceContext;

#[derive(Serialize)]
struct Output<'a> {
    range: &'a RecurrenceRange,
    truncated: bool,
    periods: &'a [OccurrencePeriod],
}

fn parse_start(text: &str) -> anyhow::Result<EventTime> {
    let parsed = match text.strip_prefix("TZID=").and_then(|rest| rest.split_once(':')) {
        Some((tzid, value)) => EventTime::parse_with_tzid(value, Some(tzid)),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid DTSTART {text:?}"))
}

fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    let config = load_config()?;

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    let mut args = std::env::args().skip(1);
    let (Some(start), Some(rule)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: calyx-expand DTSTART RRULE [DURATION]");
    };

    let start = parse_start(&start)?;
    let rule: RecurrenceRule = rule
        .parse()
        .with_context(|| format!("invalid RRULE {rule:?}"))?;
    let mut master = MasterEvent::new("calyx-expand", start).with_rrule(rule);
    if let Some(duration) = args.next() {
        let duration: EventDuration = duration
            .parse()
            .with_context(|| format!("invalid DURATION {duration:?}"))?;
        master = master.with_duration(duration);
    }

    let resolver = TimeZoneResolver::new();
    let ctx = RecurrenceContext::from_config(&config.recurrence, None, &resolver)?;
    let basis = ctx.basis(&master)?;
    let expansion = expand(&master, &basis, ctx.limits, &ExpansionWindow::default())?;

    tracing::info!(
        periods = expansion.periods.len(),
        truncated = expansion.truncated,
        "Expanded"
    );

    let output = Output {
        range: &expansion.range,
        truncated: expansion.truncated,
        periods: &expansion.periods,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
