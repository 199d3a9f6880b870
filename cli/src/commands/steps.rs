use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use fitpulse_core::FitpulseService;
use fitpulse_core::models::{CursorState, UserId};
use fitpulse_core::provider::ActivityProvider;

use super::helpers::print_json;

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{raw}'. Use RFC 3339, e.g. 2025-03-10T08:00:00Z"))
}

pub(crate) async fn cmd_steps_reading(
    svc: &FitpulseService,
    user: &UserId,
    total: i64,
    at: Option<String>,
    tz: Option<String>,
    json: bool,
) -> Result<()> {
    let at = at.as_deref().map(parse_instant).transpose()?;
    let outcome = svc
        .apply_device_step_reading(user, total, at, tz.as_deref())
        .await?;

    if json {
        return print_json(&outcome);
    }
    let what = match outcome.state {
        CursorState::NoCursor => "first reading, baseline set",
        CursorState::SameDay => "same day",
        CursorState::DayRollover => "new day",
    };
    println!(
        "{}: {} steps ({what}{})",
        outcome.record.day,
        outcome.record.steps,
        if outcome.counter_reset { ", device counter reset" } else { "" }
    );
    if let Some(prev) = &outcome.finalized {
        println!("Closed {} at {} steps", prev.day, prev.steps);
    }
    Ok(())
}

pub(crate) async fn cmd_sync(
    svc: &FitpulseService,
    provider: &dyn ActivityProvider,
    user: &UserId,
    since: Option<String>,
    until: Option<String>,
    bucket_seconds: Option<u32>,
    json: bool,
) -> Result<()> {
    let since = since.as_deref().map(parse_instant).transpose()?;
    let until = until.as_deref().map(parse_instant).transpose()?;
    let tracks = svc
        .sync_provider_activity(provider, user, since, until, bucket_seconds)
        .await?;

    if json {
        return print_json(&tracks);
    }
    if tracks.is_empty() {
        eprintln!("Provider returned no activity in range.");
        return Ok(());
    }
    for t in &tracks {
        println!(
            "{}: {} steps, {:.0} kcal, {:.1} km",
            t.day,
            t.steps,
            t.calories_kcal,
            t.distance_m / 1000.0
        );
    }
    eprintln!("Synced {} day(s).", tracks.len());
    Ok(())
}
