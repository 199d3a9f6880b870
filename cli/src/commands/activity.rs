use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fitpulse_core::FitpulseService;
use fitpulse_core::models::{
    ActivityInput, ActivityTrackRecord, UserId, WorkoutDayRecord, WorkoutUpdate,
};

use super::helpers::{day_arg, print_json};

/// How `track set` applies its fields to the stored day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackWrite {
    Replace,
    Patch,
    Add,
}

fn print_track(t: &ActivityTrackRecord) {
    println!(
        "{}: {} steps, {:.0} kcal, {:.0} m, {} min active{}",
        t.day,
        t.steps,
        t.calories_kcal,
        t.distance_m,
        t.active_seconds / 60,
        t.source.as_deref().map(|s| format!(" [{s}]")).unwrap_or_default()
    );
}

fn print_workout(w: &WorkoutDayRecord) {
    println!(
        "{}: {} min{}{}",
        w.day,
        w.total_seconds / 60,
        if w.is_completed { ", completed" } else { "" },
        w.notes.as_deref().map(|n| format!(" - {n}")).unwrap_or_default()
    );
}

pub(crate) async fn cmd_track_show(
    svc: &FitpulseService,
    user: &UserId,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let day = day_arg(date.as_deref(), svc.settings().today())?;
    let track = svc.get_activity_track(user, &day).await?;
    if json {
        return print_json(&track);
    }
    print_track(&track);
    Ok(())
}

pub(crate) async fn cmd_track_write(
    svc: &FitpulseService,
    user: &UserId,
    date: Option<String>,
    mut input: ActivityInput,
    mode: TrackWrite,
    json: bool,
) -> Result<()> {
    let day = day_arg(date.as_deref(), svc.settings().today())?;
    input.source.get_or_insert_with(|| "manual".to_string());
    let track = match mode {
        TrackWrite::Replace => svc.upsert_activity_track(user, &day, input).await?,
        TrackWrite::Patch => svc.patch_activity_track(user, &day, input).await?,
        TrackWrite::Add => svc.add_activity(user, &day, input).await?,
    };
    if json {
        return print_json(&track);
    }
    print_track(&track);
    Ok(())
}

pub(crate) async fn cmd_track_list(
    svc: &FitpulseService,
    user: &UserId,
    start: Option<String>,
    end: Option<String>,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct TrackRow {
        #[tabled(rename = "Date")]
        day: String,
        #[tabled(rename = "Steps")]
        steps: i64,
        #[tabled(rename = "kcal")]
        calories: String,
        #[tabled(rename = "Distance")]
        distance: String,
        #[tabled(rename = "Active")]
        active: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let today = svc.settings().today();
    let start = start.as_deref().map(|s| day_arg(Some(s), today)).transpose()?;
    let end = end.as_deref().map(|s| day_arg(Some(s), today)).transpose()?;
    let tracks = svc
        .list_activity_tracks(user, start.as_deref(), end.as_deref(), limit)
        .await?;

    if json {
        return print_json(&tracks);
    }
    if tracks.is_empty() {
        eprintln!("No activity tracked in range.");
        return Ok(());
    }

    let rows: Vec<TrackRow> = tracks
        .iter()
        .map(|t| TrackRow {
            day: t.day.clone(),
            steps: t.steps,
            calories: format!("{:.0}", t.calories_kcal),
            distance: format!("{:.2} km", t.distance_m / 1000.0),
            active: format!("{} min", t.active_seconds / 60),
            source: t.source.clone().unwrap_or_default(),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_track_delete(
    svc: &FitpulseService,
    user: &UserId,
    date: &str,
    json: bool,
) -> Result<()> {
    let day = day_arg(Some(date), svc.settings().today())?;
    svc.delete_activity_track(user, &day).await?;
    if json {
        println!("{}", serde_json::json!({ "deleted": day }));
    } else {
        println!("Deleted activity track for {day}");
    }
    Ok(())
}

pub(crate) async fn cmd_workout_log(
    svc: &FitpulseService,
    user: &UserId,
    date: Option<String>,
    update: WorkoutUpdate,
    json: bool,
) -> Result<()> {
    let day = day_arg(date.as_deref(), svc.settings().today())?;
    let workout = svc.upsert_workout_day(user, Some(day.as_str()), update).await?;
    if json {
        return print_json(&workout);
    }
    print_workout(&workout);
    Ok(())
}

pub(crate) async fn cmd_workout_show(
    svc: &FitpulseService,
    user: &UserId,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let day = day_arg(date.as_deref(), svc.settings().today())?;
    let workout = svc.get_workout_day(user, Some(day.as_str())).await?;
    if json {
        return print_json(&workout);
    }
    print_workout(&workout);
    Ok(())
}

pub(crate) async fn cmd_workout_list(
    svc: &FitpulseService,
    user: &UserId,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    let today = svc.settings().today();
    let start = start.as_deref().map(|s| day_arg(Some(s), today)).transpose()?;
    let end = end.as_deref().map(|s| day_arg(Some(s), today)).transpose()?;
    let days = svc
        .list_workout_days(user, start.as_deref(), end.as_deref())
        .await?;

    if json {
        return print_json(&days);
    }
    if days.is_empty() {
        eprintln!("No workouts recorded in range.");
        return Ok(());
    }
    for w in &days {
        print_workout(w);
    }
    Ok(())
}

pub(crate) async fn cmd_workout_delete(
    svc: &FitpulseService,
    user: &UserId,
    date: &str,
    json: bool,
) -> Result<()> {
    let day = day_arg(Some(date), svc.settings().today())?;
    svc.delete_workout_day(user, &day).await?;
    if json {
        println!("{}", serde_json::json!({ "deleted": day }));
    } else {
        println!("Deleted workout for {day}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_track_write_modes() {
        let svc = FitpulseService::new_in_memory().unwrap();
        let user = UserId::parse("u1").unwrap();
        let input = |steps| ActivityInput {
            steps: Some(steps),
            ..Default::default()
        };

        cmd_track_write(&svc, &user, Some("2025-03-10".into()), input(1000), TrackWrite::Replace, true)
            .await
            .unwrap();
        cmd_track_write(&svc, &user, Some("2025-03-10".into()), input(500), TrackWrite::Add, true)
            .await
            .unwrap();
        let track = svc.get_activity_track(&user, "2025-03-10").await.unwrap();
        assert_eq!(track.steps, 1500);
        assert_eq!(track.source.as_deref(), Some("manual"));

        let err = cmd_track_write(&svc, &user, Some("2025-03-11".into()), input(1), TrackWrite::Patch, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No activity track"));
    }

    #[tokio::test]
    async fn test_workout_delete_missing_errors() {
        let svc = FitpulseService::new_in_memory().unwrap();
        let user = UserId::parse("u1").unwrap();
        assert!(cmd_workout_delete(&svc, &user, "2025-03-10", true).await.is_err());
    }
}
