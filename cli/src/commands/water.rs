use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fitpulse_core::FitpulseService;
use fitpulse_core::models::{DailyHydrationRecord, UserId};

use super::helpers::{bar, day_arg, print_json};

fn print_record(r: &DailyHydrationRecord) {
    println!(
        "{}: [{}] {} / {} ml ({}%), {} ml to go{}",
        r.day,
        bar(r.percent_consumed),
        r.consumed_ml,
        r.goal_ml,
        r.percent_consumed,
        r.remaining_ml,
        if r.met_goal { "  goal met" } else { "" }
    );
}

pub(crate) async fn cmd_water_log(
    svc: &FitpulseService,
    user: &UserId,
    amounts: Vec<i64>,
    json: bool,
) -> Result<()> {
    let entries = amounts.into_iter().map(|ml| (ml, None)).collect();
    let logged = svc.log_water_batch(user, entries, Some("cli")).await?;

    if json {
        return print_json(&logged);
    }
    let total: i64 = logged.entries.iter().map(|e| e.amount_ml).sum();
    println!("Logged {total} ml");
    print_record(&logged.record);
    Ok(())
}

pub(crate) async fn cmd_water_undo(svc: &FitpulseService, user: &UserId, json: bool) -> Result<()> {
    let undone = svc.undo_last_water_log(user).await?;
    if json {
        return print_json(&undone);
    }
    println!("Removed {} ml logged at {}", undone.removed.amount_ml, undone.removed.logged_at);
    print_record(&undone.record);
    Ok(())
}

pub(crate) async fn cmd_water_goal_set(
    svc: &FitpulseService,
    user: &UserId,
    daily_ml: i64,
    json: bool,
) -> Result<()> {
    let (goal, record) = svc.set_hydration_goal(user, daily_ml).await?;
    if json {
        return print_json(&serde_json::json!({ "goal": goal, "today": record }));
    }
    println!("Daily water goal set to {} ml", goal.daily_ml);
    print_record(&record);
    Ok(())
}

pub(crate) async fn cmd_water_goal_from_profile(
    svc: &FitpulseService,
    user: &UserId,
    json: bool,
) -> Result<()> {
    let (goal, record) = svc.recompute_hydration_goal_from_profile(user).await?;
    if json {
        return print_json(&serde_json::json!({ "goal": goal, "today": record }));
    }
    println!("Daily water goal set from profile: {} ml", goal.daily_ml);
    print_record(&record);
    Ok(())
}

pub(crate) async fn cmd_water_goal_show(
    svc: &FitpulseService,
    user: &UserId,
    json: bool,
) -> Result<()> {
    let view = svc.get_hydration_goal(user).await?;
    if json {
        return print_json(&view);
    }
    match &view.goal {
        Some(goal) => println!("Daily water goal: {} ml (since {})", goal.daily_ml, goal.created_at),
        None => println!("No water goal set."),
    }
    if let (Some(bmi), Some(band)) = (view.bmi, view.bmi_band) {
        println!("BMI: {bmi:.1} ({band:?})");
    }
    if let Some(ml) = view.suggested_ml {
        println!("Suggested from profile: {ml} ml");
    }
    Ok(())
}

pub(crate) async fn cmd_water_today(svc: &FitpulseService, user: &UserId, json: bool) -> Result<()> {
    let day = svc.hydration_today(user).await?;
    if json {
        return print_json(&day);
    }
    match &day.record {
        Some(r) => print_record(r),
        None => println!("{}: no water goal set", day.day),
    }
    for log in &day.logs {
        println!(
            "  {:>5} ml  {}  {}",
            log.amount_ml,
            log.logged_at,
            log.source.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub(crate) async fn cmd_water_history(
    svc: &FitpulseService,
    user: &UserId,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct HydrationRow {
        #[tabled(rename = "Date")]
        day: String,
        #[tabled(rename = "Consumed")]
        consumed: String,
        #[tabled(rename = "Goal")]
        goal: String,
        #[tabled(rename = "%")]
        percent: u8,
        #[tabled(rename = "Met")]
        met: &'static str,
    }

    let today = svc.settings().today();
    let start = start.as_deref().map(|s| day_arg(Some(s), today)).transpose()?;
    let end = end.as_deref().map(|s| day_arg(Some(s), today)).transpose()?;
    let days = svc
        .list_hydration_days(user, start.as_deref(), end.as_deref())
        .await?;

    if json {
        return print_json(&days);
    }
    if days.is_empty() {
        eprintln!("No hydration records in range.");
        return Ok(());
    }

    let rows: Vec<HydrationRow> = days
        .iter()
        .map(|r| HydrationRow {
            day: r.day.clone(),
            consumed: format!("{} ml", r.consumed_ml),
            goal: format!("{} ml", r.goal_ml),
            percent: r.percent_consumed,
            met: if r.met_goal { "yes" } else { "" },
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
