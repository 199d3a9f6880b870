use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fitpulse_core::FitpulseService;
use fitpulse_core::models::{CategoryProgress, UserId};

use super::helpers::{bar, day_arg, no_neg_zero, print_json};

fn goal_label(p: &CategoryProgress, unit: &str) -> String {
    match p.goal {
        Some(goal) => format!("{:.0} / {goal:.0} {unit}", no_neg_zero(p.actual)),
        None => format!("{:.0} {unit} (no goal)", no_neg_zero(p.actual)),
    }
}

pub(crate) async fn cmd_summary(
    svc: &FitpulseService,
    user: &UserId,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let day = day_arg(date.as_deref(), svc.settings().today())?;
    let s = svc.get_day_summary(user, Some(day.as_str())).await?;

    if json {
        return print_json(&s);
    }

    println!("=== {} === overall {}%\n", s.day, s.overall_pct);
    let rows = [
        ("Hydration", &s.hydration, "ml"),
        ("Nutrition", &s.nutrition, "kcal"),
        ("Steps", &s.steps, "steps"),
        ("Workout", &s.workout, "s"),
    ];
    for (label, progress, unit) in rows {
        println!(
            "  {label:<10} [{}] {:>3}%  {}",
            bar(progress.percent),
            progress.percent,
            goal_label(progress, unit)
        );
    }
    if s.workout_completed {
        println!("  Workout marked complete");
    }

    let c = &s.macros.consumed;
    println!(
        "\n  EATEN: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g Fiber:{:.0}g",
        c.calories, c.protein_g, c.carbs_g, c.fat_g, c.fiber_g
    );
    if let Some(t) = &s.macros.targets {
        println!(
            "  TARGET: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g Fiber:{:.0}g",
            t.calories, t.protein_g, t.carbs_g, t.fat_g, t.fiber_g
        );
    }

    Ok(())
}

pub(crate) async fn cmd_range(
    svc: &FitpulseService,
    user: &UserId,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct RangeRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Overall")]
        overall: String,
        #[tabled(rename = "Water")]
        hydration: String,
        #[tabled(rename = "Food")]
        nutrition: String,
        #[tabled(rename = "Steps")]
        steps: String,
        #[tabled(rename = "Workout")]
        workout: String,
    }

    let today = svc.settings().today();
    let start = start.as_deref().map(|s| day_arg(Some(s), today)).transpose()?;
    let end = end.as_deref().map(|s| day_arg(Some(s), today)).transpose()?;
    let summaries = svc
        .get_range_summary(user, start.as_deref(), end.as_deref())
        .await?;

    if json {
        return print_json(&summaries);
    }

    let rows: Vec<RangeRow> = summaries
        .iter()
        .map(|s| RangeRow {
            date: s.day.clone(),
            overall: format!("{}%", s.overall_pct),
            hydration: format!("{}%", s.hydration.percent),
            nutrition: format!("{}%", s.nutrition.percent),
            steps: format!("{}%", s.steps.percent),
            workout: format!("{}%", s.workout.percent),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
