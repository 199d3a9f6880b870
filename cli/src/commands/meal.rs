use std::path::Path;

use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fitpulse_core::FitpulseService;
use fitpulse_core::models::{MealInput, UserId};

use super::helpers::{day_arg, no_neg_zero, print_json, read_image, truncate};

pub(crate) async fn cmd_meal_log(
    svc: &FitpulseService,
    user: &UserId,
    mut input: MealInput,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    if date.is_some() {
        input.day = Some(day_arg(date.as_deref(), svc.settings().today())?);
    }
    let entry = svc.log_meal(user, input).await?;
    if json {
        return print_json(&entry);
    }
    println!(
        "Logged {} to {} on {} ({:.0} kcal) [id {}]",
        entry.food_name, entry.meal_type, entry.day, entry.calories, entry.id
    );
    Ok(())
}

pub(crate) async fn cmd_meal_list(
    svc: &FitpulseService,
    user: &UserId,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Cal")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Photo")]
        photo: &'static str,
    }

    let day = day_arg(date.as_deref(), svc.settings().today())?;
    let meals = svc.list_meals_for_day(user, Some(day.as_str())).await?;

    if json {
        return print_json(&meals);
    }
    if meals.entries.is_empty() {
        eprintln!("No meals logged for {}.", meals.day);
        return Ok(());
    }

    let rows: Vec<MealRow> = meals
        .entries
        .iter()
        .map(|e| MealRow {
            id: e.id,
            meal: e.meal_type.clone(),
            food: truncate(&e.food_name, 32),
            calories: format!("{:.0}", no_neg_zero(e.calories)),
            protein: format!("{:.1}g", no_neg_zero(e.protein_g)),
            carbs: format!("{:.1}g", no_neg_zero(e.carbs_g)),
            fat: format!("{:.1}g", no_neg_zero(e.fat_g)),
            photo: if e.image_key.is_some() { "yes" } else { "" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("=== {} ===", meals.day);
    println!("{table}");

    let t = &meals.totals;
    match &meals.targets {
        Some(target) => println!(
            "TOTAL: {:.0} / {:.0} kcal{}",
            t.calories,
            target.calories,
            if meals.is_completed { "  target reached" } else { "" }
        ),
        None => println!("TOTAL: {:.0} kcal", t.calories),
    }
    Ok(())
}

pub(crate) async fn cmd_meal_delete(
    svc: &FitpulseService,
    user: &UserId,
    id: i64,
    json: bool,
) -> Result<()> {
    svc.delete_meal(user, id).await?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal entry {id}");
    }
    Ok(())
}

pub(crate) async fn cmd_meal_image(
    svc: &FitpulseService,
    user: &UserId,
    id: i64,
    path: &Path,
    json: bool,
) -> Result<()> {
    let (bytes, content_type) = read_image(path)?;
    let entry = svc.attach_meal_image(user, id, bytes, content_type).await?;
    if json {
        return print_json(&entry);
    }
    println!("Attached photo to meal entry {id}");
    if let Some(url) = entry.image_url.as_deref().filter(|u| !u.is_empty()) {
        println!("{url}");
    }
    Ok(())
}
