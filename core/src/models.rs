use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::goals::{BmiBand, MacroTargets};

/// Canonical authenticated principal id.
///
/// Built once at the boundary from whatever the authenticator hands over;
/// everything below works with this type only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::validation("User id must not be empty"));
        }
        if trimmed.len() > 128 || trimmed.chars().any(char::is_control) {
            return Err(CoreError::validation("User id is malformed"));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Hydration,
    Nutrition,
    Steps,
    Workout,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Hydration,
        Category::Nutrition,
        Category::Steps,
        Category::Workout,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Hydration => "hydration",
            Category::Nutrition => "nutrition",
            Category::Steps => "steps",
            Category::Workout => "workout",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Body profile ---

#[derive(Debug, Clone, Serialize)]
pub struct BodyProfile {
    pub user_id: String,
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub bmi: Option<f64>,
    pub bmi_band: Option<BmiBand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted by profile writes. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
}

pub const GENDERS: &[&str] = &["male", "female", "other", "prefer_not_to_say"];

pub fn validate_profile(input: &ProfileInput) -> CoreResult<()> {
    if let Some(name) = &input.name {
        if name.trim().is_empty() {
            return Err(CoreError::validation("name must not be empty"));
        }
    }
    if let Some(age) = input.age {
        if !(1..=150).contains(&age) {
            return Err(CoreError::validation("age must be between 1 and 150"));
        }
    }
    if let Some(gender) = &input.gender {
        if !GENDERS.contains(&gender.as_str()) {
            return Err(CoreError::validation(format!(
                "Invalid gender '{gender}'. Must be one of: {}",
                GENDERS.join(", ")
            )));
        }
    }
    if let Some(h) = input.height_cm {
        if !h.is_finite() || !(50.0..=300.0).contains(&h) {
            return Err(CoreError::validation("height_cm must be between 50 and 300"));
        }
    }
    if let Some(w) = input.weight_kg {
        if !w.is_finite() || !(10.0..=500.0).contains(&w) {
            return Err(CoreError::validation("weight_kg must be between 10 and 500"));
        }
    }
    Ok(())
}

// --- Hydration ---

#[derive(Debug, Clone, Serialize)]
pub struct HydrationGoal {
    pub id: i64,
    pub daily_ml: i64,
    pub is_active: bool,
    pub created_at: String,
}

/// Active goal plus what the profile would suggest.
#[derive(Debug, Clone, Serialize)]
pub struct HydrationGoalView {
    pub goal: Option<HydrationGoal>,
    pub bmi: Option<f64>,
    pub bmi_band: Option<BmiBand>,
    pub suggested_ml: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaterLogEntry {
    pub id: i64,
    pub amount_ml: i64,
    pub source: Option<String>,
    pub logged_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyHydrationRecord {
    pub day: String,
    pub goal_ml: i64,
    pub consumed_ml: i64,
    pub met_goal: bool,
    pub percent_consumed: u8,
    pub remaining_ml: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HydrationDay {
    pub day: String,
    pub record: Option<DailyHydrationRecord>,
    pub logs: Vec<WaterLogEntry>,
}

/// Outcome of a water log write: the new rows and the recomputed day.
#[derive(Debug, Clone, Serialize)]
pub struct WaterLogged {
    pub entries: Vec<WaterLogEntry>,
    pub record: DailyHydrationRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaterUndone {
    pub removed: WaterLogEntry,
    pub record: DailyHydrationRecord,
}

// --- Meals ---

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

pub fn validate_meal_type(meal: &str) -> CoreResult<String> {
    let lower = meal.to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(CoreError::validation(format!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MealEntry {
    pub id: i64,
    pub day: String,
    pub meal_type: String,
    pub food_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Derived on read: the day's calories reached the day's calorie target.
    pub is_completed: bool,
    pub eaten_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MealInput {
    pub meal_type: String,
    pub food_name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub calories: f64,
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fat_g: f64,
    #[serde(default)]
    pub fiber_g: f64,
    pub eaten_at: Option<DateTime<Utc>>,
    pub day: Option<String>,
}

pub fn validate_meal_input(input: &MealInput) -> CoreResult<()> {
    if input.food_name.trim().is_empty() {
        return Err(CoreError::validation("food_name must not be empty"));
    }
    let grams = [
        ("calories", input.calories),
        ("protein_g", input.protein_g),
        ("carbs_g", input.carbs_g),
        ("fat_g", input.fat_g),
        ("fiber_g", input.fiber_g),
    ];
    for (field, value) in grams {
        if !value.is_finite() || value < 0.0 {
            return Err(CoreError::validation(format!("{field} must be a non-negative number")));
        }
    }
    if let Some(q) = input.quantity {
        if !q.is_finite() || q <= 0.0 {
            return Err(CoreError::validation("quantity must be greater than 0"));
        }
    }
    Ok(())
}

/// Summed calories and macros for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacroTotals {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealDay {
    pub day: String,
    pub entries: Vec<MealEntry>,
    pub totals: MacroTotals,
    pub targets: Option<MacroTargets>,
    pub is_completed: bool,
}

// --- Activity tracks ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityTrackRecord {
    pub day: String,
    pub steps: i64,
    pub distance_m: f64,
    pub calories_kcal: f64,
    pub active_seconds: i64,
    pub source: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityInput {
    pub steps: Option<i64>,
    pub distance_m: Option<f64>,
    pub calories_kcal: Option<f64>,
    pub active_seconds: Option<i64>,
    pub source: Option<String>,
}

pub fn validate_activity_input(input: &ActivityInput) -> CoreResult<()> {
    if input.steps.is_some_and(|s| s < 0) {
        return Err(CoreError::validation("steps must be non-negative"));
    }
    if input.active_seconds.is_some_and(|s| s < 0) {
        return Err(CoreError::validation("active_seconds must be non-negative"));
    }
    for (field, value) in [
        ("distance_m", input.distance_m),
        ("calories_kcal", input.calories_kcal),
    ] {
        if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
            return Err(CoreError::validation(format!("{field} must be non-negative")));
        }
    }
    Ok(())
}

// --- Step cursor ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepCursor {
    pub cursor_day: NaiveDate,
    pub baseline_total: i64,
    pub last_total: i64,
}

/// Which transition a device reading took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorState {
    NoCursor,
    SameDay,
    DayRollover,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReadingOutcome {
    pub state: CursorState,
    pub counter_reset: bool,
    pub cursor: StepCursor,
    pub record: ActivityTrackRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized: Option<ActivityTrackRecord>,
}

// --- Workouts ---

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutDayRecord {
    pub day: String,
    pub total_seconds: i64,
    pub is_completed: bool,
    pub notes: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkoutUpdate {
    pub total_seconds: Option<i64>,
    pub is_completed: Option<bool>,
    pub notes: Option<String>,
}

// --- Summaries ---

/// One category's numerator, denominator and clamped percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryProgress {
    pub actual: f64,
    pub goal: Option<f64>,
    pub percent: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct MacroProgress {
    pub consumed: MacroTotals,
    pub targets: Option<MacroTargets>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub day: String,
    pub overall_pct: u8,
    pub hydration: CategoryProgress,
    pub nutrition: CategoryProgress,
    pub steps: CategoryProgress,
    pub workout: CategoryProgress,
    pub workout_completed: bool,
    pub macros: MacroProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_trims_and_rejects_empty() {
        assert_eq!(UserId::parse("  u-42 ").unwrap().as_str(), "u-42");
        assert!(UserId::parse("   ").is_err());
        assert!(UserId::parse("a\nb").is_err());
    }

    #[test]
    fn test_valid_meal_types() {
        assert_eq!(validate_meal_type("breakfast").unwrap(), "breakfast");
        assert_eq!(validate_meal_type("Lunch").unwrap(), "lunch");
        assert!(validate_meal_type("brunch").is_err());
    }

    #[test]
    fn test_validate_profile_ranges() {
        let ok = ProfileInput {
            age: Some(30),
            gender: Some("female".into()),
            height_cm: Some(165.0),
            weight_kg: Some(60.0),
            ..ProfileInput::default()
        };
        assert!(validate_profile(&ok).is_ok());

        let bad_age = ProfileInput {
            age: Some(0),
            ..ProfileInput::default()
        };
        assert!(matches!(
            validate_profile(&bad_age),
            Err(CoreError::Validation(_))
        ));

        let bad_height = ProfileInput {
            height_cm: Some(20.0),
            ..ProfileInput::default()
        };
        assert!(validate_profile(&bad_height).is_err());

        let bad_gender = ProfileInput {
            gender: Some("robot".into()),
            ..ProfileInput::default()
        };
        assert!(validate_profile(&bad_gender).is_err());
    }

    #[test]
    fn test_validate_meal_input() {
        let mut input = MealInput {
            meal_type: "lunch".into(),
            food_name: "Dal".into(),
            calories: 320.0,
            ..MealInput::default()
        };
        assert!(validate_meal_input(&input).is_ok());
        input.protein_g = -1.0;
        assert!(validate_meal_input(&input).is_err());
        input.protein_g = 10.0;
        input.calories = f64::NAN;
        assert!(validate_meal_input(&input).is_err());
    }

    #[test]
    fn test_validate_activity_input() {
        let ok = ActivityInput {
            steps: Some(100),
            distance_m: Some(80.0),
            ..ActivityInput::default()
        };
        assert!(validate_activity_input(&ok).is_ok());
        let bad = ActivityInput {
            steps: Some(-5),
            ..ActivityInput::default()
        };
        assert!(validate_activity_input(&bad).is_err());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Category::Hydration).unwrap(),
            "\"hydration\""
        );
        assert_eq!(Category::Workout.to_string(), "workout");
    }
}
