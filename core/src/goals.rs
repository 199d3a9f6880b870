use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, degrade_missing};
use crate::models::{Category, UserId};
use crate::settings::Settings;
use crate::store::Store;

pub const MIN_WATER_ML: i64 = 1200;
pub const MAX_WATER_ML: i64 = 6000;
pub const DEFAULT_STEP_TARGET: f64 = 9000.0;

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

/// Weight-status band used to pick every BMI-derived target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiBand {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

/// Share of calories per macro, plus a flat fiber target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacroSplit {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber_g: f64,
}

impl BmiBand {
    #[must_use]
    pub fn from_bmi(bmi: f64) -> Option<Self> {
        if !bmi.is_finite() || bmi <= 0.0 {
            return None;
        }
        Some(if bmi < 18.5 {
            BmiBand::Underweight
        } else if bmi < 25.0 {
            BmiBand::Normal
        } else if bmi < 30.0 {
            BmiBand::Overweight
        } else {
            BmiBand::Obese
        })
    }

    #[must_use]
    pub fn calorie_target(self) -> f64 {
        match self {
            BmiBand::Underweight => 2400.0,
            BmiBand::Normal => 2100.0,
            BmiBand::Overweight => 1800.0,
            BmiBand::Obese => 1600.0,
        }
    }

    #[must_use]
    pub fn step_target(self) -> f64 {
        match self {
            BmiBand::Underweight => 8000.0,
            BmiBand::Normal => 9000.0,
            BmiBand::Overweight => 11000.0,
            BmiBand::Obese => 12000.0,
        }
    }

    #[must_use]
    pub fn water_ml_per_kg(self) -> f64 {
        match self {
            BmiBand::Underweight | BmiBand::Normal => 35.0,
            BmiBand::Overweight => 30.0,
            BmiBand::Obese => 25.0,
        }
    }

    #[must_use]
    pub fn macro_split(self) -> MacroSplit {
        match self {
            BmiBand::Underweight => MacroSplit {
                protein: 0.20,
                carbs: 0.55,
                fat: 0.25,
                fiber_g: 25.0,
            },
            BmiBand::Normal => MacroSplit {
                protein: 0.25,
                carbs: 0.50,
                fat: 0.25,
                fiber_g: 28.0,
            },
            BmiBand::Overweight => MacroSplit {
                protein: 0.28,
                carbs: 0.42,
                fat: 0.30,
                fiber_g: 30.0,
            },
            BmiBand::Obese => MacroSplit {
                protein: 0.30,
                carbs: 0.40,
                fat: 0.30,
                fiber_g: 32.0,
            },
        }
    }
}

/// `weight / (height_m)^2`, rounded to 2 decimals; `None` unless both inputs are positive.
#[must_use]
pub fn compute_bmi(weight_kg: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    let (w, h) = (weight_kg?, height_cm?);
    if !(w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
        return None;
    }
    let m = h / 100.0;
    Some((w / (m * m) * 100.0).round() / 100.0)
}

#[must_use]
pub fn band_of(bmi: Option<f64>) -> Option<BmiBand> {
    bmi.and_then(BmiBand::from_bmi)
}

/// Calorie goal for a BMI; `fallback` applies only when the band is unknown.
#[must_use]
pub fn calorie_target(bmi: Option<f64>, fallback: Option<f64>) -> Option<f64> {
    band_of(bmi).map(BmiBand::calorie_target).or(fallback)
}

#[must_use]
pub fn step_target(bmi: Option<f64>) -> f64 {
    band_of(bmi).map_or(DEFAULT_STEP_TARGET, BmiBand::step_target)
}

/// Suggested daily water intake, clamped into `[MIN_WATER_ML, MAX_WATER_ML]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recommended_water_ml(weight_kg: Option<f64>, bmi: Option<f64>) -> Option<i64> {
    let band = band_of(bmi)?;
    let weight = weight_kg.filter(|w| w.is_finite() && *w > 0.0)?;
    let raw = (weight * band.water_ml_per_kg()).round();
    Some((raw as i64).clamp(MIN_WATER_ML, MAX_WATER_ML))
}

/// Calorie goal broken down into macro grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroTargets {
    pub band: Option<BmiBand>,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
}

impl MacroTargets {
    /// Bands without a BMI borrow the normal split.
    #[must_use]
    pub fn from_calories(calories: f64, band: Option<BmiBand>) -> Self {
        let split = band.unwrap_or(BmiBand::Normal).macro_split();
        Self {
            band,
            calories,
            protein_g: (calories * split.protein / KCAL_PER_G_PROTEIN).round(),
            carbs_g: (calories * split.carbs / KCAL_PER_G_CARBS).round(),
            fat_g: (calories * split.fat / KCAL_PER_G_FAT).round(),
            fiber_g: split.fiber_g,
        }
    }

    #[must_use]
    pub fn for_bmi(bmi: Option<f64>, fallback: Option<f64>) -> Option<Self> {
        calorie_target(bmi, fallback).map(|kcal| Self::from_calories(kcal, band_of(bmi)))
    }
}

/// Resolves a user's numeric target per category.
///
/// Missing profiles and tables fall back to the documented defaults; only
/// genuine store failures propagate.
#[derive(Clone)]
pub struct GoalResolver {
    store: Store,
    settings: Arc<Settings>,
}

impl GoalResolver {
    #[must_use]
    pub fn new(store: Store, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    pub async fn resolve_goal(
        &self,
        user: &UserId,
        category: Category,
        day: NaiveDate,
    ) -> CoreResult<Option<f64>> {
        let goal = match category {
            Category::Hydration => Some(self.hydration_goal_ml(user).await?),
            Category::Nutrition => {
                calorie_target(self.bmi(user).await?, self.settings.calorie_fallback_kcal)
            }
            Category::Steps => Some(step_target(self.bmi(user).await?)),
            #[allow(clippy::cast_precision_loss)]
            Category::Workout => Some(self.settings.workout_goal_seconds as f64),
        };
        tracing::debug!(%user, %category, %day, ?goal, "resolved goal");
        Ok(goal)
    }

    pub async fn macro_targets(&self, user: &UserId) -> CoreResult<Option<MacroTargets>> {
        let bmi = self.bmi(user).await?;
        Ok(MacroTargets::for_bmi(bmi, self.settings.calorie_fallback_kcal))
    }

    /// Latest active goal in ml, or 0 when none was ever set.
    #[allow(clippy::cast_precision_loss)]
    async fn hydration_goal_ml(&self, user: &UserId) -> CoreResult<f64> {
        let uid = user.clone();
        let result = self
            .store
            .read(move |db| db.get_active_hydration_goal(&uid))
            .await;
        let goal = degrade_missing(result, "hydration_goals")?;
        Ok(goal.map_or(0.0, |g| g.daily_ml as f64))
    }

    async fn bmi(&self, user: &UserId) -> CoreResult<Option<f64>> {
        let uid = user.clone();
        let result = self.store.read(move |db| db.get_body_profile(&uid)).await;
        let profile = degrade_missing(result, "body_profiles")?;
        Ok(profile.and_then(|p| p.bmi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_compute_bmi_rounds_to_two_decimals() {
        assert_eq!(compute_bmi(Some(70.0), Some(175.0)), Some(22.86));
        assert_eq!(compute_bmi(Some(0.0), Some(175.0)), None);
        assert_eq!(compute_bmi(Some(70.0), None), None);
        assert_eq!(compute_bmi(Some(70.0), Some(-1.0)), None);
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(BmiBand::from_bmi(18.49), Some(BmiBand::Underweight));
        assert_eq!(BmiBand::from_bmi(18.5), Some(BmiBand::Normal));
        assert_eq!(BmiBand::from_bmi(24.9), Some(BmiBand::Normal));
        assert_eq!(BmiBand::from_bmi(25.0), Some(BmiBand::Overweight));
        assert_eq!(BmiBand::from_bmi(30.0), Some(BmiBand::Obese));
        assert_eq!(BmiBand::from_bmi(f64::NAN), None);
    }

    #[test]
    fn test_calorie_target_bands_and_fallback() {
        assert_eq!(calorie_target(Some(17.0), None), Some(2400.0));
        assert_eq!(calorie_target(Some(22.0), None), Some(2100.0));
        assert_eq!(calorie_target(Some(27.0), None), Some(1800.0));
        assert_eq!(calorie_target(Some(31.0), None), Some(1600.0));
        assert_eq!(calorie_target(None, None), None);
        assert_eq!(calorie_target(None, Some(2000.0)), Some(2000.0));
        // A known band always beats the flat fallback
        assert_eq!(calorie_target(Some(31.0), Some(2000.0)), Some(1600.0));
    }

    #[test]
    fn test_obese_macro_targets() {
        let t = MacroTargets::for_bmi(Some(31.0), None).unwrap();
        assert_eq!(t.calories, 1600.0);
        assert_eq!(t.protein_g, 120.0);
        assert_eq!(t.carbs_g, 160.0);
        // 1600 * 0.30 / 9 = 53.3
        assert_eq!(t.fat_g, 53.0);
        assert_eq!(t.fiber_g, 32.0);
    }

    #[test]
    fn test_macro_split_sums_to_one() {
        for band in [
            BmiBand::Underweight,
            BmiBand::Normal,
            BmiBand::Overweight,
            BmiBand::Obese,
        ] {
            let s = band.macro_split();
            assert!((s.protein + s.carbs + s.fat - 1.0).abs() < 1e-9, "{band:?}");
        }
    }

    #[test]
    fn test_step_target() {
        assert_eq!(step_target(Some(24.9)), 9000.0);
        assert_eq!(step_target(Some(17.0)), 8000.0);
        assert_eq!(step_target(Some(28.0)), 11000.0);
        assert_eq!(step_target(Some(35.0)), 12000.0);
        assert_eq!(step_target(None), 9000.0);
    }

    #[test]
    fn test_recommended_water_overweight() {
        assert_eq!(recommended_water_ml(Some(70.0), Some(27.0)), Some(2100));
    }

    #[test]
    fn test_recommended_water_clamped() {
        assert_eq!(recommended_water_ml(Some(30.0), Some(17.0)), Some(1200));
        assert_eq!(recommended_water_ml(Some(300.0), Some(45.0)), Some(6000));
        assert_eq!(recommended_water_ml(Some(70.0), None), None);
    }

    fn resolver(settings: Settings) -> GoalResolver {
        let store = Store::new(Database::open_in_memory().unwrap());
        GoalResolver::new(store, Arc::new(settings))
    }

    #[tokio::test]
    async fn test_resolver_defaults_without_profile() {
        let r = resolver(Settings::default());
        let user = UserId::parse("nobody").unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        assert_eq!(
            r.resolve_goal(&user, Category::Hydration, day).await.unwrap(),
            Some(0.0)
        );
        assert_eq!(
            r.resolve_goal(&user, Category::Nutrition, day).await.unwrap(),
            None
        );
        assert_eq!(
            r.resolve_goal(&user, Category::Steps, day).await.unwrap(),
            Some(9000.0)
        );
        assert_eq!(
            r.resolve_goal(&user, Category::Workout, day).await.unwrap(),
            Some(1800.0)
        );
    }

    #[tokio::test]
    async fn test_resolver_flat_calorie_policy() {
        let r = resolver(Settings {
            calorie_fallback_kcal: Some(2000.0),
            ..Settings::default()
        });
        let user = UserId::parse("nobody").unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(
            r.resolve_goal(&user, Category::Nutrition, day).await.unwrap(),
            Some(2000.0)
        );
        let macros = r.macro_targets(&user).await.unwrap().unwrap();
        assert_eq!(macros.band, None);
        assert_eq!(macros.protein_g, 125.0);
    }
}
