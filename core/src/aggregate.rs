use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{CoreResult, degrade_missing};
use crate::models::{Category, MacroTotals, UserId};
use crate::settings::Settings;
use crate::store::Store;

/// What a user actually did in one category on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryActual {
    pub amount: f64,
    /// The day was explicitly marked done; completion is 100% regardless of `amount`.
    pub completed: bool,
}

impl CategoryActual {
    fn amount(amount: f64) -> Self {
        Self {
            amount,
            completed: false,
        }
    }
}

/// Read-only sums over the raw event tables.
#[derive(Clone)]
pub struct MetricAggregator {
    store: Store,
    settings: Arc<Settings>,
}

impl MetricAggregator {
    #[must_use]
    pub fn new(store: Store, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    #[allow(clippy::cast_precision_loss)]
    pub async fn aggregate_actual(
        &self,
        user: &UserId,
        category: Category,
        day: NaiveDate,
    ) -> CoreResult<CategoryActual> {
        let uid = user.clone();
        let actual = match category {
            Category::Hydration => {
                let offset = self.settings.day_offset;
                let result = self
                    .store
                    .read(move |db| db.sum_water_ml(&uid, day, offset))
                    .await;
                CategoryActual::amount(degrade_missing(result, "water_logs")? as f64)
            }
            Category::Nutrition => {
                CategoryActual::amount(self.macro_totals(user, day).await?.calories)
            }
            Category::Steps => {
                let result = self.store.read(move |db| db.get_track(&uid, day)).await;
                let track = degrade_missing(result, "activity_tracks")?;
                CategoryActual::amount(track.map_or(0.0, |t| t.steps as f64))
            }
            Category::Workout => {
                let result = self.store.read(move |db| db.get_workout_day(&uid, day)).await;
                let workout = degrade_missing(result, "workout_days")?;
                workout.map_or_else(CategoryActual::default, |w| CategoryActual {
                    amount: w.total_seconds as f64,
                    completed: w.is_completed,
                })
            }
        };
        Ok(actual)
    }

    pub async fn macro_totals(&self, user: &UserId, day: NaiveDate) -> CoreResult<MacroTotals> {
        let uid = user.clone();
        let result = self.store.read(move |db| db.meal_totals(&uid, day)).await;
        Ok(degrade_missing(result, "meal_entries")?)
    }
}
