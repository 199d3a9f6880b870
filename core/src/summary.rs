use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use futures_util::future::try_join_all;

use crate::aggregate::MetricAggregator;
use crate::completion::{category_percent, composite};
use crate::error::{CoreError, CoreResult};
use crate::goals::GoalResolver;
use crate::models::{Category, CategoryProgress, DaySummary, MacroProgress, UserId};
use crate::settings::{Settings, format_day};
use crate::store::Store;

/// Builds per-day and per-range completion summaries.
#[derive(Clone)]
pub struct SummaryBuilder {
    goals: GoalResolver,
    metrics: MetricAggregator,
    settings: Arc<Settings>,
}

impl SummaryBuilder {
    #[must_use]
    pub fn new(store: Store, settings: Arc<Settings>) -> Self {
        Self {
            goals: GoalResolver::new(store.clone(), Arc::clone(&settings)),
            metrics: MetricAggregator::new(store, Arc::clone(&settings)),
            settings,
        }
    }

    #[must_use]
    pub fn goals(&self) -> &GoalResolver {
        &self.goals
    }

    #[must_use]
    pub fn metrics(&self) -> &MetricAggregator {
        &self.metrics
    }

    async fn category(
        &self,
        user: &UserId,
        category: Category,
        day: NaiveDate,
    ) -> CoreResult<(CategoryProgress, bool)> {
        let (goal, actual) = tokio::try_join!(
            self.goals.resolve_goal(user, category, day),
            self.metrics.aggregate_actual(user, category, day),
        )?;
        let percent = if actual.completed {
            100
        } else {
            category_percent(category, actual.amount, goal)
        };
        let progress = CategoryProgress {
            actual: actual.amount,
            goal,
            percent,
        };
        Ok((progress, actual.completed))
    }

    /// All four categories for one day plus their equal-weight composite.
    pub async fn build_day_summary(&self, user: &UserId, day: NaiveDate) -> CoreResult<DaySummary> {
        let (hydration, nutrition, steps, workout, consumed, targets) = tokio::try_join!(
            self.category(user, Category::Hydration, day),
            self.category(user, Category::Nutrition, day),
            self.category(user, Category::Steps, day),
            self.category(user, Category::Workout, day),
            self.metrics.macro_totals(user, day),
            self.goals.macro_targets(user),
        )?;

        let overall_pct = composite(&[
            f64::from(hydration.0.percent),
            f64::from(nutrition.0.percent),
            f64::from(steps.0.percent),
            f64::from(workout.0.percent),
        ]);
        tracing::debug!(%user, %day, overall_pct, "built day summary");

        Ok(DaySummary {
            day: format_day(day),
            overall_pct,
            hydration: hydration.0,
            nutrition: nutrition.0,
            steps: steps.0,
            workout: workout.0,
            workout_completed: workout.1,
            macros: MacroProgress { consumed, targets },
        })
    }

    /// The `default_range_days` days ending on `today`.
    #[must_use]
    pub fn default_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let back = (self.settings.default_range_days - 1).max(0);
        (today - Duration::days(back), today)
    }

    /// Day summaries for `[start, end]`, ascending.
    ///
    /// Swapped bounds are normalized. Days run concurrently within a batch,
    /// batches one after another, so the store never sees more than
    /// `range_batch_size` summaries at once.
    pub async fn build_range_summary(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<DaySummary>> {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        let span = (end - start).num_days() + 1;
        if span > self.settings.max_range_days {
            return Err(CoreError::validation(format!(
                "Date range covers {span} days; at most {} allowed",
                self.settings.max_range_days
            )));
        }

        let days: Vec<NaiveDate> = (0..span).map(|i| start + Duration::days(i)).collect();
        let mut summaries = Vec::with_capacity(days.len());
        for batch in days.chunks(self.settings.range_batch_size.max(1)) {
            let built =
                try_join_all(batch.iter().map(|day| self.build_day_summary(user, *day))).await?;
            summaries.extend(built);
        }
        Ok(summaries)
    }
}
