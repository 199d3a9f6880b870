use crate::models::Category;

/// What a category reports when it has no positive goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroGoalFallback {
    /// No goal means no progress.
    Zero,
    /// Any recorded activity counts as done.
    AnyActivity,
}

impl Category {
    #[must_use]
    pub fn zero_goal_fallback(self) -> ZeroGoalFallback {
        match self {
            Category::Workout => ZeroGoalFallback::AnyActivity,
            Category::Hydration | Category::Nutrition | Category::Steps => ZeroGoalFallback::Zero,
        }
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

/// Clamped completion percentage. Total over all `f64` inputs.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn percent(actual: f64, goal: f64, fallback: ZeroGoalFallback) -> u8 {
    let actual = finite_or_zero(actual).max(0.0);
    let goal = finite_or_zero(goal);
    if goal <= 0.0 {
        return match fallback {
            ZeroGoalFallback::AnyActivity if actual > 0.0 => 100,
            _ => 0,
        };
    }
    ((actual / goal).min(1.0) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Percentage for a category whose goal may be unset.
#[must_use]
pub fn category_percent(category: Category, actual: f64, goal: Option<f64>) -> u8 {
    percent(actual, goal.unwrap_or(0.0), category.zero_goal_fallback())
}

/// Equal-weight mean of the component percentages, non-finite treated as 0.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn composite(components: &[f64]) -> u8 {
    if components.is_empty() {
        return 0;
    }
    let sum: f64 = components.iter().copied().map(finite_or_zero).sum();
    (sum / components.len() as f64).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_clamps_at_goal() {
        assert_eq!(percent(9450.0, 9000.0, ZeroGoalFallback::Zero), 100);
        assert_eq!(percent(9000.0, 9000.0, ZeroGoalFallback::Zero), 100);
        assert_eq!(percent(4500.0, 9000.0, ZeroGoalFallback::Zero), 50);
        assert_eq!(percent(0.0, 9000.0, ZeroGoalFallback::Zero), 0);
    }

    #[test]
    fn test_percent_rounds() {
        // 1/3 = 33.33 -> 33, 2/3 = 66.67 -> 67
        assert_eq!(percent(1.0, 3.0, ZeroGoalFallback::Zero), 33);
        assert_eq!(percent(2.0, 3.0, ZeroGoalFallback::Zero), 67);
    }

    #[test]
    fn test_percent_bounded_over_grid() {
        for goal in [1.0, 7.5, 250.0, 2100.0, 1e9] {
            for actual in [0.0, 0.4, 1.0, 99.0, 2100.0, 1e12] {
                let p = percent(actual, goal, ZeroGoalFallback::Zero);
                assert!(p <= 100);
                if actual >= goal {
                    assert_eq!(p, 100, "actual {actual} goal {goal}");
                }
            }
        }
    }

    #[test]
    fn test_zero_goal_fallback() {
        assert_eq!(category_percent(Category::Hydration, 500.0, Some(0.0)), 0);
        assert_eq!(category_percent(Category::Nutrition, 1800.0, None), 0);
        assert_eq!(category_percent(Category::Workout, 60.0, Some(0.0)), 100);
        assert_eq!(category_percent(Category::Workout, 0.0, Some(0.0)), 0);
    }

    #[test]
    fn test_percent_non_finite_inputs() {
        assert_eq!(percent(f64::NAN, 100.0, ZeroGoalFallback::Zero), 0);
        assert_eq!(percent(f64::INFINITY, 100.0, ZeroGoalFallback::Zero), 0);
        assert_eq!(percent(50.0, f64::NAN, ZeroGoalFallback::AnyActivity), 100);
        assert_eq!(percent(-20.0, 100.0, ZeroGoalFallback::Zero), 0);
    }

    #[test]
    fn test_composite_mean_and_order() {
        assert_eq!(composite(&[100.0, 50.0, 0.0, 25.0]), 44);
        assert_eq!(composite(&[25.0, 0.0, 100.0, 50.0]), 44);
        assert_eq!(composite(&[100.0, f64::NAN, 100.0, 100.0]), 75);
        assert_eq!(composite(&[]), 0);
    }
}
