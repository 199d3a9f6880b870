use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::models::{ActivityInput, UserId};

pub const DEFAULT_BUCKET_SECONDS: u32 = 300;
pub const PROVIDER_SOURCE: &str = "provider:aggregate";

/// One provider time bucket with its summed metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActivityBucket {
    pub start_ms: i64,
    pub end_ms: i64,
    pub steps: i64,
    pub calories_kcal: f64,
    pub distance_m: f64,
}

/// External fitness-data source.
///
/// Token exchange and refresh live behind the implementation; the core only
/// asks for already-aggregated buckets.
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    async fn fetch_aggregated_activity(
        &self,
        user: &UserId,
        start_ms: i64,
        end_ms: i64,
        bucket_seconds: u32,
    ) -> anyhow::Result<Vec<ActivityBucket>>;
}

/// Sum buckets into calendar days at `offset`, keyed by each bucket's start.
#[must_use]
pub fn fold_daily(
    buckets: &[ActivityBucket],
    offset: FixedOffset,
) -> BTreeMap<NaiveDate, ActivityInput> {
    let mut days: BTreeMap<NaiveDate, ActivityInput> = BTreeMap::new();
    for bucket in buckets {
        let Some(start) = DateTime::from_timestamp_millis(bucket.start_ms) else {
            tracing::warn!(start_ms = bucket.start_ms, "skipping bucket with invalid start");
            continue;
        };
        let day = start.with_timezone(&offset).date_naive();
        let acc = days.entry(day).or_insert_with(|| ActivityInput {
            steps: Some(0),
            distance_m: Some(0.0),
            calories_kcal: Some(0.0),
            active_seconds: None,
            source: Some(PROVIDER_SOURCE.to_string()),
        });
        acc.steps = Some(acc.steps.unwrap_or(0) + bucket.steps.max(0));
        acc.calories_kcal = Some(acc.calories_kcal.unwrap_or(0.0) + bucket.calories_kcal.max(0.0));
        acc.distance_m = Some(acc.distance_m.unwrap_or(0.0) + bucket.distance_m.max(0.0));
    }
    days
}
