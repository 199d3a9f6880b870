use serde::{Deserialize, Serialize};

use crate::provider::ActivityBucket;

pub const STEP_COUNT_DELTA: &str = "com.google.step_count.delta";
pub const CALORIES_EXPENDED: &str = "com.google.calories.expended";
pub const DISTANCE_DELTA: &str = "com.google.distance.delta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub aggregate_by: Vec<AggregateBy>,
    pub bucket_by_time: BucketByTime,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateBy {
    pub data_type_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketByTime {
    pub duration_millis: i64,
}

impl AggregateRequest {
    #[must_use]
    pub fn steps_calories_distance(start_ms: i64, end_ms: i64, bucket_seconds: u32) -> Self {
        Self {
            aggregate_by: [STEP_COUNT_DELTA, CALORIES_EXPENDED, DISTANCE_DELTA]
                .iter()
                .map(|t| AggregateBy {
                    data_type_name: (*t).to_string(),
                })
                .collect(),
            bucket_by_time: BucketByTime {
                duration_millis: i64::from(bucket_seconds) * 1000,
            },
            start_time_millis: start_ms,
            end_time_millis: end_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AggregateResponse {
    #[serde(default)]
    pub bucket: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub start_time_millis: String,
    pub end_time_millis: String,
    #[serde(default)]
    pub dataset: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub point: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub data_type_name: String,
    #[serde(default)]
    pub value: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    pub int_val: Option<i64>,
    pub fp_val: Option<f64>,
}

/// Sum a bucket's points into one `ActivityBucket`. `None` if its times don't parse.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn bucket_to_activity(b: &Bucket) -> Option<ActivityBucket> {
    let start_ms = b.start_time_millis.parse().ok()?;
    let end_ms = b.end_time_millis.parse().ok()?;
    let mut out = ActivityBucket {
        start_ms,
        end_ms,
        ..ActivityBucket::default()
    };
    for point in b.dataset.iter().flat_map(|ds| &ds.point) {
        let Some(v) = point.value.first() else {
            continue;
        };
        match point.data_type_name.as_str() {
            STEP_COUNT_DELTA => {
                out.steps += v.int_val.or(v.fp_val.map(|f| f.round() as i64)).unwrap_or(0);
            }
            CALORIES_EXPENDED => out.calories_kcal += v.fp_val.unwrap_or(0.0),
            DISTANCE_DELTA => out.distance_m += v.fp_val.unwrap_or(0.0),
            _ => {}
        }
    }
    Some(out)
}

#[must_use]
pub fn response_to_buckets(resp: &AggregateResponse) -> Vec<ActivityBucket> {
    resp.bucket.iter().filter_map(bucket_to_activity).collect()
}
