use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, SecondsFormat, Utc};

use crate::error::{CoreError, CoreResult};

/// Indian Standard Time, the default day boundary.
pub const DEFAULT_DAY_OFFSET_SECONDS: i32 = 5 * 3600 + 30 * 60;
pub const DEFAULT_WORKOUT_GOAL_SECONDS: i64 = 1800;
pub const DEFAULT_MAX_RANGE_DAYS: i64 = 31;
pub const DEFAULT_RANGE_BATCH_SIZE: usize = 6;
pub const DEFAULT_RANGE_DAYS: i64 = 7;
pub const DEFAULT_HYDRATION_HISTORY_DAYS: i64 = 14;
pub const DEFAULT_WORKOUT_HISTORY_DAYS: i64 = 7;
pub const DEFAULT_IMAGE_URL_TTL_SECONDS: u64 = 12 * 3600;
pub const DEFAULT_PROFILE_IMAGE_TTL_SECONDS: u64 = 3600;

/// Tunables shared by every day-boundary and goal computation.
///
/// One value is built at startup and handed to the service; nothing below it
/// re-derives the timezone or the goal constants on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub day_offset: FixedOffset,
    pub workout_goal_seconds: i64,
    /// `None` keeps the calorie goal null when BMI is unknown.
    pub calorie_fallback_kcal: Option<f64>,
    pub max_range_days: i64,
    pub range_batch_size: usize,
    pub default_range_days: i64,
    pub image_url_ttl_seconds: u64,
    pub profile_image_ttl_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            day_offset: ist(),
            workout_goal_seconds: DEFAULT_WORKOUT_GOAL_SECONDS,
            calorie_fallback_kcal: None,
            max_range_days: DEFAULT_MAX_RANGE_DAYS,
            range_batch_size: DEFAULT_RANGE_BATCH_SIZE,
            default_range_days: DEFAULT_RANGE_DAYS,
            image_url_ttl_seconds: DEFAULT_IMAGE_URL_TTL_SECONDS,
            profile_image_ttl_seconds: DEFAULT_PROFILE_IMAGE_TTL_SECONDS,
        }
    }
}

impl Settings {
    pub fn from_env() -> CoreResult<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Reads overrides through `get` so tests never touch the process env.
    pub fn from_env_with<F>(mut get: F) -> CoreResult<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        if let Some(raw) = get("FITPULSE_DAY_OFFSET") {
            settings.day_offset = parse_offset(&raw)?;
        }
        if let Some(raw) = get("FITPULSE_WORKOUT_GOAL_SECONDS") {
            settings.workout_goal_seconds = raw.trim().parse().map_err(|_| {
                CoreError::validation(format!("FITPULSE_WORKOUT_GOAL_SECONDS: invalid '{raw}'"))
            })?;
        }
        if let Some(raw) = get("FITPULSE_CALORIE_FALLBACK_KCAL") {
            let kcal: f64 = raw.trim().parse().map_err(|_| {
                CoreError::validation(format!("FITPULSE_CALORIE_FALLBACK_KCAL: invalid '{raw}'"))
            })?;
            settings.calorie_fallback_kcal = (kcal > 0.0).then_some(kcal);
        }
        if let Some(raw) = get("FITPULSE_RANGE_BATCH_SIZE") {
            settings.range_batch_size = match raw.trim().parse() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(CoreError::validation(format!(
                        "FITPULSE_RANGE_BATCH_SIZE: invalid '{raw}'"
                    )));
                }
            };
        }
        Ok(settings)
    }

    /// Calendar day containing `instant` at the configured offset.
    #[must_use]
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.day_offset).date_naive()
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.day_of(Utc::now())
    }

    /// UTC half-open window `[start, end)` covering `day` at the configured offset.
    #[must_use]
    pub fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        day_bounds_at(day, self.day_offset)
    }
}

#[must_use]
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_DAY_OFFSET_SECONDS).expect("valid offset")
}

fn utc_offset() -> FixedOffset {
    FixedOffset::east_opt(0).expect("valid offset")
}

#[must_use]
pub fn day_bounds_at(day: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = day.and_time(NaiveTime::MIN);
    let start = (local_midnight - Duration::seconds(offset.local_minus_utc().into())).and_utc();
    (start, start + Duration::days(1))
}

/// Parse `Z`, `UTC`, `IST`, `+05:30`, `-0400` or `+7` into a fixed offset.
pub fn parse_offset(raw: &str) -> CoreResult<FixedOffset> {
    let s = raw.trim();
    match s.to_ascii_uppercase().as_str() {
        "Z" | "UTC" | "GMT" => return Ok(utc_offset()),
        "IST" | "ASIA/KOLKATA" | "ASIA/CALCUTTA" => return Ok(ist()),
        _ => {}
    }
    let invalid = || CoreError::validation(format!("Invalid timezone offset '{raw}'"));
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    if !rest.is_ascii() {
        return Err(invalid());
    }
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Fixed-width UTC timestamp so lexical order in SQLite matches time order.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[must_use]
pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` calendar day.
pub fn parse_day(raw: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::validation(format!("Invalid date '{raw}'. Must be YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.day_offset.local_minus_utc(), 19_800);
        assert_eq!(s.workout_goal_seconds, 1800);
        assert_eq!(s.max_range_days, 31);
        assert_eq!(s.range_batch_size, 6);
        assert!(s.calorie_fallback_kcal.is_none());
    }

    #[test]
    fn test_from_env_reads_values() {
        let get = |k: &str| match k {
            "FITPULSE_DAY_OFFSET" => Some("-04:00".into()),
            "FITPULSE_WORKOUT_GOAL_SECONDS" => Some("2400".into()),
            "FITPULSE_CALORIE_FALLBACK_KCAL" => Some("2000".into()),
            _ => None,
        };
        let s = Settings::from_env_with(get).unwrap();
        assert_eq!(s.day_offset.local_minus_utc(), -4 * 3600);
        assert_eq!(s.workout_goal_seconds, 2400);
        assert_eq!(s.calorie_fallback_kcal, Some(2000.0));
    }

    #[test]
    fn test_from_env_rejects_bad_batch_size() {
        let get = |k: &str| (k == "FITPULSE_RANGE_BATCH_SIZE").then(|| "0".to_string());
        assert!(Settings::from_env_with(get).is_err());
    }

    #[test]
    fn test_parse_offset_forms() {
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("IST").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_offset("+0530").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_offset("+7").unwrap().local_minus_utc(), 7 * 3600);
        assert!(parse_offset("05:30").is_err());
        assert!(parse_offset("+25:00").is_err());
    }

    #[test]
    fn test_parse_offset_rejects_non_ascii() {
        // Four bytes long, so it would take the HHMM path
        assert!(matches!(parse_offset("+1\u{e9}1"), Err(CoreError::Validation(_))));
        assert!(matches!(parse_offset("-\u{e9}\u{e9}"), Err(CoreError::Validation(_))));
        assert!(parse_offset("+\u{661}\u{661}:00").is_err());
    }

    #[test]
    fn test_day_of_crosses_midnight_in_ist() {
        let s = Settings::default();
        // 19:00 UTC is 00:30 the next day in IST
        let instant = Utc.with_ymd_and_hms(2025, 3, 9, 19, 0, 0).unwrap();
        assert_eq!(s.day_of(instant), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
    }

    #[test]
    fn test_day_bounds_ist() {
        let s = Settings::default();
        let (start, end) = s.day_bounds(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(format_instant(start), "2025-03-09T18:30:00.000Z");
        assert_eq!(format_instant(end), "2025-03-10T18:30:00.000Z");
    }

    #[test]
    fn test_parse_day() {
        assert!(parse_day("2025-02-30").is_err());
        assert!(parse_day("yesterday").is_err());
        assert_eq!(
            parse_day("2025-01-31").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
    }
}
