use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{CoreError, CoreResult};
use crate::goals::{MacroTargets, band_of, recommended_water_ml};
use crate::models::{
    ActivityInput, ActivityTrackRecord, BodyProfile, DailyHydrationRecord, DaySummary,
    HydrationDay, HydrationGoal, HydrationGoalView, MealDay, MealEntry, MealInput, ProfileInput,
    StepReadingOutcome, UserId, WaterLogged, WaterUndone, WorkoutDayRecord, WorkoutUpdate,
    validate_activity_input, validate_meal_input, validate_meal_type, validate_profile,
};
use crate::objects::{ObjectStore, is_external_url, object_key, validate_image};
use crate::provider::{ActivityProvider, DEFAULT_BUCKET_SECONDS, fold_daily};
use crate::settings::{
    DEFAULT_HYDRATION_HISTORY_DAYS, DEFAULT_WORKOUT_HISTORY_DAYS, Settings, format_day, parse_day,
    parse_offset,
};
use crate::store::Store;
use crate::summary::SummaryBuilder;

pub struct FitpulseService {
    store: Store,
    settings: Arc<Settings>,
    summaries: SummaryBuilder,
    objects: Option<Arc<dyn ObjectStore>>,
}

impl FitpulseService {
    pub fn new(db_path: &str, settings: Settings) -> Result<Self> {
        Ok(Self::with_store(Store::open(Path::new(db_path))?, settings))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::with_store(Store::open_in_memory()?, Settings::default()))
    }

    #[must_use]
    pub fn with_store(store: Store, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        Self {
            summaries: SummaryBuilder::new(store.clone(), Arc::clone(&settings)),
            store,
            settings,
            objects: None,
        }
    }

    #[must_use]
    pub fn with_object_store(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn day_or_today(&self, day: Option<&str>) -> CoreResult<NaiveDate> {
        match day {
            Some(raw) => parse_day(raw),
            None => Ok(self.settings.today()),
        }
    }

    /// `[start, end]` with defaults: `end` is today, `start` is `default_days`
    /// back from `end`.
    fn history_window(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        default_days: i64,
    ) -> CoreResult<(NaiveDate, NaiveDate)> {
        let end = self.day_or_today(end)?;
        let start = match start {
            Some(raw) => parse_day(raw)?,
            None => end - Duration::days(default_days - 1),
        };
        if start > end {
            return Err(CoreError::validation("start must not be after end"));
        }
        Ok((start, end))
    }

    // --- Summaries ---

    pub async fn get_day_summary(&self, user: &UserId, day: Option<&str>) -> CoreResult<DaySummary> {
        let day = self.day_or_today(day)?;
        self.summaries.build_day_summary(user, day).await
    }

    /// Missing bounds default to the trailing week ending today (or ending on
    /// the one bound given).
    pub async fn get_range_summary(
        &self,
        user: &UserId,
        start: Option<&str>,
        end: Option<&str>,
    ) -> CoreResult<Vec<DaySummary>> {
        let (start, end) = match (start, end) {
            (Some(s), Some(e)) => (parse_day(s)?, parse_day(e)?),
            (Some(s), None) => (parse_day(s)?, self.settings.today()),
            (None, Some(e)) => self.summaries.default_range(parse_day(e)?),
            (None, None) => self.summaries.default_range(self.settings.today()),
        };
        self.summaries.build_range_summary(user, start, end).await
    }

    // --- Device steps ---

    /// Record a cumulative device step counter reading.
    ///
    /// `tz` overrides the configured day offset for this reading only.
    pub async fn apply_device_step_reading(
        &self,
        user: &UserId,
        total: i64,
        at: Option<DateTime<Utc>>,
        tz: Option<&str>,
    ) -> CoreResult<StepReadingOutcome> {
        if total < 0 {
            return Err(CoreError::validation("Step total must be non-negative"));
        }
        let offset = match tz {
            Some(raw) => parse_offset(raw)?,
            None => self.settings.day_offset,
        };
        let day = at.unwrap_or_else(Utc::now).with_timezone(&offset).date_naive();
        let uid = user.clone();
        let outcome = self
            .store
            .write(move |db| db.apply_step_reading(&uid, total, day))
            .await?;
        tracing::info!(
            %user,
            %day,
            total,
            state = ?outcome.state,
            counter_reset = outcome.counter_reset,
            "applied step reading"
        );
        Ok(outcome)
    }

    // --- Body profile ---

    pub async fn get_body_profile(&self, user: &UserId) -> CoreResult<BodyProfile> {
        let uid = user.clone();
        let profile = self
            .store
            .read(move |db| db.get_body_profile(&uid))
            .await?
            .ok_or_else(|| CoreError::not_found("Profile not found"))?;
        Ok(self.with_profile_url(profile).await)
    }

    pub async fn create_body_profile(
        &self,
        user: &UserId,
        input: ProfileInput,
    ) -> CoreResult<BodyProfile> {
        validate_profile(&input)?;
        let uid = user.clone();
        let offset = self.settings.day_offset;
        let created = self
            .store
            .write(move |db| db.create_body_profile(&uid, &input, offset))
            .await?;
        created.ok_or_else(|| CoreError::conflict("Profile already exists"))
    }

    pub async fn upsert_body_profile(
        &self,
        user: &UserId,
        input: ProfileInput,
    ) -> CoreResult<BodyProfile> {
        validate_profile(&input)?;
        let uid = user.clone();
        let offset = self.settings.day_offset;
        let profile = self
            .store
            .write(move |db| db.upsert_body_profile(&uid, &input, offset))
            .await?;
        Ok(self.with_profile_url(profile).await)
    }

    pub async fn upload_profile_photo(
        &self,
        user: &UserId,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> CoreResult<BodyProfile> {
        let objects = self.object_store()?;
        let ext = validate_image(&bytes, content_type)?;
        let uid = user.clone();
        if self.store.read(move |db| db.get_body_profile(&uid)).await?.is_none() {
            return Err(CoreError::not_found("Profile not found"));
        }

        let key = object_key(user, "profile", &bytes, ext, Utc::now());
        objects.put_object(&key, bytes, content_type).await?;
        let uid = user.clone();
        let stored_key = key.clone();
        self.store
            .write(move |db| db.set_profile_image(&uid, &stored_key))
            .await?;
        tracing::info!(%user, %key, "stored profile photo");
        self.get_body_profile(user).await
    }

    async fn with_profile_url(&self, mut profile: BodyProfile) -> BodyProfile {
        if let Some(key) = &profile.image_key {
            profile.image_url = Some(
                self.image_url(key, self.settings.profile_image_ttl_seconds)
                    .await,
            );
        }
        profile
    }

    // --- Hydration ---

    pub async fn set_hydration_goal(
        &self,
        user: &UserId,
        daily_ml: i64,
    ) -> CoreResult<(HydrationGoal, DailyHydrationRecord)> {
        if daily_ml <= 0 {
            return Err(CoreError::validation("daily_ml must be greater than 0"));
        }
        let uid = user.clone();
        let offset = self.settings.day_offset;
        let result = self
            .store
            .write(move |db| db.set_hydration_goal(&uid, daily_ml, offset))
            .await?;
        tracing::info!(%user, daily_ml, "set hydration goal");
        Ok(result)
    }

    pub async fn get_hydration_goal(&self, user: &UserId) -> CoreResult<HydrationGoalView> {
        let uid = user.clone();
        let (goal, profile) = self
            .store
            .read(move |db| Ok((db.get_active_hydration_goal(&uid)?, db.get_body_profile(&uid)?)))
            .await?;
        let bmi = profile.as_ref().and_then(|p| p.bmi);
        let weight = profile.as_ref().and_then(|p| p.weight_kg);
        Ok(HydrationGoalView {
            goal,
            bmi,
            bmi_band: band_of(bmi),
            suggested_ml: recommended_water_ml(weight, bmi),
        })
    }

    /// Replace the active goal with the profile's recommendation.
    pub async fn recompute_hydration_goal_from_profile(
        &self,
        user: &UserId,
    ) -> CoreResult<(HydrationGoal, DailyHydrationRecord)> {
        let uid = user.clone();
        let profile = self
            .store
            .read(move |db| db.get_body_profile(&uid))
            .await?
            .ok_or_else(|| CoreError::not_found("Profile not found"))?;
        let suggested = recommended_water_ml(profile.weight_kg, profile.bmi).ok_or_else(|| {
            CoreError::validation("Profile needs height and weight to suggest a goal")
        })?;
        self.set_hydration_goal(user, suggested).await
    }

    pub async fn log_water(
        &self,
        user: &UserId,
        amount_ml: i64,
        at: Option<DateTime<Utc>>,
        source: Option<&str>,
    ) -> CoreResult<WaterLogged> {
        self.log_water_batch(user, vec![(amount_ml, at)], source)
            .await
    }

    /// Log several amounts atomically. Entries without a timestamp are logged now.
    pub async fn log_water_batch(
        &self,
        user: &UserId,
        entries: Vec<(i64, Option<DateTime<Utc>>)>,
        source: Option<&str>,
    ) -> CoreResult<WaterLogged> {
        if entries.is_empty() {
            return Err(CoreError::validation("No water entries to log"));
        }
        if entries.iter().any(|(ml, _)| *ml <= 0) {
            return Err(CoreError::validation("amount_ml must be greater than 0"));
        }
        let now = Utc::now();
        let entries: Vec<(i64, DateTime<Utc>)> = entries
            .into_iter()
            .map(|(ml, at)| (ml, at.unwrap_or(now)))
            .collect();
        let uid = user.clone();
        let source = source.map(str::to_string);
        let offset = self.settings.day_offset;
        let logged = self
            .store
            .write(move |db| db.log_water(&uid, &entries, source.as_deref(), offset))
            .await?;
        logged.ok_or_else(|| CoreError::validation("Set a hydration goal before logging water"))
    }

    pub async fn undo_last_water_log(&self, user: &UserId) -> CoreResult<WaterUndone> {
        let uid = user.clone();
        let offset = self.settings.day_offset;
        let today = self.settings.today();
        self.store
            .write(move |db| db.undo_last_water_log(&uid, today, offset))
            .await?
            .ok_or_else(|| CoreError::not_found("No water logs today"))
    }

    pub async fn hydration_today(&self, user: &UserId) -> CoreResult<HydrationDay> {
        let uid = user.clone();
        let offset = self.settings.day_offset;
        let today = self.settings.today();
        let (record, logs) = self
            .store
            .read(move |db| {
                Ok((
                    db.get_hydration_day(&uid, today)?,
                    db.get_water_logs_for_day(&uid, today, offset)?,
                ))
            })
            .await?;
        Ok(HydrationDay {
            day: format_day(today),
            record,
            logs,
        })
    }

    /// Daily records in the window, newest first.
    pub async fn list_hydration_days(
        &self,
        user: &UserId,
        start: Option<&str>,
        end: Option<&str>,
    ) -> CoreResult<Vec<DailyHydrationRecord>> {
        let (start, end) = self.history_window(start, end, DEFAULT_HYDRATION_HISTORY_DAYS)?;
        let uid = user.clone();
        Ok(self
            .store
            .read(move |db| db.list_hydration_days(&uid, start, end))
            .await?)
    }

    // --- Meals ---

    pub async fn log_meal(&self, user: &UserId, input: MealInput) -> CoreResult<MealEntry> {
        validate_meal_input(&input)?;
        let meal_type = validate_meal_type(&input.meal_type)?;
        let eaten_at = input.eaten_at.unwrap_or_else(Utc::now);
        let day = match input.day.as_deref() {
            Some(raw) => parse_day(raw)?,
            None => self.settings.day_of(eaten_at),
        };
        let uid = user.clone();
        let entry = self
            .store
            .read(move |db| db.insert_meal(&uid, day, &meal_type, &input, eaten_at))
            .await?;
        tracing::info!(%user, id = entry.id, day = %entry.day, "logged meal");
        Ok(entry)
    }

    pub async fn delete_meal(&self, user: &UserId, id: i64) -> CoreResult<()> {
        let uid = user.clone();
        if self.store.read(move |db| db.delete_meal(&uid, id)).await? {
            Ok(())
        } else {
            Err(CoreError::not_found(format!("Meal entry {id} not found")))
        }
    }

    /// The day's entries with totals, targets and image URLs.
    ///
    /// Every entry shares the day's `is_completed`: calories reached the
    /// calorie target.
    pub async fn list_meals_for_day(&self, user: &UserId, day: Option<&str>) -> CoreResult<MealDay> {
        let day = self.day_or_today(day)?;
        let uid = user.clone();
        let (entries, totals) = self
            .store
            .read(move |db| Ok((db.get_meals_for_day(&uid, day)?, db.meal_totals(&uid, day)?)))
            .await?;
        let targets = self.summaries.goals().macro_targets(user).await?;
        let is_completed = targets
            .as_ref()
            .is_some_and(|t| t.calories > 0.0 && totals.calories >= t.calories);

        let mut out = Vec::with_capacity(entries.len());
        for mut entry in entries {
            entry.is_completed = is_completed;
            if let Some(key) = &entry.image_key {
                entry.image_url = Some(self.image_url(key, self.settings.image_url_ttl_seconds).await);
            }
            out.push(entry);
        }
        Ok(MealDay {
            day: format_day(day),
            entries: out,
            totals,
            targets,
            is_completed,
        })
    }

    pub async fn attach_meal_image(
        &self,
        user: &UserId,
        id: i64,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> CoreResult<MealEntry> {
        let objects = self.object_store()?;
        let ext = validate_image(&bytes, content_type)?;
        let uid = user.clone();
        if self.store.read(move |db| db.get_meal(&uid, id)).await?.is_none() {
            return Err(CoreError::not_found(format!("Meal entry {id} not found")));
        }

        let key = object_key(user, "meals", &bytes, ext, Utc::now());
        objects.put_object(&key, bytes, content_type).await?;
        let uid = user.clone();
        let stored_key = key.clone();
        let mut entry = self
            .store
            .read(move |db| {
                db.set_meal_image(&uid, id, &stored_key)?;
                db.get_meal(&uid, id)
            })
            .await?
            .ok_or_else(|| CoreError::not_found(format!("Meal entry {id} not found")))?;
        entry.image_url = Some(self.image_url(&key, self.settings.image_url_ttl_seconds).await);
        Ok(entry)
    }

    pub async fn macro_targets(&self, user: &UserId) -> CoreResult<Option<MacroTargets>> {
        self.summaries.goals().macro_targets(user).await
    }

    // --- Activity tracks ---

    pub async fn create_activity_track(
        &self,
        user: &UserId,
        day: &str,
        input: ActivityInput,
    ) -> CoreResult<ActivityTrackRecord> {
        validate_activity_input(&input)?;
        let day = parse_day(day)?;
        let uid = user.clone();
        self.store
            .read(move |db| db.insert_track(&uid, day, &input))
            .await?
            .ok_or_else(|| CoreError::conflict(format!("Activity track for {day} already exists")))
    }

    pub async fn upsert_activity_track(
        &self,
        user: &UserId,
        day: &str,
        input: ActivityInput,
    ) -> CoreResult<ActivityTrackRecord> {
        validate_activity_input(&input)?;
        let day = parse_day(day)?;
        let uid = user.clone();
        Ok(self
            .store
            .read(move |db| db.replace_track(&uid, day, &input))
            .await?)
    }

    /// Overwrite only the fields present in `input`.
    pub async fn patch_activity_track(
        &self,
        user: &UserId,
        day: &str,
        input: ActivityInput,
    ) -> CoreResult<ActivityTrackRecord> {
        validate_activity_input(&input)?;
        let day = parse_day(day)?;
        let uid = user.clone();
        self.store
            .read(move |db| db.patch_track(&uid, day, &input))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("No activity track for {day}")))
    }

    /// Add `input`'s amounts onto the day's record, creating it if needed.
    pub async fn add_activity(
        &self,
        user: &UserId,
        day: &str,
        input: ActivityInput,
    ) -> CoreResult<ActivityTrackRecord> {
        validate_activity_input(&input)?;
        let day = parse_day(day)?;
        let uid = user.clone();
        Ok(self
            .store
            .read(move |db| db.add_to_track(&uid, day, &input))
            .await?)
    }

    pub async fn get_activity_track(
        &self,
        user: &UserId,
        day: &str,
    ) -> CoreResult<ActivityTrackRecord> {
        let day = parse_day(day)?;
        let uid = user.clone();
        self.store
            .read(move |db| db.get_track(&uid, day))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("No activity track for {day}")))
    }

    pub async fn list_activity_tracks(
        &self,
        user: &UserId,
        start: Option<&str>,
        end: Option<&str>,
        limit: Option<i64>,
    ) -> CoreResult<Vec<ActivityTrackRecord>> {
        let (start, end) = self.history_window(start, end, self.settings.default_range_days)?;
        let limit = limit.unwrap_or(100).clamp(1, 1000);
        let uid = user.clone();
        Ok(self
            .store
            .read(move |db| db.list_tracks(&uid, start, end, limit))
            .await?)
    }

    pub async fn delete_activity_track(&self, user: &UserId, day: &str) -> CoreResult<()> {
        let day = parse_day(day)?;
        let uid = user.clone();
        if self.store.read(move |db| db.delete_track(&uid, day)).await? {
            Ok(())
        } else {
            Err(CoreError::not_found(format!("No activity track for {day}")))
        }
    }

    // --- Workouts ---

    pub async fn upsert_workout_day(
        &self,
        user: &UserId,
        day: Option<&str>,
        update: WorkoutUpdate,
    ) -> CoreResult<WorkoutDayRecord> {
        if update.total_seconds.is_some_and(|s| s < 0) {
            return Err(CoreError::validation("total_seconds must be non-negative"));
        }
        let day = self.day_or_today(day)?;
        let uid = user.clone();
        let goal = self.settings.workout_goal_seconds;
        Ok(self
            .store
            .write(move |db| db.upsert_workout_day(&uid, day, &update, goal))
            .await?)
    }

    pub async fn get_workout_day(&self, user: &UserId, day: Option<&str>) -> CoreResult<WorkoutDayRecord> {
        let day = self.day_or_today(day)?;
        let uid = user.clone();
        self.store
            .read(move |db| db.get_workout_day(&uid, day))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("No workout recorded for {day}")))
    }

    pub async fn list_workout_days(
        &self,
        user: &UserId,
        start: Option<&str>,
        end: Option<&str>,
    ) -> CoreResult<Vec<WorkoutDayRecord>> {
        let (start, end) = self.history_window(start, end, DEFAULT_WORKOUT_HISTORY_DAYS)?;
        let uid = user.clone();
        Ok(self
            .store
            .read(move |db| db.list_workout_days(&uid, start, end))
            .await?)
    }

    pub async fn delete_workout_day(&self, user: &UserId, day: &str) -> CoreResult<()> {
        let day = parse_day(day)?;
        let uid = user.clone();
        if self.store.read(move |db| db.delete_workout_day(&uid, day)).await? {
            Ok(())
        } else {
            Err(CoreError::not_found(format!("No workout recorded for {day}")))
        }
    }

    // --- Provider sync ---

    /// Pull aggregated buckets and replace each covered day's track.
    ///
    /// Without bounds the window is the trailing week up to now. All days are
    /// replaced in one transaction.
    pub async fn sync_provider_activity(
        &self,
        provider: &dyn ActivityProvider,
        user: &UserId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        bucket_seconds: Option<u32>,
    ) -> CoreResult<Vec<ActivityTrackRecord>> {
        let until = until.unwrap_or_else(Utc::now);
        let since = match since {
            Some(s) => s,
            None => {
                let first = self.settings.day_of(until) - Duration::days(6);
                self.settings.day_bounds(first).0
            }
        };
        if since >= until {
            return Err(CoreError::validation("since must be before until"));
        }
        let bucket_seconds = bucket_seconds.unwrap_or(DEFAULT_BUCKET_SECONDS);
        if bucket_seconds == 0 {
            return Err(CoreError::validation("bucket_seconds must be greater than 0"));
        }

        let buckets = provider
            .fetch_aggregated_activity(
                user,
                since.timestamp_millis(),
                until.timestamp_millis(),
                bucket_seconds,
            )
            .await?;
        let days: Vec<(NaiveDate, ActivityInput)> =
            fold_daily(&buckets, self.settings.day_offset).into_iter().collect();
        let uid = user.clone();
        let records = self
            .store
            .write(move |db| db.replace_tracks(&uid, &days))
            .await?;
        tracing::info!(%user, buckets = buckets.len(), days = records.len(), "synced provider activity");
        Ok(records)
    }

    // --- Objects ---

    fn object_store(&self) -> CoreResult<&Arc<dyn ObjectStore>> {
        self.objects
            .as_ref()
            .ok_or_else(|| CoreError::validation("Image storage is not configured"))
    }

    /// Presigned URL for `key`, or an empty string when signing fails.
    async fn image_url(&self, key: &str, ttl_seconds: u64) -> String {
        if is_external_url(key) {
            return key.to_string();
        }
        let Some(objects) = &self.objects else {
            return String::new();
        };
        match objects.presign_download_url(key, ttl_seconds).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to presign image url");
                String::new()
            }
        }
    }
}
