use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior, params};

use crate::completion::{ZeroGoalFallback, percent};
use crate::goals::{self, band_of};
use crate::models::{
    ActivityInput, ActivityTrackRecord, BodyProfile, DailyHydrationRecord, HydrationGoal,
    MacroTotals, MealEntry, MealInput, ProfileInput, StepCursor, StepReadingOutcome, UserId,
    WaterLogEntry, WaterLogged, WaterUndone, WorkoutDayRecord, WorkoutUpdate,
};
use crate::settings::{day_bounds_at, format_day, format_instant};
use crate::steps;

pub const DEVICE_SOURCE: &str = "device";

pub struct Database {
    conn: Connection,
}

fn now() -> String {
    format_instant(Utc::now())
}

fn today_at(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

fn bounds(day: NaiveDate, offset: FixedOffset) -> (String, String) {
    let (start, end) = day_bounds_at(day, offset);
    (format_instant(start), format_instant(end))
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS body_profiles (
                    user_id TEXT PRIMARY KEY,
                    name TEXT,
                    age INTEGER,
                    gender TEXT,
                    height_cm REAL,
                    weight_kg REAL,
                    bmi REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS hydration_goals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    daily_ml INTEGER NOT NULL CHECK (daily_ml > 0),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_hydration_goals_active
                    ON hydration_goals(user_id) WHERE is_active = 1;

                CREATE TABLE IF NOT EXISTS water_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    amount_ml INTEGER NOT NULL CHECK (amount_ml > 0),
                    source TEXT,
                    logged_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_water_logs_user_time ON water_logs(user_id, logged_at);

                CREATE TABLE IF NOT EXISTS hydration_daily (
                    user_id TEXT NOT NULL,
                    day TEXT NOT NULL,
                    goal_ml INTEGER NOT NULL,
                    consumed_ml INTEGER NOT NULL,
                    met_goal INTEGER NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, day)
                );

                CREATE TABLE IF NOT EXISTS meal_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    day TEXT NOT NULL,
                    meal_type TEXT NOT NULL,
                    food_name TEXT NOT NULL,
                    quantity REAL,
                    unit TEXT,
                    calories REAL NOT NULL DEFAULT 0,
                    protein_g REAL NOT NULL DEFAULT 0,
                    carbs_g REAL NOT NULL DEFAULT 0,
                    fat_g REAL NOT NULL DEFAULT 0,
                    fiber_g REAL NOT NULL DEFAULT 0,
                    eaten_at TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_meal_entries_user_day ON meal_entries(user_id, day);

                CREATE TABLE IF NOT EXISTS activity_tracks (
                    user_id TEXT NOT NULL,
                    day TEXT NOT NULL,
                    steps INTEGER NOT NULL DEFAULT 0,
                    distance_m REAL NOT NULL DEFAULT 0,
                    calories_kcal REAL NOT NULL DEFAULT 0,
                    active_seconds INTEGER NOT NULL DEFAULT 0,
                    source TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, day)
                );

                CREATE TABLE IF NOT EXISTS step_cursors (
                    user_id TEXT PRIMARY KEY,
                    cursor_day TEXT NOT NULL,
                    baseline_total INTEGER NOT NULL,
                    last_total INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Workout tracking and image attachments came after the first release
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS workout_days (
                    user_id TEXT NOT NULL,
                    day TEXT NOT NULL,
                    total_seconds INTEGER NOT NULL DEFAULT 0,
                    is_completed INTEGER NOT NULL DEFAULT 0,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, day)
                );

                ALTER TABLE meal_entries ADD COLUMN image_key TEXT;
                ALTER TABLE body_profiles ADD COLUMN image_key TEXT;

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    // --- Row mapping helpers ---

    fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<BodyProfile> {
        let bmi: Option<f64> = row.get(6)?;
        Ok(BodyProfile {
            user_id: row.get(0)?,
            name: row.get(1)?,
            age: row.get(2)?,
            gender: row.get(3)?,
            height_cm: row.get(4)?,
            weight_kg: row.get(5)?,
            bmi,
            bmi_band: band_of(bmi),
            image_key: row.get(7)?,
            image_url: None,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn goal_from_row(row: &rusqlite::Row) -> rusqlite::Result<HydrationGoal> {
        Ok(HydrationGoal {
            id: row.get(0)?,
            daily_ml: row.get(1)?,
            is_active: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn water_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<WaterLogEntry> {
        Ok(WaterLogEntry {
            id: row.get(0)?,
            amount_ml: row.get(1)?,
            source: row.get(2)?,
            logged_at: row.get(3)?,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn hydration_day_from_row(row: &rusqlite::Row) -> rusqlite::Result<DailyHydrationRecord> {
        let goal_ml: i64 = row.get(1)?;
        let consumed_ml: i64 = row.get(2)?;
        Ok(DailyHydrationRecord {
            day: row.get(0)?,
            goal_ml,
            consumed_ml,
            met_goal: row.get(3)?,
            percent_consumed: percent(consumed_ml as f64, goal_ml as f64, ZeroGoalFallback::Zero),
            remaining_ml: (goal_ml - consumed_ml).max(0),
            updated_at: row.get(4)?,
        })
    }

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<MealEntry> {
        Ok(MealEntry {
            id: row.get(0)?,
            day: row.get(1)?,
            meal_type: row.get(2)?,
            food_name: row.get(3)?,
            quantity: row.get(4)?,
            unit: row.get(5)?,
            calories: row.get(6)?,
            protein_g: row.get(7)?,
            carbs_g: row.get(8)?,
            fat_g: row.get(9)?,
            fiber_g: row.get(10)?,
            image_key: row.get(11)?,
            image_url: None,
            is_completed: false,
            eaten_at: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    fn track_from_row(row: &rusqlite::Row) -> rusqlite::Result<ActivityTrackRecord> {
        Ok(ActivityTrackRecord {
            day: row.get(0)?,
            steps: row.get(1)?,
            distance_m: row.get(2)?,
            calories_kcal: row.get(3)?,
            active_seconds: row.get(4)?,
            source: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn cursor_from_row(row: &rusqlite::Row) -> rusqlite::Result<StepCursor> {
        let day_str: String = row.get(0)?;
        let cursor_day = NaiveDate::parse_from_str(&day_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(StepCursor {
            cursor_day,
            baseline_total: row.get(1)?,
            last_total: row.get(2)?,
        })
    }

    fn workout_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutDayRecord> {
        Ok(WorkoutDayRecord {
            day: row.get(0)?,
            total_seconds: row.get(1)?,
            is_completed: row.get(2)?,
            notes: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    // --- Body profiles ---

    pub fn get_body_profile(&self, user: &UserId) -> Result<Option<BodyProfile>> {
        get_profile(&self.conn, user)
    }

    /// Insert a profile only if the user has none. `None` means one already exists.
    pub fn create_body_profile(
        &mut self,
        user: &UserId,
        input: &ProfileInput,
        offset: FixedOffset,
    ) -> Result<Option<BodyProfile>> {
        let tx = self.conn.transaction()?;
        if get_profile(&tx, user)?.is_some() {
            return Ok(None);
        }
        let profile = write_profile(&tx, user, input, None)?;
        sync_goal_from_profile(&tx, user, &profile, offset)?;
        tx.commit()?;
        Ok(Some(profile))
    }

    /// Merge `input` into the stored profile and recompute BMI.
    ///
    /// When height or weight changed (or no goal is active yet) and BMI is
    /// derivable, the hydration goal is superseded in the same transaction.
    pub fn upsert_body_profile(
        &mut self,
        user: &UserId,
        input: &ProfileInput,
        offset: FixedOffset,
    ) -> Result<BodyProfile> {
        let tx = self.conn.transaction()?;
        let existing = get_profile(&tx, user)?;
        let profile = write_profile(&tx, user, input, existing.as_ref())?;
        let body_changed = input.height_cm.is_some() || input.weight_kg.is_some();
        if body_changed || active_goal(&tx, user)?.is_none() {
            sync_goal_from_profile(&tx, user, &profile, offset)?;
        }
        tx.commit()?;
        Ok(profile)
    }

    pub fn set_profile_image(&self, user: &UserId, key: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE body_profiles SET image_key = ?1, updated_at = ?2 WHERE user_id = ?3",
            params![key, now(), user.as_str()],
        )?;
        Ok(rows > 0)
    }

    // --- Hydration goals ---

    pub fn get_active_hydration_goal(&self, user: &UserId) -> Result<Option<HydrationGoal>> {
        active_goal(&self.conn, user)
    }

    pub fn get_hydration_goal_history(&self, user: &UserId) -> Result<Vec<HydrationGoal>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, daily_ml, is_active, created_at FROM hydration_goals
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let goals = stmt
            .query_map(params![user.as_str()], Self::goal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    /// Deactivate every prior goal, insert the new active one, and refresh today.
    pub fn set_hydration_goal(
        &mut self,
        user: &UserId,
        daily_ml: i64,
        offset: FixedOffset,
    ) -> Result<(HydrationGoal, DailyHydrationRecord)> {
        let tx = self.conn.transaction()?;
        let goal = supersede_goal(&tx, user, daily_ml)?;
        let record = recompute_hydration_day(&tx, user, today_at(offset), offset)?;
        tx.commit()?;
        Ok((goal, record))
    }

    // --- Water logs ---

    /// Insert every `(amount_ml, logged_at)` pair and recompute the touched days.
    ///
    /// Returns `None` without writing anything when no goal is active.
    pub fn log_water(
        &mut self,
        user: &UserId,
        entries: &[(i64, DateTime<Utc>)],
        source: Option<&str>,
        offset: FixedOffset,
    ) -> Result<Option<WaterLogged>> {
        let tx = self.conn.transaction()?;
        if active_goal(&tx, user)?.is_none() {
            return Ok(None);
        }

        let mut logged = Vec::with_capacity(entries.len());
        let mut days = BTreeSet::new();
        for (amount_ml, at) in entries {
            let logged_at = format_instant(*at);
            tx.execute(
                "INSERT INTO water_logs (user_id, amount_ml, source, logged_at) VALUES (?1, ?2, ?3, ?4)",
                params![user.as_str(), amount_ml, source, logged_at],
            )?;
            logged.push(WaterLogEntry {
                id: tx.last_insert_rowid(),
                amount_ml: *amount_ml,
                source: source.map(str::to_string),
                logged_at,
            });
            days.insert(at.with_timezone(&offset).date_naive());
        }

        let mut record = None;
        for day in days {
            record = Some(recompute_hydration_day(&tx, user, day, offset)?);
        }
        let record = record.context("No water entries to log")?;
        tx.commit()?;
        Ok(Some(WaterLogged {
            entries: logged,
            record,
        }))
    }

    /// Remove the latest log of `day`. `None` if that day has no logs.
    pub fn undo_last_water_log(
        &mut self,
        user: &UserId,
        day: NaiveDate,
        offset: FixedOffset,
    ) -> Result<Option<WaterUndone>> {
        let tx = self.conn.transaction()?;
        let last = water_logs(&tx, user, day, offset)?.pop();
        let Some(removed) = last else {
            return Ok(None);
        };
        tx.execute("DELETE FROM water_logs WHERE id = ?1", params![removed.id])?;
        let record = recompute_hydration_day(&tx, user, day, offset)?;
        tx.commit()?;
        Ok(Some(WaterUndone { removed, record }))
    }

    pub fn get_water_logs_for_day(
        &self,
        user: &UserId,
        day: NaiveDate,
        offset: FixedOffset,
    ) -> Result<Vec<WaterLogEntry>> {
        water_logs(&self.conn, user, day, offset)
    }

    pub fn sum_water_ml(&self, user: &UserId, day: NaiveDate, offset: FixedOffset) -> Result<i64> {
        sum_water(&self.conn, user, day, offset)
    }

    pub fn get_hydration_day(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<Option<DailyHydrationRecord>> {
        hydration_day(&self.conn, user, day)
    }

    /// Materialized daily records in `[start, end]`, newest first.
    pub fn list_hydration_days(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyHydrationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT day, goal_ml, consumed_ml, met_goal, updated_at FROM hydration_daily
             WHERE user_id = ?1 AND day BETWEEN ?2 AND ?3 ORDER BY day DESC",
        )?;
        let records = stmt
            .query_map(
                params![user.as_str(), format_day(start), format_day(end)],
                Self::hydration_day_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // --- Meals ---

    pub fn insert_meal(
        &self,
        user: &UserId,
        day: NaiveDate,
        meal_type: &str,
        input: &MealInput,
        eaten_at: DateTime<Utc>,
    ) -> Result<MealEntry> {
        self.conn.execute(
            "INSERT INTO meal_entries (user_id, day, meal_type, food_name, quantity, unit,
                calories, protein_g, carbs_g, fat_g, fiber_g, eaten_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                user.as_str(),
                format_day(day),
                meal_type,
                input.food_name.trim(),
                input.quantity,
                input.unit,
                input.calories,
                input.protein_g,
                input.carbs_g,
                input.fat_g,
                input.fiber_g,
                format_instant(eaten_at),
                now(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_meal(user, id)?
            .context("Meal entry not found after insert")
    }

    pub fn get_meal(&self, user: &UserId, id: i64) -> Result<Option<MealEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, day, meal_type, food_name, quantity, unit, calories, protein_g, carbs_g,
                    fat_g, fiber_g, image_key, eaten_at, created_at
             FROM meal_entries WHERE user_id = ?1 AND id = ?2",
        )?;
        let mut rows = stmt.query(params![user.as_str(), id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::meal_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_meal(&self, user: &UserId, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM meal_entries WHERE user_id = ?1 AND id = ?2",
            params![user.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn set_meal_image(&self, user: &UserId, id: i64, key: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE meal_entries SET image_key = ?1 WHERE user_id = ?2 AND id = ?3",
            params![key, user.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_meals_for_day(&self, user: &UserId, day: NaiveDate) -> Result<Vec<MealEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, day, meal_type, food_name, quantity, unit, calories, protein_g, carbs_g,
                    fat_g, fiber_g, image_key, eaten_at, created_at
             FROM meal_entries WHERE user_id = ?1 AND day = ?2
             ORDER BY eaten_at, id",
        )?;
        let entries = stmt
            .query_map(params![user.as_str(), format_day(day)], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn meal_totals(&self, user: &UserId, day: NaiveDate) -> Result<MacroTotals> {
        let totals = self.conn.query_row(
            "SELECT COALESCE(SUM(calories), 0), COALESCE(SUM(protein_g), 0),
                    COALESCE(SUM(carbs_g), 0), COALESCE(SUM(fat_g), 0), COALESCE(SUM(fiber_g), 0)
             FROM meal_entries WHERE user_id = ?1 AND day = ?2",
            params![user.as_str(), format_day(day)],
            |row| {
                Ok(MacroTotals {
                    calories: row.get(0)?,
                    protein_g: row.get(1)?,
                    carbs_g: row.get(2)?,
                    fat_g: row.get(3)?,
                    fiber_g: row.get(4)?,
                })
            },
        )?;
        Ok(totals)
    }

    // --- Activity tracks ---

    pub fn get_track(&self, user: &UserId, day: NaiveDate) -> Result<Option<ActivityTrackRecord>> {
        track(&self.conn, user, day)
    }

    /// Create-only insert. `None` means the day already has a record.
    pub fn insert_track(
        &self,
        user: &UserId,
        day: NaiveDate,
        input: &ActivityInput,
    ) -> Result<Option<ActivityTrackRecord>> {
        let now = now();
        let rows = self.conn.execute(
            "INSERT INTO activity_tracks (user_id, day, steps, distance_m, calories_kcal,
                active_seconds, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(user_id, day) DO NOTHING",
            params![
                user.as_str(),
                format_day(day),
                input.steps.unwrap_or(0),
                input.distance_m.unwrap_or(0.0),
                input.calories_kcal.unwrap_or(0.0),
                input.active_seconds.unwrap_or(0),
                input.source,
                now,
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        track(&self.conn, user, day)
    }

    /// Replace the whole record; fields not given reset to zero.
    pub fn replace_track(
        &self,
        user: &UserId,
        day: NaiveDate,
        input: &ActivityInput,
    ) -> Result<ActivityTrackRecord> {
        replace_track(&self.conn, user, day, input)?;
        track(&self.conn, user, day)?.context("Activity track not found after upsert")
    }

    /// Update only the given fields of an existing record. `None` if absent.
    pub fn patch_track(
        &self,
        user: &UserId,
        day: NaiveDate,
        input: &ActivityInput,
    ) -> Result<Option<ActivityTrackRecord>> {
        let rows = self.conn.execute(
            "UPDATE activity_tracks SET
                steps = COALESCE(?3, steps),
                distance_m = COALESCE(?4, distance_m),
                calories_kcal = COALESCE(?5, calories_kcal),
                active_seconds = COALESCE(?6, active_seconds),
                source = COALESCE(?7, source),
                updated_at = ?8
             WHERE user_id = ?1 AND day = ?2",
            params![
                user.as_str(),
                format_day(day),
                input.steps,
                input.distance_m,
                input.calories_kcal,
                input.active_seconds,
                input.source,
                now(),
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        track(&self.conn, user, day)
    }

    /// Add the given amounts onto the day's record, creating it if needed.
    pub fn add_to_track(
        &self,
        user: &UserId,
        day: NaiveDate,
        input: &ActivityInput,
    ) -> Result<ActivityTrackRecord> {
        let now = now();
        self.conn.execute(
            "INSERT INTO activity_tracks (user_id, day, steps, distance_m, calories_kcal,
                active_seconds, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(user_id, day) DO UPDATE SET
                steps = activity_tracks.steps + excluded.steps,
                distance_m = activity_tracks.distance_m + excluded.distance_m,
                calories_kcal = activity_tracks.calories_kcal + excluded.calories_kcal,
                active_seconds = activity_tracks.active_seconds + excluded.active_seconds,
                source = COALESCE(excluded.source, activity_tracks.source),
                updated_at = excluded.updated_at",
            params![
                user.as_str(),
                format_day(day),
                input.steps.unwrap_or(0),
                input.distance_m.unwrap_or(0.0),
                input.calories_kcal.unwrap_or(0.0),
                input.active_seconds.unwrap_or(0),
                input.source,
                now,
            ],
        )?;
        track(&self.conn, user, day)?.context("Activity track not found after add")
    }

    /// Replace several days at once, all or nothing.
    pub fn replace_tracks(
        &mut self,
        user: &UserId,
        days: &[(NaiveDate, ActivityInput)],
    ) -> Result<Vec<ActivityTrackRecord>> {
        let tx = self.conn.transaction()?;
        let mut records = Vec::with_capacity(days.len());
        for (day, input) in days {
            replace_track(&tx, user, *day, input)?;
            records.push(track(&tx, user, *day)?.context("Activity track not found after sync")?);
        }
        tx.commit()?;
        Ok(records)
    }

    pub fn delete_track(&self, user: &UserId, day: NaiveDate) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM activity_tracks WHERE user_id = ?1 AND day = ?2",
            params![user.as_str(), format_day(day)],
        )?;
        Ok(rows > 0)
    }

    /// Records in `[start, end]`, newest first, at most `limit`.
    pub fn list_tracks(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
        limit: i64,
    ) -> Result<Vec<ActivityTrackRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT day, steps, distance_m, calories_kcal, active_seconds, source, created_at, updated_at
             FROM activity_tracks WHERE user_id = ?1 AND day BETWEEN ?2 AND ?3
             ORDER BY day DESC LIMIT ?4",
        )?;
        let records = stmt
            .query_map(
                params![user.as_str(), format_day(start), format_day(end), limit],
                Self::track_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // --- Step cursor ---

    pub fn get_step_cursor(&self, user: &UserId) -> Result<Option<StepCursor>> {
        step_cursor(&self.conn, user)
    }

    /// Apply one device reading under an IMMEDIATE transaction.
    ///
    /// The write lock is taken before the cursor is read, so two readings for
    /// the same user can never interleave their read-modify-write.
    pub fn apply_step_reading(
        &mut self,
        user: &UserId,
        total: i64,
        day: NaiveDate,
    ) -> Result<StepReadingOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let prev = step_cursor(&tx, user)?;
        let t = steps::advance(prev, total, day);

        let finalized = match t.finalize {
            Some((prev_day, steps)) => {
                merge_steps_max(&tx, user, prev_day, steps)?;
                track(&tx, user, prev_day)?
            }
            None => None,
        };
        set_day_steps(&tx, user, day, t.day_steps)?;

        tx.execute(
            "INSERT INTO step_cursors (user_id, cursor_day, baseline_total, last_total, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                cursor_day = excluded.cursor_day,
                baseline_total = excluded.baseline_total,
                last_total = excluded.last_total,
                updated_at = excluded.updated_at",
            params![
                user.as_str(),
                format_day(t.cursor.cursor_day),
                t.cursor.baseline_total,
                t.cursor.last_total,
                now(),
            ],
        )?;

        let record = track(&tx, user, day)?.context("Activity track missing after step reading")?;
        tx.commit()?;
        Ok(StepReadingOutcome {
            state: t.state,
            counter_reset: t.counter_reset,
            cursor: t.cursor,
            record,
            finalized,
        })
    }

    // --- Workouts ---

    pub fn get_workout_day(&self, user: &UserId, day: NaiveDate) -> Result<Option<WorkoutDayRecord>> {
        workout_day(&self.conn, user, day)
    }

    /// Merge `update` into the day's record.
    ///
    /// The day counts as completed when flagged so or once `total_seconds`
    /// reaches `goal_seconds`.
    pub fn upsert_workout_day(
        &mut self,
        user: &UserId,
        day: NaiveDate,
        update: &WorkoutUpdate,
        goal_seconds: i64,
    ) -> Result<WorkoutDayRecord> {
        let tx = self.conn.transaction()?;
        let existing = workout_day(&tx, user, day)?;
        let total_seconds = update
            .total_seconds
            .or(existing.as_ref().map(|w| w.total_seconds))
            .unwrap_or(0);
        let flagged = update
            .is_completed
            .or(existing.as_ref().map(|w| w.is_completed))
            .unwrap_or(false);
        let is_completed = flagged || (goal_seconds > 0 && total_seconds >= goal_seconds);
        let notes = update
            .notes
            .clone()
            .or_else(|| existing.and_then(|w| w.notes));

        let now = now();
        tx.execute(
            "INSERT INTO workout_days (user_id, day, total_seconds, is_completed, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_id, day) DO UPDATE SET
                total_seconds = excluded.total_seconds,
                is_completed = excluded.is_completed,
                notes = excluded.notes,
                updated_at = excluded.updated_at",
            params![
                user.as_str(),
                format_day(day),
                total_seconds,
                is_completed,
                notes,
                now,
            ],
        )?;
        let record = workout_day(&tx, user, day)?.context("Workout day not found after upsert")?;
        tx.commit()?;
        Ok(record)
    }

    pub fn delete_workout_day(&self, user: &UserId, day: NaiveDate) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM workout_days WHERE user_id = ?1 AND day = ?2",
            params![user.as_str(), format_day(day)],
        )?;
        Ok(rows > 0)
    }

    pub fn list_workout_days(
        &self,
        user: &UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WorkoutDayRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT day, total_seconds, is_completed, notes, updated_at FROM workout_days
             WHERE user_id = ?1 AND day BETWEEN ?2 AND ?3 ORDER BY day DESC",
        )?;
        let records = stmt
            .query_map(
                params![user.as_str(), format_day(start), format_day(end)],
                Self::workout_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

// Shared by plain reads and by transactions (a `Transaction` derefs to `Connection`).

fn get_profile(conn: &Connection, user: &UserId) -> Result<Option<BodyProfile>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, name, age, gender, height_cm, weight_kg, bmi, image_key, created_at, updated_at
         FROM body_profiles WHERE user_id = ?1",
    )?;
    let mut rows = stmt.query(params![user.as_str()])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Database::profile_from_row(row)?))
    } else {
        Ok(None)
    }
}

fn write_profile(
    conn: &Connection,
    user: &UserId,
    input: &ProfileInput,
    existing: Option<&BodyProfile>,
) -> Result<BodyProfile> {
    let name = input
        .name
        .as_ref()
        .map(|n| n.trim().to_string())
        .or_else(|| existing.and_then(|p| p.name.clone()));
    let age = input.age.or(existing.and_then(|p| p.age));
    let gender = input
        .gender
        .clone()
        .or_else(|| existing.and_then(|p| p.gender.clone()));
    let height_cm = input.height_cm.or(existing.and_then(|p| p.height_cm));
    let weight_kg = input.weight_kg.or(existing.and_then(|p| p.weight_kg));
    let bmi = goals::compute_bmi(weight_kg, height_cm);

    let now = now();
    conn.execute(
        "INSERT INTO body_profiles (user_id, name, age, gender, height_cm, weight_kg, bmi, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(user_id) DO UPDATE SET
            name = excluded.name,
            age = excluded.age,
            gender = excluded.gender,
            height_cm = excluded.height_cm,
            weight_kg = excluded.weight_kg,
            bmi = excluded.bmi,
            updated_at = excluded.updated_at",
        params![user.as_str(), name, age, gender, height_cm, weight_kg, bmi, now],
    )?;
    get_profile(conn, user)?.context("Profile not found after upsert")
}

fn sync_goal_from_profile(
    conn: &Connection,
    user: &UserId,
    profile: &BodyProfile,
    offset: FixedOffset,
) -> Result<Option<HydrationGoal>> {
    let Some(daily_ml) = goals::recommended_water_ml(profile.weight_kg, profile.bmi) else {
        return Ok(None);
    };
    let goal = supersede_goal(conn, user, daily_ml)?;
    recompute_hydration_day(conn, user, today_at(offset), offset)?;
    tracing::info!(%user, daily_ml, bmi = ?profile.bmi, "hydration goal derived from profile");
    Ok(Some(goal))
}

fn active_goal(conn: &Connection, user: &UserId) -> Result<Option<HydrationGoal>> {
    let mut stmt = conn.prepare(
        "SELECT id, daily_ml, is_active, created_at FROM hydration_goals
         WHERE user_id = ?1 AND is_active = 1
         ORDER BY created_at DESC, id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query(params![user.as_str()])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Database::goal_from_row(row)?))
    } else {
        Ok(None)
    }
}

fn supersede_goal(conn: &Connection, user: &UserId, daily_ml: i64) -> Result<HydrationGoal> {
    conn.execute(
        "UPDATE hydration_goals SET is_active = 0 WHERE user_id = ?1 AND is_active = 1",
        params![user.as_str()],
    )?;
    conn.execute(
        "INSERT INTO hydration_goals (user_id, daily_ml, is_active, created_at) VALUES (?1, ?2, 1, ?3)",
        params![user.as_str(), daily_ml, now()],
    )?;
    active_goal(conn, user)?.context("Hydration goal not found after insert")
}

fn water_logs(
    conn: &Connection,
    user: &UserId,
    day: NaiveDate,
    offset: FixedOffset,
) -> Result<Vec<WaterLogEntry>> {
    let (start, end) = bounds(day, offset);
    let mut stmt = conn.prepare(
        "SELECT id, amount_ml, source, logged_at FROM water_logs
         WHERE user_id = ?1 AND logged_at >= ?2 AND logged_at < ?3
         ORDER BY logged_at, id",
    )?;
    let logs = stmt
        .query_map(params![user.as_str(), start, end], Database::water_log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}

fn sum_water(conn: &Connection, user: &UserId, day: NaiveDate, offset: FixedOffset) -> Result<i64> {
    let (start, end) = bounds(day, offset);
    let total = conn.query_row(
        "SELECT COALESCE(SUM(amount_ml), 0) FROM water_logs
         WHERE user_id = ?1 AND logged_at >= ?2 AND logged_at < ?3",
        params![user.as_str(), start, end],
        |row| row.get(0),
    )?;
    Ok(total)
}

fn hydration_day(
    conn: &Connection,
    user: &UserId,
    day: NaiveDate,
) -> Result<Option<DailyHydrationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT day, goal_ml, consumed_ml, met_goal, updated_at FROM hydration_daily
         WHERE user_id = ?1 AND day = ?2",
    )?;
    let mut rows = stmt.query(params![user.as_str(), format_day(day)])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Database::hydration_day_from_row(row)?))
    } else {
        Ok(None)
    }
}

/// Rebuild the day's record from the log sum and the active goal.
fn recompute_hydration_day(
    conn: &Connection,
    user: &UserId,
    day: NaiveDate,
    offset: FixedOffset,
) -> Result<DailyHydrationRecord> {
    let goal_ml = active_goal(conn, user)?.map_or(0, |g| g.daily_ml);
    let raw_ml = sum_water(conn, user, day, offset)?;
    let consumed_ml = if goal_ml > 0 { raw_ml.min(goal_ml) } else { raw_ml };
    let met_goal = goal_ml > 0 && raw_ml >= goal_ml;
    conn.execute(
        "INSERT INTO hydration_daily (user_id, day, goal_ml, consumed_ml, met_goal, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, day) DO UPDATE SET
            goal_ml = excluded.goal_ml,
            consumed_ml = excluded.consumed_ml,
            met_goal = excluded.met_goal,
            updated_at = excluded.updated_at",
        params![user.as_str(), format_day(day), goal_ml, consumed_ml, met_goal, now()],
    )?;
    hydration_day(conn, user, day)?.context("Hydration day not found after recompute")
}

fn track(conn: &Connection, user: &UserId, day: NaiveDate) -> Result<Option<ActivityTrackRecord>> {
    let mut stmt = conn.prepare(
        "SELECT day, steps, distance_m, calories_kcal, active_seconds, source, created_at, updated_at
         FROM activity_tracks WHERE user_id = ?1 AND day = ?2",
    )?;
    let mut rows = stmt.query(params![user.as_str(), format_day(day)])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Database::track_from_row(row)?))
    } else {
        Ok(None)
    }
}

fn replace_track(
    conn: &Connection,
    user: &UserId,
    day: NaiveDate,
    input: &ActivityInput,
) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO activity_tracks (user_id, day, steps, distance_m, calories_kcal,
            active_seconds, source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(user_id, day) DO UPDATE SET
            steps = excluded.steps,
            distance_m = excluded.distance_m,
            calories_kcal = excluded.calories_kcal,
            active_seconds = excluded.active_seconds,
            source = excluded.source,
            updated_at = excluded.updated_at",
        params![
            user.as_str(),
            format_day(day),
            input.steps.unwrap_or(0),
            input.distance_m.unwrap_or(0.0),
            input.calories_kcal.unwrap_or(0.0),
            input.active_seconds.unwrap_or(0),
            input.source,
            now,
        ],
    )?;
    Ok(())
}

/// Raise the day's steps to at least `steps`; never lowers a stored count.
/// Overwrite the day's steps with the cursor's count for it.
fn set_day_steps(conn: &Connection, user: &UserId, day: NaiveDate, steps: i64) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO activity_tracks (user_id, day, steps, source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(user_id, day) DO UPDATE SET
            steps = excluded.steps,
            source = COALESCE(activity_tracks.source, excluded.source),
            updated_at = excluded.updated_at",
        params![user.as_str(), format_day(day), steps.max(0), DEVICE_SOURCE, now],
    )?;
    Ok(())
}

/// Finalize a closed day; its recorded steps never decrease.
fn merge_steps_max(conn: &Connection, user: &UserId, day: NaiveDate, steps: i64) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO activity_tracks (user_id, day, steps, source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(user_id, day) DO UPDATE SET
            steps = MAX(activity_tracks.steps, excluded.steps),
            source = COALESCE(activity_tracks.source, excluded.source),
            updated_at = excluded.updated_at",
        params![user.as_str(), format_day(day), steps.max(0), DEVICE_SOURCE, now],
    )?;
    Ok(())
}

fn step_cursor(conn: &Connection, user: &UserId) -> Result<Option<StepCursor>> {
    let mut stmt = conn.prepare(
        "SELECT cursor_day, baseline_total, last_total FROM step_cursors WHERE user_id = ?1",
    )?;
    let mut rows = stmt.query(params![user.as_str()])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Database::cursor_from_row(row)?))
    } else {
        Ok(None)
    }
}

fn workout_day(conn: &Connection, user: &UserId, day: NaiveDate) -> Result<Option<WorkoutDayRecord>> {
    let mut stmt = conn.prepare(
        "SELECT day, total_seconds, is_completed, notes, updated_at FROM workout_days
         WHERE user_id = ?1 AND day = ?2",
    )?;
    let mut rows = stmt.query(params![user.as_str(), format_day(day)])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Database::workout_from_row(row)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CursorState;
    use crate::settings::ist;
    use chrono::{Duration, TimeZone};

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn active_count(db: &Database, user: &UserId) -> i64 {
        db.conn
            .query_row(
                "SELECT COUNT(*) FROM hydration_goals WHERE user_id = ?1 AND is_active = 1",
                params![user.as_str()],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_goal_versioning_keeps_one_active() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        assert_eq!(active_count(&db, &u), 0);
        for ml in [2000, 2500, 3100] {
            db.set_hydration_goal(&u, ml, ist()).unwrap();
            assert_eq!(active_count(&db, &u), 1);
        }
        assert_eq!(db.get_active_hydration_goal(&u).unwrap().unwrap().daily_ml, 3100);
        let history = db.get_hydration_goal_history(&u).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().filter(|g| g.is_active).count(), 1);
    }

    #[test]
    fn test_goals_are_per_user() {
        let mut db = Database::open_in_memory().unwrap();
        db.set_hydration_goal(&user("a"), 2000, ist()).unwrap();
        db.set_hydration_goal(&user("b"), 3000, ist()).unwrap();
        assert_eq!(active_count(&db, &user("a")), 1);
        assert_eq!(
            db.get_active_hydration_goal(&user("a")).unwrap().unwrap().daily_ml,
            2000
        );
    }

    #[test]
    fn test_log_water_requires_goal() {
        let mut db = Database::open_in_memory().unwrap();
        let result = db
            .log_water(&user("u1"), &[(250, Utc::now())], None, ist())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_log_water_recomputes_daily_record() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        db.set_hydration_goal(&u, 1000, ist()).unwrap();
        // 04:00 UTC on 2025-03-10 is 09:30 IST the same day
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap();

        let logged = db
            .log_water(&u, &[(400, at), (800, at + Duration::minutes(5))], Some("bottle"), ist())
            .unwrap()
            .unwrap();
        assert_eq!(logged.entries.len(), 2);
        assert_eq!(logged.record.day, "2025-03-10");
        assert_eq!(logged.record.goal_ml, 1000);
        // Clamped to goal even though 1200 ml were logged
        assert_eq!(logged.record.consumed_ml, 1000);
        assert!(logged.record.met_goal);
        assert_eq!(logged.record.percent_consumed, 100);
        assert_eq!(logged.record.remaining_ml, 0);
        assert_eq!(db.sum_water_ml(&u, day(2025, 3, 10), ist()).unwrap(), 1200);
    }

    #[test]
    fn test_water_day_boundary_uses_offset() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        db.set_hydration_goal(&u, 2000, ist()).unwrap();
        // 18:29 UTC is 23:59 IST on the 10th; 18:31 UTC is 00:01 IST on the 11th
        let late = Utc.with_ymd_and_hms(2025, 3, 10, 18, 29, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 3, 10, 18, 31, 0).unwrap();
        db.log_water(&u, &[(300, late), (500, early)], None, ist())
            .unwrap();
        assert_eq!(db.sum_water_ml(&u, day(2025, 3, 10), ist()).unwrap(), 300);
        assert_eq!(db.sum_water_ml(&u, day(2025, 3, 11), ist()).unwrap(), 500);
        assert!(db.get_hydration_day(&u, day(2025, 3, 10)).unwrap().is_some());
        assert!(db.get_hydration_day(&u, day(2025, 3, 11)).unwrap().is_some());
    }

    #[test]
    fn test_undo_last_water_log() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        db.set_hydration_goal(&u, 2000, ist()).unwrap();
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap();
        db.log_water(&u, &[(250, at), (500, at + Duration::hours(1))], None, ist())
            .unwrap();

        let undone = db
            .undo_last_water_log(&u, day(2025, 3, 10), ist())
            .unwrap()
            .unwrap();
        assert_eq!(undone.removed.amount_ml, 500);
        assert_eq!(undone.record.consumed_ml, 250);
        assert!(!undone.record.met_goal);

        db.undo_last_water_log(&u, day(2025, 3, 10), ist()).unwrap();
        assert!(
            db.undo_last_water_log(&u, day(2025, 3, 10), ist())
                .unwrap()
                .is_none()
        );
        let record = db.get_hydration_day(&u, day(2025, 3, 10)).unwrap().unwrap();
        assert_eq!(record.consumed_ml, 0);
    }

    #[test]
    fn test_list_hydration_days_newest_first() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        db.set_hydration_goal(&u, 2000, ist()).unwrap();
        for d in [8, 9, 10] {
            let at = Utc.with_ymd_and_hms(2025, 3, d, 6, 0, 0).unwrap();
            db.log_water(&u, &[(100, at)], None, ist()).unwrap();
        }
        let days = db
            .list_hydration_days(&u, day(2025, 3, 9), day(2025, 3, 10))
            .unwrap();
        let labels: Vec<_> = days.iter().map(|r| r.day.as_str()).collect();
        assert_eq!(labels, ["2025-03-10", "2025-03-09"]);
    }

    #[test]
    fn test_profile_upsert_derives_bmi_and_goal() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        // 70 kg at 161 cm is BMI 27.01, overweight band
        let profile = db
            .upsert_body_profile(
                &u,
                &ProfileInput {
                    height_cm: Some(161.0),
                    weight_kg: Some(70.0),
                    ..ProfileInput::default()
                },
                ist(),
            )
            .unwrap();
        assert_eq!(profile.bmi, Some(27.01));
        assert_eq!(profile.bmi_band, Some(goals::BmiBand::Overweight));
        assert_eq!(db.get_active_hydration_goal(&u).unwrap().unwrap().daily_ml, 2100);
    }

    #[test]
    fn test_profile_upsert_merges_fields() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        db.upsert_body_profile(
            &u,
            &ProfileInput {
                name: Some("Asha".into()),
                height_cm: Some(170.0),
                weight_kg: Some(65.0),
                ..ProfileInput::default()
            },
            ist(),
        )
        .unwrap();
        let goal_before = db.get_active_hydration_goal(&u).unwrap().unwrap();

        let updated = db
            .upsert_body_profile(
                &u,
                &ProfileInput {
                    age: Some(31),
                    ..ProfileInput::default()
                },
                ist(),
            )
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Asha"));
        assert_eq!(updated.age, Some(31));
        assert_eq!(updated.height_cm, Some(170.0));
        // Name-only edits leave an existing goal alone
        let goal_after = db.get_active_hydration_goal(&u).unwrap().unwrap();
        assert_eq!(goal_before.id, goal_after.id);
    }

    #[test]
    fn test_profile_without_bmi_sets_no_goal() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let profile = db
            .upsert_body_profile(
                &u,
                &ProfileInput {
                    weight_kg: Some(60.0),
                    ..ProfileInput::default()
                },
                ist(),
            )
            .unwrap();
        assert!(profile.bmi.is_none());
        assert!(db.get_active_hydration_goal(&u).unwrap().is_none());
    }

    #[test]
    fn test_create_profile_is_create_only() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let input = ProfileInput {
            name: Some("Ravi".into()),
            ..ProfileInput::default()
        };
        assert!(db.create_body_profile(&u, &input, ist()).unwrap().is_some());
        assert!(db.create_body_profile(&u, &input, ist()).unwrap().is_none());
    }

    #[test]
    fn test_meal_totals_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let d = day(2025, 3, 10);
        let input = MealInput {
            meal_type: "lunch".into(),
            food_name: "Rajma chawal".into(),
            calories: 550.0,
            protein_g: 18.0,
            carbs_g: 90.0,
            fat_g: 12.0,
            fiber_g: 11.0,
            ..MealInput::default()
        };
        let first = db.insert_meal(&u, d, "lunch", &input, Utc::now()).unwrap();
        db.insert_meal(&u, d, "dinner", &input, Utc::now()).unwrap();
        db.insert_meal(&user("other"), d, "lunch", &input, Utc::now())
            .unwrap();

        let totals = db.meal_totals(&u, d).unwrap();
        assert_eq!(totals.calories, 1100.0);
        assert_eq!(totals.fiber_g, 22.0);

        assert!(db.delete_meal(&u, first.id).unwrap());
        assert!(!db.delete_meal(&u, first.id).unwrap());
        assert_eq!(db.get_meals_for_day(&u, d).unwrap().len(), 1);
    }

    #[test]
    fn test_meal_totals_empty_day() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(
            db.meal_totals(&user("u1"), day(2025, 1, 1)).unwrap(),
            MacroTotals::default()
        );
    }

    #[test]
    fn test_track_create_replace_add_patch() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let d = day(2025, 3, 10);
        let input = ActivityInput {
            steps: Some(4000),
            distance_m: Some(3000.0),
            ..ActivityInput::default()
        };
        assert!(db.insert_track(&u, d, &input).unwrap().is_some());
        assert!(db.insert_track(&u, d, &input).unwrap().is_none());

        let added = db.add_to_track(&u, d, &input).unwrap();
        assert_eq!(added.steps, 8000);
        assert_eq!(added.distance_m, 6000.0);

        let patched = db
            .patch_track(
                &u,
                d,
                &ActivityInput {
                    calories_kcal: Some(210.0),
                    ..ActivityInput::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(patched.steps, 8000);
        assert_eq!(patched.calories_kcal, 210.0);

        let replaced = db
            .replace_track(
                &u,
                d,
                &ActivityInput {
                    steps: Some(100),
                    ..ActivityInput::default()
                },
            )
            .unwrap();
        assert_eq!(replaced.steps, 100);
        assert_eq!(replaced.calories_kcal, 0.0);

        assert!(db.delete_track(&u, d).unwrap());
        assert!(db.patch_track(&u, d, &input).unwrap().is_none());
    }

    #[test]
    fn test_step_reading_flow() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");

        let first = db.apply_step_reading(&u, 10_000, day(2025, 3, 10)).unwrap();
        assert_eq!(first.state, CursorState::NoCursor);
        assert_eq!(first.record.steps, 0);

        let second = db.apply_step_reading(&u, 13_500, day(2025, 3, 10)).unwrap();
        assert_eq!(second.state, CursorState::SameDay);
        assert_eq!(second.record.steps, 3500);

        // Replay is a no-op
        let replay = db.apply_step_reading(&u, 13_500, day(2025, 3, 10)).unwrap();
        assert_eq!(replay.record.steps, 3500);

        let next = db.apply_step_reading(&u, 14_000, day(2025, 3, 11)).unwrap();
        assert_eq!(next.state, CursorState::DayRollover);
        assert_eq!(next.record.day, "2025-03-11");
        assert_eq!(next.record.steps, 0);
        assert_eq!(next.finalized.unwrap().steps, 3500);

        let cursor = db.get_step_cursor(&u).unwrap().unwrap();
        assert_eq!(cursor.cursor_day, day(2025, 3, 11));
        assert_eq!(cursor.baseline_total, 14_000);
    }

    #[test]
    fn test_step_counter_reset_rebaselines_the_day() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let d = day(2025, 3, 10);
        db.apply_step_reading(&u, 80_000, d).unwrap();
        let before = db.apply_step_reading(&u, 81_500, d).unwrap();
        assert_eq!(before.record.steps, 1500);

        // Device rebooted: the reading becomes the new baseline
        let reset = db.apply_step_reading(&u, 120, d).unwrap();
        assert!(reset.counter_reset);
        assert_eq!(reset.record.steps, 0);
        assert_eq!(reset.cursor.baseline_total, 120);

        let after = db.apply_step_reading(&u, 620, d).unwrap();
        assert!(!after.counter_reset);
        assert_eq!(after.record.steps, 500);
        assert_eq!(db.get_track(&u, d).unwrap().unwrap().steps, 500);
    }

    #[test]
    fn test_step_rollover_starts_new_day_at_zero() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let next_day = day(2025, 3, 11);
        db.replace_track(
            &u,
            next_day,
            &ActivityInput {
                steps: Some(4000),
                ..ActivityInput::default()
            },
        )
        .unwrap();
        db.apply_step_reading(&u, 100, day(2025, 3, 10)).unwrap();
        let rolled = db.apply_step_reading(&u, 300, next_day).unwrap();
        assert_eq!(rolled.state, CursorState::DayRollover);
        assert_eq!(rolled.record.steps, 0);
    }

    #[test]
    fn test_step_rollover_never_lowers_synced_steps() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let d = day(2025, 3, 10);
        db.apply_step_reading(&u, 100, d).unwrap();
        db.apply_step_reading(&u, 600, d).unwrap();
        // A provider sync reported more steps for the same day
        db.replace_track(
            &u,
            d,
            &ActivityInput {
                steps: Some(9000),
                ..ActivityInput::default()
            },
        )
        .unwrap();
        let next = db.apply_step_reading(&u, 700, day(2025, 3, 11)).unwrap();
        assert_eq!(next.finalized.unwrap().steps, 9000);
    }

    #[test]
    fn test_workout_completion_rules() {
        let mut db = Database::open_in_memory().unwrap();
        let u = user("u1");
        let d = day(2025, 3, 10);

        let partial = db
            .upsert_workout_day(
                &u,
                d,
                &WorkoutUpdate {
                    total_seconds: Some(900),
                    ..WorkoutUpdate::default()
                },
                1800,
            )
            .unwrap();
        assert!(!partial.is_completed);

        let done = db
            .upsert_workout_day(
                &u,
                d,
                &WorkoutUpdate {
                    total_seconds: Some(1800),
                    notes: Some("yoga".into()),
                    ..WorkoutUpdate::default()
                },
                1800,
            )
            .unwrap();
        assert!(done.is_completed);
        assert_eq!(done.notes.as_deref(), Some("yoga"));

        let flagged = db
            .upsert_workout_day(
                &u,
                day(2025, 3, 11),
                &WorkoutUpdate {
                    is_completed: Some(true),
                    ..WorkoutUpdate::default()
                },
                1800,
            )
            .unwrap();
        assert!(flagged.is_completed);
        assert_eq!(flagged.total_seconds, 0);

        let listed = db.list_workout_days(&u, d, day(2025, 3, 11)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].day, "2025-03-11");
    }
}
