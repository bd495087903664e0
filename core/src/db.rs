use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{
    DATE_FORMAT, Day, DayKey, DayTargets, DayTotals, EntrySource, FoodEntry, FoodSums, NewFoodEntry,
    NewTarget, NewWorkoutEntry, TargetOrigin, TargetRecord, UpdateFoodEntry, UpdateWorkoutEntry,
    WorkoutEntry, coerce_non_negative,
};

const FOOD_COLUMNS: &str = "id, uuid, user_id, date, meal_type, name, calories, protein, carbs, fat, source, created_at, updated_at";
const WORKOUT_COLUMNS: &str = "id, uuid, user_id, date, name, duration_min, calories_burned, source, created_at, updated_at";
const TARGET_COLUMNS: &str =
    "id, uuid, user_id, calories, protein, carbs, fat, label, rationale, origin, created_at";

/// Sortable UTC timestamp; "most recent" queries order by this text.
fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn date_str(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
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

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS food_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    meal_type TEXT NOT NULL,
                    name TEXT NOT NULL,
                    calories REAL,
                    protein REAL,
                    carbs REAL,
                    fat REAL,
                    source TEXT NOT NULL DEFAULT 'manual',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workout_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    name TEXT NOT NULL,
                    duration_min REAL,
                    calories_burned REAL,
                    source TEXT NOT NULL DEFAULT 'manual',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS days (
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    targets TEXT,
                    totals TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS targets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id TEXT NOT NULL,
                    calories REAL NOT NULL,
                    protein REAL,
                    carbs REAL,
                    fat REAL,
                    label TEXT,
                    rationale TEXT,
                    origin TEXT NOT NULL DEFAULT 'manual',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS daily_targets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    calories REAL NOT NULL,
                    protein REAL,
                    carbs REAL,
                    fat REAL,
                    label TEXT,
                    rationale TEXT,
                    origin TEXT NOT NULL DEFAULT 'manual',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_food_entries_user_date ON food_entries(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_workout_entries_user_date ON workout_entries(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_targets_user_created ON targets(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_daily_targets_user_date ON daily_targets(user_id, date, created_at);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    /// Read a column that should hold a number. Text that parses is accepted,
    /// anything else (NULL, blobs, junk text) reads as `None`.
    fn number_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<f64>> {
        #[allow(clippy::cast_precision_loss)]
        let value = match row.get_ref(idx)? {
            ValueRef::Real(v) => Some(v),
            ValueRef::Integer(v) => Some(v as f64),
            ValueRef::Text(t) => std::str::from_utf8(t)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok()),
            ValueRef::Null | ValueRef::Blob(_) => None,
        };
        Ok(value)
    }

    fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let raw: String = row.get(idx)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    fn source_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<EntrySource> {
        let raw: String = row.get(idx)?;
        Ok(raw.parse().unwrap_or_default())
    }

    // Expects FOOD_COLUMNS order.
    fn food_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodEntry> {
        Ok(FoodEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            date: Self::date_column(row, 3)?,
            meal_type: row.get(4)?,
            name: row.get(5)?,
            calories: Self::number_column(row, 6)?,
            protein: Self::number_column(row, 7)?,
            carbs: Self::number_column(row, 8)?,
            fat: Self::number_column(row, 9)?,
            source: Self::source_column(row, 10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    // Expects WORKOUT_COLUMNS order.
    fn workout_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutEntry> {
        Ok(WorkoutEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            date: Self::date_column(row, 3)?,
            name: row.get(4)?,
            duration_min: Self::number_column(row, 5)?,
            calories_burned: Self::number_column(row, 6)?,
            source: Self::source_column(row, 7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    // Expects TARGET_COLUMNS order, optionally followed by `date` at index 11.
    fn target_from_row(row: &rusqlite::Row, with_date: bool) -> rusqlite::Result<TargetRecord> {
        let origin: String = row.get(9)?;
        Ok(TargetRecord {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            calories: Self::number_column(row, 3)?.map_or(0.0, |v| coerce_non_negative(Some(v))),
            protein: Self::number_column(row, 4)?,
            carbs: Self::number_column(row, 5)?,
            fat: Self::number_column(row, 6)?,
            label: row.get(7)?,
            rationale: row.get(8)?,
            origin: origin.parse().unwrap_or(TargetOrigin::Manual),
            created_at: row.get(10)?,
            date: if with_date {
                Some(Self::date_column(row, 11)?)
            } else {
                None
            },
        })
    }

    fn day_from_row(row: &rusqlite::Row) -> rusqlite::Result<(Day, Option<String>, Option<String>)> {
        let day = Day {
            user_id: row.get(0)?,
            date: Self::date_column(row, 1)?,
            targets: None,
            totals: None,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        };
        Ok((day, row.get(2)?, row.get(3)?))
    }

    fn decode_day(raw: (Day, Option<String>, Option<String>)) -> Result<Day> {
        let (mut day, targets, totals) = raw;
        if let Some(json) = targets.filter(|s| !s.trim().is_empty()) {
            day.targets = Some(
                serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt targets for day {}", date_str(day.date)))?,
            );
        }
        if let Some(json) = totals.filter(|s| !s.trim().is_empty()) {
            day.totals = Some(
                serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt totals for day {}", date_str(day.date)))?,
            );
        }
        Ok(day)
    }

    // --- Food entries ---

    pub fn insert_food_entry(&self, user_id: &str, entry: &NewFoodEntry) -> Result<FoodEntry> {
        let now = now_stamp();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO food_entries (uuid, user_id, date, meal_type, name, calories, protein, carbs, fat, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                uuid,
                user_id,
                date_str(entry.date),
                entry.meal_type,
                entry.name,
                entry.calories,
                entry.protein,
                entry.carbs,
                entry.fat,
                entry.source.as_str(),
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_food_entry(user_id, id)?
            .context("Food entry vanished after insert")
    }

    pub fn get_food_entry(&self, user_id: &str, id: i64) -> Result<Option<FoodEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {FOOD_COLUMNS} FROM food_entries WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                Self::food_entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Apply a partial update. Returns `None` when no entry with this id belongs to the user.
    pub fn update_food_entry(
        &self,
        user_id: &str,
        id: i64,
        update: &UpdateFoodEntry,
    ) -> Result<Option<FoodEntry>> {
        if self.get_food_entry(user_id, id)?.is_none() {
            return Ok(None);
        }

        let now = now_stamp();
        let tx = self.conn.unchecked_transaction()?;
        if let Some(date) = update.date {
            tx.execute(
                "UPDATE food_entries SET date = ?1, updated_at = ?2 WHERE id = ?3",
                params![date_str(date), now, id],
            )?;
        }
        if let Some(ref meal_type) = update.meal_type {
            tx.execute(
                "UPDATE food_entries SET meal_type = ?1, updated_at = ?2 WHERE id = ?3",
                params![meal_type, now, id],
            )?;
        }
        if let Some(ref name) = update.name {
            tx.execute(
                "UPDATE food_entries SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, id],
            )?;
        }
        if let Some(calories) = update.calories {
            tx.execute(
                "UPDATE food_entries SET calories = ?1, updated_at = ?2 WHERE id = ?3",
                params![calories, now, id],
            )?;
        }
        if let Some(protein) = update.protein {
            tx.execute(
                "UPDATE food_entries SET protein = ?1, updated_at = ?2 WHERE id = ?3",
                params![protein, now, id],
            )?;
        }
        if let Some(carbs) = update.carbs {
            tx.execute(
                "UPDATE food_entries SET carbs = ?1, updated_at = ?2 WHERE id = ?3",
                params![carbs, now, id],
            )?;
        }
        if let Some(fat) = update.fat {
            tx.execute(
                "UPDATE food_entries SET fat = ?1, updated_at = ?2 WHERE id = ?3",
                params![fat, now, id],
            )?;
        }
        tx.commit()?;

        self.get_food_entry(user_id, id)
    }

    /// Delete an entry, returning what was removed so callers know which day changed.
    pub fn delete_food_entry(&self, user_id: &str, id: i64) -> Result<Option<FoodEntry>> {
        let Some(entry) = self.get_food_entry(user_id, id)? else {
            return Ok(None);
        };
        self.conn.execute(
            "DELETE FROM food_entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(Some(entry))
    }

    pub fn list_food_entries(&self, key: &DayKey) -> Result<Vec<FoodEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_COLUMNS} FROM food_entries WHERE user_id = ?1 AND date = ?2 ORDER BY id"
        ))?;
        let entries = stmt
            .query_map(params![key.user_id, key.date_str()], Self::food_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn sum_food(&self, key: &DayKey) -> Result<FoodSums> {
        let mut stmt = self.conn.prepare(
            "SELECT calories, protein, carbs, fat FROM food_entries WHERE user_id = ?1 AND date = ?2",
        )?;
        let mut rows = stmt.query(params![key.user_id, key.date_str()])?;
        let mut sums = FoodSums::default();
        while let Some(row) = rows.next()? {
            sums.calories += coerce_non_negative(Self::number_column(row, 0)?);
            sums.protein += coerce_non_negative(Self::number_column(row, 1)?);
            sums.carbs += coerce_non_negative(Self::number_column(row, 2)?);
            sums.fat += coerce_non_negative(Self::number_column(row, 3)?);
            sums.entry_count += 1;
        }
        Ok(sums)
    }

    // --- Workout entries ---

    pub fn insert_workout_entry(
        &self,
        user_id: &str,
        entry: &NewWorkoutEntry,
    ) -> Result<WorkoutEntry> {
        let now = now_stamp();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO workout_entries (uuid, user_id, date, name, duration_min, calories_burned, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                uuid,
                user_id,
                date_str(entry.date),
                entry.name,
                entry.duration_min,
                entry.calories_burned,
                entry.source.as_str(),
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_workout_entry(user_id, id)?
            .context("Workout entry vanished after insert")
    }

    pub fn get_workout_entry(&self, user_id: &str, id: i64) -> Result<Option<WorkoutEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "SELECT {WORKOUT_COLUMNS} FROM workout_entries WHERE id = ?1 AND user_id = ?2"
                ),
                params![id, user_id],
                Self::workout_entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn update_workout_entry(
        &self,
        user_id: &str,
        id: i64,
        update: &UpdateWorkoutEntry,
    ) -> Result<Option<WorkoutEntry>> {
        if self.get_workout_entry(user_id, id)?.is_none() {
            return Ok(None);
        }

        let now = now_stamp();
        let tx = self.conn.unchecked_transaction()?;
        if let Some(date) = update.date {
            tx.execute(
                "UPDATE workout_entries SET date = ?1, updated_at = ?2 WHERE id = ?3",
                params![date_str(date), now, id],
            )?;
        }
        if let Some(ref name) = update.name {
            tx.execute(
                "UPDATE workout_entries SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, id],
            )?;
        }
        if let Some(duration) = update.duration_min {
            tx.execute(
                "UPDATE workout_entries SET duration_min = ?1, updated_at = ?2 WHERE id = ?3",
                params![duration, now, id],
            )?;
        }
        if let Some(burned) = update.calories_burned {
            tx.execute(
                "UPDATE workout_entries SET calories_burned = ?1, updated_at = ?2 WHERE id = ?3",
                params![burned, now, id],
            )?;
        }
        tx.commit()?;

        self.get_workout_entry(user_id, id)
    }

    pub fn delete_workout_entry(&self, user_id: &str, id: i64) -> Result<Option<WorkoutEntry>> {
        let Some(entry) = self.get_workout_entry(user_id, id)? else {
            return Ok(None);
        };
        self.conn.execute(
            "DELETE FROM workout_entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(Some(entry))
    }

    pub fn list_workout_entries(&self, key: &DayKey) -> Result<Vec<WorkoutEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORKOUT_COLUMNS} FROM workout_entries WHERE user_id = ?1 AND date = ?2 ORDER BY id"
        ))?;
        let entries = stmt
            .query_map(
                params![key.user_id, key.date_str()],
                Self::workout_entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn sum_workout_calories(&self, key: &DayKey) -> Result<f64> {
        let mut stmt = self.conn.prepare(
            "SELECT calories_burned FROM workout_entries WHERE user_id = ?1 AND date = ?2",
        )?;
        let mut rows = stmt.query(params![key.user_id, key.date_str()])?;
        let mut total = 0.0;
        while let Some(row) = rows.next()? {
            total += coerce_non_negative(Self::number_column(row, 0)?);
        }
        Ok(total)
    }

    // --- Days ---

    pub fn read_day(&self, key: &DayKey) -> Result<Option<Day>> {
        let raw = self
            .conn
            .query_row(
                "SELECT user_id, date, targets, totals, created_at, updated_at
                 FROM days WHERE user_id = ?1 AND date = ?2",
                params![key.user_id, key.date_str()],
                Self::day_from_row,
            )
            .optional()?;
        raw.map(Self::decode_day).transpose()
    }

    /// Insert the day if absent, otherwise replace only its `totals` blob.
    pub fn upsert_day_totals(&self, key: &DayKey, totals: &DayTotals) -> Result<()> {
        let now = now_stamp();
        let json = serde_json::to_string(totals).context("Failed to encode totals")?;
        self.conn.execute(
            "INSERT INTO days (user_id, date, targets, totals, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?4)
             ON CONFLICT(user_id, date) DO UPDATE SET totals = excluded.totals, updated_at = excluded.updated_at",
            params![key.user_id, key.date_str(), json, now],
        )?;
        Ok(())
    }

    /// Insert the day if absent, otherwise replace only its `targets` blob.
    pub fn upsert_day_targets(&self, key: &DayKey, targets: &DayTargets) -> Result<()> {
        let now = now_stamp();
        let json = serde_json::to_string(targets).context("Failed to encode targets")?;
        self.conn.execute(
            "INSERT INTO days (user_id, date, targets, totals, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?4)
             ON CONFLICT(user_id, date) DO UPDATE SET targets = excluded.targets, updated_at = excluded.updated_at",
            params![key.user_id, key.date_str(), json, now],
        )?;
        Ok(())
    }

    /// Days for a user within `[from, to]`, oldest first.
    pub fn list_days(&self, user_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Day>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, date, targets, totals, created_at, updated_at
             FROM days WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
        )?;
        let raw = stmt
            .query_map(
                params![user_id, date_str(from), date_str(to)],
                Self::day_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(Self::decode_day).collect()
    }

    // --- Targets ---

    pub fn insert_standing_target(&self, user_id: &str, target: &NewTarget) -> Result<TargetRecord> {
        let now = now_stamp();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO targets (uuid, user_id, calories, protein, carbs, fat, label, rationale, origin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                uuid,
                user_id,
                target.calories,
                target.protein,
                target.carbs,
                target.fat,
                target.label,
                target.rationale,
                target.origin.as_str(),
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?1"),
                params![id],
                |row| Self::target_from_row(row, false),
            )
            .context("Target not found")
    }

    pub fn latest_standing_target(&self, user_id: &str) -> Result<Option<TargetRecord>> {
        let target = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TARGET_COLUMNS} FROM targets WHERE user_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![user_id],
                |row| Self::target_from_row(row, false),
            )
            .optional()?;
        Ok(target)
    }

    /// Standing targets, newest first.
    pub fn list_standing_targets(&self, user_id: &str) -> Result<Vec<TargetRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TARGET_COLUMNS} FROM targets WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let targets = stmt
            .query_map(params![user_id], |row| Self::target_from_row(row, false))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    pub fn insert_daily_target(&self, key: &DayKey, target: &NewTarget) -> Result<TargetRecord> {
        let now = now_stamp();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO daily_targets (uuid, user_id, date, calories, protein, carbs, fat, label, rationale, origin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                uuid,
                key.user_id,
                key.date_str(),
                target.calories,
                target.protein,
                target.carbs,
                target.fat,
                target.label,
                target.rationale,
                target.origin.as_str(),
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                &format!("SELECT {TARGET_COLUMNS}, date FROM daily_targets WHERE id = ?1"),
                params![id],
                |row| Self::target_from_row(row, true),
            )
            .context("Daily target not found")
    }

    pub fn latest_daily_target(&self, key: &DayKey) -> Result<Option<TargetRecord>> {
        let target = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TARGET_COLUMNS}, date FROM daily_targets
                     WHERE user_id = ?1 AND date = ?2
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![key.user_id, key.date_str()],
                |row| Self::target_from_row(row, true),
            )
            .optional()?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user: &str, date: &str) -> DayKey {
        DayKey::parse(user, date).unwrap()
    }

    fn sample_food(date: &str, calories: Option<f64>) -> NewFoodEntry {
        NewFoodEntry {
            date: NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
            meal_type: "lunch".to_string(),
            name: "Oats".to_string(),
            calories,
            protein: Some(10.0),
            carbs: Some(50.0),
            fat: Some(5.0),
            source: EntrySource::Manual,
        }
    }

    fn sample_workout(date: &str, burned: Option<f64>) -> NewWorkoutEntry {
        NewWorkoutEntry {
            date: NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
            name: "Bike".to_string(),
            duration_min: Some(45.0),
            calories_burned: burned,
            source: EntrySource::Manual,
        }
    }

    #[test]
    fn test_insert_and_get_food_entry() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_food_entry("u1", &sample_food("2024-01-05", Some(350.0)))
            .unwrap();

        assert_eq!(entry.user_id, "u1");
        assert_eq!(entry.name, "Oats");
        assert_eq!(entry.calories, Some(350.0));
        assert_eq!(entry.source, EntrySource::Manual);
        assert!(!entry.uuid.is_empty());

        let fetched = db.get_food_entry("u1", entry.id).unwrap().unwrap();
        assert_eq!(fetched.id, entry.id);

        // Other users cannot see it
        assert!(db.get_food_entry("u2", entry.id).unwrap().is_none());
    }

    #[test]
    fn test_sum_food_filters_by_user_and_date() {
        let db = Database::open_in_memory().unwrap();
        db.insert_food_entry("u1", &sample_food("2024-01-05", Some(300.0)))
            .unwrap();
        db.insert_food_entry("u1", &sample_food("2024-01-05", Some(200.0)))
            .unwrap();
        db.insert_food_entry("u1", &sample_food("2024-01-06", Some(999.0)))
            .unwrap();
        db.insert_food_entry("u2", &sample_food("2024-01-05", Some(999.0)))
            .unwrap();

        let sums = db.sum_food(&key("u1", "2024-01-05")).unwrap();
        assert!((sums.calories - 500.0).abs() < f64::EPSILON);
        assert!((sums.protein - 20.0).abs() < f64::EPSILON);
        assert!((sums.carbs - 100.0).abs() < f64::EPSILON);
        assert_eq!(sums.entry_count, 2);
    }

    #[test]
    fn test_sum_food_treats_missing_and_junk_as_zero() {
        let db = Database::open_in_memory().unwrap();
        db.insert_food_entry("u1", &sample_food("2024-01-05", None))
            .unwrap();
        let junk = db
            .insert_food_entry("u1", &sample_food("2024-01-05", Some(1.0)))
            .unwrap();
        db.conn
            .execute(
                "UPDATE food_entries SET calories = 'lots' WHERE id = ?1",
                params![junk.id],
            )
            .unwrap();
        db.insert_food_entry("u1", &sample_food("2024-01-05", Some(120.0)))
            .unwrap();

        let sums = db.sum_food(&key("u1", "2024-01-05")).unwrap();
        assert!((sums.calories - 120.0).abs() < f64::EPSILON);
        assert_eq!(sums.entry_count, 3);
    }

    #[test]
    fn test_sum_food_empty_day() {
        let db = Database::open_in_memory().unwrap();
        let sums = db.sum_food(&key("u1", "2024-01-05")).unwrap();
        assert_eq!(sums, FoodSums::default());
    }

    #[test]
    fn test_update_food_entry() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_food_entry("u1", &sample_food("2024-01-05", Some(350.0)))
            .unwrap();

        let update = UpdateFoodEntry {
            calories: Some(Some(400.0)),
            date: Some(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()),
            protein: Some(None),
            ..UpdateFoodEntry::default()
        };
        let updated = db.update_food_entry("u1", entry.id, &update).unwrap().unwrap();
        assert_eq!(updated.calories, Some(400.0));
        assert_eq!(updated.date, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        assert!(updated.protein.is_none());
        assert_eq!(updated.carbs, Some(50.0));
        assert!(updated.updated_at >= entry.updated_at);
    }

    #[test]
    fn test_update_food_entry_wrong_owner() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_food_entry("u1", &sample_food("2024-01-05", Some(350.0)))
            .unwrap();
        let update = UpdateFoodEntry {
            calories: Some(Some(1.0)),
            ..UpdateFoodEntry::default()
        };
        assert!(db.update_food_entry("u2", entry.id, &update).unwrap().is_none());
        let unchanged = db.get_food_entry("u1", entry.id).unwrap().unwrap();
        assert_eq!(unchanged.calories, Some(350.0));
    }

    #[test]
    fn test_update_food_entry_failure_leaves_entry_untouched() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_food_entry("u1", &sample_food("2024-01-05", Some(350.0)))
            .unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_fat BEFORE UPDATE OF fat ON food_entries
                 BEGIN SELECT RAISE(ABORT, 'fat rejected'); END;",
            )
            .unwrap();

        let update = UpdateFoodEntry {
            name: Some("Porridge".to_string()),
            calories: Some(Some(500.0)),
            fat: Some(Some(9.0)),
            ..UpdateFoodEntry::default()
        };
        let err = db.update_food_entry("u1", entry.id, &update).unwrap_err();
        assert!(err.to_string().contains("fat rejected"));

        let unchanged = db.get_food_entry("u1", entry.id).unwrap().unwrap();
        assert_eq!(unchanged.name, "Oats");
        assert_eq!(unchanged.calories, Some(350.0));
        assert_eq!(unchanged.fat, Some(5.0));
        assert_eq!(unchanged.updated_at, entry.updated_at);
    }

    #[test]
    fn test_update_workout_entry_failure_leaves_entry_untouched() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_workout_entry("u1", &sample_workout("2024-01-05", Some(300.0)))
            .unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_burn BEFORE UPDATE OF calories_burned ON workout_entries
                 BEGIN SELECT RAISE(ABORT, 'burn rejected'); END;",
            )
            .unwrap();

        let update = UpdateWorkoutEntry {
            name: Some("Spin".to_string()),
            calories_burned: Some(Some(450.0)),
            ..UpdateWorkoutEntry::default()
        };
        assert!(db.update_workout_entry("u1", entry.id, &update).is_err());

        let unchanged = db.get_workout_entry("u1", entry.id).unwrap().unwrap();
        assert_eq!(unchanged.name, "Bike");
        assert_eq!(unchanged.calories_burned, Some(300.0));
        assert_eq!(unchanged.updated_at, entry.updated_at);
    }

    #[test]
    fn test_delete_food_entry() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_food_entry("u1", &sample_food("2024-01-05", Some(350.0)))
            .unwrap();

        assert!(db.delete_food_entry("u2", entry.id).unwrap().is_none());
        let deleted = db.delete_food_entry("u1", entry.id).unwrap().unwrap();
        assert_eq!(deleted.id, entry.id);
        assert!(db.get_food_entry("u1", entry.id).unwrap().is_none());
        assert!(db.delete_food_entry("u1", entry.id).unwrap().is_none());
    }

    #[test]
    fn test_workout_entries_and_sum() {
        let db = Database::open_in_memory().unwrap();
        let run = db
            .insert_workout_entry("u1", &sample_workout("2024-01-05", Some(300.0)))
            .unwrap();
        db.insert_workout_entry("u1", &sample_workout("2024-01-05", None))
            .unwrap();
        db.insert_workout_entry("u1", &sample_workout("2024-01-07", Some(50.0)))
            .unwrap();

        let k = key("u1", "2024-01-05");
        assert!((db.sum_workout_calories(&k).unwrap() - 300.0).abs() < f64::EPSILON);
        assert_eq!(db.list_workout_entries(&k).unwrap().len(), 2);

        let updated = db
            .update_workout_entry(
                "u1",
                run.id,
                &UpdateWorkoutEntry {
                    calories_burned: Some(Some(420.0)),
                    ..UpdateWorkoutEntry::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.calories_burned, Some(420.0));
        assert!((db.sum_workout_calories(&k).unwrap() - 420.0).abs() < f64::EPSILON);

        assert!(db.delete_workout_entry("u1", run.id).unwrap().is_some());
        assert!((db.sum_workout_calories(&k).unwrap()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_read_day_absent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.read_day(&key("u1", "2024-01-05")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_day_totals_then_targets_keeps_both() {
        let db = Database::open_in_memory().unwrap();
        let k = key("u1", "2024-01-05");

        let totals = DayTotals::empty(2000.0);
        db.upsert_day_totals(&k, &totals).unwrap();
        let day = db.read_day(&k).unwrap().unwrap();
        assert_eq!(day.totals.as_ref(), Some(&totals));
        assert!(day.targets.is_none());

        let targets = DayTargets {
            calories: Some(2000.0),
            label: Some("Cut".to_string()),
            ..DayTargets::default()
        };
        db.upsert_day_targets(&k, &targets).unwrap();
        let day = db.read_day(&k).unwrap().unwrap();
        assert_eq!(day.targets.as_ref(), Some(&targets));
        assert_eq!(day.totals.as_ref(), Some(&totals));
        assert!(day.updated_at >= day.created_at);
    }

    #[test]
    fn test_read_day_corrupt_totals_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let k = key("u1", "2024-01-05");
        db.upsert_day_totals(&k, &DayTotals::empty(0.0)).unwrap();
        db.conn
            .execute("UPDATE days SET totals = '[1,2' WHERE user_id = 'u1'", [])
            .unwrap();
        assert!(db.read_day(&k).is_err());
    }

    #[test]
    fn test_list_days_range() {
        let db = Database::open_in_memory().unwrap();
        for date in ["2024-01-01", "2024-01-03", "2024-01-09"] {
            db.upsert_day_totals(&key("u1", date), &DayTotals::empty(1800.0))
                .unwrap();
        }
        db.upsert_day_totals(&key("u2", "2024-01-02"), &DayTotals::empty(1.0))
            .unwrap();

        let days = db
            .list_days(
                "u1",
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
            )
            .unwrap();
        let dates: Vec<String> = days.iter().map(|d| date_str(d.date)).collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-03"]);
    }

    #[test]
    fn test_latest_standing_target_is_most_recent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.latest_standing_target("u1").unwrap().is_none());

        db.insert_standing_target("u1", &NewTarget::calories(1800.0))
            .unwrap();
        let second = db
            .insert_standing_target("u1", &NewTarget::calories(2100.0))
            .unwrap();
        db.insert_standing_target("u2", &NewTarget::calories(3000.0))
            .unwrap();

        let latest = db.latest_standing_target("u1").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!((latest.calories - 2100.0).abs() < f64::EPSILON);
        assert!(latest.date.is_none());

        let all = db.list_standing_targets("u1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
    }

    #[test]
    fn test_latest_daily_target_scoped_to_date() {
        let db = Database::open_in_memory().unwrap();
        let k = key("u1", "2024-01-05");
        assert!(db.latest_daily_target(&k).unwrap().is_none());

        db.insert_daily_target(&k, &NewTarget::calories(1900.0)).unwrap();
        let mut suggested = NewTarget::calories(1750.0);
        suggested.origin = TargetOrigin::Suggested;
        suggested.rationale = Some("Rest day".to_string());
        db.insert_daily_target(&k, &suggested).unwrap();
        db.insert_daily_target(&key("u1", "2024-01-06"), &NewTarget::calories(2500.0))
            .unwrap();

        let latest = db.latest_daily_target(&k).unwrap().unwrap();
        assert!((latest.calories - 1750.0).abs() < f64::EPSILON);
        assert_eq!(latest.origin, TargetOrigin::Suggested);
        assert_eq!(latest.date, Some(k.date));
        assert_eq!(latest.rationale.as_deref(), Some("Rest day"));
    }

    #[test]
    fn test_open_on_disk_runs_migrations_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuel.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_food_entry("u1", &sample_food("2024-01-05", Some(10.0)))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
        assert_eq!(db.list_food_entries(&key("u1", "2024-01-05")).unwrap().len(), 1);
    }
}
