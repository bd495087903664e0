//! Storage contracts consumed by the resolver and the totals engine, plus the
//! SQLite-backed implementation used by the service.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::db::Database;
use crate::models::{Day, DayKey, DayTargets, DayTotals, FoodSums, TargetRecord};

/// Sums over logged entries for one exact (user, date) key.
/// Missing or non-numeric amounts count as zero.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn sum_food(&self, key: &DayKey) -> Result<FoodSums>;

    async fn sum_workout_calories(&self, key: &DayKey) -> Result<f64>;
}

/// Access to Day rows. `upsert_*` inserts the row when absent and always
/// stamps `updated_at`.
#[async_trait]
pub trait DayStore: Send + Sync {
    async fn read_day(&self, key: &DayKey) -> Result<Option<Day>>;

    async fn upsert_day_totals(&self, key: &DayKey, totals: &DayTotals) -> Result<()>;

    async fn upsert_day_targets(&self, key: &DayKey, targets: &DayTargets) -> Result<()>;

    async fn list_days(&self, user_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Day>>;
}

/// Daily and standing target tables, newest row wins.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn latest_daily_target(&self, key: &DayKey) -> Result<Option<TargetRecord>>;

    async fn latest_standing_target(&self, user_id: &str) -> Result<Option<TargetRecord>>;
}

/// All three contracts over one shared SQLite connection.
///
/// The connection mutex is only held inside the synchronous closure, never
/// across an await point.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    #[must_use]
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    pub fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&db)
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn sum_food(&self, key: &DayKey) -> Result<FoodSums> {
        self.with_db(|db| db.sum_food(key))
    }

    async fn sum_workout_calories(&self, key: &DayKey) -> Result<f64> {
        self.with_db(|db| db.sum_workout_calories(key))
    }
}

#[async_trait]
impl DayStore for SqliteStore {
    async fn read_day(&self, key: &DayKey) -> Result<Option<Day>> {
        self.with_db(|db| db.read_day(key))
    }

    async fn upsert_day_totals(&self, key: &DayKey, totals: &DayTotals) -> Result<()> {
        self.with_db(|db| db.upsert_day_totals(key, totals))
    }

    async fn upsert_day_targets(&self, key: &DayKey, targets: &DayTargets) -> Result<()> {
        self.with_db(|db| db.upsert_day_targets(key, targets))
    }

    async fn list_days(&self, user_id: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Day>> {
        self.with_db(|db| db.list_days(user_id, from, to))
    }
}

#[async_trait]
impl TargetStore for SqliteStore {
    async fn latest_daily_target(&self, key: &DayKey) -> Result<Option<TargetRecord>> {
        self.with_db(|db| db.latest_daily_target(key))
    }

    async fn latest_standing_target(&self, user_id: &str) -> Result<Option<TargetRecord>> {
        self.with_db(|db| db.latest_standing_target(user_id))
    }
}
