use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::bus::{Event, NotificationBus, SubscriptionId};
use crate::db::Database;
use crate::engine::{MacroPolicy, TotalsEngine, validate_pin_value};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    DayKey, DaySummary, DayTargets, DayTotals, DayView, FoodEntry, NewFoodEntry, NewTarget,
    NewWorkoutEntry, ResolvedTarget, TargetRecord, TargetSource, UpdateFoodEntry,
    UpdateWorkoutEntry, WorkoutEntry, validate_day_targets, validate_food_entry,
    validate_food_update, validate_target, validate_user_id, validate_workout_entry,
    validate_workout_update,
};
use crate::resolver::TargetResolver;
use crate::store::{DayStore, SqliteStore};

/// Longest history window a caller can ask for.
pub const MAX_HISTORY_DAYS: u32 = 366;

/// An entry after a mutation, plus the totals of every day it touched.
#[derive(Debug, Clone, Serialize)]
pub struct EntryChange<T> {
    pub entry: T,
    pub totals: DayTotals,
    /// Totals of the day the entry moved away from, when an update changed its date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_day: Option<DayTotals>,
}

/// Facade used by the CLI and the HTTP server. Every entry or target
/// mutation ends in a recompute through the engine.
pub struct FuelService {
    store: SqliteStore,
    bus: Arc<NotificationBus>,
    resolver: TargetResolver,
    engine: TotalsEngine,
}

impl FuelService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self::from_database(db))
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(db))
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        let store = SqliteStore::new(Arc::new(Mutex::new(db)));
        let shared = Arc::new(store.clone());
        let bus = Arc::new(NotificationBus::new());
        let resolver = TargetResolver::new(shared.clone(), shared.clone());
        let engine = TotalsEngine::new(shared.clone(), shared, Arc::clone(&bus));
        Self {
            store,
            bus,
            resolver,
            engine,
        }
    }

    #[must_use]
    pub fn with_macro_policy(mut self, policy: MacroPolicy) -> Self {
        self.engine = self.engine.with_macro_policy(policy);
        self
    }

    #[must_use]
    pub fn bus(&self) -> Arc<NotificationBus> {
        Arc::clone(&self.bus)
    }

    pub fn subscribe<F>(&self, event_name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.bus.subscribe(event_name, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // --- Food ---

    pub async fn log_food(
        &self,
        user_id: &str,
        entry: &NewFoodEntry,
    ) -> EngineResult<EntryChange<FoodEntry>> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        validate_food_entry(entry).map_err(EngineError::validation)?;

        let entry = self
            .store
            .with_db(|db| db.insert_food_entry(&user_id, entry))
            .map_err(EngineError::Write)?;
        info!(user = %user_id, id = entry.id, name = %entry.name, "food logged");

        let key = DayKey::new(&user_id, entry.date).map_err(EngineError::validation)?;
        let totals = self.refresh(&key).await?;
        Ok(EntryChange {
            entry,
            totals,
            previous_day: None,
        })
    }

    pub async fn update_food(
        &self,
        user_id: &str,
        id: i64,
        update: &UpdateFoodEntry,
    ) -> EngineResult<EntryChange<FoodEntry>> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        validate_food_update(update).map_err(EngineError::validation)?;

        let before = self
            .store
            .with_db(|db| db.get_food_entry(&user_id, id))
            .map_err(EngineError::Read)?
            .ok_or_else(|| EngineError::NotFound(format!("food entry {id}")))?;
        let entry = self
            .store
            .with_db(|db| db.update_food_entry(&user_id, id, update))
            .map_err(EngineError::Write)?
            .ok_or_else(|| EngineError::NotFound(format!("food entry {id}")))?;
        debug!(user = %user_id, id, "food updated");

        let (totals, previous_day) = self.refresh_moved(&user_id, before.date, entry.date).await?;
        Ok(EntryChange {
            entry,
            totals,
            previous_day,
        })
    }

    pub async fn delete_food(&self, user_id: &str, id: i64) -> EngineResult<EntryChange<FoodEntry>> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        let entry = self
            .store
            .with_db(|db| db.delete_food_entry(&user_id, id))
            .map_err(EngineError::Write)?
            .ok_or_else(|| EngineError::NotFound(format!("food entry {id}")))?;
        info!(user = %user_id, id, "food deleted");

        let key = DayKey::new(&user_id, entry.date).map_err(EngineError::validation)?;
        let totals = self.refresh(&key).await?;
        Ok(EntryChange {
            entry,
            totals,
            previous_day: None,
        })
    }

    pub fn list_foods(&self, user_id: &str, date: &str) -> EngineResult<Vec<FoodEntry>> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        self.store
            .with_db(|db| db.list_food_entries(&key))
            .map_err(EngineError::Read)
    }

    // --- Workouts ---

    pub async fn log_workout(
        &self,
        user_id: &str,
        entry: &NewWorkoutEntry,
    ) -> EngineResult<EntryChange<WorkoutEntry>> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        validate_workout_entry(entry).map_err(EngineError::validation)?;

        let entry = self
            .store
            .with_db(|db| db.insert_workout_entry(&user_id, entry))
            .map_err(EngineError::Write)?;
        info!(user = %user_id, id = entry.id, name = %entry.name, "workout logged");

        let key = DayKey::new(&user_id, entry.date).map_err(EngineError::validation)?;
        let totals = self.refresh(&key).await?;
        Ok(EntryChange {
            entry,
            totals,
            previous_day: None,
        })
    }

    pub async fn update_workout(
        &self,
        user_id: &str,
        id: i64,
        update: &UpdateWorkoutEntry,
    ) -> EngineResult<EntryChange<WorkoutEntry>> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        validate_workout_update(update).map_err(EngineError::validation)?;

        let before = self
            .store
            .with_db(|db| db.get_workout_entry(&user_id, id))
            .map_err(EngineError::Read)?
            .ok_or_else(|| EngineError::NotFound(format!("workout {id}")))?;
        let entry = self
            .store
            .with_db(|db| db.update_workout_entry(&user_id, id, update))
            .map_err(EngineError::Write)?
            .ok_or_else(|| EngineError::NotFound(format!("workout {id}")))?;
        debug!(user = %user_id, id, "workout updated");

        let (totals, previous_day) = self.refresh_moved(&user_id, before.date, entry.date).await?;
        Ok(EntryChange {
            entry,
            totals,
            previous_day,
        })
    }

    pub async fn delete_workout(
        &self,
        user_id: &str,
        id: i64,
    ) -> EngineResult<EntryChange<WorkoutEntry>> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        let entry = self
            .store
            .with_db(|db| db.delete_workout_entry(&user_id, id))
            .map_err(EngineError::Write)?
            .ok_or_else(|| EngineError::NotFound(format!("workout {id}")))?;
        info!(user = %user_id, id, "workout deleted");

        let key = DayKey::new(&user_id, entry.date).map_err(EngineError::validation)?;
        let totals = self.refresh(&key).await?;
        Ok(EntryChange {
            entry,
            totals,
            previous_day: None,
        })
    }

    pub fn list_workouts(&self, user_id: &str, date: &str) -> EngineResult<Vec<WorkoutEntry>> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        self.store
            .with_db(|db| db.list_workout_entries(&key))
            .map_err(EngineError::Read)
    }

    // --- Targets ---

    /// Replace the day's embedded targets, publish them, then recompute.
    pub async fn save_day_targets(
        &self,
        user_id: &str,
        date: &str,
        targets: &DayTargets,
    ) -> EngineResult<DayTotals> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        validate_day_targets(targets).map_err(EngineError::validation)?;
        let guard = self.engine.lock_day(&key).await;
        self.write_day_targets(&key, targets).await?;
        self.snapshot_target(&key).await?;
        self.engine.recalc_locked(&key, &guard).await
    }

    /// Record a new standing target. Days that already carry a snapshot keep it.
    pub fn save_standing_target(
        &self,
        user_id: &str,
        target: &NewTarget,
    ) -> EngineResult<TargetRecord> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        validate_target(target).map_err(EngineError::validation)?;

        let record = self
            .store
            .with_db(|db| db.insert_standing_target(&user_id, target))
            .map_err(EngineError::Write)?;
        info!(user = %user_id, calories = record.calories, "standing target saved");

        self.bus.emit(&Event::TargetsSaved {
            user_id,
            date: None,
            targets: record.to_day_targets(),
        });
        Ok(record)
    }

    /// Record a per-date target row and make it the day's snapshot.
    pub async fn save_daily_target(
        &self,
        user_id: &str,
        date: &str,
        target: &NewTarget,
    ) -> EngineResult<(TargetRecord, DayTotals)> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        validate_target(target).map_err(EngineError::validation)?;

        let guard = self.engine.lock_day(&key).await;
        let record = self
            .store
            .with_db(|db| db.insert_daily_target(&key, target))
            .map_err(EngineError::Write)?;
        self.write_day_targets(&key, &record.to_day_targets()).await?;
        let totals = self.engine.recalc_locked(&key, &guard).await?;
        Ok((record, totals))
    }

    pub fn standing_targets(&self, user_id: &str) -> EngineResult<Vec<TargetRecord>> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        self.store
            .with_db(|db| db.list_standing_targets(&user_id))
            .map_err(EngineError::Read)
    }

    /// Effective target for a day without touching its stored state.
    pub async fn resolve_target(&self, user_id: &str, date: &str) -> EngineResult<ResolvedTarget> {
        self.resolver.resolve_targets(user_id, date).await
    }

    // --- Day ---

    pub async fn recalc_day(&self, user_id: &str, date: &str) -> EngineResult<DayTotals> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        self.refresh(&key).await
    }

    pub async fn pin_remaining(
        &self,
        user_id: &str,
        date: &str,
        value: Option<f64>,
    ) -> EngineResult<DayTotals> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        validate_pin_value(value)?;
        let guard = self.engine.lock_day(&key).await;
        self.snapshot_target(&key).await?;
        self.engine.pin_locked(&key, value, &guard).await
    }

    pub async fn unpin_remaining(&self, user_id: &str, date: &str) -> EngineResult<DayTotals> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        let guard = self.engine.lock_day(&key).await;
        self.snapshot_target(&key).await?;
        self.engine.unpin_locked(&key, &guard).await
    }

    /// Entries, totals and the resolved target for one day. Days that have
    /// never been computed are computed now.
    pub async fn get_day(&self, user_id: &str, date: &str) -> EngineResult<DayView> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;

        let stored = self
            .store
            .read_day(&key)
            .await
            .map_err(EngineError::Read)?
            .and_then(|d| d.totals);
        let totals = match stored {
            Some(totals) => totals,
            None => self.refresh(&key).await?,
        };
        let target = self.resolver.resolve(&key).await?;
        let (foods, workouts) = self
            .store
            .with_db(|db| Ok((db.list_food_entries(&key)?, db.list_workout_entries(&key)?)))
            .map_err(EngineError::Read)?;

        Ok(DayView {
            user_id: key.user_id.clone(),
            date: key.date_str(),
            foods,
            workouts,
            display_remaining: totals.display_remaining(),
            over_target: totals.is_over_target(),
            totals,
            target,
        })
    }

    /// Persisted totals for the `days` calendar days ending at `today`,
    /// oldest first. Days with nothing stored are reported as not logged.
    pub async fn day_history(
        &self,
        user_id: &str,
        days: u32,
        today: NaiveDate,
    ) -> EngineResult<Vec<DaySummary>> {
        let user_id = validate_user_id(user_id).map_err(EngineError::validation)?;
        if days == 0 || days > MAX_HISTORY_DAYS {
            return Err(EngineError::Validation(format!(
                "days must be between 1 and {MAX_HISTORY_DAYS}"
            )));
        }
        let from = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .ok_or_else(|| EngineError::validation("history window out of range"))?;

        let stored: HashMap<NaiveDate, DayTotals> = self
            .store
            .list_days(&user_id, from, today)
            .await
            .map_err(EngineError::Read)?
            .into_iter()
            .filter_map(|d| d.totals.map(|t| (d.date, t)))
            .collect();

        Ok(from
            .iter_days()
            .take_while(|d| *d <= today)
            .map(|d| DaySummary::from_totals(d, stored.get(&d)))
            .collect())
    }

    // --- Internals ---

    async fn write_day_targets(&self, key: &DayKey, targets: &DayTargets) -> EngineResult<()> {
        self.store
            .upsert_day_targets(key, targets)
            .await
            .map_err(EngineError::Write)?;
        info!(%key, calories = ?targets.calories, "day targets saved");
        self.bus.emit(&Event::TargetsSaved {
            user_id: key.user_id.clone(),
            date: Some(key.date),
            targets: targets.clone(),
        });
        Ok(())
    }

    /// Give the day a calorie snapshot when it has none. Days that resolve to
    /// nothing stay empty so a later standing target still reaches them.
    /// Callers hold the day's lock.
    async fn snapshot_target(&self, key: &DayKey) -> EngineResult<()> {
        let day = self.store.read_day(key).await.map_err(EngineError::Read)?;
        if day.as_ref().and_then(|d| d.embedded_calories()).is_some() {
            return Ok(());
        }
        let resolved = self.resolver.resolve(key).await?;
        if resolved.source == TargetSource::Default {
            return Ok(());
        }
        debug!(%key, source = ?resolved.source, "snapshotting target");
        self.write_day_targets(key, &resolved.to_day_targets()).await
    }

    async fn refresh(&self, key: &DayKey) -> EngineResult<DayTotals> {
        let guard = self.engine.lock_day(key).await;
        self.snapshot_target(key).await?;
        self.engine.recalc_locked(key, &guard).await
    }

    async fn refresh_moved(
        &self,
        user_id: &str,
        before: NaiveDate,
        after: NaiveDate,
    ) -> EngineResult<(DayTotals, Option<DayTotals>)> {
        let previous = if before == after {
            None
        } else {
            let key = DayKey::new(user_id, before).map_err(EngineError::validation)?;
            Some(self.refresh(&key).await?)
        };
        let key = DayKey::new(user_id, after).map_err(EngineError::validation)?;
        Ok((self.refresh(&key).await?, previous))
    }
}
