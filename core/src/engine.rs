//! Daily totals recomputation.
//!
//! `TotalsEngine` is the only code that writes `days.totals`. Every mutation
//! path (entry changes, target saves, pin/unpin) ends in one of its methods.

use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::bus::{Event, NotificationBus};
use crate::error::{EngineError, EngineResult};
use crate::locks::{DayGuard, KeyedLocks};
use crate::models::{Day, DayKey, DayTotals, FoodSums, coerce_non_negative, finite};
use crate::store::{DayStore, EntryStore};

/// What to do with protein/carbs/fat on recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MacroPolicy {
    /// Sum macros over the day's food entries, like calories.
    #[default]
    Recompute,
    /// Copy macros from the previously persisted totals unchanged.
    CarryForward,
}

/// Sums smaller than this are treated as unchanged when checking a pin.
const SUM_TOLERANCE: f64 = 1e-9;

fn sums_differ(a: f64, b: f64) -> bool {
    (a - b).abs() > SUM_TOLERANCE
}

pub(crate) fn validate_pin_value(value: Option<f64>) -> EngineResult<()> {
    if value.is_some_and(|v| !v.is_finite()) {
        return Err(EngineError::validation("pinned remaining must be a number"));
    }
    Ok(())
}

/// Base target from the day's embedded snapshot only, plus the prior totals.
fn split_day(day: Option<Day>) -> (f64, Option<DayTotals>) {
    match day {
        Some(day) => (coerce_non_negative(day.embedded_calories()), day.totals),
        None => (0.0, None),
    }
}

/// Pure totals computation from gathered inputs and the prior record.
#[must_use]
pub fn compute_totals(
    base_target: f64,
    food: &FoodSums,
    workout_cals: f64,
    prior: Option<&DayTotals>,
    policy: MacroPolicy,
) -> DayTotals {
    let food_cals = coerce_non_negative(Some(food.calories));
    // Workout sums keep their sign; only the allowance itself is floored.
    let workout_cals = finite(Some(workout_cals)).unwrap_or(0.0);
    let allowance = (coerce_non_negative(Some(base_target)) + workout_cals).max(0.0);
    let computed = allowance - food_cals;

    let inputs_changed = prior.is_some_and(|p| {
        sums_differ(p.food_cals, food_cals) || sums_differ(p.workout_cals, workout_cals)
    });
    let locked = prior.is_some_and(|p| p.locked_remaining) && !inputs_changed;

    let (remaining, remaining_override) = match prior {
        Some(p) if locked => {
            let pinned = finite(p.remaining_override)
                .or_else(|| finite(Some(p.remaining)))
                .unwrap_or(computed);
            (pinned, finite(p.remaining_override))
        }
        _ => (computed, None),
    };

    let (protein, carbs, fat) = match policy {
        MacroPolicy::Recompute => (
            Some(coerce_non_negative(Some(food.protein))),
            Some(coerce_non_negative(Some(food.carbs))),
            Some(coerce_non_negative(Some(food.fat))),
        ),
        MacroPolicy::CarryForward => prior.map_or((None, None, None), |p| (p.protein, p.carbs, p.fat)),
    };

    DayTotals {
        food_cals,
        workout_cals,
        allowance,
        remaining,
        protein,
        carbs,
        fat,
        locked_remaining: locked,
        remaining_override,
    }
}

pub struct TotalsEngine {
    entries: Arc<dyn EntryStore>,
    days: Arc<dyn DayStore>,
    bus: Arc<NotificationBus>,
    locks: KeyedLocks,
    macro_policy: MacroPolicy,
}

impl TotalsEngine {
    pub fn new(
        entries: Arc<dyn EntryStore>,
        days: Arc<dyn DayStore>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            entries,
            days,
            bus,
            locks: KeyedLocks::new(),
            macro_policy: MacroPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_macro_policy(mut self, policy: MacroPolicy) -> Self {
        self.macro_policy = policy;
        self
    }

    #[must_use]
    pub fn macro_policy(&self) -> MacroPolicy {
        self.macro_policy
    }

    /// Recompute, persist and publish totals for one day. Safe to call
    /// repeatedly: unchanged inputs produce identical totals.
    pub async fn recalc_and_persist_day(&self, user_id: &str, date: &str) -> EngineResult<DayTotals> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        self.recalc_key(&key).await
    }

    pub async fn recalc_key(&self, key: &DayKey) -> EngineResult<DayTotals> {
        let guard = self.lock_day(key).await;
        self.recalc_locked(key, &guard).await
    }

    /// Hold the day's lock across several steps. Writes the caller makes
    /// while holding it cannot interleave with another recompute of the day.
    pub async fn lock_day(&self, key: &DayKey) -> DayGuard {
        self.locks.acquire(key).await
    }

    /// Recompute with the day's lock already held by the caller.
    pub async fn recalc_locked(
        &self,
        key: &DayKey,
        _guard: &DayGuard,
    ) -> EngineResult<DayTotals> {
        let (food, workout_cals, day) = self.gather(key).await?;
        let (base, prior) = split_day(day);
        let totals = self.compute(base, &food, workout_cals, prior.as_ref());
        self.commit(key, totals).await
    }

    /// Pin `remaining` for the day. With `None`, the currently computed
    /// remaining is pinned. The pin holds until an entry sum changes or
    /// `unpin_remaining` is called.
    pub async fn pin_remaining(
        &self,
        user_id: &str,
        date: &str,
        value: Option<f64>,
    ) -> EngineResult<DayTotals> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        validate_pin_value(value)?;
        let guard = self.lock_day(&key).await;
        self.pin_locked(&key, value, &guard).await
    }

    pub async fn pin_locked(
        &self,
        key: &DayKey,
        value: Option<f64>,
        _guard: &DayGuard,
    ) -> EngineResult<DayTotals> {
        validate_pin_value(value)?;
        let (food, workout_cals, day) = self.gather(key).await?;
        let (base, prior) = split_day(day);
        let mut totals = self.compute(base, &food, workout_cals, prior.as_ref());
        totals.locked_remaining = true;
        totals.remaining_override = value;
        if let Some(v) = value {
            totals.remaining = v;
        }
        self.commit(key, totals).await
    }

    /// Clear any pin and recompute `remaining` from the sums.
    pub async fn unpin_remaining(&self, user_id: &str, date: &str) -> EngineResult<DayTotals> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        let guard = self.lock_day(&key).await;
        self.unpin_locked(&key, &guard).await
    }

    pub async fn unpin_locked(
        &self,
        key: &DayKey,
        _guard: &DayGuard,
    ) -> EngineResult<DayTotals> {
        let (food, workout_cals, day) = self.gather(key).await?;
        let (base, prior) = split_day(day);
        let prior = prior.map(|mut p| {
            p.locked_remaining = false;
            p.remaining_override = None;
            p
        });
        let totals = self.compute(base, &food, workout_cals, prior.as_ref());
        self.commit(key, totals).await
    }

    async fn gather(&self, key: &DayKey) -> EngineResult<(FoodSums, f64, Option<Day>)> {
        let (food, workout_cals, day) = tokio::try_join!(
            async {
                self.entries
                    .sum_food(key)
                    .await
                    .with_context(|| format!("summing food entries for {key}"))
                    .map_err(EngineError::Read)
            },
            async {
                self.entries
                    .sum_workout_calories(key)
                    .await
                    .with_context(|| format!("summing workouts for {key}"))
                    .map_err(EngineError::Read)
            },
            async {
                self.days
                    .read_day(key)
                    .await
                    .with_context(|| format!("reading day {key}"))
                    .map_err(EngineError::Read)
            },
        )?;
        Ok((food, workout_cals, day))
    }

    fn compute(
        &self,
        base_target: f64,
        food: &FoodSums,
        workout_cals: f64,
        prior: Option<&DayTotals>,
    ) -> DayTotals {
        compute_totals(base_target, food, workout_cals, prior, self.macro_policy)
    }

    async fn commit(&self, key: &DayKey, totals: DayTotals) -> EngineResult<DayTotals> {
        self.days
            .upsert_day_totals(key, &totals)
            .await
            .with_context(|| format!("writing totals for {key}"))
            .map_err(EngineError::Write)?;

        debug!(
            %key,
            food_cals = totals.food_cals,
            workout_cals = totals.workout_cals,
            allowance = totals.allowance,
            remaining = totals.remaining,
            locked = totals.locked_remaining,
            "totals persisted"
        );

        self.bus.emit(&Event::TotalsChanged {
            user_id: key.user_id.clone(),
            date: key.date,
            totals: totals.clone(),
        });
        Ok(totals)
    }
}
