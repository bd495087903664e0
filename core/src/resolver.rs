//! Calorie target resolution: day snapshot, then the day's most recent
//! daily-target row, then the user's most recent standing target, then 0.

use std::sync::Arc;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    DayKey, DayTargets, ResolvedTarget, TargetRecord, TargetSource, coerce_non_negative,
};
use crate::store::{DayStore, TargetStore};

#[derive(Clone)]
pub struct TargetResolver {
    days: Arc<dyn DayStore>,
    targets: Arc<dyn TargetStore>,
}

impl TargetResolver {
    pub fn new(days: Arc<dyn DayStore>, targets: Arc<dyn TargetStore>) -> Self {
        Self { days, targets }
    }

    /// Effective base calorie target for the day. Never negative; 0 when no
    /// target exists anywhere.
    pub async fn resolve_base_calories(&self, user_id: &str, date: &str) -> EngineResult<f64> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        Ok(self.resolve(&key).await?.calories)
    }

    /// Full target for display and snapshotting, tagged with where the
    /// calories came from.
    pub async fn resolve_targets(&self, user_id: &str, date: &str) -> EngineResult<ResolvedTarget> {
        let key = DayKey::parse(user_id, date).map_err(EngineError::validation)?;
        self.resolve(&key).await
    }

    pub async fn resolve(&self, key: &DayKey) -> EngineResult<ResolvedTarget> {
        let day = self.days.read_day(key).await.map_err(EngineError::Read)?;
        let snapshot = day.and_then(|d| d.targets).unwrap_or_default();

        if let Some(calories) = snapshot.base_calories() {
            return Ok(from_parts(
                coerce_non_negative(Some(calories)),
                &snapshot,
                None,
                TargetSource::Day,
            ));
        }

        if let Some(daily) = self
            .targets
            .latest_daily_target(key)
            .await
            .map_err(EngineError::Read)?
        {
            debug!(%key, calories = daily.calories, "target from daily row");
            return Ok(from_parts(
                coerce_non_negative(Some(daily.calories)),
                &snapshot,
                Some(&daily),
                TargetSource::DailyTarget,
            ));
        }

        let standing = self
            .targets
            .latest_standing_target(&key.user_id)
            .await
            .map_err(EngineError::Read)?;
        match standing {
            Some(record) => Ok(from_parts(
                coerce_non_negative(Some(record.calories)),
                &snapshot,
                Some(&record),
                TargetSource::Standing,
            )),
            None => Ok(from_parts(0.0, &snapshot, None, TargetSource::Default)),
        }
    }
}

// Macros and labels prefer the day snapshot, then the record that supplied the calories.
fn from_parts(
    calories: f64,
    snapshot: &DayTargets,
    record: Option<&TargetRecord>,
    source: TargetSource,
) -> ResolvedTarget {
    ResolvedTarget {
        calories,
        protein: snapshot.protein.or(record.and_then(|r| r.protein)),
        carbs: snapshot.carbs.or(record.and_then(|r| r.carbs)),
        fat: snapshot.fat.or(record.and_then(|r| r.fat)),
        label: snapshot
            .label
            .clone()
            .or_else(|| record.and_then(|r| r.label.clone())),
        rationale: snapshot
            .rationale
            .clone()
            .or_else(|| record.and_then(|r| r.rationale.clone())),
        source,
    }
}
