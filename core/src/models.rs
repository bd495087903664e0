use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

// --- Numeric coercion ---

/// Collapse an optional, possibly non-finite or negative number to a usable
/// non-negative value. Every summation and target lookup goes through this.
#[must_use]
pub fn coerce_non_negative(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

/// `Some` only when the value is present and a real number.
#[must_use]
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

// --- Day key ---

/// Identifies one Day row: a user and a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey {
    pub user_id: String,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(user_id: &str, date: NaiveDate) -> Result<Self> {
        let user_id = validate_user_id(user_id)?;
        Ok(Self { user_id, date })
    }

    /// Build a key from raw request input, rejecting empty ids and malformed dates.
    pub fn parse(user_id: &str, date: &str) -> Result<Self> {
        let user_id = validate_user_id(user_id)?;
        let date = parse_date_key(date)?;
        Ok(Self { user_id, date })
    }

    #[must_use]
    pub fn date_str(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.date.format(DATE_FORMAT))
    }
}

pub fn validate_user_id(user_id: &str) -> Result<String> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        bail!("user id must not be empty");
    }
    Ok(trimmed.to_string())
}

pub fn parse_date_key(date: &str) -> Result<NaiveDate> {
    let trimmed = date.trim();
    if trimmed.is_empty() {
        bail!("date must not be empty");
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| anyhow::anyhow!("Invalid date '{trimmed}'. Use YYYY-MM-DD"))
}

// --- Entries ---

/// Where a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    #[default]
    Manual,
    Ai,
    Plan,
    Import,
}

impl EntrySource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Ai => "ai",
            Self::Plan => "plan",
            Self::Import => "import",
        }
    }
}

impl FromStr for EntrySource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "ai" => Ok(Self::Ai),
            "plan" => Ok(Self::Plan),
            "import" => Ok(Self::Import),
            _ => bail!("Invalid source '{s}'. Must be one of: manual, ai, plan, import"),
        }
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodEntry {
    pub id: i64,
    pub uuid: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub meal_type: String,
    pub name: String,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub source: EntrySource,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewFoodEntry {
    pub date: NaiveDate,
    pub meal_type: String,
    pub name: String,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub source: EntrySource,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateFoodEntry {
    pub date: Option<NaiveDate>,
    pub meal_type: Option<String>,
    pub name: Option<String>,
    pub calories: Option<Option<f64>>,
    pub protein: Option<Option<f64>>,
    pub carbs: Option<Option<f64>>,
    pub fat: Option<Option<f64>>,
}

impl UpdateFoodEntry {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.meal_type.is_none()
            && self.name.is_none()
            && self.calories.is_none()
            && self.protein.is_none()
            && self.carbs.is_none()
            && self.fat.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutEntry {
    pub id: i64,
    pub uuid: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub name: String,
    pub duration_min: Option<f64>,
    pub calories_burned: Option<f64>,
    pub source: EntrySource,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWorkoutEntry {
    pub date: NaiveDate,
    pub name: String,
    pub duration_min: Option<f64>,
    pub calories_burned: Option<f64>,
    pub source: EntrySource,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateWorkoutEntry {
    pub date: Option<NaiveDate>,
    pub name: Option<String>,
    pub duration_min: Option<Option<f64>>,
    pub calories_burned: Option<Option<f64>>,
}

impl UpdateWorkoutEntry {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.name.is_none()
            && self.duration_min.is_none()
            && self.calories_burned.is_none()
    }
}

/// Food sums for one day. Macros are always summed; whether the engine uses
/// them depends on its `MacroPolicy`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FoodSums {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub entry_count: i64,
}

// --- Targets ---

/// Target snapshot embedded in a Day row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayTargets {
    #[serde(default, deserialize_with = "lenient_number")]
    pub calories: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub protein: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub carbs: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub fat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl DayTargets {
    /// Embedded calorie target, when it is a real number.
    #[must_use]
    pub fn base_calories(&self) -> Option<f64> {
        finite(self.calories)
    }
}

/// Where a target row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetOrigin {
    #[default]
    Manual,
    Suggested,
}

impl TargetOrigin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Suggested => "suggested",
        }
    }
}

impl FromStr for TargetOrigin {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "suggested" => Ok(Self::Suggested),
            _ => bail!("Invalid target origin '{s}'. Must be manual or suggested"),
        }
    }
}

/// A row from the standing `targets` table or the `daily_targets` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: i64,
    pub uuid: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub calories: f64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub label: Option<String>,
    pub rationale: Option<String>,
    pub origin: TargetOrigin,
    pub created_at: String,
}

impl TargetRecord {
    #[must_use]
    pub fn to_day_targets(&self) -> DayTargets {
        DayTargets {
            calories: Some(self.calories),
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            label: self.label.clone(),
            rationale: self.rationale.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTarget {
    pub calories: f64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub label: Option<String>,
    pub rationale: Option<String>,
    pub origin: TargetOrigin,
}

impl NewTarget {
    #[must_use]
    pub fn calories(calories: f64) -> Self {
        Self {
            calories,
            protein: None,
            carbs: None,
            fat: None,
            label: None,
            rationale: None,
            origin: TargetOrigin::Manual,
        }
    }

    #[must_use]
    pub fn to_day_targets(&self) -> DayTargets {
        DayTargets {
            calories: Some(self.calories),
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            label: self.label.clone(),
            rationale: self.rationale.clone(),
        }
    }
}

/// Which precedence step produced a resolved calorie target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Day,
    DailyTarget,
    Standing,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTarget {
    pub calories: f64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub label: Option<String>,
    pub rationale: Option<String>,
    pub source: TargetSource,
}

impl ResolvedTarget {
    #[must_use]
    pub fn to_day_targets(&self) -> DayTargets {
        DayTargets {
            calories: Some(self.calories),
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            label: self.label.clone(),
            rationale: self.rationale.clone(),
        }
    }
}

// --- Day ---

/// Derived totals for one (user, date). Persisted as JSON in `days.totals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTotals {
    #[serde(default, deserialize_with = "lenient_zero")]
    pub food_cals: f64,
    #[serde(default, deserialize_with = "lenient_zero")]
    pub workout_cals: f64,
    #[serde(default, deserialize_with = "lenient_zero")]
    pub allowance: f64,
    /// Signed: negative means over target. NaN only for stored rows whose
    /// blob carried no numeric `remaining`.
    #[serde(default = "missing_number", deserialize_with = "lenient_nan")]
    pub remaining: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub protein: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub carbs: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub fat: Option<f64>,
    #[serde(default)]
    pub locked_remaining: bool,
    #[serde(default, deserialize_with = "lenient_number")]
    pub remaining_override: Option<f64>,
}

impl DayTotals {
    /// Totals for a day nobody has logged anything on yet.
    #[must_use]
    pub fn empty(base_target: f64) -> Self {
        let allowance = base_target.max(0.0);
        Self {
            food_cals: 0.0,
            workout_cals: 0.0,
            allowance,
            remaining: allowance,
            protein: None,
            carbs: None,
            fat: None,
            locked_remaining: false,
            remaining_override: None,
        }
    }

    /// Remaining as shown to a user: never below zero.
    #[must_use]
    pub fn display_remaining(&self) -> f64 {
        if self.remaining.is_finite() {
            self.remaining.max(0.0)
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn is_over_target(&self) -> bool {
        self.remaining.is_finite() && self.remaining < 0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Day {
    pub user_id: String,
    pub date: NaiveDate,
    pub targets: Option<DayTargets>,
    pub totals: Option<DayTotals>,
    pub created_at: String,
    pub updated_at: String,
}

impl Day {
    #[must_use]
    pub fn embedded_calories(&self) -> Option<f64> {
        self.targets.as_ref().and_then(DayTargets::base_calories)
    }
}

/// Everything a client needs to render one day.
#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub user_id: String,
    pub date: String,
    pub foods: Vec<FoodEntry>,
    pub workouts: Vec<WorkoutEntry>,
    pub totals: DayTotals,
    pub display_remaining: f64,
    pub over_target: bool,
    pub target: ResolvedTarget,
}

/// One row of the history/trends listing.
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: String,
    pub food_cals: f64,
    pub workout_cals: f64,
    pub allowance: f64,
    pub remaining: f64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub logged: bool,
}

impl DaySummary {
    #[must_use]
    pub fn from_totals(date: NaiveDate, totals: Option<&DayTotals>) -> Self {
        let date = date.format(DATE_FORMAT).to_string();
        match totals {
            Some(t) => Self {
                date,
                food_cals: t.food_cals,
                workout_cals: t.workout_cals,
                allowance: t.allowance,
                remaining: if t.remaining.is_finite() { t.remaining } else { 0.0 },
                protein: t.protein,
                carbs: t.carbs,
                fat: t.fat,
                logged: true,
            },
            None => Self {
                date,
                food_cals: 0.0,
                workout_cals: 0.0,
                allowance: 0.0,
                remaining: 0.0,
                protein: None,
                carbs: None,
                fat: None,
                logged: false,
            },
        }
    }
}

// --- Lenient JSON helpers for stored blobs ---

fn missing_number() -> f64 {
    f64::NAN
}

fn number_from_value(value: Option<serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => finite(n.as_f64()),
        serde_json::Value::String(s) => finite(s.trim().parse::<f64>().ok()),
        _ => None,
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(number_from_value(value))
}

fn lenient_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(number_from_value(value).unwrap_or(0.0))
}

fn lenient_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(number_from_value(value).unwrap_or(f64::NAN))
}

// --- Validation ---

pub fn validate_meal_type(meal: &str) -> anyhow::Result<String> {
    let lower = meal.to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        anyhow::bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )
    }
}

fn validate_optional_amount(field: &str, value: Option<f64>) -> anyhow::Result<()> {
    if let Some(v) = value {
        if !v.is_finite() {
            anyhow::bail!("{field} must be a number");
        }
        if v < 0.0 {
            anyhow::bail!("{field} must not be negative");
        }
    }
    Ok(())
}

/// Validate a new food entry: name must not be empty, amounts must not be negative.
pub fn validate_food_entry(entry: &NewFoodEntry) -> anyhow::Result<()> {
    if entry.name.trim().is_empty() {
        anyhow::bail!("Food name must not be empty");
    }
    validate_meal_type(&entry.meal_type)?;
    validate_optional_amount("calories", entry.calories)?;
    validate_optional_amount("protein", entry.protein)?;
    validate_optional_amount("carbs", entry.carbs)?;
    validate_optional_amount("fat", entry.fat)?;
    Ok(())
}

pub fn validate_food_update(update: &UpdateFoodEntry) -> anyhow::Result<()> {
    if update.is_empty() {
        anyhow::bail!("At least one field must be provided");
    }
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            anyhow::bail!("Food name must not be empty");
        }
    }
    if let Some(meal) = &update.meal_type {
        validate_meal_type(meal)?;
    }
    validate_optional_amount("calories", update.calories.flatten())?;
    validate_optional_amount("protein", update.protein.flatten())?;
    validate_optional_amount("carbs", update.carbs.flatten())?;
    validate_optional_amount("fat", update.fat.flatten())?;
    Ok(())
}

/// Validate a new workout entry: name must not be empty, burn/duration must not be negative.
pub fn validate_workout_entry(entry: &NewWorkoutEntry) -> anyhow::Result<()> {
    if entry.name.trim().is_empty() {
        anyhow::bail!("Workout name must not be empty");
    }
    validate_optional_amount("duration_min", entry.duration_min)?;
    validate_optional_amount("calories_burned", entry.calories_burned)?;
    Ok(())
}

pub fn validate_workout_update(update: &UpdateWorkoutEntry) -> anyhow::Result<()> {
    if update.is_empty() {
        anyhow::bail!("At least one field must be provided");
    }
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            anyhow::bail!("Workout name must not be empty");
        }
    }
    validate_optional_amount("duration_min", update.duration_min.flatten())?;
    validate_optional_amount("calories_burned", update.calories_burned.flatten())?;
    Ok(())
}

/// Validate a target: calories > 0, macros non-negative grams.
pub fn validate_target(target: &NewTarget) -> anyhow::Result<()> {
    if !target.calories.is_finite() || target.calories <= 0.0 {
        anyhow::bail!("Target calories must be greater than 0");
    }
    validate_optional_amount("protein", target.protein)?;
    validate_optional_amount("carbs", target.carbs)?;
    validate_optional_amount("fat", target.fat)?;
    Ok(())
}

pub fn validate_day_targets(targets: &DayTargets) -> anyhow::Result<()> {
    if let Some(c) = targets.calories {
        if !c.is_finite() || c < 0.0 {
            anyhow::bail!("Target calories must not be negative");
        }
    }
    validate_optional_amount("protein", targets.protein)?;
    validate_optional_amount("carbs", targets.carbs)?;
    validate_optional_amount("fat", targets.fat)?;
    Ok(())
}
