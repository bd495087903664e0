use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fuel_core::models::{
    DATE_FORMAT, DayTotals, FoodEntry, ResolvedTarget, TargetSource, WorkoutEntry,
};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, DATE_FORMAT).with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Date argument in the form the service expects.
pub(crate) fn date_key(date_str: Option<String>) -> Result<String> {
    Ok(parse_date(date_str)?.format(DATE_FORMAT).to_string())
}

/// Parse an amount that can also be cleared with `none`.
#[allow(clippy::option_option)]
pub(crate) fn parse_clearable(raw: Option<&str>) -> Result<Option<Option<f64>>> {
    match raw {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("none") || s == "-" => Ok(Some(None)),
        Some(s) => {
            let value: f64 = s
                .trim()
                .parse()
                .with_context(|| format!("Invalid number '{s}'. Use a number or 'none'"))?;
            if value < 0.0 {
                bail!("Amounts must not be negative");
            }
            Ok(Some(Some(value)))
        }
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

pub(crate) fn fmt_amount(value: Option<f64>) -> String {
    value.map_or("-".into(), |v| format!("{:.0}", no_neg_zero(v)))
}

pub(crate) fn fmt_grams(value: Option<f64>) -> String {
    value.map_or("-".into(), |v| format!("{:.0}g", no_neg_zero(v)))
}

pub(crate) fn print_food_table(foods: &[FoodEntry]) {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .map(|f| FoodRow {
            id: f.id,
            meal: f.meal_type.clone(),
            name: truncate(&f.name, 35),
            calories: fmt_amount(f.calories),
            protein: fmt_grams(f.protein),
            carbs: fmt_grams(f.carbs),
            fat: fmt_grams(f.fat),
            source: f.source.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_workout_table(workouts: &[WorkoutEntry]) {
    #[derive(Tabled)]
    struct WorkoutRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Minutes")]
        duration: String,
        #[tabled(rename = "Burned")]
        burned: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<WorkoutRow> = workouts
        .iter()
        .map(|w| WorkoutRow {
            id: w.id,
            name: truncate(&w.name, 35),
            duration: fmt_amount(w.duration_min),
            burned: fmt_amount(w.calories_burned),
            source: w.source.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// One-line remaining summary, clamped for display.
pub(crate) fn remaining_line(totals: &DayTotals) -> String {
    let pinned = if totals.locked_remaining {
        " (pinned)"
    } else {
        ""
    };
    if totals.is_over_target() {
        let over = -totals.remaining;
        format!("0 kcal remaining, {over:.0} over{pinned}")
    } else {
        let remaining = no_neg_zero(totals.display_remaining());
        format!("{remaining:.0} kcal remaining{pinned}")
    }
}

pub(crate) fn print_totals(date: &str, totals: &DayTotals) {
    let food = no_neg_zero(totals.food_cals);
    let workout = no_neg_zero(totals.workout_cals);
    let allowance = no_neg_zero(totals.allowance);
    println!("{date}: {}", remaining_line(totals));
    println!("  Allowance: {allowance:.0} kcal (food {food:.0}, workouts {workout:.0})");
    if totals.protein.is_some() || totals.carbs.is_some() || totals.fat.is_some() {
        println!(
            "  Macros: P {} | C {} | F {}",
            fmt_grams(totals.protein),
            fmt_grams(totals.carbs),
            fmt_grams(totals.fat),
        );
    }
}

pub(crate) fn print_target(target: &ResolvedTarget) {
    let source = match target.source {
        TargetSource::Day => "day snapshot",
        TargetSource::DailyTarget => "daily target",
        TargetSource::Standing => "standing target",
        TargetSource::Default => "no target set",
    };
    print!("Target: {:.0} kcal/day ({source})", target.calories);
    if let Some(label) = &target.label {
        print!(" [{label}]");
    }
    println!();
    if target.protein.is_some() || target.carbs.is_some() || target.fat.is_some() {
        println!(
            "  Macros: P {} | C {} | F {}",
            fmt_grams(target.protein),
            fmt_grams(target.carbs),
            fmt_grams(target.fat),
        );
    }
    if let Some(rationale) = &target.rationale {
        println!("  {rationale}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(date_key(Some("2024-01-15".to_string())).unwrap(), "2024-01-15");
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_parse_clearable() {
        assert_eq!(parse_clearable(None).unwrap(), None);
        assert_eq!(parse_clearable(Some("none")).unwrap(), Some(None));
        assert_eq!(parse_clearable(Some("-")).unwrap(), Some(None));
        assert_eq!(parse_clearable(Some("250")).unwrap(), Some(Some(250.0)));
        assert!(parse_clearable(Some("-5")).is_err());
        assert!(parse_clearable(Some("lots")).is_err());
    }

    #[test]
    fn test_remaining_line() {
        let mut totals = DayTotals::empty(2000.0);
        assert_eq!(remaining_line(&totals), "2000 kcal remaining");

        totals.remaining = -150.0;
        assert_eq!(remaining_line(&totals), "0 kcal remaining, 150 over");

        totals.remaining = 800.0;
        totals.locked_remaining = true;
        assert_eq!(remaining_line(&totals), "800 kcal remaining (pinned)");
    }

    #[test]
    fn test_fmt_amounts() {
        assert_eq!(fmt_amount(None), "-");
        assert_eq!(fmt_amount(Some(-0.0)), "0");
        assert_eq!(fmt_grams(Some(30.4)), "30g");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("boom"), r#"{"error":"boom"}"#);
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(-3.0), -3.0);
    }
}
