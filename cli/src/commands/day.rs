use std::process;

use anyhow::Result;
use chrono::Local;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fuel_core::service::FuelService;

use super::helpers::{
    date_key, fmt_grams, json_error, no_neg_zero, print_food_table, print_target, print_totals,
    print_workout_table,
};

pub(crate) async fn cmd_day(
    service: &FuelService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = date_key(date)?;
    let view = service.get_day(user, &date).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    print_totals(&view.date, &view.totals);
    print_target(&view.target);

    if !view.foods.is_empty() {
        println!("\nFood:");
        print_food_table(&view.foods);
    }
    if !view.workouts.is_empty() {
        println!("\nWorkouts:");
        print_workout_table(&view.workouts);
    }
    Ok(())
}

pub(crate) async fn cmd_recalc(
    service: &FuelService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = date_key(date)?;
    let totals = service.recalc_day(user, &date).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    } else {
        print_totals(&date, &totals);
    }
    Ok(())
}

pub(crate) async fn cmd_pin(
    service: &FuelService,
    user: &str,
    value: Option<f64>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = date_key(date)?;
    let totals = service.pin_remaining(user, &date, value).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    } else {
        print_totals(&date, &totals);
        println!("Remaining stays pinned until food or workouts change, or `fuel unpin`.");
    }
    Ok(())
}

pub(crate) async fn cmd_unpin(
    service: &FuelService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = date_key(date)?;
    let totals = service.unpin_remaining(user, &date).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    } else {
        print_totals(&date, &totals);
    }
    Ok(())
}

pub(crate) async fn cmd_history(
    service: &FuelService,
    user: &str,
    days: u32,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Workouts")]
        workouts: String,
        #[tabled(rename = "Allowance")]
        allowance: String,
        #[tabled(rename = "Remaining")]
        remaining: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let today = Local::now().date_naive();
    let summaries = service.day_history(user, days, today).await?;

    if summaries.iter().all(|s| !s.logged) {
        let message = format!("No entries in the last {days} days");
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    let rows: Vec<HistoryRow> = summaries
        .iter()
        .rev()
        .map(|s| HistoryRow {
            date: s.date.clone(),
            food: format!("{:.0}", no_neg_zero(s.food_cals)),
            workouts: format!("{:.0}", no_neg_zero(s.workout_cals)),
            allowance: format!("{:.0}", no_neg_zero(s.allowance)),
            remaining: if s.logged {
                format!("{:.0}", no_neg_zero(s.remaining))
            } else {
                "-".into()
            },
            protein: fmt_grams(s.protein),
            carbs: fmt_grams(s.carbs),
            fat: fmt_grams(s.fat),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
