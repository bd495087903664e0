use anyhow::{Result, bail};

use fuel_core::models::{EntrySource, FoodEntry, NewFoodEntry, UpdateFoodEntry};
use fuel_core::service::{EntryChange, FuelService};

use super::helpers::{date_key, parse_clearable, parse_date, print_food_table, print_totals};

/// Arguments for `food add`, gathered by clap.
pub(crate) struct FoodArgs {
    pub name: String,
    pub meal: String,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub source: String,
    pub date: Option<String>,
}

/// Arguments for `food update`. Amounts accept `none` to clear a value.
pub(crate) struct FoodUpdateArgs {
    pub name: Option<String>,
    pub meal: Option<String>,
    pub calories: Option<String>,
    pub protein: Option<String>,
    pub carbs: Option<String>,
    pub fat: Option<String>,
    pub date: Option<String>,
}

fn print_change(verb: &str, change: &EntryChange<FoodEntry>) {
    let entry = &change.entry;
    let cal = entry
        .calories
        .map_or_else(|| "no calories".to_string(), |c| format!("{c:.0} kcal"));
    println!(
        "{verb} #{}: {} ({}, {cal}) on {}",
        entry.id, entry.name, entry.meal_type, entry.date
    );
    if let Some(previous) = &change.previous_day {
        print_totals("Previous day", previous);
    }
    print_totals(&entry.date.to_string(), &change.totals);
}

pub(crate) async fn cmd_food_add(
    service: &FuelService,
    user: &str,
    args: FoodArgs,
    json: bool,
) -> Result<()> {
    let entry = NewFoodEntry {
        date: parse_date(args.date)?,
        meal_type: args.meal,
        name: args.name,
        calories: args.calories,
        protein: args.protein,
        carbs: args.carbs,
        fat: args.fat,
        source: args.source.parse::<EntrySource>()?,
    };
    let change = service.log_food(user, &entry).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&change)?);
    } else {
        print_change("Logged", &change);
    }
    Ok(())
}

pub(crate) fn cmd_food_list(
    service: &FuelService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = date_key(date)?;
    let foods = service.list_foods(user, &date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
        return Ok(());
    }
    if foods.is_empty() {
        println!("No food logged for {date}");
        return Ok(());
    }
    print_food_table(&foods);
    Ok(())
}

pub(crate) async fn cmd_food_update(
    service: &FuelService,
    user: &str,
    id: i64,
    args: FoodUpdateArgs,
    json: bool,
) -> Result<()> {
    let update = UpdateFoodEntry {
        date: args.date.map(|d| parse_date(Some(d))).transpose()?,
        meal_type: args.meal,
        name: args.name,
        calories: parse_clearable(args.calories.as_deref())?,
        protein: parse_clearable(args.protein.as_deref())?,
        carbs: parse_clearable(args.carbs.as_deref())?,
        fat: parse_clearable(args.fat.as_deref())?,
    };
    if update.is_empty() {
        bail!("Nothing to update. Use --name, --meal, --calories, --protein, --carbs, --fat or --date");
    }
    let change = service.update_food(user, id, &update).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&change)?);
    } else {
        print_change("Updated", &change);
    }
    Ok(())
}

pub(crate) async fn cmd_food_delete(
    service: &FuelService,
    user: &str,
    id: i64,
    json: bool,
) -> Result<()> {
    let change = service.delete_food(user, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&change)?);
    } else {
        print_change("Deleted", &change);
    }
    Ok(())
}
