use anyhow::{Result, bail};

use fuel_core::models::{EntrySource, NewWorkoutEntry, UpdateWorkoutEntry, WorkoutEntry};
use fuel_core::service::{EntryChange, FuelService};

use super::helpers::{date_key, parse_clearable, parse_date, print_totals, print_workout_table};

pub(crate) struct WorkoutArgs {
    pub name: String,
    pub duration: Option<f64>,
    pub calories: Option<f64>,
    pub source: String,
    pub date: Option<String>,
}

pub(crate) struct WorkoutUpdateArgs {
    pub name: Option<String>,
    pub duration: Option<String>,
    pub calories: Option<String>,
    pub date: Option<String>,
}

fn print_change(verb: &str, change: &EntryChange<WorkoutEntry>) {
    let entry = &change.entry;
    let burned = entry
        .calories_burned
        .map_or_else(|| "no burn recorded".to_string(), |c| format!("{c:.0} kcal"));
    println!("{verb} #{}: {} ({burned}) on {}", entry.id, entry.name, entry.date);
    if let Some(previous) = &change.previous_day {
        print_totals("Previous day", previous);
    }
    print_totals(&entry.date.to_string(), &change.totals);
}

pub(crate) async fn cmd_workout_add(
    service: &FuelService,
    user: &str,
    args: WorkoutArgs,
    json: bool,
) -> Result<()> {
    let entry = NewWorkoutEntry {
        date: parse_date(args.date)?,
        name: args.name,
        duration_min: args.duration,
        calories_burned: args.calories,
        source: args.source.parse::<EntrySource>()?,
    };
    let change = service.log_workout(user, &entry).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&change)?);
    } else {
        print_change("Logged", &change);
    }
    Ok(())
}

pub(crate) fn cmd_workout_list(
    service: &FuelService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = date_key(date)?;
    let workouts = service.list_workouts(user, &date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workouts)?);
        return Ok(());
    }
    if workouts.is_empty() {
        println!("No workouts logged for {date}");
        return Ok(());
    }
    print_workout_table(&workouts);
    Ok(())
}

pub(crate) async fn cmd_workout_update(
    service: &FuelService,
    user: &str,
    id: i64,
    args: WorkoutUpdateArgs,
    json: bool,
) -> Result<()> {
    let update = UpdateWorkoutEntry {
        date: args.date.map(|d| parse_date(Some(d))).transpose()?,
        name: args.name,
        duration_min: parse_clearable(args.duration.as_deref())?,
        calories_burned: parse_clearable(args.calories.as_deref())?,
    };
    if update.is_empty() {
        bail!("Nothing to update. Use --name, --duration, --calories or --date");
    }
    let change = service.update_workout(user, id, &update).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&change)?);
    } else {
        print_change("Updated", &change);
    }
    Ok(())
}

pub(crate) async fn cmd_workout_delete(
    service: &FuelService,
    user: &str,
    id: i64,
    json: bool,
) -> Result<()> {
    let change = service.delete_workout(user, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&change)?);
    } else {
        print_change("Deleted", &change);
    }
    Ok(())
}
