use anyhow::Result;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fuel_core::models::{DayTotals, NewTarget, ResolvedTarget, TargetOrigin, TargetRecord};
use fuel_core::service::FuelService;

use super::helpers::{date_key, fmt_grams, print_target, print_totals, truncate};

pub(crate) struct TargetArgs {
    pub calories: f64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub label: Option<String>,
    pub rationale: Option<String>,
    pub suggested: bool,
}

impl TargetArgs {
    fn into_target(self) -> NewTarget {
        NewTarget {
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            label: self.label,
            rationale: self.rationale,
            origin: if self.suggested {
                TargetOrigin::Suggested
            } else {
                TargetOrigin::Manual
            },
        }
    }
}

fn print_record(record: &TargetRecord) {
    print!("{:.0} kcal/day", record.calories);
    if let Some(label) = &record.label {
        print!(" [{label}]");
    }
    println!();
    if record.protein.is_some() || record.carbs.is_some() || record.fat.is_some() {
        println!(
            "  Macros: P {} | C {} | F {}",
            fmt_grams(record.protein),
            fmt_grams(record.carbs),
            fmt_grams(record.fat),
        );
    }
}

/// Save a standing target. Days that already have a snapshot keep it.
pub(crate) fn cmd_target_set(
    service: &FuelService,
    user: &str,
    args: TargetArgs,
    json: bool,
) -> Result<()> {
    let record = service.save_standing_target(user, &args.into_target())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("Standing target: ");
        print_record(&record);
    }
    Ok(())
}

/// Save a target for one date and recompute that day.
pub(crate) async fn cmd_target_daily(
    service: &FuelService,
    user: &str,
    date: Option<String>,
    args: TargetArgs,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct DailyOutput {
        target: TargetRecord,
        totals: DayTotals,
    }

    let date = date_key(date)?;
    let (target, totals) = service
        .save_daily_target(user, &date, &args.into_target())
        .await?;

    if json {
        let output = DailyOutput { target, totals };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("Target for {date}: ");
        print_record(&target);
        print_totals(&date, &totals);
    }
    Ok(())
}

pub(crate) async fn cmd_target_show(
    service: &FuelService,
    user: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct ShowOutput {
        date: String,
        effective: ResolvedTarget,
        standing: Vec<TargetRecord>,
    }

    #[derive(Tabled)]
    struct TargetRow {
        #[tabled(rename = "Saved")]
        saved: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Label")]
        label: String,
        #[tabled(rename = "Origin")]
        origin: String,
    }

    let date = date_key(date)?;
    let effective = service.resolve_target(user, &date).await?;
    let standing = service.standing_targets(user)?;

    if json {
        let output = ShowOutput {
            date,
            effective,
            standing,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{date}");
    print_target(&effective);

    if standing.is_empty() {
        println!("\nNo standing targets. Use `fuel target set <calories>` to add one.");
        return Ok(());
    }

    let rows: Vec<TargetRow> = standing
        .iter()
        .map(|t| TargetRow {
            saved: t.created_at.chars().take(10).collect(),
            calories: format!("{:.0}", t.calories),
            protein: fmt_grams(t.protein),
            carbs: fmt_grams(t.carbs),
            fat: fmt_grams(t.fat),
            label: t.label.as_deref().map(|l| truncate(l, 25)).unwrap_or_default(),
            origin: t.origin.as_str().to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..5)).with(Alignment::right()))
        .to_string();
    println!("\nStanding targets (newest first):");
    println!("{table}");

    Ok(())
}
