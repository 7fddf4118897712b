use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use slimify_core::models::{ViolationType, WeightEntry, WeightUnit};
use slimify_core::service::TrackerService;

use super::helpers::{lbs_to_unit, parse_date, print_json, weight_to_lbs};

pub(crate) struct WeightArgs {
    pub value: f64,
    pub unit: Option<WeightUnit>,
    pub date: Option<String>,
    pub body_fat: Option<f64>,
    pub notes: Option<String>,
}

/// Record a weigh-in. Without `--unit` the value is read in the preferred unit.
pub(crate) async fn cmd_weight_log(
    service: &TrackerService,
    args: WeightArgs,
    json: bool,
) -> Result<()> {
    let unit = args.unit.unwrap_or(service.preferences().units.weight);
    let weight = weight_to_lbs(args.value, unit)?;
    if unit == WeightUnit::Kg {
        eprintln!("Converting {:.1} kg -> {weight:.1} lbs", args.value);
    }

    let entry = WeightEntry {
        date: parse_date(args.date, service.today())?,
        weight,
        body_fat: args.body_fat,
        notes: args.notes,
    };
    service.add_weight(entry.clone()).await?;

    if json {
        return print_json(&entry);
    }
    println!(
        "Logged {:.1} {unit} for {}",
        lbs_to_unit(entry.weight, unit),
        entry.date.format("%Y-%m-%d")
    );
    if let Some(ref n) = entry.notes {
        println!("  Notes: {n}");
    }

    let recorded = service
        .safety_violations(Some(ViolationType::RapidWeightLoss), 1)
        .await?;
    if let Some(v) = recorded.first().filter(|v| v.date == entry.date) {
        eprintln!("Warning: {}", v.details);
    }
    Ok(())
}

pub(crate) async fn cmd_weight_history(
    service: &TrackerService,
    limit: usize,
    json: bool,
) -> Result<()> {
    let entries = service.weight_entries(limit).await?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        eprintln!("No weight entries found. Use `slimify weight log` to record your weight.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct WeightRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Change")]
        change: String,
        #[tabled(rename = "Body fat")]
        body_fat: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let unit = service.preferences().units.weight;
    // Newest first; the change is against the next older entry.
    let rows: Vec<WeightRow> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| WeightRow {
            date: e.date.format("%Y-%m-%d").to_string(),
            weight: format!("{:.1} {unit}", lbs_to_unit(e.weight, unit)),
            change: entries.get(i + 1).map_or(String::new(), |older| {
                format!("{:+.1}", lbs_to_unit(e.weight - older.weight, unit))
            }),
            body_fat: e.body_fat.map_or(String::new(), |bf| format!("{bf:.1}%")),
            notes: e.notes.clone().unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
