use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};

use slimify_core::models::MonthlyInsight;
use slimify_core::service::TrackerService;

use super::helpers::{json_error, print_json};

pub(crate) async fn cmd_insight_show(service: &TrackerService, month: &str, json: bool) -> Result<()> {
    let Some(insight) = service.monthly_insight(month).await? else {
        if json {
            println!("{}", json_error(&format!("No insight for {month}")));
            return Ok(());
        }
        bail!("No insight for {month}");
    };
    if json {
        return print_json(&insight);
    }

    println!("=== {} ===\n", insight.month);
    println!("{}\n", insight.summary);
    let section = |title: &str, items: &[String]| {
        if !items.is_empty() {
            println!("{title}:");
            for item in items {
                println!("  - {item}");
            }
            println!();
        }
    };
    section("Achievements", &insight.achievements);
    section("Challenges", &insight.challenges);
    section("Recommendations", &insight.recommendations);

    let ex = &insight.exercise_patterns;
    println!(
        "Exercise: {} workouts, avg {:.0} min, {} kcal burned",
        ex.total_workouts, ex.average_duration, ex.calories_burned
    );
    if !ex.favorite_activities.is_empty() {
        println!("  Favorites: {}", ex.favorite_activities.join(", "));
    }
    let nu = &insight.nutrition_patterns;
    println!(
        "Nutrition: avg {:.0} kcal/day (weekday {:.0}, weekend {:.0}), {:.0}% consistent",
        nu.average_daily_calories,
        nu.weekday_vs_weekend.weekday,
        nu.weekday_vs_weekend.weekend,
        nu.consistency
    );
    println!("Weight change: {:+.1} lbs", insight.weight_change);
    Ok(())
}

/// Store a month summary produced elsewhere, read from a JSON file.
pub(crate) async fn cmd_insight_import(
    service: &TrackerService,
    file: &Path,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let insight: MonthlyInsight = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid monthly insight", file.display()))?;
    service.save_monthly_insight(insight.clone()).await?;

    if json {
        return print_json(&insight);
    }
    println!("Saved insight for {}", insight.month);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N]: ");
    io::stderr().flush()?;
    let line = io::stdin().lock().lines().next().context("No input")??;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

pub(crate) async fn cmd_reset(service: &TrackerService, yes: bool, json: bool) -> Result<()> {
    if !yes && !confirm("Delete every profile, log, weigh-in and setting?")? {
        eprintln!("Aborted.");
        return Ok(());
    }
    service.reset_all_data().await?;

    if json {
        println!("{}", serde_json::json!({ "reset": true }));
    } else {
        println!("All data deleted.");
    }
    Ok(())
}
