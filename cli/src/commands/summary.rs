use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use slimify_core::aggregate::today_stats;
use slimify_core::calories::{CalorieStatus, calorie_status, week_start};
use slimify_core::models::{DailyLog, TodayStats};
use slimify_core::service::TrackerService;

use super::helpers::{parse_date, print_json, print_log_tables};

#[derive(Serialize)]
struct DaySummary {
    date: chrono::NaiveDate,
    log: Option<DailyLog>,
    stats: TodayStats,
    status: CalorieStatus,
}

pub(crate) async fn cmd_summary(
    service: &TrackerService,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let today = service.today();
    let date = parse_date(date, today)?;
    let log = if date == today {
        service.today_log()
    } else {
        service.daily_log(date).await?
    };
    let stats = today_stats(log.as_ref());
    let (percent, status) = calorie_status(stats.total_calories, stats.target_calories);

    if json {
        return print_json(&DaySummary {
            date,
            log,
            stats,
            status,
        });
    }

    let Some(log) = log.filter(|l| !l.meals.is_empty() || !l.exercises.is_empty()) else {
        eprintln!("No entries for {date}");
        process::exit(2);
    };

    println!("=== {date} ===\n");
    print_log_tables(&log);
    println!();
    println!(
        "  EATEN: {} kcal | BURNED: {} kcal | NET: {} kcal",
        stats.total_calories, stats.exercise_calories, stats.net_calories
    );
    println!(
        "  TARGET: {} kcal | REMAINING: {} kcal ({percent:.0}% eaten, {})",
        stats.target_calories,
        stats.remaining,
        status_label(status)
    );
    if let Some(weight) = log.weight {
        println!("  WEIGHT: {weight:.1} lbs");
    }
    if let Some(notes) = &log.notes {
        println!("  NOTES: {notes}");
    }

    Ok(())
}

fn status_label(status: CalorieStatus) -> &'static str {
    match status {
        CalorieStatus::Under => "under",
        CalorieStatus::Optimal => "on track",
        CalorieStatus::Over => "over",
    }
}

pub(crate) async fn cmd_history(service: &TrackerService, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Eaten")]
        eaten: i64,
        #[tabled(rename = "Burned")]
        burned: i64,
        #[tabled(rename = "Net")]
        net: i64,
        #[tabled(rename = "Target")]
        target: i64,
    }

    let today = service.today();
    let from = today - Duration::days(i64::from(days.max(1)) - 1);
    let mut logs = service.daily_logs(from, today).await?;
    logs.reverse();

    if json {
        return print_json(&logs);
    }

    if logs.is_empty() {
        eprintln!("No entries in the last {days} days");
        process::exit(2);
    }

    let rows: Vec<HistoryRow> = logs
        .iter()
        .map(|l| HistoryRow {
            date: l.date.format("%Y-%m-%d").to_string(),
            eaten: l.total_calories,
            burned: l.exercise_calories,
            net: l.net_calories,
            target: l.target_calories,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

/// Averages for the Monday-to-Sunday week containing `date`.
pub(crate) async fn cmd_stats(
    service: &TrackerService,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date, service.today())?;
    let stats = service.weekly_stats(date).await?;

    if json {
        return print_json(&stats);
    }

    let start = week_start(date);
    println!(
        "Week of {} to {}",
        start.format("%Y-%m-%d"),
        (start + Duration::days(6)).format("%Y-%m-%d")
    );
    println!("  Average intake:    {} kcal", stats.average_intake);
    println!("  Average exercise:  {} kcal", stats.average_exercise);
    println!("  Average net:       {} kcal", stats.average_net);
    println!("  Days on target:    {}%", stats.adherence_rate);
    println!("  Total deficit:     {} kcal", stats.total_deficit);
    Ok(())
}
