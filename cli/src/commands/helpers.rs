use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use slimify_core::calories::{CM_PER_INCH, KG_PER_LB};
use slimify_core::models::{DailyLog, HeightUnit, WeightUnit};

/// Resolve `today`/`yesterday`/`tomorrow` or an ISO date relative to `today`.
pub(crate) fn parse_date(date_str: Option<String>, today: NaiveDate) -> Result<NaiveDate> {
    match date_str {
        None => Ok(today),
        Some(s) => match s.as_str() {
            "today" => Ok(today),
            "yesterday" => Ok(today - Duration::days(1)),
            "tomorrow" => Ok(today + Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Convert a weight in the user's unit to pounds.
pub(crate) fn weight_to_lbs(value: f64, unit: WeightUnit) -> Result<f64> {
    if !(value.is_finite() && value > 0.0) {
        bail!("Weight must be greater than 0");
    }
    Ok(match unit {
        WeightUnit::Lbs => value,
        WeightUnit::Kg => no_neg_zero(value / KG_PER_LB),
    })
}

pub(crate) fn lbs_to_unit(lbs: f64, unit: WeightUnit) -> f64 {
    match unit {
        WeightUnit::Lbs => lbs,
        WeightUnit::Kg => lbs * KG_PER_LB,
    }
}

/// Convert a height in the user's unit to inches.
pub(crate) fn height_to_inches(value: f64, unit: HeightUnit) -> Result<f64> {
    if !(value.is_finite() && value > 0.0) {
        bail!("Height must be greater than 0");
    }
    Ok(match unit {
        HeightUnit::Inches => value,
        HeightUnit::Cm => value / CM_PER_INCH,
    })
}

pub(crate) fn inches_to_unit(inches: f64, unit: HeightUnit) -> f64 {
    match unit {
        HeightUnit::Inches => inches,
        HeightUnit::Cm => inches * CM_PER_INCH,
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
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
        let end = s
            .char_indices()
            .nth(max.saturating_sub(3))
            .map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// Meals and exercises of one day as two tables.
pub(crate) fn print_log_tables(log: &DailyLog) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Food")]
        name: String,
        #[tabled(rename = "Cal")]
        calories: i64,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
    }

    #[derive(Tabled)]
    struct ExerciseRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Activity")]
        activity: String,
        #[tabled(rename = "Min")]
        duration: u32,
        #[tabled(rename = "Intensity")]
        intensity: String,
        #[tabled(rename = "Burned")]
        burned: i64,
    }

    let grams = |v: Option<f64>| v.map_or("-".into(), |g| format!("{g:.1}"));

    if !log.meals.is_empty() {
        let rows: Vec<MealRow> = log
            .meals
            .iter()
            .map(|m| MealRow {
                id: short_id(&m.id),
                meal: m.meal_type.map(|t| t.to_string()).unwrap_or_default(),
                name: truncate(&m.name, 30),
                calories: m.calories,
                protein: grams(m.protein),
                carbs: grams(m.carbs),
                fat: grams(m.fat),
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    if !log.exercises.is_empty() {
        let rows: Vec<ExerciseRow> = log
            .exercises
            .iter()
            .map(|e| ExerciseRow {
                id: short_id(&e.id),
                activity: truncate(&e.activity, 30),
                duration: e.duration,
                intensity: e.intensity.to_string(),
                burned: e.calories_burned,
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..5)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }
}

/// First segment of a uuid, enough to pick an entry out of one day's log.
pub(crate) fn short_id(id: &str) -> String {
    id.split('-').next().unwrap_or(id).to_string()
}

/// Match a full id or a unique prefix against the ids of one day's entries.
pub(crate) fn resolve_id<'a>(prefix: &str, ids: impl Iterator<Item = &'a str>) -> Result<String> {
    let matches: Vec<&str> = ids.filter(|id| id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [] => bail!("No entry matching '{prefix}' today"),
        [id] => Ok((*id).to_string()),
        _ => bail!("'{prefix}' matches {} entries. Use more characters", matches.len()),
    }
}
