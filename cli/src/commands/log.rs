use anyhow::Result;

use slimify_core::aggregate::target_for_date;
use slimify_core::ai::ExerciseParser;
use slimify_core::models::{DailyLog, ExerciseEntry, Intensity, MealType, NewExerciseEntry, NewFoodEntry};
use slimify_core::service::TrackerService;

use super::helpers::{parse_date, print_json, resolve_id, short_id};

pub(crate) struct FoodArgs {
    pub name: String,
    pub calories: i64,
    pub meal: Option<MealType>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}

fn print_remaining(service: &TrackerService) {
    let stats = service.today_stats();
    println!(
        "  Today: {} in, {} out, {} net of {} ({} remaining)",
        stats.total_calories,
        stats.exercise_calories,
        stats.net_calories,
        stats.target_calories,
        stats.remaining
    );
}

pub(crate) async fn cmd_food_add(service: &TrackerService, args: FoodArgs, json: bool) -> Result<()> {
    let entry = service
        .add_food_entry(NewFoodEntry {
            name: args.name,
            calories: args.calories,
            protein: args.protein,
            carbs: args.carbs,
            fat: args.fat,
            meal_type: args.meal,
            ..NewFoodEntry::default()
        })
        .await?;

    if json {
        return print_json(&entry);
    }
    let meal = entry.meal_type.map(|m| format!(" ({m})")).unwrap_or_default();
    println!(
        "Logged {} - {} kcal{meal} [{}]",
        entry.name,
        entry.calories,
        short_id(&entry.id)
    );
    print_remaining(service);
    Ok(())
}

pub(crate) async fn cmd_food_remove(service: &TrackerService, id: &str, json: bool) -> Result<()> {
    let log = service.today_log().unwrap_or_else(|| DailyLog::new(service.today(), 0));
    let id = resolve_id(id, log.meals.iter().map(|m| m.id.as_str()))?;
    let removed = service.remove_food_entry(&id).await?;

    if json {
        println!("{}", serde_json::json!({ "removed": removed, "id": id }));
    } else if removed {
        println!("Removed food entry {}", short_id(&id));
        print_remaining(service);
    }
    Ok(())
}

fn print_exercise(service: &TrackerService, entry: &ExerciseEntry) {
    let source = if entry.ai_generated { " via AI" } else { "" };
    println!(
        "Logged {} - {} min, {} - {} kcal burned{source} [{}]",
        entry.activity,
        entry.duration,
        entry.intensity,
        entry.calories_burned,
        short_id(&entry.id)
    );
    print_remaining(service);
}

pub(crate) async fn cmd_exercise_add(
    service: &TrackerService,
    activity: String,
    minutes: u32,
    intensity: Intensity,
    json: bool,
) -> Result<()> {
    let entry = service
        .add_exercise_entry(NewExerciseEntry {
            activity,
            duration: minutes,
            intensity,
            ai_generated: false,
            raw_input: None,
        })
        .await?;

    if json {
        return print_json(&entry);
    }
    print_exercise(service, &entry);
    Ok(())
}

/// Describe a workout in plain words and let the AI provider structure it.
pub(crate) async fn cmd_exercise_parse(
    service: &TrackerService,
    parser: &dyn ExerciseParser,
    input: &str,
    json: bool,
) -> Result<()> {
    let entry = match service.log_exercise_from_text(parser, input).await {
        Ok(entry) => entry,
        // The service publishes a user-facing message alongside the error.
        Err(e) => match service.error_message() {
            Some(message) => anyhow::bail!("{message}"),
            None => return Err(e.into()),
        },
    };

    if json {
        return print_json(&entry);
    }
    print_exercise(service, &entry);
    Ok(())
}

pub(crate) async fn cmd_exercise_remove(
    service: &TrackerService,
    id: &str,
    json: bool,
) -> Result<()> {
    let log = service.today_log().unwrap_or_else(|| DailyLog::new(service.today(), 0));
    let id = resolve_id(id, log.exercises.iter().map(|e| e.id.as_str()))?;
    let removed = service.remove_exercise_entry(&id).await?;

    if json {
        println!("{}", serde_json::json!({ "removed": removed, "id": id }));
    } else if removed {
        println!("Removed exercise entry {}", short_id(&id));
        print_remaining(service);
    }
    Ok(())
}

/// Attach a free-text note to a day's log, creating the log if needed.
/// An empty note clears it.
pub(crate) async fn cmd_note(
    service: &TrackerService,
    text: String,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date, service.today())?;
    let mut log = match service.daily_log(date).await? {
        Some(log) => log,
        None => DailyLog::new(date, target_for_date(service.weekly_plan().as_ref(), date)),
    };
    log.notes = Some(text).filter(|t| !t.trim().is_empty());
    let log = service.update_daily_log(log).await?;

    if json {
        return print_json(&log);
    }
    match &log.notes {
        Some(_) => println!("Saved note for {date}"),
        None => println!("Cleared note for {date}"),
    }
    Ok(())
}
