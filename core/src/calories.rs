//! Deterministic nutrition and exercise formulas.
//!
//! Everything here is pure: inputs in, numbers out. Weights are pounds and
//! heights inches at the boundary and are converted to metric internally.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::models::{
    ActivityLevel, DailyLog, Intensity, SafetyReport, SafetyThresholds, SafetyWarning, Severity,
    Sex, UserProfile, ViolationType, WeeklyPlan, WeeklyStats, WeightEntry,
};

pub const KG_PER_LB: f64 = 0.453_592;
pub const CM_PER_INCH: f64 = 2.54;

/// 3500 kcal per pound of body weight.
pub const KCAL_PER_LB: f64 = 3500.0;

/// Daily deficit per lb/week of goal (3500 / 7).
pub const DAILY_DEFICIT_PER_WEEKLY_LB: f64 = 500.0;

/// Days within this many kcal of target count as on target.
pub const ADHERENCE_TOLERANCE: i64 = 100;

#[allow(clippy::cast_possible_truncation)]
fn round_kcal(value: f64) -> i64 {
    value.round() as i64
}

#[must_use]
pub fn activity_multiplier(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::Sedentary => 1.2,
        ActivityLevel::Light => 1.375,
        ActivityLevel::Moderate => 1.55,
        ActivityLevel::Active => 1.725,
    }
}

/// Mifflin–St Jeor basal metabolic rate in kcal/day.
#[must_use]
pub fn calculate_bmr(profile: &UserProfile) -> i64 {
    let weight_kg = profile.weight * KG_PER_LB;
    let height_cm = profile.height * CM_PER_INCH;
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(profile.age);
    let adjusted = match profile.sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    };
    round_kcal(adjusted)
}

#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_tdee(profile: &UserProfile) -> i64 {
    let bmr = calculate_bmr(profile);
    round_kcal(bmr as f64 * activity_multiplier(profile.activity_level))
}

/// TDEE minus the goal deficit, never below the sex-specific floor.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_daily_target(profile: &UserProfile) -> i64 {
    let tdee = calculate_tdee(profile) as f64;
    let target = round_kcal(tdee - profile.weekly_goal * DAILY_DEFICIT_PER_WEEKLY_LB);
    target.max(SafetyThresholds::min_net_calories(profile.sex))
}

#[must_use]
pub fn zigzag_multiplier(day: Weekday) -> f64 {
    match day {
        Weekday::Mon | Weekday::Fri => 1.10,
        Weekday::Tue | Weekday::Thu => 0.90,
        Weekday::Wed => 1.00,
        Weekday::Sat => 1.05,
        Weekday::Sun => 0.95,
    }
}

/// Seven daily targets starting at `start`, cycling around the base target.
///
/// Each day is scaled by its weekday multiplier and rounded, then the
/// shortfall against `base * 7` is spread evenly across all seven days.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn generate_zigzag_plan(profile: &UserProfile, start: NaiveDate) -> BTreeMap<NaiveDate, i64> {
    let base = calculate_daily_target(profile) as f64;
    let weekly_total = base * 7.0;

    let raw: Vec<(NaiveDate, i64)> = (0..7)
        .map(|offset| {
            let date = start + Duration::days(offset);
            (date, round_kcal(base * zigzag_multiplier(date.weekday())))
        })
        .collect();

    let raw_total = raw.iter().fold(0_i64, |acc, (_, kcal)| acc.saturating_add(*kcal));
    let adjustment = (weekly_total - raw_total as f64) / 7.0;

    raw.into_iter()
        .map(|(date, kcal)| (date, round_kcal(kcal as f64 + adjustment)))
        .collect()
}

/// Monday of the week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Wrap a fresh zigzag schedule into a plan for the week containing `today`.
///
/// The plan is keyed by that week's Monday so it can be found again, but its
/// targets run from `today` forward. Days earlier in the week have no entry
/// and days spilling into next week are only reachable through this plan.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn build_weekly_plan(profile: &UserProfile, today: NaiveDate) -> WeeklyPlan {
    let daily_targets = generate_zigzag_plan(profile, today);
    let total = daily_targets.values().fold(0_i64, |acc, kcal| acc.saturating_add(*kcal));
    WeeklyPlan {
        week_start_date: week_start(today),
        average_target: round_kcal(total as f64 / 7.0),
        total_deficit: round_kcal(profile.weekly_goal * KCAL_PER_LB),
        projected_loss: profile.weekly_goal,
        daily_targets,
    }
}

fn met_values(activity: &str) -> [f64; 3] {
    match activity {
        "walking" => [2.5, 3.5, 4.5],
        "running" => [6.0, 8.0, 10.0],
        "cycling" => [4.0, 6.0, 8.0],
        "swimming" => [5.0, 7.0, 9.0],
        "strength training" => [3.0, 4.5, 6.0],
        "yoga" => [2.0, 3.0, 4.0],
        "dancing" => [3.0, 4.5, 6.5],
        "hiking" => [4.0, 5.5, 7.0],
        _ => [3.0, 5.0, 7.0],
    }
}

/// MET value for an activity; unknown activities use the default row.
#[must_use]
pub fn met_value(activity: &str, intensity: Intensity) -> f64 {
    let row = met_values(&activity.trim().to_lowercase());
    match intensity {
        Intensity::Light => row[0],
        Intensity::Moderate => row[1],
        Intensity::Intense => row[2],
    }
}

/// kcal = MET × kg × hours.
#[must_use]
pub fn calculate_exercise_calories(
    activity: &str,
    duration_minutes: u32,
    intensity: Intensity,
    weight_lb: f64,
) -> i64 {
    let weight_kg = weight_lb * KG_PER_LB;
    let hours = f64::from(duration_minutes) / 60.0;
    round_kcal(met_value(activity, intensity) * weight_kg * hours)
}

#[must_use]
pub fn check_safety_thresholds(
    net_calories: i64,
    sex: Sex,
    exercise_duration_minutes: u32,
) -> SafetyReport {
    let mut warnings = Vec::new();

    let min = SafetyThresholds::min_net_calories(sex);
    let caution = SafetyThresholds::warning_net_calories(sex);
    if net_calories < min {
        warnings.push(SafetyWarning {
            severity: Severity::Critical,
            violation_type: ViolationType::LowCalories,
            message: format!(
                "Net calories ({net_calories}) are below the safe minimum of {min}"
            ),
        });
    } else if net_calories < caution {
        warnings.push(SafetyWarning {
            severity: Severity::Caution,
            violation_type: ViolationType::LowCalories,
            message: format!("Net calories ({net_calories}) are getting low. Consider eating more."),
        });
    }

    let minutes = exercise_duration_minutes;
    if minutes > SafetyThresholds::MAX_EXERCISE_MINUTES {
        warnings.push(SafetyWarning {
            severity: Severity::Critical,
            violation_type: ViolationType::ExcessiveExercise,
            message: format!(
                "Exercise duration ({minutes}min) exceeds recommended maximum of 2 hours"
            ),
        });
    } else if minutes > SafetyThresholds::HIGH_EXERCISE_MINUTES {
        warnings.push(SafetyWarning {
            severity: Severity::Caution,
            violation_type: ViolationType::ExcessiveExercise,
            message: format!(
                "High exercise duration ({minutes}min). Remember to rest and recover."
            ),
        });
    }

    SafetyReport {
        safe: warnings.is_empty(),
        warnings,
    }
}

/// Means, adherence and cumulative deficit over a set of days.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_weekly_stats(logs: &[DailyLog]) -> WeeklyStats {
    if logs.is_empty() {
        return WeeklyStats::default();
    }

    let days = logs.len() as f64;
    let intake: i64 = logs.iter().map(|l| l.total_calories).sum();
    let exercise: i64 = logs.iter().map(|l| l.exercise_calories).sum();
    let deficit: i64 = logs
        .iter()
        .map(|l| l.target_calories - l.total_calories + l.exercise_calories)
        .sum();
    let on_target = logs
        .iter()
        .filter(|l| (l.total_calories - l.target_calories).abs() <= ADHERENCE_TOLERANCE)
        .count();

    WeeklyStats {
        average_intake: round_kcal(intake as f64 / days),
        average_exercise: round_kcal(exercise as f64 / days),
        average_net: round_kcal((intake - exercise) as f64 / days),
        adherence_rate: round_kcal(on_target as f64 / days * 100.0),
        total_deficit: deficit,
    }
}

/// Pounds lost per week between `latest` and the most recent earlier weigh-in
/// taken 7 to 14 days before it. `history` is most recent first.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn weekly_loss_rate(history: &[WeightEntry], latest: &WeightEntry) -> Option<f64> {
    let (reference, days) = history.iter().find_map(|entry| {
        let days = (latest.date - entry.date).num_days();
        (7..=14).contains(&days).then_some((entry, days))
    })?;
    Some((reference.weight - latest.weight) / days as f64 * 7.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalorieStatus {
    Under,
    Optimal,
    Over,
}

/// Percentage of target consumed and a coarse band for display.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calorie_status(current: i64, target: i64) -> (f64, CalorieStatus) {
    if target <= 0 {
        return (0.0, CalorieStatus::Under);
    }
    let percentage = current as f64 / target as f64 * 100.0;
    let status = if percentage < 90.0 {
        CalorieStatus::Under
    } else if percentage <= 110.0 {
        CalorieStatus::Optimal
    } else {
        CalorieStatus::Over
    };
    (percentage, status)
}
