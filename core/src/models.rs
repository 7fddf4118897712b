use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Target used whenever no weekly plan covers a date.
pub const DEFAULT_TARGET_CALORIES: i64 = 2000;

pub const MIN_WEEKLY_GOAL: f64 = 0.5;
pub const MAX_WEEKLY_GOAL: f64 = 2.0;

/// Upper bounds for profile measurements, in pounds and inches.
pub const MAX_WEIGHT_LB: f64 = 1500.0;
pub const MAX_HEIGHT_IN: f64 = 120.0;

/// Largest calorie value accepted for a single food entry.
pub const MAX_ENTRY_CALORIES: i64 = 20_000;

/// Parse a lowercase token against a fixed list, case-insensitively.
macro_rules! string_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let lower = s.trim().to_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().to_lowercase() == lower)
                    .ok_or_else(|| {
                        let valid: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        Error::Validation(format!(
                            "Invalid {} '{s}'. Must be one of: {}",
                            $label,
                            valid.join(", ")
                        ))
                    })
            }
        }
    };
}

// --- Profile ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
}

string_enum!(ActivityLevel, "activity level", {
    Sedentary => "sedentary",
    Light => "light",
    Moderate => "moderate",
    Active => "active",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

string_enum!(Sex, "sex", {
    Male => "male",
    Female => "female",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub age: u32,
    /// Pounds.
    pub weight: f64,
    /// Inches.
    pub height: f64,
    pub activity_level: ActivityLevel,
    pub sex: Sex,
    pub target_weight: f64,
    /// Pounds per week.
    pub weekly_goal: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields collected at onboarding; ids and timestamps are assigned on save.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub age: u32,
    pub weight: f64,
    pub height: f64,
    pub activity_level: ActivityLevel,
    pub sex: Sex,
    pub target_weight: f64,
    pub weekly_goal: f64,
}

impl NewProfile {
    pub fn into_profile(self) -> Result<UserProfile> {
        let now = Utc::now();
        let profile = UserProfile {
            id: uuid::Uuid::new_v4().to_string(),
            age: self.age,
            weight: self.weight,
            height: self.height,
            activity_level: self.activity_level,
            sex: self.sex,
            target_weight: self.target_weight,
            weekly_goal: self.weekly_goal,
            created_at: now,
            updated_at: now,
        };
        validate_profile(&profile)?;
        Ok(profile)
    }
}

pub fn validate_weekly_goal(goal: f64) -> Result<()> {
    if !(MIN_WEEKLY_GOAL..=MAX_WEEKLY_GOAL).contains(&goal) {
        return Err(Error::Validation(format!(
            "Weekly goal must be between {MIN_WEEKLY_GOAL} and {MAX_WEEKLY_GOAL} lbs/week, got {goal}"
        )));
    }
    Ok(())
}

pub fn validate_profile(profile: &UserProfile) -> Result<()> {
    if profile.age == 0 || profile.age > 120 {
        return Err(Error::Validation(format!(
            "Age must be between 1 and 120, got {}",
            profile.age
        )));
    }
    check_measure("Weight", profile.weight, MAX_WEIGHT_LB, "lbs")?;
    check_measure("Height", profile.height, MAX_HEIGHT_IN, "inches")?;
    check_measure("Target weight", profile.target_weight, MAX_WEIGHT_LB, "lbs")?;
    validate_weekly_goal(profile.weekly_goal)
}

fn check_measure(label: &str, value: f64, max: f64, unit: &str) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > max {
        return Err(Error::Validation(format!(
            "{label} must be greater than 0 and at most {max} {unit}, got {value}"
        )));
    }
    Ok(())
}

// --- Daily log entries ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

string_enum!(MealType, "meal type", {
    Breakfast => "breakfast",
    Lunch => "lunch",
    Dinner => "dinner",
    Snack => "snack",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Light,
    Moderate,
    Intense,
}

string_enum!(Intensity, "intensity", {
    Light => "light",
    Moderate => "moderate",
    Intense => "intense",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
    pub id: String,
    pub name: String,
    pub calories: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<MealType>,
    #[serde(default)]
    pub ai_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewFoodEntry {
    pub name: String,
    pub calories: i64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub meal_type: Option<MealType>,
    pub ai_generated: bool,
    pub raw_input: Option<String>,
}

impl NewFoodEntry {
    pub fn into_entry(self) -> Result<FoodEntry> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Food name must not be empty".to_string()));
        }
        if self.calories < 0 {
            return Err(Error::Validation("Calories must not be negative".to_string()));
        }
        if self.calories > MAX_ENTRY_CALORIES {
            return Err(Error::Validation(format!(
                "Calories must be at most {MAX_ENTRY_CALORIES}, got {}",
                self.calories
            )));
        }
        Ok(FoodEntry {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name.trim().to_string(),
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            timestamp: Utc::now(),
            meal_type: self.meal_type,
            ai_generated: self.ai_generated,
            raw_input: self.raw_input,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    pub id: String,
    pub activity: String,
    /// Minutes.
    pub duration: u32,
    pub intensity: Intensity,
    pub calories_burned: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ai_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<String>,
}

/// Body weight assumed for burn estimates when neither a profile nor a
/// weigh-in is available.
pub const DEFAULT_BODY_WEIGHT_LB: f64 = 150.0;

#[derive(Debug, Clone)]
pub struct NewExerciseEntry {
    pub activity: String,
    pub duration: u32,
    pub intensity: Intensity,
    pub ai_generated: bool,
    pub raw_input: Option<String>,
}

impl NewExerciseEntry {
    /// Validate and price the entry for a person weighing `weight_lb`.
    pub fn into_entry(self, weight_lb: f64) -> Result<ExerciseEntry> {
        let activity = self.activity.trim();
        if activity.is_empty() {
            return Err(Error::Validation("Activity must not be empty".to_string()));
        }
        if self.duration == 0 || self.duration > 24 * 60 {
            return Err(Error::Validation(format!(
                "Duration must be between 1 and 1440 minutes, got {}",
                self.duration
            )));
        }
        let calories_burned = crate::calories::calculate_exercise_calories(
            activity,
            self.duration,
            self.intensity,
            weight_lb,
        );
        Ok(ExerciseEntry {
            id: uuid::Uuid::new_v4().to_string(),
            activity: activity.to_string(),
            duration: self.duration,
            intensity: self.intensity,
            calories_burned,
            timestamp: Utc::now(),
            ai_generated: self.ai_generated,
            raw_input: self.raw_input,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Encouragement,
    Warning,
    Tip,
    Achievement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackContext {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiFeedback {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<FeedbackContext>,
}

/// One calendar day of intake and exercise.
///
/// `total_calories`, `exercise_calories` and `net_calories` are derived from
/// the entry lists; see [`crate::aggregate`] for the only code that writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub date: NaiveDate,
    pub meals: Vec<FoodEntry>,
    pub exercises: Vec<ExerciseEntry>,
    pub target_calories: i64,
    pub total_calories: i64,
    pub exercise_calories: i64,
    pub net_calories: i64,
    #[serde(default)]
    pub feedback: Vec<AiFeedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// --- Plans and history ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPlan {
    /// Monday of the week this plan belongs to.
    pub week_start_date: NaiveDate,
    pub daily_targets: BTreeMap<NaiveDate, i64>,
    pub average_target: i64,
    pub total_deficit: i64,
    pub projected_loss: f64,
}

impl WeeklyPlan {
    #[must_use]
    pub fn target_for(&self, date: NaiveDate) -> Option<i64> {
        self.daily_targets.get(&date).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub date: NaiveDate,
    /// Pounds.
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_fat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExercisePatterns {
    pub total_workouts: u32,
    pub favorite_activities: Vec<String>,
    pub average_duration: f64,
    pub calories_burned: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayVsWeekend {
    pub weekday: f64,
    pub weekend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionPatterns {
    pub average_daily_calories: f64,
    pub weekday_vs_weekend: WeekdayVsWeekend,
    /// Percentage.
    pub consistency: f64,
}

/// Month summary produced by the AI collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyInsight {
    /// `YYYY-MM`.
    pub month: String,
    pub summary: String,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
    pub exercise_patterns: ExercisePatterns,
    pub nutrition_patterns: NutritionPatterns,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub weight_change: f64,
}

pub fn validate_month(month: &str) -> Result<()> {
    let valid = month.len() == 7
        && NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_ok();
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Invalid month '{month}'. Use YYYY-MM"
        )))
    }
}

// --- Safety ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationType {
    LowCalories,
    ExcessiveExercise,
    RapidWeightLoss,
}

string_enum!(ViolationType, "violation type", {
    LowCalories => "lowCalories",
    ExcessiveExercise => "excessiveExercise",
    RapidWeightLoss => "rapidWeightLoss",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLog {
    /// Assigned by the store on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub violation_type: ViolationType,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_calories: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise_duration: Option<u32>,
}

/// Fixed thresholds shared by the target floor and the safety checks.
pub struct SafetyThresholds;

impl SafetyThresholds {
    pub const MAX_EXERCISE_MINUTES: u32 = 120;
    pub const HIGH_EXERCISE_MINUTES: u32 = 90;
    pub const MAX_WEEKLY_WEIGHT_LOSS: f64 = 2.0;

    #[must_use]
    pub fn min_net_calories(sex: Sex) -> i64 {
        match sex {
            Sex::Male => 1500,
            Sex::Female => 1200,
        }
    }

    #[must_use]
    pub fn warning_net_calories(sex: Sex) -> i64 {
        match sex {
            Sex::Male => 1700,
            Sex::Female => 1400,
        }
    }
}

// --- Preferences ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

string_enum!(Theme, "theme", {
    Light => "light",
    Dark => "dark",
    System => "system",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Lbs,
    Kg,
}

string_enum!(WeightUnit, "weight unit", {
    Lbs => "lbs",
    Kg => "kg",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeightUnit {
    #[default]
    Inches,
    Cm,
}

string_enum!(HeightUnit, "height unit", {
    Inches => "inches",
    Cm => "cm",
});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReminderTimes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakfast: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lunch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dinner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weigh: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Units {
    pub weight: WeightUnit,
    pub height: HeightUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub theme: Theme,
    pub enable_notifications: bool,
    #[serde(default)]
    pub reminder_times: ReminderTimes,
    pub units: Units,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            enable_notifications: true,
            reminder_times: ReminderTimes::default(),
            units: Units::default(),
        }
    }
}

/// Accepts `HH:MM` in 24-hour time.
pub fn validate_reminder_time(time: &str) -> Result<()> {
    chrono::NaiveTime::parse_from_str(time, "%H:%M")
        .map(|_| ())
        .map_err(|_| Error::Validation(format!("Invalid reminder time '{time}'. Use HH:MM")))
}

// --- Chat ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub food_entries: Vec<FoodEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exercise_entries: Vec<ExerciseEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChatMetadata>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}

// --- Derived views ---

/// Snapshot of today's progress for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TodayStats {
    pub total_calories: i64,
    pub exercise_calories: i64,
    pub net_calories: i64,
    pub target_calories: i64,
    pub remaining: i64,
    pub percent_complete: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WeeklyStats {
    pub average_intake: i64,
    pub average_exercise: i64,
    pub average_net: i64,
    /// Percentage of days within 100 kcal of target.
    pub adherence_rate: i64,
    pub total_deficit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    pub safe: bool,
    pub warnings: Vec<SafetyWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Caution,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyWarning {
    pub severity: Severity,
    pub violation_type: ViolationType,
    pub message: String,
}
