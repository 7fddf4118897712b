//! Daily log bookkeeping: entry lists in, totals out.

use chrono::NaiveDate;

use crate::models::{
    DEFAULT_TARGET_CALORIES, DailyLog, ExerciseEntry, FoodEntry, TodayStats, WeeklyPlan,
};

impl DailyLog {
    /// Empty log for `date`.
    #[must_use]
    pub fn new(date: NaiveDate, target_calories: i64) -> Self {
        Self {
            date,
            meals: Vec::new(),
            exercises: Vec::new(),
            target_calories,
            total_calories: 0,
            exercise_calories: 0,
            net_calories: 0,
            feedback: Vec::new(),
            weight: None,
            notes: None,
        }
    }

    /// Rebuild the derived totals from the entry lists.
    pub fn recompute_totals(&mut self) {
        self.total_calories = saturating_sum(self.meals.iter().map(|m| m.calories));
        self.exercise_calories =
            saturating_sum(self.exercises.iter().map(|e| e.calories_burned));
        self.net_calories = self.total_calories.saturating_sub(self.exercise_calories);
    }

    pub fn add_food(&mut self, entry: FoodEntry) {
        self.meals.push(entry);
        self.recompute_totals();
    }

    pub fn add_exercise(&mut self, entry: ExerciseEntry) {
        self.exercises.push(entry);
        self.recompute_totals();
    }

    /// Returns `false` when no entry has that id; the log is left untouched.
    pub fn remove_food(&mut self, id: &str) -> bool {
        let before = self.meals.len();
        self.meals.retain(|m| m.id != id);
        let removed = self.meals.len() != before;
        if removed {
            self.recompute_totals();
        }
        removed
    }

    pub fn remove_exercise(&mut self, id: &str) -> bool {
        let before = self.exercises.len();
        self.exercises.retain(|e| e.id != id);
        let removed = self.exercises.len() != before;
        if removed {
            self.recompute_totals();
        }
        removed
    }

    /// Whether the stored totals agree with the entry lists.
    #[must_use]
    pub fn totals_consistent(&self) -> bool {
        let total = saturating_sum(self.meals.iter().map(|m| m.calories));
        let exercise = saturating_sum(self.exercises.iter().map(|e| e.calories_burned));
        self.total_calories == total
            && self.exercise_calories == exercise
            && self.net_calories == total.saturating_sub(exercise)
    }
}

fn saturating_sum(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0, i64::saturating_add)
}

/// Target for `date` from the plan, or the default when the plan has no entry.
#[must_use]
pub fn target_for_date(plan: Option<&WeeklyPlan>, date: NaiveDate) -> i64 {
    match plan.and_then(|p| p.target_for(date)) {
        Some(target) => target,
        None => {
            if plan.is_some() {
                tracing::warn!(%date, "weekly plan has no target for date, using default");
            }
            DEFAULT_TARGET_CALORIES
        }
    }
}

/// Dashboard numbers for today; a missing log reads as an empty day at the default target.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn today_stats(log: Option<&DailyLog>) -> TodayStats {
    let (total, exercise, target) = log.map_or((0, 0, DEFAULT_TARGET_CALORIES), |l| {
        (l.total_calories, l.exercise_calories, l.target_calories)
    });
    let percent_complete = if target > 0 {
        (total as f64 / target as f64 * 100.0).round() as i64
    } else {
        0
    };
    TodayStats {
        total_calories: total,
        exercise_calories: exercise,
        net_calories: total.saturating_sub(exercise),
        target_calories: target,
        remaining: target.saturating_sub(total).saturating_add(exercise),
        percent_complete,
    }
}
