use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use chrono::{Duration, Local, NaiveDate, Utc};
use tokio::sync::{Mutex, watch};

use crate::aggregate::{target_for_date, today_stats};
use crate::ai::ExerciseParser;
use crate::calories::{self, week_start};
use crate::db::{Database, Index, LazyDatabase, Order};
use crate::error::{Error, Result};
use crate::models::{
    ChatMessage, DEFAULT_BODY_WEIGHT_LB, DailyLog, ExerciseEntry, FoodEntry, MonthlyInsight,
    NewExerciseEntry, NewFoodEntry, NewProfile, SafetyLog, SafetyReport, SafetyThresholds,
    Severity, TodayStats, UserPreferences, UserProfile, ViolationType, WeeklyPlan, WeeklyStats,
    WeightEntry, validate_month, validate_reminder_time,
};

/// Number of weigh-ins kept in the observable history.
pub const RECENT_WEIGHT_LIMIT: usize = 30;

const LOAD_FAILED: &str = "Failed to load data. Please refresh the page.";
const PROFILE_FAILED: &str = "Failed to save profile. Please try again.";
const SAVE_FAILED: &str = "Failed to save changes. Please try again.";
const WEIGHT_FAILED: &str = "Failed to save weight. Please try again.";
const PREFERENCES_FAILED: &str = "Failed to save preferences. Please try again.";
const REMOVE_FAILED: &str = "Failed to remove entry. Please try again.";
const SAFETY_FAILED: &str = "Failed to check safety. Please try again.";
const RESET_FAILED: &str = "Failed to reset data. Please try again.";
const READ_FAILED: &str = "Failed to load data. Please try again.";

/// Source of "today". Injected so tests can pin the date.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusyState {
    pub busy: bool,
    pub message: Option<String>,
}

/// Clears the busy flag when dropped, whichever way the operation ends.
struct BusyGuard<'a> {
    busy: &'a watch::Sender<BusyState>,
}

impl<'a> BusyGuard<'a> {
    fn start(busy: &'a watch::Sender<BusyState>, message: &str) -> Self {
        busy.send_replace(BusyState {
            busy: true,
            message: Some(message.to_string()),
        });
        Self { busy }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.send_replace(BusyState::default());
    }
}

fn ai_error_message(err: &Error) -> String {
    match err {
        Error::AiNotConfigured => "AI service not configured".to_string(),
        Error::AiRequest(_) => "AI request failed. Please try again.".to_string(),
        Error::AiResponseMalformed(_) => {
            "Could not understand that exercise. Please enter it manually.".to_string()
        }
        Error::Validation(msg) => msg.clone(),
        _ => SAVE_FAILED.to_string(),
    }
}

/// Today's log from the cache if it is current, else from the store, else a
/// fresh log at the planned target.
fn load_or_create_log(
    db: &Database,
    cached: Option<DailyLog>,
    today: NaiveDate,
) -> Result<DailyLog> {
    if let Some(log) = cached.filter(|l| l.date == today) {
        return Ok(log);
    }
    if let Some(log) = db.get_daily_log(today)? {
        return Ok(log);
    }
    let plan = db.get_current_weekly_plan(today)?;
    Ok(DailyLog::new(today, target_for_date(plan.as_ref(), today)))
}

fn body_weight(db: &Database) -> Result<f64> {
    if let Some(profile) = db.get_profile()? {
        return Ok(profile.weight);
    }
    if let Some(latest) = db.get_latest_weight()? {
        return Ok(latest.weight);
    }
    tracing::warn!(
        weight = DEFAULT_BODY_WEIGHT_LB,
        "no profile or weigh-in, using default body weight"
    );
    Ok(DEFAULT_BODY_WEIGHT_LB)
}

struct Snapshot {
    profile: Option<UserProfile>,
    today_log: Option<DailyLog>,
    weekly_plan: Option<WeeklyPlan>,
    weight_history: Vec<WeightEntry>,
    preferences: UserPreferences,
}

/// Owns the store and the observable state derived from it.
///
/// Every mutation computes the new value, writes it through to the store and
/// only then publishes it. A failed mutation publishes a user-facing error and
/// leaves every observable value as it was.
pub struct TrackerService {
    store: LazyDatabase,
    clock: Clock,
    write_lock: Mutex<()>,
    profile: watch::Sender<Option<UserProfile>>,
    today_log: watch::Sender<Option<DailyLog>>,
    weekly_plan: watch::Sender<Option<WeeklyPlan>>,
    weight_history: watch::Sender<Vec<WeightEntry>>,
    preferences: watch::Sender<UserPreferences>,
    chat: watch::Sender<Vec<ChatMessage>>,
    busy: watch::Sender<BusyState>,
    error: watch::Sender<Option<String>>,
}

impl TrackerService {
    #[must_use]
    pub fn new(store: LazyDatabase) -> Self {
        Self::with_clock(store, Arc::new(|| Local::now().date_naive()))
    }

    #[must_use]
    pub fn with_clock(store: LazyDatabase, clock: Clock) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
            profile: watch::Sender::new(None),
            today_log: watch::Sender::new(None),
            weekly_plan: watch::Sender::new(None),
            weight_history: watch::Sender::new(Vec::new()),
            preferences: watch::Sender::new(UserPreferences::default()),
            chat: watch::Sender::new(Vec::new()),
            busy: watch::Sender::new(BusyState::default()),
            error: watch::Sender::new(None),
        }
    }

    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(LazyDatabase::new(path))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(LazyDatabase::in_memory())
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    async fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let shared = self.store.get().await?;
        let db = shared.lock().unwrap_or_else(PoisonError::into_inner);
        f(&db)
    }

    fn publish_error(&self, message: String) {
        self.error.send_replace(Some(message));
    }

    /// Publish a message for a failed result. Validation failures carry their
    /// own text; anything else gets `fallback`.
    fn report<T>(&self, result: Result<T>, fallback: &str) -> Result<T> {
        if let Err(e) = &result {
            let message = match e {
                Error::Validation(msg) => {
                    tracing::warn!(error = %e, "rejected input");
                    msg.clone()
                }
                _ => {
                    tracing::error!(error = %e, "{fallback}");
                    fallback.to_string()
                }
            };
            self.publish_error(message);
        }
        result
    }

    fn cached_today_log(&self) -> Option<DailyLog> {
        self.today_log.borrow().clone()
    }

    // --- Observable state ---

    #[must_use]
    pub fn subscribe_profile(&self) -> watch::Receiver<Option<UserProfile>> {
        self.profile.subscribe()
    }

    #[must_use]
    pub fn subscribe_today_log(&self) -> watch::Receiver<Option<DailyLog>> {
        self.today_log.subscribe()
    }

    #[must_use]
    pub fn subscribe_weekly_plan(&self) -> watch::Receiver<Option<WeeklyPlan>> {
        self.weekly_plan.subscribe()
    }

    #[must_use]
    pub fn subscribe_weight_history(&self) -> watch::Receiver<Vec<WeightEntry>> {
        self.weight_history.subscribe()
    }

    #[must_use]
    pub fn subscribe_preferences(&self) -> watch::Receiver<UserPreferences> {
        self.preferences.subscribe()
    }

    #[must_use]
    pub fn subscribe_chat(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.chat.subscribe()
    }

    #[must_use]
    pub fn subscribe_busy(&self) -> watch::Receiver<BusyState> {
        self.busy.subscribe()
    }

    #[must_use]
    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    #[must_use]
    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.borrow().clone()
    }

    #[must_use]
    pub fn today_log(&self) -> Option<DailyLog> {
        self.cached_today_log()
    }

    #[must_use]
    pub fn weekly_plan(&self) -> Option<WeeklyPlan> {
        self.weekly_plan.borrow().clone()
    }

    #[must_use]
    pub fn weight_history(&self) -> Vec<WeightEntry> {
        self.weight_history.borrow().clone()
    }

    #[must_use]
    pub fn preferences(&self) -> UserPreferences {
        self.preferences.borrow().clone()
    }

    #[must_use]
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.chat.borrow().clone()
    }

    #[must_use]
    pub fn busy_state(&self) -> BusyState {
        self.busy.borrow().clone()
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    // --- Derived views ---

    #[must_use]
    pub fn is_onboarded(&self) -> bool {
        self.profile.borrow().is_some()
    }

    #[must_use]
    pub fn today_stats(&self) -> TodayStats {
        let log = self.today_log.borrow();
        today_stats(Option::as_ref(&log))
    }

    // --- Lifecycle ---

    /// Load every observable value from the store.
    pub async fn initialize(&self) -> Result<()> {
        let _busy = BusyGuard::start(&self.busy, "Loading your data...");
        let today = self.today();

        let result = self
            .with_db(|db| {
                let mut today_log = db.get_daily_log(today)?;
                if let Some(log) = today_log.as_mut().filter(|l| !l.totals_consistent()) {
                    tracing::warn!(date = %log.date, "stored totals disagree with entries, recomputing");
                    log.recompute_totals();
                }
                Ok(Snapshot {
                    profile: db.get_profile()?,
                    today_log,
                    weekly_plan: db.get_current_weekly_plan(today)?,
                    weight_history: db.get_weight_history(RECENT_WEIGHT_LIMIT)?,
                    preferences: db.get_preferences()?,
                })
            })
            .await;
        let snapshot = self.report(result, LOAD_FAILED)?;

        tracing::info!(
            onboarded = snapshot.profile.is_some(),
            %today,
            "tracker state loaded"
        );
        self.profile.send_replace(snapshot.profile);
        self.today_log.send_replace(snapshot.today_log);
        self.weekly_plan.send_replace(snapshot.weekly_plan);
        self.weight_history.send_replace(snapshot.weight_history);
        self.preferences.send_replace(snapshot.preferences);
        Ok(())
    }

    /// Save the profile, generate this week's plan from it and retarget
    /// today's log. Existing entries in today's log are kept.
    pub async fn save_user_profile(&self, new: NewProfile) -> Result<UserProfile> {
        let _write = self.write_lock.lock().await;
        let _busy = BusyGuard::start(&self.busy, "Saving profile...");
        let today = self.today();

        let result: Result<(UserProfile, WeeklyPlan, DailyLog)> = async {
            let mut profile = new.into_profile()?;
            self.with_db(|db| {
                if let Some(previous) = db.get_profile()? {
                    profile.id = previous.id;
                    profile.created_at = previous.created_at;
                }
                let plan = calories::build_weekly_plan(&profile, today);
                let target = plan.target_for(today).unwrap_or(plan.average_target);

                let mut log = db
                    .get_daily_log(today)?
                    .unwrap_or_else(|| DailyLog::new(today, target));
                log.target_calories = target;
                log.recompute_totals();

                db.atomic(|db| {
                    db.save_profile(&profile)?;
                    db.save_weekly_plan(&plan)?;
                    db.save_daily_log(&log)
                })?;
                Ok((profile, plan, log))
            })
            .await
        }
        .await;
        let (profile, plan, log) = self.report(result, PROFILE_FAILED)?;

        tracing::info!(
            target = log.target_calories,
            week_start = %plan.week_start_date,
            "profile saved"
        );
        self.profile.send_replace(Some(profile.clone()));
        self.weekly_plan.send_replace(Some(plan));
        self.today_log.send_replace(Some(log));
        Ok(profile)
    }

    /// Persist an edited log. Totals are recomputed from its entries.
    pub async fn update_daily_log(&self, mut log: DailyLog) -> Result<DailyLog> {
        let _write = self.write_lock.lock().await;
        log.recompute_totals();

        let result = self.with_db(|db| db.save_daily_log(&log)).await;
        self.report(result, SAVE_FAILED)?;

        if log.date == self.today() {
            self.today_log.send_replace(Some(log.clone()));
        }
        Ok(log)
    }

    pub async fn add_food_entry(&self, new: NewFoodEntry) -> Result<FoodEntry> {
        let _write = self.write_lock.lock().await;
        let today = self.today();
        let cached = self.cached_today_log();

        let result: Result<(FoodEntry, DailyLog)> = async {
            let entry = new.into_entry()?;
            let log = self
                .with_db(|db| {
                    let mut log = load_or_create_log(db, cached, today)?;
                    log.add_food(entry.clone());
                    db.save_daily_log(&log)?;
                    Ok(log)
                })
                .await?;
            Ok((entry, log))
        }
        .await;
        let (entry, log) = self.report(result, SAVE_FAILED)?;

        tracing::debug!(name = %entry.name, calories = entry.calories, "food logged");
        self.today_log.send_replace(Some(log));
        Ok(entry)
    }

    /// Log exercise for today, pricing the burn at the user's body weight.
    pub async fn add_exercise_entry(&self, new: NewExerciseEntry) -> Result<ExerciseEntry> {
        let _write = self.write_lock.lock().await;
        let today = self.today();
        let cached = self.cached_today_log();

        let result = self
            .with_db(|db| {
                let entry = new.into_entry(body_weight(db)?)?;
                let mut log = load_or_create_log(db, cached, today)?;
                log.add_exercise(entry.clone());
                db.save_daily_log(&log)?;
                Ok((entry, log))
            })
            .await;
        let (entry, log) = self.report(result, SAVE_FAILED)?;

        tracing::debug!(
            activity = %entry.activity,
            minutes = entry.duration,
            burned = entry.calories_burned,
            "exercise logged"
        );
        self.today_log.send_replace(Some(log));
        Ok(entry)
    }

    /// Ask the AI collaborator to structure `input`, then log the result.
    pub async fn log_exercise_from_text(
        &self,
        parser: &dyn ExerciseParser,
        input: &str,
    ) -> Result<ExerciseEntry> {
        let input = input.trim();
        if input.is_empty() {
            return self.report(
                Err(Error::Validation("No input provided".to_string())),
                SAVE_FAILED,
            );
        }

        let parsed = {
            let _busy = BusyGuard::start(&self.busy, "Analyzing exercise...");
            parser.parse_exercise(input).await
        };
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "exercise parsing failed");
                self.publish_error(ai_error_message(&e));
                return Err(e);
            }
        };

        self.add_exercise_entry(NewExerciseEntry {
            activity: parsed.activity,
            duration: parsed.duration,
            intensity: parsed.intensity,
            ai_generated: true,
            raw_input: Some(input.to_string()),
        })
        .await
    }

    /// Returns `false` when today's log has no food entry with that id.
    pub async fn remove_food_entry(&self, id: &str) -> Result<bool> {
        self.remove_entry(id, DailyLog::remove_food).await
    }

    /// Returns `false` when today's log has no exercise entry with that id.
    pub async fn remove_exercise_entry(&self, id: &str) -> Result<bool> {
        self.remove_entry(id, DailyLog::remove_exercise).await
    }

    async fn remove_entry(&self, id: &str, remove: fn(&mut DailyLog, &str) -> bool) -> Result<bool> {
        let _write = self.write_lock.lock().await;
        let _busy = BusyGuard::start(&self.busy, "Removing entry...");
        let today = self.today();
        let cached = self.cached_today_log();

        let result = self
            .with_db(|db| {
                let mut log = match cached.filter(|l| l.date == today) {
                    Some(log) => log,
                    None => match db.get_daily_log(today)? {
                        Some(log) => log,
                        None => return Ok(None),
                    },
                };
                if !remove(&mut log, id) {
                    return Ok(None);
                }
                db.save_daily_log(&log)?;
                Ok(Some(log))
            })
            .await;

        match self.report(result, REMOVE_FAILED)? {
            Some(log) => {
                self.today_log.send_replace(Some(log));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record a weigh-in. The profile weight follows the newest entry, and a
    /// loss faster than the safe weekly rate is recorded as a violation.
    pub async fn add_weight(&self, entry: WeightEntry) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let today = self.today();

        let result: Result<(Option<UserProfile>, Vec<WeightEntry>, Option<DailyLog>)> = async {
            if !(entry.weight.is_finite() && entry.weight > 0.0) {
                return Err(Error::Validation(
                    "Weight must be greater than 0".to_string(),
                ));
            }
            self.with_db(|db| {
                db.atomic(|db| {
                    db.add_weight_entry(&entry)?;

                    let history = db.get_weight_history(RECENT_WEIGHT_LIMIT)?;
                    let is_newest = history.first().is_some_and(|e| e.date == entry.date);

                    let mut profile = db.get_profile()?;
                    if let Some(p) = profile.as_mut().filter(|_| is_newest) {
                        p.weight = entry.weight;
                        p.updated_at = Utc::now();
                        db.save_profile(p)?;
                    }

                    let mut log = db.get_daily_log(entry.date)?;
                    if let Some(l) = log.as_mut() {
                        l.weight = Some(entry.weight);
                        db.save_daily_log(l)?;
                    }

                    if let Some(rate) = calories::weekly_loss_rate(&history, &entry) {
                        if rate > SafetyThresholds::MAX_WEEKLY_WEIGHT_LOSS {
                            tracing::warn!(rate, "rapid weight loss recorded");
                            db.add_safety_violation(&SafetyLog {
                                id: None,
                                date: entry.date,
                                violation_type: ViolationType::RapidWeightLoss,
                                details: format!(
                                    "Losing {rate:.1} lbs/week, above the safe maximum of {} lbs/week",
                                    SafetyThresholds::MAX_WEEKLY_WEIGHT_LOSS
                                ),
                                net_calories: None,
                                exercise_duration: None,
                            })?;
                        }
                    }

                    Ok((profile, history, log.filter(|l| l.date == today)))
                })
            })
            .await
        }
        .await;
        let (profile, history, log) = self.report(result, WEIGHT_FAILED)?;

        if profile.is_some() {
            self.profile.send_replace(profile);
        }
        if log.is_some() {
            self.today_log.send_replace(log);
        }
        self.weight_history.send_replace(history);
        Ok(())
    }

    pub async fn save_preferences(&self, preferences: UserPreferences) -> Result<()> {
        let _write = self.write_lock.lock().await;

        let result: Result<()> = async {
            let times = &preferences.reminder_times;
            for time in [&times.breakfast, &times.lunch, &times.dinner, &times.weigh]
                .into_iter()
                .flatten()
            {
                validate_reminder_time(time)?;
            }
            self.with_db(|db| db.save_preferences(&preferences)).await
        }
        .await;
        self.report(result, PREFERENCES_FAILED)?;

        self.preferences.send_replace(preferences);
        Ok(())
    }

    /// Check today's net intake and exercise volume against the safety
    /// thresholds. Critical findings are recorded once per type per day.
    pub async fn evaluate_today_safety(&self) -> Result<SafetyReport> {
        let _write = self.write_lock.lock().await;
        let today = self.today();
        let cached = self.cached_today_log();

        let result = self
            .with_db(|db| {
                let profile = db.get_profile()?.ok_or_else(|| {
                    Error::Validation("Create a profile before checking safety".to_string())
                })?;
                let log = load_or_create_log(db, cached, today)?;
                let minutes: u32 = log.exercises.iter().map(|e| e.duration).sum();
                let report =
                    calories::check_safety_thresholds(log.net_calories, profile.sex, minutes);

                let day = today.to_string();
                let recorded: Vec<SafetyLog> =
                    db.range_scan(Index::Date, Some(day.as_str()), Some(day.as_str()), Order::Asc, None)?;
                for warning in report
                    .warnings
                    .iter()
                    .filter(|w| w.severity == Severity::Critical)
                {
                    if recorded
                        .iter()
                        .any(|v| v.violation_type == warning.violation_type)
                    {
                        continue;
                    }
                    let exercise = warning.violation_type == ViolationType::ExcessiveExercise;
                    db.add_safety_violation(&SafetyLog {
                        id: None,
                        date: today,
                        violation_type: warning.violation_type,
                        details: warning.message.clone(),
                        net_calories: (!exercise).then_some(log.net_calories),
                        exercise_duration: exercise.then_some(minutes),
                    })?;
                    tracing::warn!(kind = %warning.violation_type, "safety violation recorded");
                }
                Ok(report)
            })
            .await;
        self.report(result, SAFETY_FAILED)
    }

    pub async fn safety_violations(
        &self,
        kind: Option<ViolationType>,
        limit: usize,
    ) -> Result<Vec<SafetyLog>> {
        let result = self
            .with_db(|db| match kind {
                Some(kind) => db.get_safety_violations_by_type(kind, limit),
                None => db.get_safety_violations(limit),
            })
            .await;
        self.report(result, READ_FAILED)
    }

    pub async fn daily_log(&self, date: NaiveDate) -> Result<Option<DailyLog>> {
        let result = self.with_db(|db| db.get_daily_log(date)).await;
        self.report(result, READ_FAILED)
    }

    pub async fn daily_logs(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyLog>> {
        let result = self.with_db(|db| db.get_daily_logs(from, to)).await;
        self.report(result, READ_FAILED)
    }

    /// The stored plan for the week containing today, if one was generated.
    pub async fn current_weekly_plan(&self) -> Result<Option<WeeklyPlan>> {
        let today = self.today();
        let result = self.with_db(|db| db.get_current_weekly_plan(today)).await;
        self.report(result, READ_FAILED)
    }

    /// Newest first.
    pub async fn weight_entries(&self, limit: usize) -> Result<Vec<WeightEntry>> {
        let result = self.with_db(|db| db.get_weight_history(limit)).await;
        self.report(result, READ_FAILED)
    }

    /// Stats for the Monday-to-Sunday week containing `date`. Days without a
    /// log are left out rather than counted as zero.
    pub async fn weekly_stats(&self, date: NaiveDate) -> Result<WeeklyStats> {
        let start = week_start(date);
        let logs = self.daily_logs(start, start + Duration::days(6)).await?;
        Ok(calories::calculate_weekly_stats(&logs))
    }

    pub async fn save_monthly_insight(&self, insight: MonthlyInsight) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let result: Result<()> = async {
            validate_month(&insight.month)?;
            self.with_db(|db| db.save_monthly_insight(&insight)).await
        }
        .await;
        self.report(result, SAVE_FAILED)
    }

    pub async fn monthly_insight(&self, month: &str) -> Result<Option<MonthlyInsight>> {
        let result: Result<Option<MonthlyInsight>> = async {
            validate_month(month)?;
            self.with_db(|db| db.get_monthly_insight(month)).await
        }
        .await;
        self.report(result, READ_FAILED)
    }

    /// Wipe every collection and return all observable values to defaults.
    pub async fn reset_all_data(&self) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let _busy = BusyGuard::start(&self.busy, "Resetting data...");

        let result = self.with_db(Database::clear_all).await;
        self.report(result, RESET_FAILED)?;

        tracing::info!("all data cleared");
        self.profile.send_replace(None);
        self.today_log.send_replace(None);
        self.weekly_plan.send_replace(None);
        self.weight_history.send_replace(Vec::new());
        self.preferences.send_replace(UserPreferences::default());
        self.chat.send_replace(Vec::new());
        Ok(())
    }

    // --- Transient state ---

    pub fn clear_error(&self) {
        self.error.send_replace(None);
    }

    pub fn add_chat_message(&self, message: ChatMessage) {
        self.chat.send_modify(|chat| chat.push(message));
    }

    pub fn clear_chat(&self) {
        self.chat.send_replace(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ParsedExercise;
    use crate::models::{ActivityLevel, ChatRole, Intensity, Sex};
    use async_trait::async_trait;

    enum MockParser {
        Reply(ParsedExercise),
        NotConfigured,
        Malformed,
    }

    #[async_trait]
    impl ExerciseParser for MockParser {
        async fn parse_exercise(&self, _input: &str) -> Result<ParsedExercise> {
            match self {
                MockParser::Reply(parsed) => Ok(parsed.clone()),
                MockParser::NotConfigured => Err(Error::AiNotConfigured),
                MockParser::Malformed => {
                    Err(Error::AiResponseMalformed("reply is not JSON".to_string()))
                }
            }
        }
    }

    // Wednesday.
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    fn service() -> TrackerService {
        TrackerService::with_clock(LazyDatabase::in_memory(), Arc::new(today))
    }

    fn new_profile() -> NewProfile {
        NewProfile {
            age: 30,
            weight: 180.0,
            height: 70.0,
            activity_level: ActivityLevel::Moderate,
            sex: Sex::Male,
            target_weight: 165.0,
            weekly_goal: 1.0,
        }
    }

    fn food(name: &str, calories: i64) -> NewFoodEntry {
        NewFoodEntry {
            name: name.to_string(),
            calories,
            ..NewFoodEntry::default()
        }
    }

    fn run(minutes: u32) -> NewExerciseEntry {
        NewExerciseEntry {
            activity: "running".to_string(),
            duration: minutes,
            intensity: Intensity::Moderate,
            ai_generated: false,
            raw_input: None,
        }
    }

    fn weigh_in(date: NaiveDate, weight: f64) -> WeightEntry {
        WeightEntry {
            date,
            weight,
            body_fat: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_initialize_empty_store() {
        let svc = service();
        svc.initialize().await.unwrap();

        assert!(!svc.is_onboarded());
        assert!(svc.today_log().is_none());
        assert_eq!(svc.preferences(), UserPreferences::default());
        assert_eq!(svc.today_stats().target_calories, 2000);
        assert!(!svc.busy_state().busy);
        assert!(svc.error_message().is_none());
    }

    #[tokio::test]
    async fn test_initialize_failure_publishes_error_and_clears_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("slimify.db");
        let svc = TrackerService::with_clock(LazyDatabase::new(path), Arc::new(today));

        assert!(svc.initialize().await.is_err());
        assert_eq!(svc.error_message().as_deref(), Some(LOAD_FAILED));
        assert!(!svc.busy_state().busy);

        svc.clear_error();
        assert!(svc.error_message().is_none());
    }

    #[tokio::test]
    async fn test_save_profile_builds_plan_and_today_log() {
        let svc = service();
        svc.initialize().await.unwrap();
        let profile = svc.save_user_profile(new_profile()).await.unwrap();

        assert!(svc.is_onboarded());
        let plan = svc.weekly_plan().unwrap();
        assert_eq!(plan.week_start_date, NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert_eq!(plan.average_target, 2264);

        // Wednesday multiplier is 1.0.
        let log = svc.today_log().unwrap();
        assert_eq!(log.target_calories, 2264);
        assert_eq!(svc.today_stats().remaining, 2264);

        // A fresh service sees the same state.
        let again = svc.with_db(|db| db.get_profile()).await.unwrap().unwrap();
        assert_eq!(again, profile);
    }

    #[tokio::test]
    async fn test_resaving_profile_keeps_id_and_entries() {
        let svc = service();
        let first = svc.save_user_profile(new_profile()).await.unwrap();
        svc.add_food_entry(food("Bagel", 300)).await.unwrap();

        let mut updated = new_profile();
        updated.weekly_goal = 0.5;
        let second = svc.save_user_profile(updated).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        let log = svc.today_log().unwrap();
        assert_eq!(log.meals.len(), 1);
        assert_eq!(log.total_calories, 300);
        assert_eq!(log.target_calories, 2514);
    }

    #[tokio::test]
    async fn test_invalid_profile_leaves_state_untouched() {
        let svc = service();
        let mut bad = new_profile();
        bad.weekly_goal = 3.0;

        let err = svc.save_user_profile(bad).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(svc.profile().is_none());
        assert!(svc.weekly_plan().is_none());
        assert!(
            svc.error_message()
                .unwrap()
                .contains("Weekly goal must be between")
        );
        assert!(!svc.busy_state().busy);
    }

    #[tokio::test]
    async fn test_non_finite_profile_rejected() {
        let svc = service();
        let mut bad = new_profile();
        bad.weight = f64::INFINITY;
        bad.target_weight = f64::NAN;

        let err = svc.save_user_profile(bad).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(svc.weekly_plan().is_none());
        assert!(svc.current_weekly_plan().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_then_remove_food_restores_totals() {
        let svc = service();
        svc.add_food_entry(food("Toast", 200)).await.unwrap();
        let before = svc.today_log().unwrap();

        let pizza = svc.add_food_entry(food("Pizza", 500)).await.unwrap();
        assert_eq!(svc.today_log().unwrap().total_calories, 700);

        assert!(svc.remove_food_entry(&pizza.id).await.unwrap());
        assert_eq!(svc.today_log().unwrap(), before);

        let stored = svc.daily_log(today()).await.unwrap().unwrap();
        assert_eq!(stored, before);
    }

    #[tokio::test]
    async fn test_food_round_trip_from_empty_day_keeps_exercise() {
        let svc = service();
        let burn = svc.add_exercise_entry(run(30)).await.unwrap();
        assert_eq!(svc.today_log().unwrap().total_calories, 0);

        let dinner = svc.add_food_entry(food("Dinner", 500)).await.unwrap();
        assert_eq!(svc.today_log().unwrap().total_calories, 500);

        assert!(svc.remove_food_entry(&dinner.id).await.unwrap());
        let log = svc.today_log().unwrap();
        assert_eq!(log.total_calories, 0);
        assert_eq!(log.exercise_calories, burn.calories_burned);
        assert_eq!(log.net_calories, -burn.calories_burned);
        assert_eq!(svc.daily_log(today()).await.unwrap(), Some(log));
    }

    #[tokio::test]
    async fn test_remove_missing_entry_returns_false() {
        let svc = service();
        assert!(!svc.remove_food_entry("nope").await.unwrap());
        svc.add_food_entry(food("Toast", 200)).await.unwrap();
        assert!(!svc.remove_exercise_entry("nope").await.unwrap());
        assert!(!svc.busy_state().busy);
    }

    #[tokio::test]
    async fn test_new_log_without_plan_uses_default_target() {
        let svc = service();
        svc.add_food_entry(food("Apple", 95)).await.unwrap();
        assert_eq!(svc.today_log().unwrap().target_calories, 2000);
    }

    #[tokio::test]
    async fn test_invalid_food_rejected_without_publish() {
        let svc = service();
        let err = svc.add_food_entry(food("", 100)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(svc.today_log().is_none());
        assert_eq!(
            svc.error_message().as_deref(),
            Some("Food name must not be empty")
        );
    }

    #[tokio::test]
    async fn test_exercise_priced_at_profile_weight() {
        let svc = service();
        svc.save_user_profile(new_profile()).await.unwrap();
        let entry = svc.add_exercise_entry(run(60)).await.unwrap();
        assert_eq!(entry.calories_burned, 653);

        let stats = svc.today_stats();
        assert_eq!(stats.exercise_calories, 653);
        assert_eq!(stats.remaining, 2264 + 653);
    }

    #[tokio::test]
    async fn test_exercise_without_profile_uses_fallback_weight() {
        let svc = service();
        // 8.0 MET * 68.0388 kg * 1 h
        assert_eq!(svc.add_exercise_entry(run(60)).await.unwrap().calories_burned, 544);

        svc.add_weight(weigh_in(today(), 200.0)).await.unwrap();
        // 8.0 MET * 90.7184 kg * 1 h
        assert_eq!(svc.add_exercise_entry(run(60)).await.unwrap().calories_burned, 726);
    }

    #[tokio::test]
    async fn test_log_exercise_from_text() {
        let svc = service();
        svc.save_user_profile(new_profile()).await.unwrap();
        let parser = MockParser::Reply(ParsedExercise {
            activity: "cycling".to_string(),
            duration: 30,
            intensity: Intensity::Intense,
        });

        let entry = svc
            .log_exercise_from_text(&parser, "  hard bike ride  ")
            .await
            .unwrap();
        assert!(entry.ai_generated);
        assert_eq!(entry.raw_input.as_deref(), Some("hard bike ride"));
        // 8.0 MET * 81.64656 kg * 0.5 h
        assert_eq!(entry.calories_burned, 327);
        assert_eq!(svc.today_log().unwrap().exercises.len(), 1);
    }

    #[tokio::test]
    async fn test_log_exercise_from_text_failures() {
        let svc = service();

        let err = svc
            .log_exercise_from_text(&MockParser::NotConfigured, "ran")
            .await
            .unwrap_err();
        assert!(err.is_ai());
        assert_eq!(
            svc.error_message().as_deref(),
            Some("AI service not configured")
        );

        let err = svc
            .log_exercise_from_text(&MockParser::Malformed, "ran")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AiResponseMalformed(_)));
        assert!(svc.error_message().unwrap().contains("enter it manually"));

        let err = svc
            .log_exercise_from_text(&MockParser::NotConfigured, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(svc.error_message().as_deref(), Some("No input provided"));

        assert!(svc.today_log().is_none());
        assert!(!svc.busy_state().busy);
    }

    #[tokio::test]
    async fn test_add_weight_updates_profile_and_history() {
        let svc = service();
        svc.save_user_profile(new_profile()).await.unwrap();
        svc.add_food_entry(food("Eggs", 200)).await.unwrap();

        svc.add_weight(weigh_in(today() - Duration::days(2), 179.0))
            .await
            .unwrap();
        svc.add_weight(weigh_in(today(), 178.2)).await.unwrap();

        let history = svc.weight_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, today());
        assert!((svc.profile().unwrap().weight - 178.2).abs() < f64::EPSILON);
        assert_eq!(svc.today_log().unwrap().weight, Some(178.2));

        // A back-dated entry does not move the profile weight.
        svc.add_weight(weigh_in(today() - Duration::days(5), 181.0))
            .await
            .unwrap();
        assert!((svc.profile().unwrap().weight - 178.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_weight_history_capped() {
        let svc = service();
        for offset in 0..35 {
            svc.add_weight(weigh_in(today() - Duration::days(offset), 180.0))
                .await
                .unwrap();
        }
        assert_eq!(svc.weight_history().len(), RECENT_WEIGHT_LIMIT);

        let all = svc.weight_entries(100).await.unwrap();
        assert_eq!(all.len(), 35);
        assert_eq!(all[0].date, today());
    }

    #[tokio::test]
    async fn test_current_weekly_plan_read_from_store() {
        let svc = service();
        assert!(svc.current_weekly_plan().await.unwrap().is_none());

        svc.save_user_profile(new_profile()).await.unwrap();
        let plan = svc.current_weekly_plan().await.unwrap().unwrap();
        assert_eq!(plan.week_start_date, week_start(today()));
        assert_eq!(Some(plan), svc.weekly_plan());
    }

    #[tokio::test]
    async fn test_invalid_weight_rejected() {
        let svc = service();
        assert!(svc.add_weight(weigh_in(today(), 0.0)).await.is_err());
        assert!(svc.weight_history().is_empty());
    }

    #[tokio::test]
    async fn test_rapid_weight_loss_recorded() {
        let svc = service();
        svc.add_weight(weigh_in(today() - Duration::days(7), 185.0))
            .await
            .unwrap();
        svc.add_weight(weigh_in(today(), 181.5)).await.unwrap();

        let violations = svc
            .safety_violations(Some(ViolationType::RapidWeightLoss), 10)
            .await
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].details.contains("3.5 lbs/week"));
    }

    #[tokio::test]
    async fn test_safety_evaluation_records_once() {
        let svc = service();
        svc.save_user_profile(new_profile()).await.unwrap();
        svc.add_food_entry(food("Salad", 900)).await.unwrap();
        svc.add_exercise_entry(run(130)).await.unwrap();

        let report = svc.evaluate_today_safety().await.unwrap();
        assert!(!report.safe);
        assert_eq!(report.warnings.len(), 2);

        svc.evaluate_today_safety().await.unwrap();
        let recorded = svc.safety_violations(None, 10).await.unwrap();
        assert_eq!(recorded.len(), 2);
        let exercise = recorded
            .iter()
            .find(|v| v.violation_type == ViolationType::ExcessiveExercise)
            .unwrap();
        assert_eq!(exercise.exercise_duration, Some(130));
    }

    #[tokio::test]
    async fn test_safety_requires_profile() {
        let svc = service();
        assert!(matches!(
            svc.evaluate_today_safety().await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_preferences_saved_and_validated() {
        let svc = service();
        let mut prefs = UserPreferences::default();
        prefs.reminder_times.lunch = Some("12:15".to_string());
        svc.save_preferences(prefs.clone()).await.unwrap();
        assert_eq!(svc.preferences(), prefs);

        let mut bad = prefs.clone();
        bad.reminder_times.dinner = Some("dinnertime".to_string());
        assert!(svc.save_preferences(bad).await.is_err());
        assert_eq!(svc.preferences(), prefs);
    }

    #[tokio::test]
    async fn test_update_daily_log_recomputes_totals() {
        let svc = service();
        svc.add_food_entry(food("Rice", 400)).await.unwrap();
        let mut log = svc.today_log().unwrap();
        log.meals[0].calories = 350;
        log.notes = Some("smaller portion".to_string());

        let saved = svc.update_daily_log(log).await.unwrap();
        assert_eq!(saved.total_calories, 350);
        assert_eq!(svc.today_log().unwrap(), saved);
    }

    #[tokio::test]
    async fn test_weekly_stats_for_week() {
        let svc = service();
        let mut monday = DailyLog::new(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(), 2000);
        monday.add_food(food("Dinner", 2050).into_entry().unwrap());
        let mut tuesday = DailyLog::new(NaiveDate::from_ymd_opt(2024, 6, 11).unwrap(), 2000);
        tuesday.add_food(food("Dinner", 2200).into_entry().unwrap());
        let mut next_monday = DailyLog::new(NaiveDate::from_ymd_opt(2024, 6, 17).unwrap(), 2000);
        next_monday.add_food(food("Dinner", 900).into_entry().unwrap());
        for log in [monday, tuesday, next_monday] {
            svc.update_daily_log(log).await.unwrap();
        }

        let stats = svc.weekly_stats(today()).await.unwrap();
        assert_eq!(stats.adherence_rate, 50);
        assert_eq!(stats.average_intake, 2125);
        assert_eq!(stats.total_deficit, -250);
    }

    #[tokio::test]
    async fn test_monthly_insight_roundtrip() {
        use crate::models::{ExercisePatterns, NutritionPatterns, WeekdayVsWeekend};

        let svc = service();
        let insight = MonthlyInsight {
            month: "2024-06".to_string(),
            summary: "Steady month".to_string(),
            achievements: vec!["Logged 28 days".to_string()],
            challenges: vec![],
            exercise_patterns: ExercisePatterns {
                total_workouts: 12,
                favorite_activities: vec!["running".to_string()],
                average_duration: 42.5,
                calories_burned: 5400,
            },
            nutrition_patterns: NutritionPatterns {
                average_daily_calories: 2150.0,
                weekday_vs_weekend: WeekdayVsWeekend {
                    weekday: 2080.0,
                    weekend: 2320.0,
                },
                consistency: 86.0,
            },
            recommendations: vec![],
            weight_change: -3.2,
        };
        svc.save_monthly_insight(insight.clone()).await.unwrap();
        assert_eq!(svc.monthly_insight("2024-06").await.unwrap(), Some(insight));
        assert!(svc.monthly_insight("2024-07").await.unwrap().is_none());
        assert!(svc.monthly_insight("June").await.is_err());
    }

    #[tokio::test]
    async fn test_chat_transcript() {
        let svc = service();
        svc.add_chat_message(ChatMessage::new(ChatRole::User, "I ran 5k"));
        svc.add_chat_message(ChatMessage::new(ChatRole::Assistant, "Nice work!"));
        assert_eq!(svc.chat_messages().len(), 2);
        svc.clear_chat();
        assert!(svc.chat_messages().is_empty());
    }

    #[tokio::test]
    async fn test_reset_all_data() {
        let svc = service();
        svc.save_user_profile(new_profile()).await.unwrap();
        svc.add_weight(weigh_in(today(), 180.0)).await.unwrap();
        svc.add_chat_message(ChatMessage::new(ChatRole::User, "hi"));

        svc.reset_all_data().await.unwrap();
        assert!(!svc.is_onboarded());
        assert!(svc.today_log().is_none());
        assert!(svc.weight_history().is_empty());
        assert!(svc.chat_messages().is_empty());
        assert!(svc.daily_log(today()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_published_log() {
        let svc = service();
        let mut rx = svc.subscribe_today_log();
        assert!(rx.borrow_and_update().is_none());

        svc.add_food_entry(food("Banana", 105)).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().total_calories, 105);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_serialized() {
        let svc = Arc::new(service());
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.add_food_entry(food(&format!("Snack {i}"), 10)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let log = svc.daily_log(today()).await.unwrap().unwrap();
        assert_eq!(log.meals.len(), 10);
        assert_eq!(log.total_calories, 100);
    }
}
