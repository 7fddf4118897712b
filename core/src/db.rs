use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::calories::week_start;
use crate::error::{Error, Result};
use crate::models::{
    DailyLog, MonthlyInsight, SafetyLog, UserPreferences, UserProfile, ViolationType, WeeklyPlan,
    WeightEntry,
};

/// Highest `user_version` this build knows how to read.
pub const SCHEMA_VERSION: i64 = 1;

/// Key of the single row in the `profile` and `preferences` collections.
pub const SINGLETON_KEY: &str = "current";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Profile,
    DailyLogs,
    WeeklyPlans,
    WeightHistory,
    MonthlyInsights,
    SafetyViolations,
    Preferences,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Profile,
        Collection::DailyLogs,
        Collection::WeeklyPlans,
        Collection::WeightHistory,
        Collection::MonthlyInsights,
        Collection::SafetyViolations,
        Collection::Preferences,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Collection::Profile => "profile",
            Collection::DailyLogs => "dailyLogs",
            Collection::WeeklyPlans => "weeklyPlans",
            Collection::WeightHistory => "weightHistory",
            Collection::MonthlyInsights => "monthlyInsights",
            Collection::SafetyViolations => "safetyViolations",
            Collection::Preferences => "preferences",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Collection::Profile => "profile",
            Collection::DailyLogs => "daily_logs",
            Collection::WeeklyPlans => "weekly_plans",
            Collection::WeightHistory => "weight_history",
            Collection::MonthlyInsights => "monthly_insights",
            Collection::SafetyViolations => "safety_violations",
            Collection::Preferences => "preferences",
        }
    }

    fn has_month(self) -> bool {
        matches!(self, Collection::DailyLogs | Collection::WeightHistory)
    }

    fn is_appended(self) -> bool {
        matches!(self, Collection::SafetyViolations)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered indexes available for [`Database::range_scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// The natural key, or the generated id for appended collections.
    Primary,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// Calendar month (`YYYY-MM`).
    Month,
    ViolationType,
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Index::Primary => "primary",
            Index::Date => "date",
            Index::Month => "month",
            Index::ViolationType => "violation type",
        })
    }
}

fn index_column(collection: Collection, index: Index) -> Result<&'static str> {
    use Collection::{DailyLogs, SafetyViolations, WeeklyPlans, WeightHistory};

    match (collection, index) {
        (SafetyViolations, Index::Primary) => Ok("id"),
        (_, Index::Primary) | (DailyLogs | WeeklyPlans | WeightHistory, Index::Date) => Ok("key"),
        (DailyLogs | WeightHistory, Index::Month) => Ok("month"),
        (SafetyViolations, Index::Date) => Ok("date"),
        (SafetyViolations, Index::ViolationType) => Ok("violation_type"),
        _ => Err(Error::Validation(format!(
            "Collection {collection} has no {index} index"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// A value stored as a JSON document in one collection.
pub trait Stored: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// Attach the row id assigned by the store. Most records ignore it.
    #[must_use]
    fn with_row_id(self, _id: i64) -> Self {
        self
    }
}

/// A record addressed by its natural key; `put` upserts on that key.
pub trait Keyed: Stored {
    fn key(&self) -> String;

    fn month(&self) -> Option<String> {
        None
    }
}

/// A record that only ever gets appended, with a generated id.
pub trait Appended: Stored {
    fn date(&self) -> NaiveDate;
    fn kind(&self) -> &'static str;
}

fn month_of(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

impl Stored for UserProfile {
    const COLLECTION: Collection = Collection::Profile;
}

impl Keyed for UserProfile {
    fn key(&self) -> String {
        SINGLETON_KEY.to_string()
    }
}

impl Stored for DailyLog {
    const COLLECTION: Collection = Collection::DailyLogs;
}

impl Keyed for DailyLog {
    fn key(&self) -> String {
        self.date.to_string()
    }

    fn month(&self) -> Option<String> {
        Some(month_of(self.date))
    }
}

impl Stored for WeeklyPlan {
    const COLLECTION: Collection = Collection::WeeklyPlans;
}

impl Keyed for WeeklyPlan {
    fn key(&self) -> String {
        self.week_start_date.to_string()
    }
}

impl Stored for WeightEntry {
    const COLLECTION: Collection = Collection::WeightHistory;
}

impl Keyed for WeightEntry {
    fn key(&self) -> String {
        self.date.to_string()
    }

    fn month(&self) -> Option<String> {
        Some(month_of(self.date))
    }
}

impl Stored for MonthlyInsight {
    const COLLECTION: Collection = Collection::MonthlyInsights;
}

impl Keyed for MonthlyInsight {
    fn key(&self) -> String {
        self.month.clone()
    }
}

impl Stored for UserPreferences {
    const COLLECTION: Collection = Collection::Preferences;
}

impl Keyed for UserPreferences {
    fn key(&self) -> String {
        SINGLETON_KEY.to_string()
    }
}

impl Stored for SafetyLog {
    const COLLECTION: Collection = Collection::SafetyViolations;

    fn with_row_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

impl Appended for SafetyLog {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn kind(&self) -> &'static str {
        self.violation_type.as_str()
    }
}

fn decode<T: Stored>(row_id: i64, data: &str) -> Result<T> {
    serde_json::from_str::<T>(data)
        .map(|value| value.with_row_id(row_id))
        .map_err(|source| Error::Corrupt {
            collection: T::COLLECTION.name(),
            source,
        })
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "opening store");
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version > SCHEMA_VERSION {
            return Err(Error::SchemaMismatch {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS profile (
                    key TEXT PRIMARY KEY,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS daily_logs (
                    key TEXT PRIMARY KEY,
                    month TEXT NOT NULL,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weekly_plans (
                    key TEXT PRIMARY KEY,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weight_history (
                    key TEXT PRIMARY KEY,
                    month TEXT NOT NULL,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS monthly_insights (
                    key TEXT PRIMARY KEY,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS safety_violations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL,
                    violation_type TEXT NOT NULL,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS preferences (
                    key TEXT PRIMARY KEY,
                    data TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_daily_logs_month ON daily_logs(month);
                CREATE INDEX IF NOT EXISTS idx_weight_history_month ON weight_history(month);
                CREATE INDEX IF NOT EXISTS idx_safety_violations_date ON safety_violations(date);
                CREATE INDEX IF NOT EXISTS idx_safety_violations_type ON safety_violations(violation_type);

                PRAGMA user_version = 1;",
            )?;
            tracing::info!(version = SCHEMA_VERSION, "store schema created");
        }

        Ok(())
    }

    // --- Generic collection operations ---

    pub fn get<T: Keyed>(&self, key: &str) -> Result<Option<T>> {
        let sql = format!(
            "SELECT rowid, data FROM {} WHERE key = ?1",
            T::COLLECTION.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => {
                let row_id: i64 = row.get(0)?;
                let data: String = row.get(1)?;
                decode(row_id, &data).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Insert or replace the record at its natural key.
    pub fn put<T: Keyed>(&self, value: &T) -> Result<()> {
        let collection = T::COLLECTION;
        let data = serde_json::to_string(value)?;
        if collection.has_month() {
            let month = value.month().unwrap_or_default();
            self.conn.execute(
                &format!(
                    "INSERT INTO {} (key, month, data) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET month = excluded.month, data = excluded.data",
                    collection.table()
                ),
                params![value.key(), month, data],
            )?;
        } else {
            self.conn.execute(
                &format!(
                    "INSERT INTO {} (key, data) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET data = excluded.data",
                    collection.table()
                ),
                params![value.key(), data],
            )?;
        }
        Ok(())
    }

    /// Append a record and return its generated id.
    pub fn add<T: Appended>(&self, value: &T) -> Result<i64> {
        let collection = T::COLLECTION;
        debug_assert!(collection.is_appended());
        let data = serde_json::to_string(value)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {} (date, violation_type, data) VALUES (?1, ?2, ?3)",
                collection.table()
            ),
            params![value.date().to_string(), value.kind(), data],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Records whose `index` value lies within `[lower, upper]`; either bound
    /// may be open. Ties on the index value keep insertion order.
    pub fn range_scan<T: Stored>(
        &self,
        index: Index,
        lower: Option<&str>,
        upper: Option<&str>,
        order: Order,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        let collection = T::COLLECTION;
        let column = index_column(collection, index)?;
        let dir = order.sql();
        let sql = format!(
            "SELECT rowid, data FROM {table}
             WHERE (?1 IS NULL OR {column} >= ?1) AND (?2 IS NULL OR {column} <= ?2)
             ORDER BY {column} {dir}, rowid {dir}
             LIMIT ?3",
            table = collection.table(),
        );
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![lower, upper, limit], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(row_id, data)| decode(row_id, &data))
            .collect()
    }

    pub fn clear(&self, collection: Collection) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", collection.table()), [])?;
        Ok(())
    }

    /// Run `f` inside one transaction. Nothing `f` wrote survives an error.
    pub fn atomic<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Clear every collection, continuing past failures. Returns the first
    /// failure so the caller can retry.
    pub fn clear_all(&self) -> Result<()> {
        let mut first_error = None;
        for collection in Collection::ALL {
            if let Err(e) = self.clear(collection) {
                tracing::warn!(%collection, error = %e, "failed to clear collection");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // --- Profile ---

    pub fn get_profile(&self) -> Result<Option<UserProfile>> {
        self.get(SINGLETON_KEY)
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        self.put(profile)
    }

    // --- Daily logs ---

    pub fn get_daily_log(&self, date: NaiveDate) -> Result<Option<DailyLog>> {
        self.get(&date.to_string())
    }

    pub fn save_daily_log(&self, log: &DailyLog) -> Result<()> {
        self.put(log)
    }

    /// Logs between `from` and `to` inclusive, oldest first.
    pub fn get_daily_logs(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyLog>> {
        self.range_scan(
            Index::Date,
            Some(&from.to_string()),
            Some(&to.to_string()),
            Order::Asc,
            None,
        )
    }

    pub fn get_daily_logs_for_month(&self, month: &str) -> Result<Vec<DailyLog>> {
        self.range_scan(Index::Month, Some(month), Some(month), Order::Asc, None)
    }

    // --- Weekly plans ---

    pub fn get_weekly_plan(&self, week_start_date: NaiveDate) -> Result<Option<WeeklyPlan>> {
        self.get(&week_start_date.to_string())
    }

    /// Plan stored under the Monday of the week containing `today`.
    pub fn get_current_weekly_plan(&self, today: NaiveDate) -> Result<Option<WeeklyPlan>> {
        self.get_weekly_plan(week_start(today))
    }

    pub fn save_weekly_plan(&self, plan: &WeeklyPlan) -> Result<()> {
        self.put(plan)
    }

    // --- Weight ---

    /// One entry per date; a second entry on the same date replaces the first.
    pub fn add_weight_entry(&self, entry: &WeightEntry) -> Result<()> {
        self.put(entry)
    }

    /// Most recent first.
    pub fn get_weight_history(&self, limit: usize) -> Result<Vec<WeightEntry>> {
        self.range_scan(Index::Date, None, None, Order::Desc, Some(limit))
    }

    pub fn get_latest_weight(&self) -> Result<Option<WeightEntry>> {
        Ok(self.get_weight_history(1)?.into_iter().next())
    }

    // --- Monthly insights ---

    pub fn get_monthly_insight(&self, month: &str) -> Result<Option<MonthlyInsight>> {
        self.get(month)
    }

    pub fn save_monthly_insight(&self, insight: &MonthlyInsight) -> Result<()> {
        self.put(insight)
    }

    // --- Safety ---

    pub fn add_safety_violation(&self, violation: &SafetyLog) -> Result<i64> {
        self.add(violation)
    }

    /// Most recent first.
    pub fn get_safety_violations(&self, limit: usize) -> Result<Vec<SafetyLog>> {
        self.range_scan(Index::Date, None, None, Order::Desc, Some(limit))
    }

    pub fn get_safety_violations_by_type(
        &self,
        violation_type: ViolationType,
        limit: usize,
    ) -> Result<Vec<SafetyLog>> {
        let kind = violation_type.as_str();
        self.range_scan(
            Index::ViolationType,
            Some(kind),
            Some(kind),
            Order::Desc,
            Some(limit),
        )
    }

    // --- Preferences ---

    /// Stored preferences, or the defaults when none have been saved.
    pub fn get_preferences(&self) -> Result<UserPreferences> {
        Ok(self
            .get::<UserPreferences>(SINGLETON_KEY)?
            .unwrap_or_default())
    }

    pub fn save_preferences(&self, preferences: &UserPreferences) -> Result<()> {
        self.put(preferences)
    }
}

pub type SharedDatabase = Arc<Mutex<Database>>;

/// A store that opens on first use.
///
/// Concurrent first callers all wait on the same open; a failed open is not
/// cached, so the next call tries again.
pub struct LazyDatabase {
    path: Option<PathBuf>,
    cell: OnceCell<SharedDatabase>,
}

impl LazyDatabase {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cell: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cell: OnceCell::new(),
        }
    }

    /// Wrap an already-open store.
    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self {
            path: None,
            cell: OnceCell::new_with(Some(Arc::new(Mutex::new(db)))),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Result<SharedDatabase> {
        let db = self
            .cell
            .get_or_try_init(|| async {
                let db = match &self.path {
                    Some(path) => Database::open(path)?,
                    None => Database::open_in_memory()?,
                };
                tracing::info!("store opened");
                Ok::<_, Error>(Arc::new(Mutex::new(db)))
            })
            .await?;
        Ok(Arc::clone(db))
    }
}
