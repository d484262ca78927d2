//! SQLite-backed alert store
//!
//! The pool holds a single connection, so every read and write is serialized
//! through it. Concurrent callers (the scheduler and the operator API) queue
//! on acquire instead of racing on the database file.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::model::{
    Alert, AlertCounts, AlertFilter, AlertStatus, AlertTrend, Severity, ValidationError,
};

/// How long a caller waits for the store connection before giving up
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_ALERT: &str =
    "SELECT id, message, severity, status, created_at, updated_at FROM alerts";

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message TEXT NOT NULL,
        severity TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_severity ON alerts(severity)",
    "CREATE INDEX IF NOT EXISTS idx_status ON alerts(status)",
    "CREATE INDEX IF NOT EXISTS idx_created_at ON alerts(created_at)",
];

/// Durable alert store
#[derive(Debug, Clone)]
pub struct AlertStore {
    pool: SqlitePool,
}

impl AlertStore {
    /// Open (or create) the database file at `path` and apply the schema
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Storage(e.into()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        tracing::info!(path = %path.display(), "Opening alert store");
        Self::connect(options).await
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        // The connection is never recycled: an in-memory database lives
        // exactly as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Validate `severity` and insert a new alert
    ///
    /// Accepts a [`Severity`] or its text form. Nothing is written when the
    /// severity is rejected.
    pub async fn create<S>(&self, message: &str, severity: S) -> Result<Alert, StoreError>
    where
        S: TryInto<Severity>,
        ValidationError: From<S::Error>,
    {
        let severity = severity.try_into().map_err(ValidationError::from)?;
        self.insert(message, severity).await
    }

    /// Insert a new alert. The row is committed before this returns.
    pub async fn insert(&self, message: &str, severity: Severity) -> Result<Alert, StoreError> {
        let now = now();
        let ts = format_timestamp(&now);

        let result = sqlx::query(
            "INSERT INTO alerts (message, severity, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(message)
        .bind(severity.as_str())
        .bind(AlertStatus::New.as_str())
        .bind(&ts)
        .bind(&ts)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(alert_id = id, severity = %severity, "Alert stored");

        Ok(Alert {
            id,
            message: message.to_string(),
            severity,
            status: AlertStatus::New,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a single alert
    pub async fn get(&self, id: i64) -> Result<Alert, StoreError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ALERT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => alert_from_row(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// Query alerts, newest first
    pub async fn query(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_ALERT);
        qb.push(" WHERE 1=1");

        if let Some(severity) = filter.severity {
            qb.push(" AND severity = ").push_bind(severity.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(start) = filter.start {
            qb.push(" AND created_at >= ").push_bind(format_timestamp(&ceil_micros(start)));
        }
        if let Some(end) = filter.end {
            qb.push(" AND created_at <= ").push_bind(format_timestamp(&end.trunc_subsecs(6)));
        }

        qb.push(" ORDER BY created_at DESC, id DESC");

        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(alert_from_row).collect()
    }

    /// Move an alert from `new` to `read` or `ignored`
    ///
    /// Re-applying a transition is rejected with `InvalidTransition` and leaves
    /// the record untouched.
    pub async fn update_status<S>(&self, id: i64, status: S) -> Result<Alert, StoreError>
    where
        S: TryInto<AlertStatus>,
        ValidationError: From<S::Error>,
    {
        let status = status.try_into().map_err(ValidationError::from)?;
        if !status.is_update_target() {
            return Err(ValidationError::Status(status.to_string()).into());
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ALERT))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let mut alert = match row {
            Some(row) => alert_from_row(&row)?,
            None => return Err(StoreError::NotFound(id)),
        };

        if alert.status != AlertStatus::New {
            return Err(StoreError::InvalidTransition {
                id,
                from: alert.status,
                to: status,
            });
        }

        // updated_at must move forward even if the clock hasn't
        let mut updated_at = now();
        if updated_at <= alert.updated_at {
            updated_at = alert.updated_at + chrono::Duration::microseconds(1);
        }

        sqlx::query("UPDATE alerts SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(status.as_str())
            .bind(format_timestamp(&updated_at))
            .bind(id)
            .bind(AlertStatus::New.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(alert_id = id, status = %status, "Alert status updated");

        alert.status = status;
        alert.updated_at = updated_at;
        Ok(alert)
    }

    /// Totals by status and severity
    pub async fn counts(&self) -> Result<AlertCounts, StoreError> {
        let rows = sqlx::query(
            "SELECT severity, status, COUNT(*) AS n FROM alerts GROUP BY severity, status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = AlertCounts::default();
        for row in &rows {
            let severity: String = row.try_get("severity")?;
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = u64::try_from(n).unwrap_or(0);

            counts.add_severity(parse_column(&severity)?, n);
            counts.add_status(parse_column(&status)?, n);
        }

        Ok(counts)
    }

    /// Per-day alert counts by severity for the last `days` days, oldest first
    ///
    /// Days are UTC calendar days ending today; days without alerts are
    /// included with zero counts.
    pub async fn trend(&self, days: u32) -> Result<Vec<AlertTrend>, StoreError> {
        let last = Utc::now().date_naive();
        let first = last - chrono::Duration::days(i64::from(days.max(1)) - 1);
        self.trend_between(first, last).await
    }

    async fn trend_between(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<AlertTrend>, StoreError> {
        let rows = sqlx::query(
            "SELECT substr(created_at, 1, 10) AS day, severity, COUNT(*) AS n FROM alerts \
             WHERE created_at >= ? AND created_at < ? GROUP BY day, severity",
        )
        .bind(first.format("%Y-%m-%d").to_string())
        .bind((last + chrono::Duration::days(1)).format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut trend: Vec<AlertTrend> = first
            .iter_days()
            .take_while(|day| *day <= last)
            .map(AlertTrend::empty)
            .collect();

        for row in &rows {
            let day: String = row.try_get("day")?;
            let severity: String = row.try_get("severity")?;
            let n: i64 = row.try_get("n")?;

            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| StoreError::Corrupted(format!("bad date {:?}: {}", day, e)))?;
            let offset = (date - first).num_days();
            if let Some(entry) = usize::try_from(offset).ok().and_then(|i| trend.get_mut(i)) {
                entry.add(parse_column(&severity)?, u64::try_from(n).unwrap_or(0));
            }
        }

        Ok(trend)
    }

    /// Close the underlying connection
    pub async fn close(&self) {
        tracing::info!("Closing alert store");
        self.pool.close().await;
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Round up to the next whole microsecond
fn ceil_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = t.trunc_subsecs(6);
    if truncated < t {
        truncated + chrono::Duration::microseconds(1)
    } else {
        truncated
    }
}

/// Fixed-width UTC timestamp; lexical order matches chronological order
fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupted(format!("bad timestamp {:?}: {}", s, e)))
}

fn parse_column<T>(value: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = ValidationError>,
{
    value
        .parse()
        .map_err(|e: ValidationError| StoreError::Corrupted(e.to_string()))
}

fn alert_from_row(row: &SqliteRow) -> Result<Alert, StoreError> {
    let severity: String = row.try_get("severity")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Alert {
        id: row.try_get("id")?,
        message: row.try_get("message")?,
        severity: parse_column(&severity)?,
        status: parse_column(&status)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Alert store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Alert with ID {0} not found")]
    NotFound(i64),

    #[error("Alert {id} is already {from}, cannot move to {to}")]
    InvalidTransition {
        id: i64,
        from: AlertStatus,
        to: AlertStatus,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Corrupted alert record: {0}")]
    Corrupted(String),
}
