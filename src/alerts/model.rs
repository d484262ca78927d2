//! Alert record types

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity, ordered `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Whether alerts of this severity are sent to notification channels
    pub fn notifies(&self) -> bool {
        matches!(self, Severity::Medium | Severity::High)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(ValidationError::Severity(s.to_string())),
        }
    }
}

impl TryFrom<&str> for Severity {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for Severity {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Lifecycle status of an alert
///
/// Alerts start as `New` and move once to either `Read` or `Ignored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Read,
    Ignored,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Read => "read",
            AlertStatus::Ignored => "ignored",
        }
    }

    /// Statuses an alert may be moved into by an explicit update
    pub fn is_update_target(&self) -> bool {
        matches!(self, AlertStatus::Read | AlertStatus::Ignored)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(AlertStatus::New),
            "read" => Ok(AlertStatus::Read),
            "ignored" => Ok(AlertStatus::Ignored),
            _ => Err(ValidationError::Status(s.to_string())),
        }
    }
}

impl TryFrom<&str> for AlertStatus {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for AlertStatus {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A persisted alert event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Store-assigned identifier, increasing with each insert
    pub id: i64,
    pub message: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every status transition
    pub updated_at: DateTime<Utc>,
}

/// Filter for alert queries. Unset fields match everything; time bounds are
/// inclusive and apply to `created_at`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_status(mut self, status: AlertStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Alert totals grouped by status and severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub total: u64,
    pub new: u64,
    pub read: u64,
    pub ignored: u64,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl AlertCounts {
    pub(crate) fn add_status(&mut self, status: AlertStatus, n: u64) {
        match status {
            AlertStatus::New => self.new += n,
            AlertStatus::Read => self.read += n,
            AlertStatus::Ignored => self.ignored += n,
        }
    }

    pub(crate) fn add_severity(&mut self, severity: Severity, n: u64) {
        self.total += n;
        match severity {
            Severity::Low => self.low += n,
            Severity::Medium => self.medium += n,
            Severity::High => self.high += n,
        }
    }
}

/// Alerts raised on one UTC calendar day, by severity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTrend {
    pub date: NaiveDate,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl AlertTrend {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            low: 0,
            medium: 0,
            high: 0,
        }
    }

    pub(crate) fn add(&mut self, severity: Severity, n: u64) {
        match severity {
            Severity::Low => self.low += n,
            Severity::Medium => self.medium += n,
            Severity::High => self.high += n,
        }
    }
}

/// Rejected caller input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid severity level: {0}")]
    Severity(String),

    #[error("invalid status: {0}")]
    Status(String),
}

// Lets typed values flow through the same `TryInto` bounds as raw strings.
impl From<Infallible> for ValidationError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse() {
        assert_eq!("low".parse::<Severity>().unwrap(), Severity::Low);
        assert_eq!("Medium".parse::<Severity>().unwrap(), Severity::Medium);
        assert_eq!(" HIGH ".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(
            "critical".parse::<Severity>(),
            Err(ValidationError::Severity("critical".to_string()))
        );
    }

    #[test]
    fn test_severity_ordering_and_policy() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(!Severity::Low.notifies());
        assert!(Severity::Medium.notifies());
        assert!(Severity::High.notifies());
    }

    #[test]
    fn test_status_parse_and_targets() {
        assert_eq!("read".parse::<AlertStatus>().unwrap(), AlertStatus::Read);
        assert!("resolved".parse::<AlertStatus>().is_err());
        assert!(!AlertStatus::New.is_update_target());
        assert!(AlertStatus::Read.is_update_target());
        assert!(AlertStatus::Ignored.is_update_target());
    }

    #[test]
    fn test_trend_serializes_plain_date() {
        let mut day = AlertTrend::empty(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        day.add(Severity::High, 2);
        day.add(Severity::Low, 1);

        let json = serde_json::to_value(&day).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"date": "2024-03-01", "low": 1, "medium": 0, "high": 2})
        );
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        let status: AlertStatus = serde_json::from_str("\"ignored\"").unwrap();
        assert_eq!(status, AlertStatus::Ignored);
    }
}
