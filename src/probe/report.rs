use crate::executor::ConnectionError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;

/// Why a connection test failed
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeFailure {
    #[error("data source lookup failed: {0}")]
    Naming(String),

    #[error("could not connect: {0}")]
    Connection(String),

    #[error("probe statement failed: {0}")]
    Statement(String),

    #[error("no answer within {0} ms")]
    TimedOut(u64),

    #[error("driver aborted the probe: {0}")]
    Aborted(String),
}

impl From<ConnectionError> for ProbeFailure {
    fn from(error: ConnectionError) -> Self {
        match error {
            ConnectionError::QueryFailed(detail) => ProbeFailure::Statement(detail),
            other => ProbeFailure::Connection(other.to_string()),
        }
    }
}

/// Outcome of one connection test.
///
/// `failure_cause` is present exactly when `success` is false.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTestReport {
    connection: String,
    vendor: String,
    success: bool,
    message: String,
    elapsed_ms: u64,
    tested_at: DateTime<Utc>,
    failure_cause: Option<ProbeFailure>,
}

impl ConnectionTestReport {
    pub fn passed(connection: &str, vendor: &str, probe: Option<&str>, elapsed: Duration) -> Self {
        let mut message = format!("Connection to database [{}] is OK.", connection);
        match probe {
            Some(statement) => {
                let _ = write!(message, " Probe statement '{}' succeeded", statement);
            }
            None => message.push_str(" Connection opened (no probe statement for this vendor)"),
        }
        let _ = write!(message, " in {} ms.", elapsed.as_millis());

        Self {
            connection: connection.to_string(),
            vendor: vendor.to_string(),
            success: true,
            message,
            failure_cause: None,
            elapsed_ms: elapsed.as_millis() as u64,
            tested_at: Utc::now(),
        }
    }

    pub fn failed(connection: &str, vendor: &str, cause: ProbeFailure, elapsed: Duration) -> Self {
        let message = format!(
            "Error connecting to database [{}] after {} ms: {}",
            connection,
            elapsed.as_millis(),
            cause
        );
        Self {
            connection: connection.to_string(),
            vendor: vendor.to_string(),
            success: false,
            message,
            failure_cause: Some(cause),
            elapsed_ms: elapsed.as_millis() as u64,
            tested_at: Utc::now(),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn failure_cause(&self) -> Option<&ProbeFailure> {
        self.failure_cause.as_ref()
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn tested_at(&self) -> DateTime<Utc> {
        self.tested_at
    }

    /// Multi-line report for terminals and log files
    pub fn report_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "{}", self.message);
        let _ = writeln!(text);
        let _ = writeln!(text, "Connection : {}", self.connection);
        let _ = writeln!(text, "Vendor     : {}", self.vendor);
        let _ = writeln!(text, "Tested at  : {}", self.tested_at.to_rfc3339());
        let _ = writeln!(text, "Elapsed    : {} ms", self.elapsed_ms);
        let status = if self.success { "OK" } else { "FAILED" };
        let _ = writeln!(text, "Status     : {}", status);
        if let Some(cause) = &self.failure_cause {
            let _ = writeln!(text, "Cause      : {}", cause);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_report_has_no_cause() {
        let report = ConnectionTestReport::passed("warehouse", "postgresql", Some("SELECT 1"), Duration::from_millis(12));
        assert!(report.success());
        assert!(report.failure_cause().is_none());
        assert!(report.message().contains("SELECT 1"));
        assert!(report.report_text().contains("Status     : OK"));
    }

    #[test]
    fn test_failed_report_carries_cause() {
        let cause = ProbeFailure::Connection("host unreachable".to_string());
        let report = ConnectionTestReport::failed("warehouse", "mysql", cause.clone(), Duration::ZERO);
        assert!(!report.success());
        assert_eq!(report.failure_cause(), Some(&cause));
        assert!(report.message().contains("host unreachable"));
        assert!(report.report_text().contains("Cause"));
    }

    #[test]
    fn test_query_errors_map_to_statement_failures() {
        let failure: ProbeFailure = ConnectionError::QueryFailed("syntax".to_string()).into();
        assert_eq!(failure, ProbeFailure::Statement("syntax".to_string()));
        let failure: ProbeFailure = ConnectionError::ConnectionFailed("refused".to_string()).into();
        assert!(matches!(failure, ProbeFailure::Connection(msg) if msg.contains("refused")));
    }

    #[test]
    fn test_report_serializes_to_toml() {
        let report = ConnectionTestReport::failed("x", "oracle", ProbeFailure::TimedOut(500), Duration::from_millis(500));
        let text = toml::to_string(&report).unwrap();
        assert!(text.contains("success = false"));
        assert!(text.contains("timed_out"));
    }
}
