//! Connection test protocol

pub mod report;
pub mod tester;

pub use report::{ConnectionTestReport, ProbeFailure};
pub use tester::ConnectionTester;

use crate::executor::ConnectionError;
use std::time::Duration;

/// Seam between the tester and the database driver
pub trait Connector: Send + Sync + 'static {
    /// Open a connection and run `statement` when given; open only otherwise
    fn probe(
        &self,
        connection_string: &str,
        statement: Option<&str>,
        login_timeout: Option<Duration>,
    ) -> Result<(), ConnectionError>;
}

/// Stands in for the driver when the ODBC environment could not be created,
/// so every probe reports the same connection failure
#[derive(Debug, Clone)]
pub struct UnavailableConnector {
    reason: String,
}

impl UnavailableConnector {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Connector for UnavailableConnector {
    fn probe(
        &self,
        _connection_string: &str,
        _statement: Option<&str>,
        _login_timeout: Option<Duration>,
    ) -> Result<(), ConnectionError> {
        Err(ConnectionError::ConnectionFailed(format!(
            "ODBC environment unavailable: {}",
            self.reason
        )))
    }
}
