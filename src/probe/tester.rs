use crate::datasource::NamedDataSourceProvider;
use crate::dialects::{AccessType, ConnectionSpec, DialectError, DialectRegistry};
use crate::probe::{ConnectionTestReport, Connector, ProbeFailure};
use log::{debug, error, info, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs connection tests against configured connections.
///
/// Connectivity problems never surface as `Err`: they end up in the
/// returned report. Only configuration mistakes (unknown vendor,
/// unsupported access type) are errors.
pub struct ConnectionTester<'a> {
    registry: &'a DialectRegistry,
    connector: Arc<dyn Connector>,
    data_sources: Option<&'a dyn NamedDataSourceProvider>,
    timeout: Option<Duration>,
}

impl<'a> ConnectionTester<'a> {
    pub fn new(registry: &'a DialectRegistry, connector: Arc<dyn Connector>) -> Self {
        Self {
            registry,
            connector,
            data_sources: None,
            timeout: None,
        }
    }

    /// Provider used to resolve `jndi` connections
    pub fn with_data_sources(mut self, provider: &'a dyn NamedDataSourceProvider) -> Self {
        self.data_sources = Some(provider);
        self
    }

    /// Give up on the probe after `timeout`; the driver login timeout is set to match
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn test(&self, spec: &ConnectionSpec) -> Result<ConnectionTestReport, DialectError> {
        let dialect = self.registry.resolve(&spec.vendor)?;
        let display_name = if spec.name.is_empty() {
            spec.target()
        } else {
            spec.name.clone()
        };
        info!("Testing connection '{}' ({})", display_name, dialect.vendor_key);

        let started = Instant::now();
        let connection_string = match spec.access {
            AccessType::Jndi => {
                if !dialect.supports_access(AccessType::Jndi) {
                    return Err(DialectError::UnsupportedAccess {
                        vendor: dialect.vendor_key.clone(),
                        access: AccessType::Jndi,
                    });
                }
                match self.lookup_data_source(spec) {
                    Ok(connection_string) => connection_string,
                    Err(cause) => {
                        warn!("Data source lookup failed for '{}': {}", display_name, cause);
                        return Ok(ConnectionTestReport::failed(
                            &display_name,
                            &dialect.vendor_key,
                            cause,
                            started.elapsed(),
                        ));
                    }
                }
            }
            AccessType::Native | AccessType::Odbc => spec.connection_string(&dialect)?,
        };

        let statement = dialect.probe_statement.clone();
        let outcome = self.run_probe(connection_string, statement.clone());
        let elapsed = started.elapsed();

        let report = match outcome {
            Ok(()) => {
                info!("Connection '{}' is OK ({} ms)", display_name, elapsed.as_millis());
                ConnectionTestReport::passed(&display_name, &dialect.vendor_key, statement.as_deref(), elapsed)
            }
            Err(cause) => {
                error!("Connection '{}' failed: {}", display_name, cause);
                ConnectionTestReport::failed(&display_name, &dialect.vendor_key, cause, elapsed)
            }
        };
        Ok(report)
    }

    /// Human readable report, or the configuration error as text
    pub fn test_report_text(&self, spec: &ConnectionSpec) -> String {
        match self.test(spec) {
            Ok(report) => report.report_text(),
            Err(e) => format!("Connection test could not start: {}\n", e),
        }
    }

    fn lookup_data_source(&self, spec: &ConnectionSpec) -> Result<String, ProbeFailure> {
        let name = spec
            .datasource
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProbeFailure::Naming("no data source name configured".to_string()))?;
        let provider = self
            .data_sources
            .ok_or_else(|| ProbeFailure::Naming(format!("no provider to resolve '{}'", name)))?;

        let handle = provider
            .get_named_data_source_typed(name, spec.datasource_kind)
            .map_err(|e| ProbeFailure::Naming(e.to_string()))?;
        match handle.max_size {
            Some(max_size) => debug!("Resolved {} data source '{}' (pool of {})", handle.kind, handle.name, max_size),
            None => debug!("Resolved {} data source '{}'", handle.kind, handle.name),
        }
        Ok(handle.connection_string)
    }

    /// Probe on a worker thread so a hung driver cannot block the caller
    /// past the timeout
    fn run_probe(&self, connection_string: String, statement: Option<String>) -> Result<(), ProbeFailure> {
        let (sender, receiver) = mpsc::channel();
        let connector = Arc::clone(&self.connector);
        let login_timeout = self.timeout;

        thread::Builder::new()
            .name("connection-probe".to_string())
            .spawn(move || {
                let result = connector.probe(&connection_string, statement.as_deref(), login_timeout);
                // The receiver is gone when the caller already timed out
                let _ = sender.send(result);
            })
            .map_err(|e| ProbeFailure::Aborted(e.to_string()))?;

        let received = match self.timeout {
            Some(timeout) => receiver.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => ProbeFailure::TimedOut(timeout.as_millis() as u64),
                RecvTimeoutError::Disconnected => {
                    ProbeFailure::Aborted("probe thread ended without a result".to_string())
                }
            })?,
            None => receiver
                .recv()
                .map_err(|_| ProbeFailure::Aborted("probe thread ended without a result".to_string()))?,
        };

        received.map_err(ProbeFailure::from)
    }
}
