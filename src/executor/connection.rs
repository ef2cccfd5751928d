use crate::catalog::{MetadataSource, TableRow};
use crate::probe::Connector;
use crate::spatial::QuerySource;
use log::{debug, error, info};
use odbc_api::{
    buffers::TextRowSet, Connection, ConnectionOptions, Cursor, Environment, Error as OdbcError,
};
use std::time::Duration;

const FETCH_BATCH: usize = 100;
const MAX_TEXT_LEN: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("ODBC error: {0}")]
    Odbc(#[from] OdbcError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),
}

/// Hands out connections from the process-wide ODBC environment
pub struct ConnectionManager {
    environment: &'static Environment,
}

impl ConnectionManager {
    pub fn new() -> Result<Self, ConnectionError> {
        let environment = odbc_api::environment()?;
        Ok(Self { environment })
    }

    pub fn connect(&self, connection_string: &str) -> Result<Connection<'static>, ConnectionError> {
        self.connect_with_timeout(connection_string, None)
    }

    pub fn connect_with_timeout(
        &self,
        connection_string: &str,
        login_timeout: Option<Duration>,
    ) -> Result<Connection<'static>, ConnectionError> {
        debug!(
            "Connecting to database with connection string length: {}",
            connection_string.len()
        );

        let options = ConnectionOptions {
            login_timeout_sec: login_timeout.map(|t| t.as_secs().max(1) as u32),
            ..ConnectionOptions::default()
        };
        let connection = self
            .environment
            .connect_with_connection_string(connection_string, options)
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                ConnectionError::ConnectionFailed(e.to_string())
            })?;

        info!("Successfully connected to database");
        Ok(connection)
    }
}

impl Connector for ConnectionManager {
    fn probe(
        &self,
        connection_string: &str,
        statement: Option<&str>,
        login_timeout: Option<Duration>,
    ) -> Result<(), ConnectionError> {
        let connection = self.connect_with_timeout(connection_string, login_timeout)?;
        match statement {
            Some(statement) => {
                let mut executor = DatabaseExecutor::new(connection);
                executor.fetch_first_row(statement)?;
            }
            None => debug!("Dialect declares no probe statement; connection open is the probe"),
        }
        Ok(())
    }
}

pub struct DatabaseExecutor<'a> {
    connection: Connection<'a>,
}

impl<'a> DatabaseExecutor<'a> {
    pub fn new(connection: Connection<'a>) -> Self {
        Self { connection }
    }

    /// Run a statement and fetch at most one row of its result
    pub fn fetch_first_row(&mut self, statement: &str) -> Result<(), ConnectionError> {
        debug!("Executing probe statement: {}", statement);
        let mut prepared = self
            .connection
            .prepare(statement)
            .map_err(|e| ConnectionError::QueryFailed(e.to_string()))?;

        match prepared
            .execute(())
            .map_err(|e| ConnectionError::QueryFailed(e.to_string()))?
        {
            Some(mut cursor) => {
                let mut buffer = TextRowSet::for_cursor(1, &mut cursor, Some(MAX_TEXT_LEN))?;
                let mut row_set_cursor = cursor.bind_buffer(&mut buffer)?;
                let _row_set = row_set_cursor.fetch()?;
            }
            None => debug!("Probe statement returned no result set"),
        }
        Ok(())
    }

    pub fn query_single_value(&mut self, query: &str) -> Result<Option<String>, ConnectionError> {
        debug!("Querying single value: {}", query);

        let mut prepared = self
            .connection
            .prepare(query)
            .map_err(|e| ConnectionError::QueryFailed(e.to_string()))?;

        let mut cursor = prepared
            .execute(())
            .map_err(|e| ConnectionError::QueryFailed(e.to_string()))?
            .ok_or_else(|| ConnectionError::QueryFailed("Query returned no cursor".to_string()))?;

        let mut buffer = TextRowSet::for_cursor(1, &mut cursor, Some(MAX_TEXT_LEN))?;
        let mut row_set_cursor = cursor.bind_buffer(&mut buffer)?;

        if let Some(row_set) = row_set_cursor.fetch()? {
            if row_set.num_rows() > 0 {
                if let Some(value) = row_set.at(0, 0) {
                    let result = String::from_utf8_lossy(value).to_string();
                    debug!("Query returned single value: {}", result);
                    return Ok(Some(result));
                }
            }
        }

        debug!("Query returned no value");
        Ok(None)
    }

    /// All tables visible to the connection, in driver order
    pub fn table_rows(&mut self) -> Result<Vec<TableRow>, ConnectionError> {
        debug!("Reading table metadata");
        let mut cursor = self.connection.tables("", "", "", "")?;

        let mut buffer = TextRowSet::for_cursor(FETCH_BATCH, &mut cursor, Some(MAX_TEXT_LEN))?;
        let mut row_set_cursor = cursor.bind_buffer(&mut buffer)?;
        let mut rows = Vec::new();

        while let Some(row_set) = row_set_cursor.fetch()? {
            for row_index in 0..row_set.num_rows() {
                let text = |col: usize| {
                    row_set
                        .at(col, row_index)
                        .map(|v| String::from_utf8_lossy(v).to_string())
                        .filter(|v| !v.is_empty())
                };
                let Some(table) = text(2) else { continue };
                rows.push(TableRow {
                    catalog: text(0),
                    schema: text(1),
                    table,
                });
            }
        }

        debug!("Metadata returned {} tables", rows.len());
        Ok(rows)
    }
}

impl QuerySource for DatabaseExecutor<'static> {
    fn query_single_value(&mut self, query: &str) -> Result<Option<String>, ConnectionError> {
        DatabaseExecutor::query_single_value(self, query)
    }
}

impl MetadataSource for DatabaseExecutor<'_> {
    fn table_rows(&mut self) -> Result<Vec<TableRow>, ConnectionError> {
        DatabaseExecutor::table_rows(self)
    }
}
