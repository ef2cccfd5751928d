use crate::dialects::Dialect;
use crate::executor::ConnectionError;
use crate::spatial::SpatialError;
use log::debug;
use std::sync::{Mutex, PoisonError};

/// Live SRID resolution against the target database
pub trait SridLookup: Send + Sync {
    fn vendor_srid(&self, neutral: i32) -> Result<i32, SpatialError>;
    fn neutral_srid(&self, vendor: i32) -> Result<i32, SpatialError>;
}

/// Anything that can answer a single-value query
pub trait QuerySource: Send {
    fn query_single_value(&mut self, query: &str) -> Result<Option<String>, ConnectionError>;
}

/// SRID lookup running the dialect's reference-table queries
pub struct SqlSridLookup {
    source: Mutex<Box<dyn QuerySource>>,
    to_vendor_sql: String,
    to_neutral_sql: String,
}

impl SqlSridLookup {
    pub fn new(source: Box<dyn QuerySource>, to_vendor_sql: String, to_neutral_sql: String) -> Self {
        Self {
            source: Mutex::new(source),
            to_vendor_sql,
            to_neutral_sql,
        }
    }

    pub fn for_dialect(dialect: &Dialect, source: Box<dyn QuerySource>) -> Result<Self, SpatialError> {
        let spatial = &dialect.spatial;
        match (&spatial.srid_to_vendor_sql, &spatial.srid_to_neutral_sql) {
            (Some(to_vendor), Some(to_neutral)) => {
                Ok(Self::new(source, to_vendor.clone(), to_neutral.clone()))
            }
            _ => Err(SpatialError::LookupUnavailable(dialect.vendor_key.clone())),
        }
    }

    fn run(&self, template: &str, srid: i32) -> Result<i32, SpatialError> {
        let query = template.replace("{srid}", &srid.to_string());
        let value = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .query_single_value(&query)?;
        debug!("SRID lookup for {} returned {:?}", srid, value);

        let value = value.ok_or(SpatialError::SridNotFound(srid))?;
        value
            .trim()
            .parse::<i32>()
            .map_err(|_| SpatialError::InvalidSrid(value.clone()))
    }
}

impl SridLookup for SqlSridLookup {
    fn vendor_srid(&self, neutral: i32) -> Result<i32, SpatialError> {
        self.run(&self.to_vendor_sql, neutral)
    }

    fn neutral_srid(&self, vendor: i32) -> Result<i32, SpatialError> {
        self.run(&self.to_neutral_sql, vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialects::DialectRegistry;
    use std::sync::{Arc, Mutex};

    /// Answers from a fixed list and records every query
    struct Scripted {
        answers: Vec<Option<String>>,
        queries: Arc<Mutex<Vec<String>>>,
    }

    impl QuerySource for Scripted {
        fn query_single_value(&mut self, query: &str) -> Result<Option<String>, ConnectionError> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.answers.remove(0))
        }
    }

    fn lookup(answers: Vec<Option<&str>>) -> (SqlSridLookup, Arc<Mutex<Vec<String>>>) {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let source = Scripted {
            answers: answers.into_iter().map(|a| a.map(str::to_string)).collect(),
            queries: Arc::clone(&queries),
        };
        let dialect = DialectRegistry::with_builtins().unwrap().resolve("oracle").unwrap();
        (SqlSridLookup::for_dialect(&dialect, Box::new(source)).unwrap(), queries)
    }

    #[test]
    fn test_lookup_substitutes_srid() {
        let (lookup, queries) = lookup(vec![Some(" 8307 ")]);
        assert_eq!(lookup.vendor_srid(4326).unwrap(), 8307);
        assert!(queries.lock().unwrap()[0].ends_with("AUTH_SRID = 4326"));
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let (lookup, _) = lookup(vec![None]);
        assert!(matches!(lookup.neutral_srid(99), Err(SpatialError::SridNotFound(99))));
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let (lookup, _) = lookup(vec![Some("WGS84")]);
        assert!(matches!(lookup.vendor_srid(4326), Err(SpatialError::InvalidSrid(_))));
    }

    #[test]
    fn test_dialect_without_queries() {
        let dialect = DialectRegistry::with_builtins().unwrap().resolve("mssql").unwrap();
        let source = Scripted {
            answers: vec![],
            queries: Arc::new(Mutex::new(Vec::new())),
        };
        let result = SqlSridLookup::for_dialect(&dialect, Box::new(source));
        assert!(matches!(result, Err(SpatialError::LookupUnavailable(_))));
    }
}
