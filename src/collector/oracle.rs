//! Oracle backend built on the `oracle` crate (ODPI-C).

use std::time::Duration;

use oracle::Connection;

use crate::collector::row::Row;
use crate::collector::{CollectorError, Connector, Session};
use crate::config::TargetConfig;

/// ODPI-C error code reported when `set_call_timeout` expires.
const CALL_TIMEOUT_CODE: &str = "DPI-1067";

/// Easy Connect Plus parameter bounding session establishment, in seconds.
const CONNECT_TIMEOUT_PARAM: &str = "connect_timeout";

/// Connect string handed to the driver.
///
/// Easy Connect strings (`host[:port]/service`) get `connect_timeout` set to
/// the target timeout unless they already carry one. TNS aliases and full
/// descriptors are passed through unchanged; their connect phase is bounded
/// only by the client's `sqlnet.ora` settings.
fn connect_descriptor(connection: &str, timeout: Duration) -> String {
    let easy_connect = connection.contains('/') && !connection.contains('(');
    let has_param = connection.split_once('?').is_some_and(|(_, params)| {
        params.split('&').any(|param| {
            param
                .split('=')
                .next()
                .is_some_and(|key| key.trim().eq_ignore_ascii_case(CONNECT_TIMEOUT_PARAM))
        })
    });
    if !easy_connect || has_param {
        return connection.to_string();
    }

    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    let separator = if connection.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}={}",
        connection,
        separator,
        CONNECT_TIMEOUT_PARAM,
        secs.max(1)
    )
}

/// Opens one dedicated Oracle session per scrape.
#[derive(Debug, Default, Clone, Copy)]
pub struct OracleConnector;

impl OracleConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for OracleConnector {
    fn connect(&self, target: &TargetConfig) -> Result<Box<dyn Session>, CollectorError> {
        let credentials = &target.credentials;
        let descriptor = connect_descriptor(&target.connection, target.timeout);
        let conn = Connection::connect(&credentials.user, &credentials.password, &descriptor)
            .map_err(|e| CollectorError::Connection(e.to_string()))?;

        if let Err(e) = conn.set_call_timeout(Some(target.timeout)) {
            let _ = conn.close();
            return Err(CollectorError::Connection(e.to_string()));
        }

        Ok(Box::new(OracleSession {
            conn,
            timeout: target.timeout,
        }))
    }
}

struct OracleSession {
    conn: Connection,
    timeout: Duration,
}

impl OracleSession {
    fn classify(&self, err: oracle::Error) -> CollectorError {
        let message = err.to_string();
        if message.contains(CALL_TIMEOUT_CODE) {
            tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Oracle call timed out");
            CollectorError::Timeout
        } else {
            CollectorError::Query(message)
        }
    }
}

impl Session for OracleSession {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, CollectorError> {
        let result_set = self.conn.query(sql, &[]).map_err(|e| self.classify(e))?;

        let mut rows = Vec::new();
        for fetched in result_set {
            let fetched = fetched.map_err(|e| self.classify(e))?;
            let cells = fetched
                .sql_values()
                .iter()
                .enumerate()
                .map(|(column, value)| {
                    value
                        .get::<Option<String>>()
                        .map_err(|e| CollectorError::decode(column, e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(Row::new(cells));
        }
        Ok(rows)
    }

    fn close(self: Box<Self>) -> Result<(), CollectorError> {
        self.conn
            .close()
            .map_err(|e| CollectorError::Connection(e.to_string()))
    }
}
