//! Blocking MySQL wire driver.
//!
//! A thin adapter from the [`Driver`](super::Driver) seam onto the `mysql`
//! crate. Beyond plumbing, its one real job is value conversion at the
//! boundary: temporal values are formatted to text on read so nothing
//! downstream handles backend-specific date types, mirroring how the harness
//! has always consumed them.

use super::{Driver, DriverConnection, ExecResult, ResultSet};
use crate::config::DbConfig;
use crate::value::SqlValue;
use crate::{Error, Result};
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Params, Value};
use secrecy::ExposeSecret;

/// Driver over the blocking MySQL protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDriver;

impl Driver for MysqlDriver {
    type Conn = MysqlConnection;

    fn connect(&self, config: &DbConfig) -> Result<MysqlConnection> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.expose_secret().to_string()))
            .db_name(Some(config.database.clone()));
        let conn = Conn::new(opts).map_err(|e| Error::Connection(e.to_string()))?;
        Ok(MysqlConnection { conn })
    }
}

/// One live MySQL connection. Released on drop.
#[derive(Debug)]
pub struct MysqlConnection {
    conn: Conn,
}

impl MysqlConnection {
    fn query_error(sql: &str, cause: &impl std::fmt::Display) -> Error {
        Error::Query {
            statement: sql.to_string(),
            cause: cause.to_string(),
        }
    }
}

impl DriverConnection for MysqlConnection {
    fn ping(&mut self) -> bool {
        self.conn.ping().is_ok()
    }

    fn query(&mut self, sql: &str, args: &[SqlValue]) -> Result<ResultSet> {
        if args.is_empty() {
            let result = self
                .conn
                .query_iter(sql)
                .map_err(|e| Self::query_error(sql, &e))?;
            collect(sql, result)
        } else {
            let result = self
                .conn
                .exec_iter(sql, to_params(args))
                .map_err(|e| Self::query_error(sql, &e))?;
            collect(sql, result)
        }
    }

    fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult> {
        // Text and binary protocol results are distinct types; the branches
        // cannot share a binding.
        if args.is_empty() {
            let result = self
                .conn
                .query_iter(sql)
                .map_err(|e| Self::query_error(sql, &e))?;
            Ok(ExecResult {
                affected_rows: result.affected_rows(),
                last_insert_id: result.last_insert_id(),
            })
        } else {
            let result = self
                .conn
                .exec_iter(sql, to_params(args))
                .map_err(|e| Self::query_error(sql, &e))?;
            Ok(ExecResult {
                affected_rows: result.affected_rows(),
                last_insert_id: result.last_insert_id(),
            })
        }
    }

    fn execute_batch(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<ExecResult> {
        let statement = self
            .conn
            .prep(sql)
            .map_err(|e| Self::query_error(sql, &e))?;
        let mut outcome = ExecResult::default();
        for row in rows {
            let result = self
                .conn
                .exec_iter(&statement, to_params(row))
                .map_err(|e| Self::query_error(sql, &e))?;
            outcome.affected_rows += result.affected_rows();
            if let Some(id) = result.last_insert_id() {
                outcome.last_insert_id = Some(id);
            }
        }
        Ok(outcome)
    }
}

fn collect<P>(sql: &str, result: mysql::QueryResult<'_, '_, '_, P>) -> Result<ResultSet>
where
    P: mysql::prelude::Protocol,
{
    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    for row in result {
        let row = row.map_err(|e| MysqlConnection::query_error(sql, &e))?;
        if columns.is_empty() {
            columns = row
                .columns_ref()
                .iter()
                .map(|column| column.name_str().to_string())
                .collect();
        }
        rows.push(row.unwrap().into_iter().map(from_wire).collect());
    }
    Ok(ResultSet { columns, rows })
}

fn to_params(args: &[SqlValue]) -> Params {
    if args.is_empty() {
        Params::Empty
    } else {
        Params::Positional(args.iter().map(to_wire).collect())
    }
}

fn to_wire(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Int(i) => Value::Int(*i),
        SqlValue::UInt(u) => Value::UInt(*u),
        SqlValue::Double(f) => Value::Double(*f),
        SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
    }
}

fn from_wire(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(raw) => SqlValue::Bytes(raw.into_bytes()),
        },
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => SqlValue::UInt(u),
        Value::Float(f) => SqlValue::Double(f64::from(f)),
        Value::Double(d) => SqlValue::Double(d),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            SqlValue::Text(format_date(year, month, day, hour, minute, second, micros))
        },
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            SqlValue::Text(format_time(negative, days, hours, minutes, seconds, micros))
        },
    }
}

fn format_date(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    micros: u32,
) -> String {
    let mut out = format!("{year:04}-{month:02}-{day:02}");
    if hour != 0 || minute != 0 || second != 0 || micros != 0 {
        out.push_str(&format!(" {hour:02}:{minute:02}:{second:02}"));
        if micros != 0 {
            out.push_str(&format!(".{micros:06}"));
        }
    }
    out
}

fn format_time(
    negative: bool,
    days: u32,
    hours: u8,
    minutes: u8,
    seconds: u8,
    micros: u32,
) -> String {
    let total_hours = u64::from(days) * 24 + u64::from(hours);
    let sign = if negative { "-" } else { "" };
    let mut out = format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}");
    if micros != 0 {
        out.push_str(&format!(".{micros:06}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip_for_scalars() {
        let values = [
            SqlValue::Null,
            SqlValue::Int(-5),
            SqlValue::UInt(5),
            SqlValue::Double(2.5),
            SqlValue::Text("abc".into()),
        ];
        for value in values {
            assert_eq!(from_wire(to_wire(&value)), value);
        }
    }

    #[test]
    fn test_non_utf8_bytes_stay_bytes() {
        let value = from_wire(Value::Bytes(vec![0xFF, 0xFE]));
        assert_eq!(value, SqlValue::Bytes(vec![0xFF, 0xFE]));
    }

    #[test]
    fn test_date_formatting_matches_harness_expectations() {
        assert_eq!(format_date(2026, 8, 7, 0, 0, 0, 0), "2026-08-07");
        assert_eq!(
            format_date(2026, 8, 7, 12, 30, 5, 0),
            "2026-08-07 12:30:05"
        );
        assert_eq!(
            format_date(2026, 8, 7, 12, 30, 5, 250_000),
            "2026-08-07 12:30:05.250000"
        );
    }

    #[test]
    fn test_time_formatting_folds_days_into_hours() {
        assert_eq!(format_time(false, 0, 9, 5, 0, 0), "09:05:00");
        assert_eq!(format_time(true, 1, 2, 0, 0, 0), "-26:00:00");
    }
}
