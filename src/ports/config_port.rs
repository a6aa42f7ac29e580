//! Configuration access port.

use chrono::NaiveDate;

use crate::domain::error::EngineError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Backtest window boundaries are the only date-typed config values.
    /// `Ok(None)` when the key is absent; an error only when the value is
    /// present but not a `YYYY-MM-DD` date.
    fn get_date(&self, section: &str, key: &str) -> Result<Option<NaiveDate>, EngineError>;
}
