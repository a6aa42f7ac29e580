//! Daily price/indicator bar as delivered by the data provider.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One ticker's market state on one date. The moving averages are computed
/// upstream by the data provider and are absent when there is insufficient
/// trailing history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
}
