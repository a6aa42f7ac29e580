//! Stateless signal predicates.
//!
//! Each signal is a pure function of one day's bar plus the prior day's bar
//! (crossovers), of the day's benchmark bar (regime filter), or of the
//! calendar date alone (Q2 filter). A missing bar or missing average never
//! errors; it simply means the signal cannot fire.

use chrono::{Datelike, NaiveDate};

use super::bar::Bar;

/// 50-average crosses above the 200-average: strictly above today, at or
/// below yesterday. Requires all four averages to be present.
pub fn golden_cross(today: &Bar, yesterday: &Bar) -> bool {
    match (today.sma50, today.sma200, yesterday.sma50, yesterday.sma200) {
        (Some(t50), Some(t200), Some(y50), Some(y200)) => t50 > t200 && y50 <= y200,
        _ => false,
    }
}

/// Symmetric inverse of [`golden_cross`]: strictly below today, at or above
/// yesterday.
pub fn death_cross(today: &Bar, yesterday: &Bar) -> bool {
    match (today.sma50, today.sma200, yesterday.sma50, yesterday.sma200) {
        (Some(t50), Some(t200), Some(y50), Some(y200)) => t50 < t200 && y50 >= y200,
        _ => false,
    }
}

/// Entry gate: the benchmark must be trading above its own 200-average.
/// A missing benchmark bar or missing average suppresses all entries.
pub fn regime_permits(benchmark: Option<&Bar>) -> bool {
    match benchmark {
        Some(bar) => match bar.sma200 {
            Some(sma200) => bar.close > sma200,
            None => false,
        },
        None => false,
    }
}

/// Entry gate: no new entries during April, May or June.
pub fn q2_blocked(date: NaiveDate) -> bool {
    (4..=6).contains(&date.month())
}
