//! Market data provider port.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::bar::Bar;
use crate::domain::error::EngineError;

/// Calendar days of lead-in history the orchestrator requests ahead of the
/// simulation start, so 200-period averages are populated on day one.
pub const LEAD_IN_DAYS: i64 = 250;

/// Which slice of the ticker universe a fetch covers. `IndexMembers`
/// restricts to the benchmark plus the index-membership subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniverseFilter {
    Full,
    IndexMembers,
}

/// Supplies one indicator-enriched row per (ticker, date). The engine never
/// computes indicators itself; the provider delivers the 50/200 averages
/// pre-joined onto each bar.
pub trait MarketDataPort {
    fn fetch_bars(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        filter: UniverseFilter,
    ) -> Result<Vec<Bar>, EngineError>;
}
