//! Shared builders and mock ports for the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use boardwalk::domain::bar::Bar;
use boardwalk::domain::error::EngineError;
use boardwalk::domain::strategy::{SizingPolicy, StrategyDefinition};
use boardwalk::ports::data_port::{MarketDataPort, UniverseFilter};
use boardwalk::ports::progress_port::ProgressSink;
use boardwalk::ports::strategy_port::StrategyStore;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn day_series(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

pub fn bar(ticker: &str, d: NaiveDate, close: f64, sma50: f64, sma200: f64) -> Bar {
    Bar {
        ticker: ticker.into(),
        date: d,
        close,
        sma50: Some(sma50),
        sma200: Some(sma200),
    }
}

/// A ticker whose 50-average crosses above the 200-average on `up_day` and
/// back below on `down_day` (0-based offsets into `days`). Closes are taken
/// from `closes`, cycled if shorter than the day list.
pub fn crossing_series(
    ticker: &str,
    days: &[NaiveDate],
    closes: &[f64],
    up_day: usize,
    down_day: usize,
) -> Vec<Bar> {
    days.iter()
        .enumerate()
        .map(|(i, &d)| {
            let sma50 = if i >= up_day && i < down_day { 105.0 } else { 95.0 };
            bar(ticker, d, closes[i % closes.len()], sma50, 100.0)
        })
        .collect()
}

/// Benchmark series trading above (bull) or at/below (bear) its 200-average.
pub fn benchmark_series(days: &[NaiveDate], bull: bool) -> Vec<Bar> {
    days.iter()
        .map(|&d| {
            let close = if bull { 210.0 } else { 190.0 };
            bar("SPY", d, close, 200.0, 200.0)
        })
        .collect()
}

pub fn make_strategy(
    id: i64,
    sizing: SizingPolicy,
    sizing_value: f64,
    entry: &[&str],
    exit: &[&str],
) -> StrategyDefinition {
    StrategyDefinition {
        id,
        name: format!("strategy-{id}"),
        sizing,
        sizing_value,
        entry_rules: entry.iter().map(|s| s.to_string()).collect(),
        exit_rules: exit.iter().map(|s| s.to_string()).collect(),
    }
}

#[derive(Default)]
pub struct MockStrategyStore {
    strategies: HashMap<i64, StrategyDefinition>,
}

impl MockStrategyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: StrategyDefinition) -> Self {
        self.strategies.insert(strategy.id, strategy);
        self
    }
}

impl StrategyStore for MockStrategyStore {
    fn load(&self, strategy_id: i64) -> Result<Option<StrategyDefinition>, EngineError> {
        Ok(self.strategies.get(&strategy_id).cloned())
    }

    fn list(&self) -> Result<Vec<StrategyDefinition>, EngineError> {
        let mut all: Vec<StrategyDefinition> = self.strategies.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        Ok(all)
    }
}

pub struct MockDataPort {
    bars: Vec<Bar>,
    pub last_fetch: RefCell<Option<(NaiveDate, NaiveDate, UniverseFilter)>>,
}

impl MockDataPort {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            last_fetch: RefCell::new(None),
        }
    }
}

impl MarketDataPort for MockDataPort {
    fn fetch_bars(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        filter: UniverseFilter,
    ) -> Result<Vec<Bar>, EngineError> {
        *self.last_fetch.borrow_mut() = Some((start_date, end_date, filter));
        Ok(self
            .bars
            .iter()
            .filter(|b| b.date >= start_date && b.date <= end_date)
            .cloned()
            .collect())
    }
}

/// Captures everything the engine reports.
#[derive(Default)]
pub struct RecordingSink {
    pub statuses: RefCell<Vec<String>>,
    pub percents: RefCell<Vec<u8>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saw_status_containing(&self, needle: &str) -> bool {
        self.statuses.borrow().iter().any(|s| s.contains(needle))
    }
}

impl ProgressSink for RecordingSink {
    fn status(&self, message: &str) {
        self.statuses.borrow_mut().push(message.to_string());
    }

    fn percent(&self, pct: u8) {
        self.percents.borrow_mut().push(pct);
    }
}
