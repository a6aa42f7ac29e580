//! In-memory market data index built from the provider's flat bar sequence.
//!
//! Per-ticker bars are kept date-ascending with a date-keyed index map, so
//! the simulation's inner-loop "bar on date X" lookups stay O(1) amortized
//! across multiple tickers and years of daily bars.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use super::bar::Bar;
use super::error::EngineError;

#[derive(Debug, Clone)]
pub struct MarketIndex {
    bars: HashMap<String, Vec<Bar>>,
    date_index: HashMap<String, HashMap<NaiveDate, usize>>,
    benchmark_ticker: String,
    trading_days: Vec<NaiveDate>,
    tradable: Vec<String>,
}

impl MarketIndex {
    /// Structures the provider output for high-speed lookup. Fails when the
    /// benchmark ticker is absent from the dataset, since the regime filter
    /// cannot function without it.
    pub fn build(all_bars: Vec<Bar>, benchmark_ticker: &str) -> Result<Self, EngineError> {
        let mut bars: HashMap<String, Vec<Bar>> = HashMap::new();
        let mut days: BTreeSet<NaiveDate> = BTreeSet::new();

        for bar in all_bars {
            days.insert(bar.date);
            bars.entry(bar.ticker.clone()).or_default().push(bar);
        }

        if !bars.contains_key(benchmark_ticker) {
            return Err(EngineError::MissingBenchmark {
                ticker: benchmark_ticker.to_string(),
            });
        }

        let mut date_index = HashMap::with_capacity(bars.len());
        for (ticker, series) in bars.iter_mut() {
            series.sort_by_key(|b| b.date);
            let index: HashMap<NaiveDate, usize> = series
                .iter()
                .enumerate()
                .map(|(i, b)| (b.date, i))
                .collect();
            date_index.insert(ticker.clone(), index);
        }

        let mut tradable: Vec<String> = bars
            .keys()
            .filter(|t| t.as_str() != benchmark_ticker)
            .cloned()
            .collect();
        tradable.sort();

        Ok(MarketIndex {
            bars,
            date_index,
            benchmark_ticker: benchmark_ticker.to_string(),
            trading_days: days.into_iter().collect(),
            tradable,
        })
    }

    /// All distinct dates present anywhere in the universe, ascending.
    pub fn trading_days(&self) -> &[NaiveDate] {
        &self.trading_days
    }

    /// Universe minus the benchmark, ascending by ticker. The entry phase
    /// iterates in this order, which decides who gets funded first when cash
    /// runs short.
    pub fn tradable_tickers(&self) -> &[String] {
        &self.tradable
    }

    pub fn benchmark_ticker(&self) -> &str {
        &self.benchmark_ticker
    }

    /// The ticker's bar exactly on `date`, if any.
    pub fn bar_on(&self, ticker: &str, date: NaiveDate) -> Option<&Bar> {
        let idx = *self.date_index.get(ticker)?.get(&date)?;
        Some(&self.bars[ticker][idx])
    }

    /// Today's bar plus the immediately preceding bar for the ticker.
    /// `None` unless the ticker has a bar exactly on `date` that is not its
    /// first bar — a newly listed ticker or a data gap yields no pair, so no
    /// crossover can be detected that day.
    pub fn pair_on(&self, ticker: &str, date: NaiveDate) -> Option<(&Bar, &Bar)> {
        let idx = *self.date_index.get(ticker)?.get(&date)?;
        if idx < 1 {
            return None;
        }
        let series = &self.bars[ticker];
        Some((&series[idx], &series[idx - 1]))
    }

    /// The benchmark's bar on `date`, used by the regime filter.
    pub fn benchmark_on(&self, date: NaiveDate) -> Option<&Bar> {
        self.bar_on(&self.benchmark_ticker, date)
    }

    /// Last close at or before `date`, used when force-closing positions at
    /// the simulation's end.
    pub fn last_close_on_or_before(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        let series = self.bars.get(ticker)?;
        let upto = series.partition_point(|b| b.date <= date);
        if upto == 0 {
            return None;
        }
        Some(series[upto - 1].close)
    }
}
