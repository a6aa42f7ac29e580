//! CSV file data adapter.
//!
//! One `<TICKER>.csv` file per ticker (`date,close` columns) under a base
//! directory. The adapter is the indicator provider: it computes the rolling
//! 50/200 simple moving averages over each full series before handing bars to
//! the engine, so lead-in coverage is limited only by the files themselves.
//! An optional `index_members.txt` (one ticker per line) defines the
//! index-membership subset.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::domain::bar::Bar;
use crate::domain::error::EngineError;
use crate::ports::data_port::{MarketDataPort, UniverseFilter};

const MEMBERS_FILE: &str = "index_members.txt";

pub struct CsvBarAdapter {
    base_path: PathBuf,
    benchmark: String,
}

impl CsvBarAdapter {
    pub fn new(base_path: PathBuf, benchmark: &str) -> Self {
        Self {
            base_path,
            benchmark: benchmark.to_string(),
        }
    }

    fn tickers(&self, filter: UniverseFilter) -> Result<Vec<String>, EngineError> {
        let mut tickers = match filter {
            UniverseFilter::Full => self.all_tickers()?,
            UniverseFilter::IndexMembers => {
                let mut members = self.member_tickers()?;
                if !members.contains(&self.benchmark) {
                    members.push(self.benchmark.clone());
                }
                members
            }
        };
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }

    fn all_tickers(&self) -> Result<Vec<String>, EngineError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| EngineError::Store {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Store {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(ticker) = name_str.strip_suffix(".csv") {
                tickers.push(ticker.to_string());
            }
        }
        Ok(tickers)
    }

    fn member_tickers(&self) -> Result<Vec<String>, EngineError> {
        let path = self.base_path.join(MEMBERS_FILE);
        let content = fs::read_to_string(&path).map_err(|e| EngineError::Store {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn load_series(&self, ticker: &str) -> Result<Vec<Bar>, EngineError> {
        let path = self.base_path.join(format!("{}.csv", ticker));
        let content = fs::read_to_string(&path).map_err(|e| EngineError::Store {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows: Vec<(NaiveDate, f64)> = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| EngineError::Store {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;

            let date_str = record.get(0).ok_or_else(|| EngineError::Store {
                reason: format!("missing date column in {}", path.display()),
            })?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                EngineError::Store {
                    reason: format!("invalid date in {}: {}", path.display(), e),
                }
            })?;

            let close: f64 = record
                .get(1)
                .ok_or_else(|| EngineError::Store {
                    reason: format!("missing close column in {}", path.display()),
                })?
                .parse()
                .map_err(|e| EngineError::Store {
                    reason: format!("invalid close value in {}: {}", path.display(), e),
                })?;

            rows.push((date, close));
        }

        rows.sort_by_key(|&(date, _)| date);
        Ok(enrich_with_averages(ticker, &rows))
    }
}

/// Joins rolling 50/200 simple moving averages onto a date-sorted close
/// series. Averages are absent until a full window of trailing history
/// exists.
fn enrich_with_averages(ticker: &str, rows: &[(NaiveDate, f64)]) -> Vec<Bar> {
    let mut prefix = Vec::with_capacity(rows.len() + 1);
    prefix.push(0.0);
    let mut running = 0.0;
    for &(_, close) in rows {
        running += close;
        prefix.push(running);
    }

    let window = |i: usize, period: usize| -> Option<f64> {
        if i + 1 < period {
            None
        } else {
            Some((prefix[i + 1] - prefix[i + 1 - period]) / period as f64)
        }
    };

    rows.iter()
        .enumerate()
        .map(|(i, &(date, close))| Bar {
            ticker: ticker.to_string(),
            date,
            close,
            sma50: window(i, 50),
            sma200: window(i, 200),
        })
        .collect()
}

impl MarketDataPort for CsvBarAdapter {
    fn fetch_bars(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        filter: UniverseFilter,
    ) -> Result<Vec<Bar>, EngineError> {
        let mut bars = Vec::new();
        for ticker in self.tickers(filter)? {
            let series = self.load_series(&ticker)?;
            bars.extend(
                series
                    .into_iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date),
            );
        }
        Ok(bars)
    }
}
