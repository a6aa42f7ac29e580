//! Simulated positions and the position book.
//!
//! The book is an arena: positions are never removed, only closed in place,
//! and a ticker-to-open-index map replaces repeated linear scans while the
//! exit and entry phases mutate state.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One simulated holding, open or closed. Open iff `exit_date` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub shares: i64,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<f64>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.exit_date.is_none()
    }

    /// Realized profit/loss. Zero while the position is still open.
    pub fn realized_pnl(&self) -> f64 {
        match self.exit_price {
            Some(exit) => (exit - self.entry_price) * self.shares as f64,
            None => 0.0,
        }
    }

    pub fn pnl_percent(&self) -> f64 {
        match self.exit_price {
            Some(exit) if self.entry_price != 0.0 => {
                (exit - self.entry_price) / self.entry_price
            }
            _ => 0.0,
        }
    }

    /// Mark-to-market value at `price`.
    pub fn market_value(&self, price: f64) -> f64 {
        self.shares as f64 * price
    }
}

/// Stable position ids (indices into the arena) plus an open-position map
/// enforcing at most one open position per ticker.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: Vec<Position>,
    open_by_ticker: HashMap<String, usize>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new position and returns its id. Callers check `has_open`
    /// first; a second open for the same ticker replaces the map entry and
    /// would break the one-open-per-ticker invariant.
    pub fn open(&mut self, ticker: &str, date: NaiveDate, price: f64, shares: i64) -> usize {
        debug_assert!(!self.has_open(ticker), "duplicate open for {ticker}");
        let id = self.positions.len();
        self.positions.push(Position {
            ticker: ticker.to_string(),
            shares,
            entry_date: date,
            entry_price: price,
            exit_date: None,
            exit_price: None,
        });
        self.open_by_ticker.insert(ticker.to_string(), id);
        id
    }

    /// Closes the position with id `id` at the given date and price.
    pub fn close(&mut self, id: usize, date: NaiveDate, price: f64) {
        let position = &mut self.positions[id];
        position.exit_date = Some(date);
        position.exit_price = Some(price);
        self.open_by_ticker.remove(&position.ticker);
    }

    pub fn has_open(&self, ticker: &str) -> bool {
        self.open_by_ticker.contains_key(ticker)
    }

    pub fn open_count(&self) -> usize {
        self.open_by_ticker.len()
    }

    /// Snapshot of the currently open ids, in entry order. Taken before the
    /// exit phase so closes during iteration cannot skew it.
    pub fn open_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.open_by_ticker.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn get(&self, id: usize) -> &Position {
        &self.positions[id]
    }

    pub fn iter_open(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_open())
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn into_positions(self) -> Vec<Position> {
        self.positions
    }
}
