//! Year-by-year rollup and derived summary statistics.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::position::Position;

/// Sentinel returned instead of dividing by a zero gross loss.
pub const PROFIT_FACTOR_CAP: f64 = 999.0;

/// One calendar year's realized results, chained from the previous year's
/// ending capital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyPerformance {
    pub year: i32,
    pub net_pl: f64,
    pub total_trades: usize,
    pub year_end_capital: f64,
    /// Return for the year relative to the previous year-end capital, in
    /// percent. Zero when that capital was zero.
    pub return_pct: f64,
}

/// The completed simulation: parameters echoed back, every position ever
/// opened, and the yearly breakdown. Summary ratios are derived from the
/// position list at read time, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub ending_capital: f64,
    pub trades: Vec<Position>,
    pub yearly: Vec<YearlyPerformance>,
}

impl BacktestResult {
    pub fn net_pl(&self) -> f64 {
        self.ending_capital - self.initial_capital
    }

    pub fn net_pl_percent(&self) -> f64 {
        if self.initial_capital == 0.0 {
            0.0
        } else {
            self.net_pl() / self.initial_capital
        }
    }

    /// Closed trades only.
    pub fn total_trades(&self) -> usize {
        self.trades.iter().filter(|t| !t.is_open()).count()
    }

    pub fn winning_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.realized_pnl() > 0.0).count()
    }

    pub fn losing_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.realized_pnl() < 0.0).count()
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.total_trades();
        if total == 0 {
            0.0
        } else {
            self.winning_trades() as f64 / total as f64
        }
    }

    /// Mean realized profit over winning trades, zero when there are none.
    pub fn average_gain(&self) -> f64 {
        let wins: Vec<f64> = self
            .trades
            .iter()
            .map(Position::realized_pnl)
            .filter(|&pnl| pnl > 0.0)
            .collect();
        if wins.is_empty() {
            0.0
        } else {
            wins.iter().sum::<f64>() / wins.len() as f64
        }
    }

    /// Mean realized loss over losing trades (a negative number), zero when
    /// there are none.
    pub fn average_loss(&self) -> f64 {
        let losses: Vec<f64> = self
            .trades
            .iter()
            .map(Position::realized_pnl)
            .filter(|&pnl| pnl < 0.0)
            .collect();
        if losses.is_empty() {
            0.0
        } else {
            losses.iter().sum::<f64>() / losses.len() as f64
        }
    }

    /// Gross profit divided by absolute gross loss, saturating to
    /// [`PROFIT_FACTOR_CAP`] when there is no loss to divide by.
    pub fn profit_factor(&self) -> f64 {
        let gross_profit: f64 = self
            .trades
            .iter()
            .map(Position::realized_pnl)
            .filter(|&pnl| pnl > 0.0)
            .sum();
        let gross_loss: f64 = self
            .trades
            .iter()
            .map(Position::realized_pnl)
            .filter(|&pnl| pnl < 0.0)
            .sum::<f64>()
            .abs();
        if gross_loss == 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            gross_profit / gross_loss
        }
    }
}

/// Builds the yearly breakdown for every calendar year from `start_year` to
/// `end_year` inclusive, seeding the capital chain with `initial_capital`.
/// A trade contributes to the year its exit date falls in.
pub fn yearly_breakdown(
    trades: &[Position],
    start_year: i32,
    end_year: i32,
    initial_capital: f64,
) -> Vec<YearlyPerformance> {
    let mut breakdown = Vec::new();
    let mut last_year_end_capital = initial_capital;

    for year in start_year..=end_year {
        let in_year: Vec<&Position> = trades
            .iter()
            .filter(|t| t.exit_date.is_some_and(|d| d.year() == year))
            .collect();
        let net_pl: f64 = in_year.iter().map(|t| t.realized_pnl()).sum();
        let year_end_capital = last_year_end_capital + net_pl;
        let return_pct = if last_year_end_capital == 0.0 {
            0.0
        } else {
            net_pl / last_year_end_capital * 100.0
        };

        breakdown.push(YearlyPerformance {
            year,
            net_pl,
            total_trades: in_year.len(),
            year_end_capital,
            return_pct,
        });
        last_year_end_capital = year_end_capital;
    }

    breakdown
}
