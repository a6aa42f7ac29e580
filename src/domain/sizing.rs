//! Position sizing: converting available capital into an allocation amount.

use chrono::NaiveDate;

use super::market::MarketIndex;
use super::position::PositionBook;
use super::strategy::{SizingPolicy, StrategyDefinition};

/// Capital to allocate to a prospective new position on `date`.
///
/// `FixedAmount` returns the strategy's sizing value verbatim.
/// `PercentOfEquity` marks every open position to market first, using the
/// close on `date` when a bar exists and the entry price otherwise.
/// Unrecognized policy tags return zero, which blocks the entry downstream
/// at the whole-share check.
pub fn amount_to_invest(
    strategy: &StrategyDefinition,
    available_cash: f64,
    book: &PositionBook,
    market: &MarketIndex,
    date: NaiveDate,
) -> f64 {
    match &strategy.sizing {
        SizingPolicy::FixedAmount => strategy.sizing_value,
        SizingPolicy::PercentOfEquity => {
            let open_value: f64 = book
                .iter_open()
                .map(|pos| {
                    let price = market
                        .bar_on(&pos.ticker, date)
                        .map(|bar| bar.close)
                        .unwrap_or(pos.entry_price);
                    pos.market_value(price)
                })
                .sum();
            let total_equity = available_cash + open_value;
            total_equity * (strategy.sizing_value / 100.0)
        }
        SizingPolicy::Unknown(_) => 0.0,
    }
}
