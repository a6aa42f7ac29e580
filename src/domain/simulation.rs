//! The simulation loop: a deterministic, time-stepped walk over the trading
//! days, evaluating exits before entries and keeping a cash-and-positions
//! ledger.
//!
//! The loop is single-threaded and CPU-bound; all data is materialized before
//! it starts and no error is ever raised mid-loop. Data gaps degrade to
//! skip-this-day-for-this-ticker, never to an abort. Independent backtests
//! each own their state and may run concurrently without coordination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::market::MarketIndex;
use super::performance::{BacktestResult, yearly_breakdown};
use super::position::PositionBook;
use super::signal;
use super::sizing::amount_to_invest;
use super::strategy::{
    DEATH_CROSS, GOLDEN_CROSS, Q2_FILTER, REGIME_FILTER, SizingPolicy, StrategyDefinition,
};
use crate::domain::error::EngineError;
use crate::ports::data_port::{LEAD_IN_DAYS, MarketDataPort, UniverseFilter};
use crate::ports::progress_port::ProgressSink;
use crate::ports::strategy_port::StrategyStore;

pub const DEFAULT_BENCHMARK: &str = "SPY";

/// User-supplied parameters for one run. The strategy logic itself lives in
/// the strategy store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestParams {
    pub strategy_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub benchmark: String,
    pub universe: UniverseFilter,
}

impl BacktestParams {
    pub fn new(strategy_id: i64, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        BacktestParams {
            strategy_id,
            start_date,
            end_date,
            initial_capital: 100_000.0,
            benchmark: DEFAULT_BENCHMARK.to_string(),
            universe: UniverseFilter::Full,
        }
    }
}

/// Cooperative cancellation flag, checked only at day boundaries so no
/// position is ever left half-processed. A cancelled run still finalizes and
/// returns a consistent result for the days already simulated.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Loads the strategy, fetches indicator-enriched bars with lead-in history,
/// builds the market index and runs the simulation.
///
/// Configuration errors (unknown strategy id, missing benchmark ticker) are
/// fatal before the loop starts: they are reported on the progress sink and
/// returned as `Err` with no partial simulation performed.
pub fn run_backtest(
    store: &dyn StrategyStore,
    provider: &dyn MarketDataPort,
    params: &BacktestParams,
    sink: &dyn ProgressSink,
    cancel: Option<&CancelToken>,
) -> Result<BacktestResult, EngineError> {
    sink.status("Initializing backtest...");

    sink.status(&format!(
        "Loading strategy definition for id {}...",
        params.strategy_id
    ));
    let strategy = match store.load(params.strategy_id)? {
        Some(s) => s,
        None => {
            let err = EngineError::UnknownStrategy {
                id: params.strategy_id,
            };
            sink.status(&format!("fatal: {err}"));
            return Err(err);
        }
    };
    if let SizingPolicy::Unknown(tag) = &strategy.sizing {
        sink.status(&format!(
            "warning: unrecognized sizing policy '{tag}', no entries will be funded"
        ));
    }
    sink.status(&format!("Strategy '{}' loaded.", strategy.name));

    sink.status("Loading pre-calculated historical data and indicators...");
    let fetch_start = params.start_date - Duration::days(LEAD_IN_DAYS);
    let bars = provider.fetch_bars(fetch_start, params.end_date, params.universe)?;

    sink.status("Structuring data for high-speed lookup...");
    let market = match MarketIndex::build(bars, &params.benchmark) {
        Ok(m) => m,
        Err(err) => {
            sink.status(&format!("fatal: {err}"));
            return Err(err);
        }
    };

    sink.status(&format!(
        "Indexed {} tradable tickers against benchmark {}. Starting simulation...",
        market.tradable_tickers().len(),
        market.benchmark_ticker()
    ));
    let result = run_simulation(&strategy, &market, params, sink, cancel);
    sink.status("Analysis complete.");
    Ok(result)
}

/// Runs the day loop over a prepared market index. Infallible: every data
/// gap inside the loop is absorbed locally.
pub fn run_simulation(
    strategy: &StrategyDefinition,
    market: &MarketIndex,
    params: &BacktestParams,
    sink: &dyn ProgressSink,
    cancel: Option<&CancelToken>,
) -> BacktestResult {
    let mut book = PositionBook::new();
    let mut cash = params.initial_capital;

    let days: Vec<NaiveDate> = market
        .trading_days()
        .iter()
        .copied()
        .filter(|d| *d >= params.start_date && *d <= params.end_date)
        .collect();
    let total_days = days.len();
    let mut last_pct: Option<u8> = None;

    for (day_number, &current) in days.iter().enumerate() {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            sink.status("Cancellation requested, finalizing open positions...");
            break;
        }

        // 1. Exit phase. The snapshot of open ids keeps iteration stable
        // while positions close underneath it.
        for id in book.open_ids() {
            let ticker = book.get(id).ticker.clone();
            let Some((today, yesterday)) = market.pair_on(&ticker, current) else {
                continue;
            };
            if strategy.has_exit_rule(DEATH_CROSS) && signal::death_cross(today, yesterday) {
                let exit_price = today.close;
                let shares = book.get(id).shares;
                book.close(id, current, exit_price);
                cash += exit_price * shares as f64;
            }
        }

        // 2. Entry gate, evaluated once per day. Exits above still stand
        // even when the gate is shut.
        let mut can_enter = true;
        if strategy.has_entry_rule(REGIME_FILTER)
            && !signal::regime_permits(market.benchmark_on(current))
        {
            can_enter = false;
        }
        if strategy.has_entry_rule(Q2_FILTER) && signal::q2_blocked(current) {
            can_enter = false;
        }

        // 3. Entry phase, in ascending ticker order: first come, first
        // funded when cash runs short.
        if can_enter {
            for ticker in market.tradable_tickers() {
                if book.has_open(ticker) {
                    continue;
                }
                let Some((today, yesterday)) = market.pair_on(ticker, current) else {
                    continue;
                };
                let amount = amount_to_invest(strategy, cash, &book, market, current);
                if cash < amount {
                    continue;
                }
                if !(strategy.has_entry_rule(GOLDEN_CROSS)
                    && signal::golden_cross(today, yesterday))
                {
                    continue;
                }
                let shares = (amount / today.close).floor() as i64;
                if shares >= 1 {
                    let entry_price = today.close;
                    book.open(ticker, current, entry_price, shares);
                    cash -= shares as f64 * entry_price;
                }
            }
        }

        if total_days > 0 {
            let pct = ((day_number + 1) * 100 / total_days) as u8;
            if last_pct != Some(pct) {
                sink.percent(pct);
                last_pct = Some(pct);
            }
        }
    }

    // 4. Finalization: force-close at the end date using the last available
    // close, or the entry price when the ticker has no data in range.
    for id in book.open_ids() {
        let position = book.get(id);
        let exit_price = market
            .last_close_on_or_before(&position.ticker, params.end_date)
            .unwrap_or(position.entry_price);
        let shares = position.shares;
        book.close(id, params.end_date, exit_price);
        cash += exit_price * shares as f64;
    }

    // 5. Yearly rollup.
    let trades = book.into_positions();
    let yearly = yearly_breakdown(
        &trades,
        params.start_date.year(),
        params.end_date.year(),
        params.initial_capital,
    );

    BacktestResult {
        initial_capital: params.initial_capital,
        ending_capital: cash,
        trades,
        yearly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::ports::progress_port::NullProgress;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(ticker: &str, d: NaiveDate, close: f64, sma50: f64, sma200: f64) -> Bar {
        Bar {
            ticker: ticker.into(),
            date: d,
            close,
            sma50: Some(sma50),
            sma200: Some(sma200),
        }
    }

    fn strategy(entry: &[&str], exit: &[&str]) -> StrategyDefinition {
        StrategyDefinition {
            id: 1,
            name: "test".into(),
            sizing: SizingPolicy::FixedAmount,
            sizing_value: 10_000.0,
            entry_rules: entry.iter().map(|s| s.to_string()).collect(),
            exit_rules: exit.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn weekday_series(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        // Calendar days are fine for tests; the engine only cares about
        // whatever dates the provider delivered.
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    /// Ticker whose 50-average sits below the 200-average, crossing up on
    /// `up_day` and back down on `down_day` (0-based day offsets).
    fn crossing_ticker(ticker: &str, days: &[NaiveDate], up_day: usize, down_day: usize) -> Vec<Bar> {
        days.iter()
            .enumerate()
            .map(|(i, &d)| {
                let sma50 = if i >= up_day && i < down_day { 105.0 } else { 95.0 };
                bar(ticker, d, 100.0, sma50, 100.0)
            })
            .collect()
    }

    fn flat_benchmark(days: &[NaiveDate], above_regime: bool) -> Vec<Bar> {
        days.iter()
            .map(|&d| {
                let close = if above_regime { 210.0 } else { 190.0 };
                bar("SPY", d, close, 200.0, 200.0)
            })
            .collect()
    }

    fn params(days: &[NaiveDate]) -> BacktestParams {
        BacktestParams {
            strategy_id: 1,
            start_date: days[0],
            end_date: *days.last().unwrap(),
            initial_capital: 100_000.0,
            benchmark: "SPY".into(),
            universe: UniverseFilter::Full,
        }
    }

    #[test]
    fn single_crossover_round_trip() {
        let days = weekday_series(date(2015, 1, 1), 300);
        let mut bars = crossing_ticker("AAPL", &days, 210, 260);
        bars.extend(flat_benchmark(&days, true));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS], &[DEATH_CROSS]);
        let p = params(&days);

        let result = run_simulation(&s, &market, &p, &NullProgress, None);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.ticker, "AAPL");
        assert_eq!(trade.entry_date, days[210]);
        assert_eq!(trade.exit_date, Some(days[260]));
        assert_eq!(trade.shares, 100); // floor(10_000 / 100.0)

        // Flat price: ending capital returns to the initial.
        assert_relative_eq!(
            result.ending_capital,
            100_000.0 - 10_000.0 + 100.0 * 100.0
        );
    }

    #[test]
    fn regime_filter_blocks_every_entry() {
        let days = weekday_series(date(2015, 1, 1), 300);
        let mut bars = crossing_ticker("AAPL", &days, 210, 260);
        bars.extend(flat_benchmark(&days, false));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS, REGIME_FILTER], &[DEATH_CROSS]);
        let p = params(&days);

        let result = run_simulation(&s, &market, &p, &NullProgress, None);

        assert!(result.trades.is_empty());
        assert_relative_eq!(result.ending_capital, 100_000.0);
    }

    #[test]
    fn q2_filter_suppresses_entries_in_q2_only() {
        // Crossover fires in May (blocked) for AAPL, and again in July
        // (allowed) for MSFT.
        let days = weekday_series(date(2015, 4, 1), 120);
        let mut bars = crossing_ticker("AAPL", &days, 40, 400); // crosses up ~May 11
        bars.extend(crossing_ticker("MSFT", &days, 100, 400)); // crosses up ~Jul 10
        bars.extend(flat_benchmark(&days, true));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS, Q2_FILTER], &[DEATH_CROSS]);
        let p = params(&days);

        let result = run_simulation(&s, &market, &p, &NullProgress, None);

        let tickers: Vec<&str> = result.trades.iter().map(|t| t.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["MSFT"]);
    }

    #[test]
    fn absent_regime_rule_means_no_gating() {
        let days = weekday_series(date(2015, 1, 1), 300);
        let mut bars = crossing_ticker("AAPL", &days, 210, 260);
        bars.extend(flat_benchmark(&days, false)); // bear regime, but no rule

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS], &[DEATH_CROSS]);
        let p = params(&days);

        let result = run_simulation(&s, &market, &p, &NullProgress, None);
        assert_eq!(result.trades.len(), 1);
    }

    #[test]
    fn open_position_is_force_closed_at_end() {
        let days = weekday_series(date(2015, 1, 1), 300);
        // Crosses up at 210 and never crosses back down.
        let mut bars = crossing_ticker("AAPL", &days, 210, 999);
        bars.extend(flat_benchmark(&days, true));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS], &[DEATH_CROSS]);
        let p = params(&days);

        let result = run_simulation(&s, &market, &p, &NullProgress, None);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert!(!trade.is_open());
        assert_eq!(trade.exit_date, Some(p.end_date));
        assert_eq!(trade.exit_price, Some(100.0));
    }

    #[test]
    fn cash_conservation_holds() {
        let days = weekday_series(date(2015, 1, 1), 300);
        let mut bars = crossing_ticker("AAPL", &days, 100, 150);
        bars.extend(crossing_ticker("MSFT", &days, 120, 200));
        bars.extend(flat_benchmark(&days, true));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS], &[DEATH_CROSS]);
        let p = params(&days);

        let result = run_simulation(&s, &market, &p, &NullProgress, None);

        let realized: f64 = result.trades.iter().map(|t| t.realized_pnl()).sum();
        assert_relative_eq!(
            result.ending_capital,
            result.initial_capital + realized,
            max_relative = 1e-12
        );
    }

    #[test]
    fn no_reentry_while_position_open() {
        let days = weekday_series(date(2015, 1, 1), 300);
        // Two upward crossovers with no death cross between them: the
        // position from the first stays open, so the second cannot fire.
        let mut bars: Vec<Bar> = days
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let sma50 = if (100..110).contains(&i) || i >= 120 {
                    105.0
                } else if (110..120).contains(&i) {
                    100.0 // between the averages: neither signal fires
                } else {
                    95.0
                };
                bar("AAPL", d, 100.0, sma50, 100.0)
            })
            .collect();
        bars.extend(flat_benchmark(&days, true));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS], &[DEATH_CROSS]);
        let p = params(&days);

        let result = run_simulation(&s, &market, &p, &NullProgress, None);
        assert_eq!(result.trades.len(), 1);
    }

    #[test]
    fn lead_in_bars_feed_yesterday_but_never_trade() {
        let days = weekday_series(date(2015, 1, 1), 10);
        // Crossover happens on day 1 of the in-range window; day 0 of the
        // series is lead-in (start_date = days[1]).
        let mut bars = crossing_ticker("AAPL", &days, 1, 999);
        bars.extend(flat_benchmark(&days, true));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS], &[DEATH_CROSS]);
        let mut p = params(&days);
        p.start_date = days[1];

        let result = run_simulation(&s, &market, &p, &NullProgress, None);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].entry_date, days[1]);
    }

    #[test]
    fn cancelled_run_still_finalizes() {
        let days = weekday_series(date(2015, 1, 1), 300);
        let mut bars = crossing_ticker("AAPL", &days, 210, 260);
        bars.extend(flat_benchmark(&days, true));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS], &[DEATH_CROSS]);
        let p = params(&days);

        let token = CancelToken::new();
        token.cancel();
        let result = run_simulation(&s, &market, &p, &NullProgress, Some(&token));

        // Cancelled before day one: nothing traded, capital intact.
        assert!(result.trades.is_empty());
        assert_relative_eq!(result.ending_capital, 100_000.0);
        // Yearly breakdown still covers the requested range.
        assert_eq!(result.yearly.first().unwrap().year, 2015);
    }

    #[test]
    fn yearly_rollup_spans_request_years() {
        let days = weekday_series(date(2014, 12, 1), 120);
        let mut bars = crossing_ticker("AAPL", &days, 20, 60);
        bars.extend(flat_benchmark(&days, true));

        let market = MarketIndex::build(bars, "SPY").unwrap();
        let s = strategy(&[GOLDEN_CROSS], &[DEATH_CROSS]);
        let p = params(&days);

        let result = run_simulation(&s, &market, &p, &NullProgress, None);
        let years: Vec<i32> = result.yearly.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2014, 2015]);
    }
}
