//! SQLite adapter: strategy store, indicator-enriched price store, and
//! best-effort persistence of finished runs.

use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

use crate::domain::bar::Bar;
use crate::domain::error::EngineError;
use crate::domain::performance::BacktestResult;
use crate::domain::simulation::BacktestParams;
use crate::domain::strategy::{SizingPolicy, StrategyDefinition};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{MarketDataPort, UniverseFilter};
use crate::ports::strategy_port::StrategyStore;

const DATE_FMT: &str = "%Y-%m-%d";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
    benchmark: String,
}

fn store_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Store {
        reason: e.to_string(),
    }
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort, benchmark: &str) -> Result<Self, EngineError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| EngineError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;
        let pool_size = config.get_int("sqlite", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(store_err)?;

        Ok(Self {
            pool,
            benchmark: benchmark.to_string(),
        })
    }

    pub fn in_memory(benchmark: &str) -> Result<Self, EngineError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(store_err)?;

        Ok(Self {
            pool,
            benchmark: benchmark.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), EngineError> {
        let conn = self.pool.get().map_err(store_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS strategy (
                strategy_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                sizing_strategy TEXT NOT NULL,
                sizing_value REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS strategy_rule (
                rule_id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id INTEGER NOT NULL REFERENCES strategy(strategy_id),
                rule_type TEXT NOT NULL CHECK (rule_type IN ('Entry', 'Exit')),
                signal_name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS daily_price (
                ticker TEXT NOT NULL,
                date TEXT NOT NULL,
                close REAL NOT NULL,
                sma50 REAL,
                sma200 REAL,
                PRIMARY KEY (ticker, date)
            );
            CREATE INDEX IF NOT EXISTS idx_daily_price_date ON daily_price(date);
            CREATE TABLE IF NOT EXISTS index_member (
                ticker TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS backtest_run (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id INTEGER NOT NULL,
                params TEXT NOT NULL,
                initial_capital REAL NOT NULL,
                ending_capital REAL NOT NULL,
                total_trades INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                profit_factor REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS backtest_run_trade (
                run_id INTEGER NOT NULL REFERENCES backtest_run(run_id),
                ticker TEXT NOT NULL,
                shares INTEGER NOT NULL,
                entry_date TEXT NOT NULL,
                entry_price REAL NOT NULL,
                exit_date TEXT,
                exit_price REAL,
                pnl REAL NOT NULL
            );",
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn insert_strategy(&self, strategy: &StrategyDefinition) -> Result<(), EngineError> {
        let mut conn = self.pool.get().map_err(store_err)?;
        let tx = conn.transaction().map_err(store_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO strategy (strategy_id, name, sizing_strategy, sizing_value)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                strategy.id,
                strategy.name,
                strategy.sizing.tag(),
                strategy.sizing_value
            ],
        )
        .map_err(store_err)?;

        tx.execute(
            "DELETE FROM strategy_rule WHERE strategy_id = ?1",
            params![strategy.id],
        )
        .map_err(store_err)?;

        for (rule_type, names) in [
            ("Entry", &strategy.entry_rules),
            ("Exit", &strategy.exit_rules),
        ] {
            for name in names {
                tx.execute(
                    "INSERT INTO strategy_rule (strategy_id, rule_type, signal_name)
                     VALUES (?1, ?2, ?3)",
                    params![strategy.id, rule_type, name],
                )
                .map_err(store_err)?;
            }
        }

        tx.commit().map_err(store_err)
    }

    pub fn insert_bars(&self, bars: &[Bar]) -> Result<(), EngineError> {
        let mut conn = self.pool.get().map_err(store_err)?;
        let tx = conn.transaction().map_err(store_err)?;
        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO daily_price (ticker, date, close, sma50, sma200)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    bar.ticker,
                    bar.date.format(DATE_FMT).to_string(),
                    bar.close,
                    bar.sma50,
                    bar.sma200
                ],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)
    }

    pub fn insert_index_members(&self, tickers: &[&str]) -> Result<(), EngineError> {
        let mut conn = self.pool.get().map_err(store_err)?;
        let tx = conn.transaction().map_err(store_err)?;
        for ticker in tickers {
            tx.execute(
                "INSERT OR IGNORE INTO index_member (ticker) VALUES (?1)",
                params![ticker],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)
    }

    /// Persists a finished run: the JSON parameter blob, summary columns and
    /// the flat trade list. Callers treat failures as non-fatal; the engine
    /// never depends on persistence succeeding.
    pub fn save_run(
        &self,
        run_params: &BacktestParams,
        result: &BacktestResult,
    ) -> Result<i64, EngineError> {
        let blob = serde_json::to_string(run_params).map_err(store_err)?;

        let mut conn = self.pool.get().map_err(store_err)?;
        let tx = conn.transaction().map_err(store_err)?;

        tx.execute(
            "INSERT INTO backtest_run
                (strategy_id, params, initial_capital, ending_capital,
                 total_trades, win_rate, profit_factor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_params.strategy_id,
                blob,
                result.initial_capital,
                result.ending_capital,
                result.total_trades() as i64,
                result.win_rate(),
                result.profit_factor()
            ],
        )
        .map_err(store_err)?;
        let run_id = tx.last_insert_rowid();

        for trade in &result.trades {
            tx.execute(
                "INSERT INTO backtest_run_trade
                    (run_id, ticker, shares, entry_date, entry_price,
                     exit_date, exit_price, pnl)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_id,
                    trade.ticker,
                    trade.shares,
                    trade.entry_date.format(DATE_FMT).to_string(),
                    trade.entry_price,
                    trade.exit_date.map(|d| d.format(DATE_FMT).to_string()),
                    trade.exit_price,
                    trade.realized_pnl()
                ],
            )
            .map_err(store_err)?;
        }

        tx.commit().map_err(store_err)?;
        Ok(run_id)
    }

    fn load_rules(
        &self,
        conn: &rusqlite::Connection,
        strategy_id: i64,
    ) -> Result<(Vec<String>, Vec<String>), EngineError> {
        let mut stmt = conn
            .prepare("SELECT rule_type, signal_name FROM strategy_rule WHERE strategy_id = ?1")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![strategy_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(store_err)?;

        let mut entries = Vec::new();
        let mut exits = Vec::new();
        for row in rows {
            let (rule_type, signal_name) = row.map_err(store_err)?;
            match rule_type.as_str() {
                "Entry" => entries.push(signal_name),
                _ => exits.push(signal_name),
            }
        }
        Ok((entries, exits))
    }
}

impl StrategyStore for SqliteAdapter {
    fn load(&self, strategy_id: i64) -> Result<Option<StrategyDefinition>, EngineError> {
        let conn = self.pool.get().map_err(store_err)?;

        let header: Option<(String, String, f64)> = conn
            .query_row(
                "SELECT name, sizing_strategy, sizing_value
                 FROM strategy WHERE strategy_id = ?1",
                params![strategy_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(store_err)?;

        let Some((name, sizing_tag, sizing_value)) = header else {
            return Ok(None);
        };

        let (entries, exits) = self.load_rules(&conn, strategy_id)?;

        Ok(Some(StrategyDefinition {
            id: strategy_id,
            name,
            sizing: SizingPolicy::from_tag(&sizing_tag),
            sizing_value,
            entry_rules: entries.into_iter().collect(),
            exit_rules: exits.into_iter().collect(),
        }))
    }

    fn list(&self) -> Result<Vec<StrategyDefinition>, EngineError> {
        let conn = self.pool.get().map_err(store_err)?;
        let mut stmt = conn
            .prepare("SELECT strategy_id FROM strategy ORDER BY strategy_id")
            .map_err(store_err)?;
        let ids: Vec<i64> = stmt
            .query_map([], |row| row.get(0))
            .map_err(store_err)?
            .collect::<Result<_, _>>()
            .map_err(store_err)?;
        drop(stmt);
        drop(conn);

        let mut strategies = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(s) = self.load(id)? {
                strategies.push(s);
            }
        }
        Ok(strategies)
    }
}

impl MarketDataPort for SqliteAdapter {
    fn fetch_bars(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        filter: UniverseFilter,
    ) -> Result<Vec<Bar>, EngineError> {
        let conn = self.pool.get().map_err(store_err)?;

        let sql = match filter {
            UniverseFilter::Full => {
                "SELECT ticker, date, close, sma50, sma200
                 FROM daily_price
                 WHERE date >= ?1 AND date <= ?2"
            }
            UniverseFilter::IndexMembers => {
                "SELECT ticker, date, close, sma50, sma200
                 FROM daily_price
                 WHERE date >= ?1 AND date <= ?2
                   AND (ticker IN (SELECT ticker FROM index_member) OR ticker = ?3)"
            }
        };

        let start = start_date.format(DATE_FMT).to_string();
        let end = end_date.format(DATE_FMT).to_string();

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String, f64, Option<f64>, Option<f64>)> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        };

        let mut stmt = conn.prepare(sql).map_err(store_err)?;
        let rows: Vec<(String, String, f64, Option<f64>, Option<f64>)> = match filter {
            UniverseFilter::Full => stmt
                .query_map(params![start, end], map_row)
                .map_err(store_err)?
                .collect::<Result<_, _>>()
                .map_err(store_err)?,
            UniverseFilter::IndexMembers => stmt
                .query_map(params![start, end, self.benchmark], map_row)
                .map_err(store_err)?
                .collect::<Result<_, _>>()
                .map_err(store_err)?,
        };

        let mut bars = Vec::with_capacity(rows.len());
        for (ticker, date_str, close, sma50, sma200) in rows {
            let date = NaiveDate::parse_from_str(&date_str, DATE_FMT).map_err(store_err)?;
            bars.push(Bar {
                ticker,
                date,
                close,
                sma50,
                sma200,
            });
        }
        Ok(bars)
    }
}
