//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::EngineError;
use crate::domain::simulation::{BacktestParams, DEFAULT_BENCHMARK};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::UniverseFilter;
use crate::ports::progress_port::ProgressSink;

#[derive(Parser, Debug)]
#[command(name = "boardwalk", about = "Rule-based trading strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Override [backtest] strategy_id from the config
        #[arg(long)]
        strategy_id: Option<i64>,
        /// Restrict the universe to the benchmark plus index members
        #[arg(long)]
        sp500_only: bool,
        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Do not persist the run to the store
        #[arg(long)]
        no_save: bool,
    },
    /// List strategies in the store
    Strategies {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Stage messages and a coarse percentage ticker on stderr.
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn status(&self, message: &str) {
        eprintln!("{message}");
    }

    fn percent(&self, pct: u8) {
        if pct % 10 == 0 {
            eprintln!("  {pct}%");
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            strategy_id,
            sp500_only,
            output,
            no_save,
        } => run_backtest_cmd(&config, strategy_id, sp500_only, output.as_ref(), no_save),
        Command::Strategies { config } => run_strategies_cmd(&config),
    }
}

fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = EngineError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn require_date(adapter: &dyn ConfigPort, key: &str) -> Result<NaiveDate, EngineError> {
    adapter
        .get_date("backtest", key)?
        .ok_or_else(|| EngineError::ConfigMissing {
            section: "backtest".into(),
            key: key.into(),
        })
}

pub fn build_params(
    adapter: &dyn ConfigPort,
    strategy_id_override: Option<i64>,
    sp500_only: bool,
) -> Result<BacktestParams, EngineError> {
    let strategy_id = match strategy_id_override {
        Some(id) => id,
        None => {
            let id = adapter.get_int("backtest", "strategy_id", 0);
            if id == 0 {
                return Err(EngineError::ConfigMissing {
                    section: "backtest".into(),
                    key: "strategy_id".into(),
                });
            }
            id
        }
    };

    let universe = if sp500_only || adapter.get_bool("backtest", "sp500_only", false) {
        UniverseFilter::IndexMembers
    } else {
        UniverseFilter::Full
    };

    Ok(BacktestParams {
        strategy_id,
        start_date: require_date(adapter, "start_date")?,
        end_date: require_date(adapter, "end_date")?,
        initial_capital: adapter.get_double("backtest", "initial_capital", 100_000.0),
        benchmark: adapter
            .get_string("backtest", "benchmark")
            .unwrap_or_else(|| DEFAULT_BENCHMARK.to_string()),
        universe,
    })
}

fn run_backtest_cmd(
    config_path: &PathBuf,
    strategy_id: Option<i64>,
    sp500_only: bool,
    output_path: Option<&PathBuf>,
    no_save: bool,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let params = match build_params(&adapter, strategy_id, sp500_only) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::csv_adapter::CsvBarAdapter;
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::domain::simulation::run_backtest;
        use crate::ports::data_port::MarketDataPort;

        let store = match SqliteAdapter::from_config(&adapter, &params.benchmark) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        let source = adapter
            .get_string("data", "source")
            .unwrap_or_else(|| "sqlite".to_string());
        let csv_provider: Option<CsvBarAdapter> = match source.as_str() {
            "csv" => {
                let Some(path) = adapter.get_string("data", "path") else {
                    let err = EngineError::ConfigMissing {
                        section: "data".into(),
                        key: "path".into(),
                    };
                    eprintln!("error: {err}");
                    return (&err).into();
                };
                Some(CsvBarAdapter::new(PathBuf::from(path), &params.benchmark))
            }
            _ => None,
        };
        let provider: &dyn MarketDataPort = match &csv_provider {
            Some(csv) => csv,
            None => &store,
        };

        let result = match run_backtest(&store, provider, &params, &StderrProgress, None) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        print_summary(&result);

        if let Some(path) = output_path {
            let json = match serde_json::to_string_pretty(&result) {
                Ok(j) => j,
                Err(e) => {
                    eprintln!("error: failed to serialize result: {e}");
                    return ExitCode::from(1);
                }
            };
            if let Err(e) = std::fs::write(path, json) {
                eprintln!("error: failed to write {}: {e}", path.display());
                return ExitCode::from(1);
            }
            eprintln!("Result written to {}", path.display());
        }

        if !no_save {
            // Persistence is best-effort; the run already succeeded.
            match store.save_run(&params, &result) {
                Ok(run_id) => eprintln!("Run saved as #{run_id}"),
                Err(e) => eprintln!("warning: failed to save run: {e}"),
            }
        }

        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (params, output_path, no_save);
        eprintln!("error: the sqlite feature is required for backtest");
        ExitCode::from(1)
    }
}

fn run_strategies_cmd(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::ports::strategy_port::StrategyStore;

        let store = match SqliteAdapter::from_config(&adapter, DEFAULT_BENCHMARK) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        let strategies = match store.list() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        for s in &strategies {
            let mut entries: Vec<&str> = s.entry_rules.iter().map(String::as_str).collect();
            let mut exits: Vec<&str> = s.exit_rules.iter().map(String::as_str).collect();
            entries.sort_unstable();
            exits.sort_unstable();
            println!(
                "{:>4}  {:<30} {} {:<10} entry: [{}] exit: [{}]",
                s.id,
                s.name,
                s.sizing.tag(),
                s.sizing_value,
                entries.join(", "),
                exits.join(", ")
            );
        }
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = adapter;
        eprintln!("error: the sqlite feature is required for strategies");
        ExitCode::from(1)
    }
}

#[cfg(feature = "sqlite")]
fn print_summary(result: &crate::domain::performance::BacktestResult) {
    println!("Initial capital:  {:>14.2}", result.initial_capital);
    println!("Ending capital:   {:>14.2}", result.ending_capital);
    println!(
        "Net P/L:          {:>14.2}  ({:.2}%)",
        result.net_pl(),
        result.net_pl_percent() * 100.0
    );
    println!("Closed trades:    {:>14}", result.total_trades());
    println!("Win rate:         {:>13.1}%", result.win_rate() * 100.0);
    println!("Avg gain:         {:>14.2}", result.average_gain());
    println!("Avg loss:         {:>14.2}", result.average_loss());
    println!("Profit factor:    {:>14.2}", result.profit_factor());
    println!();
    println!("Year    Trades        Net P/L   Year-end capital   Return");
    for y in &result.yearly {
        println!(
            "{}  {:>8}  {:>13.2}  {:>17.2}  {:>6.2}%",
            y.year, y.total_trades, y.net_pl, y.year_end_capital, y.return_pct
        );
    }
}
