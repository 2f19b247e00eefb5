//! EMA crossover walk-forward evaluator.
//!
//! # Usage
//!
//! ```bash
//! # Walk-forward over a universe, writing tables to results/
//! ema-walkforward run --tickers SPY,QQQ,IWM,TLT,GLD --execution close --fee-bps 2 --slippage-bps 0.5
//!
//! # Start from a JSON config, override one field
//! ema-walkforward run --config config/default.json --no-regimes
//!
//! # Full-history backtest of one parameter pair
//! ema-walkforward single --ticker SPY --fast 12 --slow 26
//!
//! # Check price files before a run
//! ema-walkforward validate --tickers SPY,QQQ
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use ema_walkforward::backtest::{BacktestEngine, ExecutionMode};
use ema_walkforward::config::{parse_tickers, RunConfig};
use ema_walkforward::data::{DataLoader, PriceProvider};
use ema_walkforward::metrics::MetricsCalculator;
use ema_walkforward::results::{AggregateRunner, ResultsWriter};
use ema_walkforward::signals::make_signals;
use ema_walkforward::validation::{DataIntegrityValidator, DEFAULT_MAX_GAP_DAYS};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "ema-walkforward")]
#[command(about = "Walk-forward evaluation of EMA crossover strategies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every subcommand that backtests.
#[derive(Args)]
struct CommonArgs {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with one price file per ticker
    #[arg(long)]
    data_dir: Option<String>,

    /// Output directory for results
    #[arg(long)]
    outdir: Option<String>,

    /// Start date for historical data (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Execution mode (close or open)
    #[arg(long)]
    execution: Option<ExecutionMode>,

    /// Fee in basis points per unit of turnover
    #[arg(long)]
    fee_bps: Option<f64>,

    /// Slippage in basis points per unit of turnover
    #[arg(long)]
    slippage_bps: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run walk-forward evaluation over a universe
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Comma-separated list of tickers
        #[arg(short, long)]
        tickers: Option<String>,

        /// Do not compute the volatility-regime breakdown
        #[arg(long)]
        no_regimes: bool,

        /// Training window in years
        #[arg(long)]
        train_years: Option<u32>,

        /// Test window in years
        #[arg(long)]
        test_years: Option<u32>,
    },

    /// Backtest one parameter pair over a ticker's full history
    Single {
        #[command(flatten)]
        common: CommonArgs,

        /// Ticker to backtest
        #[arg(long, default_value = "SPY")]
        ticker: String,

        /// Fast EMA span
        #[arg(long, default_value_t = 12)]
        fast: usize,

        /// Slow EMA span
        #[arg(long, default_value_t = 26)]
        slow: usize,
    },

    /// Validate price files
    Validate {
        /// Directory with one price file per ticker
        #[arg(long, default_value = "data")]
        data_dir: String,

        /// Comma-separated list of tickers (default: every file in the data directory)
        #[arg(short, long)]
        tickers: Option<String>,

        /// Largest allowed calendar gap between bars
        #[arg(long, default_value_t = DEFAULT_MAX_GAP_DAYS)]
        max_gap_days: i64,
    },
}

/// Defaults, then the config file, then command-line overrides.
fn build_config(common: &CommonArgs) -> Result<RunConfig> {
    let mut config = match &common.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(dir) = &common.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &common.outdir {
        config.output_dir = dir.clone();
    }
    if let Some(start) = common.start {
        config.start = start;
    }
    if let Some(execution) = common.execution {
        config.backtest.execution = execution;
    }
    if let Some(fee) = common.fee_bps {
        config.backtest.commission.fee_bps = fee;
    }
    if let Some(slip) = common.slippage_bps {
        config.backtest.slippage.slippage_bps = slip;
    }

    Ok(config)
}

fn cmd_run(config: RunConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    println!("{}", SEPARATOR);
    println!("EMA Crossover Walk-Forward");
    println!("{}", SEPARATOR);
    println!("  Tickers: {}", config.tickers.join(","));
    println!("  Start: {}", config.start);
    println!(
        "  Windows: {}y train / {}y test",
        config.walkforward.train_years, config.walkforward.test_years
    );
    println!(
        "  Execution: {} (fee {} bps, slippage {} bps)",
        config.backtest.execution,
        config.backtest.commission.fee_bps,
        config.backtest.slippage.slippage_bps
    );
    println!("  Grid: {} pairs", config.walkforward.grid.total_combinations());
    println!("  Regimes: {}", if config.walkforward.compute_regimes { "on" } else { "off" });
    println!();

    let started = Instant::now();
    let loader = DataLoader::new(&config.data_dir);
    let runner = AggregateRunner::new(config.clone());

    let pb = ProgressBar::new(config.tickers.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let result = runner.run(&loader, &config.tickers, |ticker| {
        pb.set_message(ticker.to_string());
        pb.inc(1);
    });
    pb.finish_and_clear();
    let result = result.context("Walk-forward run failed")?;

    let writer = ResultsWriter::new(&config.output_dir, config.backtest.execution);
    let written = writer
        .write_all(&result, &config)
        .context("Failed to write result tables")?;

    println!("{}", result.summary());
    println!("Wrote {} files in {:.1}s", written.len(), started.elapsed().as_secs_f64());
    println!("Done. results folder: {}", writer.output_dir().display());
    Ok(())
}

fn cmd_single(config: RunConfig, ticker: &str, fast: usize, slow: usize) -> Result<()> {
    if slow <= fast {
        bail!("Slow span ({}) must exceed fast span ({})", slow, fast);
    }
    config.validate().context("Invalid configuration")?;

    let loader = DataLoader::new(&config.data_dir);
    let prices = loader
        .fetch(ticker, config.start)
        .with_context(|| format!("Failed to load prices for {}", ticker))?;

    let signals = make_signals(&prices, fast, slow);
    let result = BacktestEngine::new(config.backtest).run(&signals);

    let ppy = config.walkforward.periods_per_year;
    let strategy = MetricsCalculator::from_backtest(&result, ppy);
    let buy_hold = MetricsCalculator::buy_and_hold(&result, ppy);
    let drawdown = MetricsCalculator::analyze_drawdown(&result);

    println!("{}", SEPARATOR);
    println!("{} {}", ticker, result.summary());
    println!("{}", SEPARATOR);
    println!("Strategy\n{}\n", strategy.summary());
    println!("Buy & Hold\n{}\n", buy_hold.summary());
    if let (Some(peak), Some(trough)) = (drawdown.peak_date, drawdown.trough_date) {
        let recovery = drawdown
            .recovery_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "not recovered".to_string());
        println!(
            "Worst drawdown: {:.2}% (peak {}, trough {}, recovery {})",
            drawdown.max_drawdown * 100.0,
            peak,
            trough,
            recovery
        );
    }

    let writer = ResultsWriter::new(&config.output_dir, config.backtest.execution);
    let path = writer
        .write_equity(ticker, &result)
        .context("Failed to write equity curve")?;
    println!("Equity curve: {}", path.display());
    Ok(())
}

fn cmd_validate(data_dir: &str, tickers: Option<String>, max_gap_days: i64) -> Result<()> {
    let validator = DataIntegrityValidator::new(data_dir).with_max_gap_days(max_gap_days);

    let reports = match tickers {
        Some(list) => parse_tickers(&list)
            .iter()
            .map(|t| validator.validate(t))
            .collect::<Result<Vec<_>, _>>()?,
        None => validator.validate_all()?,
    };

    if reports.is_empty() {
        bail!("No price files found in {}", data_dir);
    }

    let mut failed = 0;
    for report in &reports {
        println!("{}", report.summary());
        for check in report.failed_checks() {
            println!("  FAIL {}: {}", check.name, check.message);
            if let Some(details) = &check.details {
                println!("       {}", details);
            }
        }
        if !report.all_passed() {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} tickers failed validation", failed, reports.len());
    }
    println!("All {} tickers passed", reports.len());
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ema_walkforward=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            common,
            tickers,
            no_regimes,
            train_years,
            test_years,
        } => {
            let mut config = build_config(&common)?;
            if let Some(list) = tickers {
                config.tickers = parse_tickers(&list);
            }
            if no_regimes {
                config.walkforward.compute_regimes = false;
            }
            if let Some(years) = train_years {
                config.walkforward.train_years = years;
            }
            if let Some(years) = test_years {
                config.walkforward.test_years = years;
            }
            cmd_run(config)?;
        }
        Commands::Single {
            common,
            ticker,
            fast,
            slow,
        } => {
            let config = build_config(&common)?;
            cmd_single(config, &ticker.to_uppercase(), fast, slow)?;
        }
        Commands::Validate {
            data_dir,
            tickers,
            max_gap_days,
        } => {
            cmd_validate(&data_dir, tickers, max_gap_days)?;
        }
    }

    Ok(())
}
