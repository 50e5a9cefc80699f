//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, Cerebro, RunResult};
use crate::domain::config_validation::{DataSettings, Settings, load_settings};
use crate::domain::equivalence::{self, Divergence};
use crate::domain::error::EngineError;
use crate::domain::graph::GraphBuilder;
use crate::domain::indicator::DataFeed;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::scheduler::{RunConfig, RunMode};
use crate::domain::strategy::{SmaCross, Strategy};
use crate::ports::data_port::DataPort;

/// Exit status of `verify` when two run configurations disagree.
pub const DIVERGENCE_EXIT: u8 = 6;

#[derive(Parser, Debug)]
#[command(name = "linetrader", about = "Line-based indicator engine and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Override `[run] mode`: incremental or batch
        #[arg(long)]
        mode: Option<String>,
        /// Pre-size every line buffer before the first bar
        #[arg(long)]
        pregrow: bool,
    },
    /// Evaluate the configured graph and run under every mode and report the
    /// first disagreement
    Verify {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the feeds available in the configured data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            mode,
            pregrow,
        } => run_backtest(&config, mode.as_deref(), pregrow),
        Command::Verify { config } => run_verify(&config),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

fn fail(err: &EngineError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<Settings, EngineError> {
    info!("loading config from {}", path.display());
    let adapter = FileConfigAdapter::from_file(path)?;
    load_settings(&adapter)
}

/// Apply the command-line overrides on top of the configured run mode.
pub fn apply_overrides(
    run: RunConfig,
    mode: Option<&str>,
    pregrow: bool,
) -> Result<RunConfig, EngineError> {
    let mode = match mode {
        None => run.mode,
        Some(s) => RunMode::parse(s).ok_or_else(|| EngineError::ConfigInvalid {
            section: "run".into(),
            key: "mode".into(),
            reason: format!("unknown mode {s:?}, expected incremental or batch"),
        })?,
    };
    Ok(RunConfig::new(mode, run.pregrow || pregrow))
}

/// Fetch every configured feed. Feeds must cover the same number of bars.
pub fn load_feeds(
    data_port: &dyn DataPort,
    data: &DataSettings,
) -> Result<Vec<(String, Vec<OhlcvBar>)>, EngineError> {
    let mut feeds = Vec::with_capacity(data.feeds.len());
    for name in &data.feeds {
        let bars = data_port.fetch_ohlcv(name, data.start, data.end)?;
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(EngineError::NoData { name: name.clone() });
        };
        info!("feed {}: {} bars, {} to {}", name, bars.len(), first.date, last.date);
        feeds.push((name.clone(), bars));
    }
    Ok(feeds)
}

fn cerebro(
    feeds: &[(String, Vec<OhlcvBar>)],
    settings: &Settings,
    config: BacktestConfig,
) -> Cerebro<SmaCross> {
    let mut cerebro = Cerebro::new(SmaCross::new(settings.strategy), config);
    for (name, bars) in feeds {
        cerebro.add_feed(DataFeed::new(name, bars.clone()));
    }
    cerebro
}

pub fn run_pipeline(
    data_port: &dyn DataPort,
    settings: &Settings,
    run: RunConfig,
) -> Result<RunResult, EngineError> {
    let feeds = load_feeds(data_port, &settings.data)?;
    let config = BacktestConfig {
        run,
        ..settings.backtest.clone()
    };
    info!(
        "running {} feed(s), mode {}, pregrow {}",
        feeds.len(),
        run.mode,
        run.pregrow
    );
    cerebro(&feeds, settings, config).run()
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// Every configuration produced the same lines and the same run.
    Agree { bars: usize, lines: usize },
    Lines(Divergence),
    /// Lines agree but the order flow or equity differ.
    Run {
        left: RunConfig,
        right: RunConfig,
        what: &'static str,
    },
}

pub fn verify_pipeline(
    data_port: &dyn DataPort,
    settings: &Settings,
) -> Result<VerifyOutcome, EngineError> {
    let feeds = load_feeds(data_port, &settings.data)?;
    let build = || -> Result<GraphBuilder, EngineError> {
        let mut builder = GraphBuilder::new();
        let mut ids = Vec::with_capacity(feeds.len());
        for (name, bars) in &feeds {
            ids.push(builder.add_feed(DataFeed::new(name, bars.clone()))?);
        }
        SmaCross::new(settings.strategy).init(&mut builder, &ids)?;
        Ok(builder)
    };
    if let Some(divergence) = equivalence::verify(build)? {
        return Ok(VerifyOutcome::Lines(divergence));
    }

    let configs = RunConfig::all();
    let mut runs = Vec::with_capacity(configs.len());
    for run in configs {
        let config = BacktestConfig {
            run,
            ..settings.backtest.clone()
        };
        runs.push(cerebro(&feeds, settings, config).run()?);
    }
    let base = &runs[0];
    for other in &runs[1..] {
        let what = if other.orders != base.orders {
            Some("order notifications")
        } else if other.equity_curve != base.equity_curve {
            Some("equity curve")
        } else {
            None
        };
        if let Some(what) = what {
            return Ok(VerifyOutcome::Run {
                left: base.config,
                right: other.config,
                what,
            });
        }
    }
    Ok(VerifyOutcome::Agree {
        bars: base.bars,
        lines: base.lines.len(),
    })
}

pub fn format_summary(result: &RunResult) -> String {
    let m = &result.metrics;
    let mut out = String::from("=== Run Summary ===\n");
    out.push_str(&format!(
        "Mode:             {} (pregrow {})\n",
        result.config.mode, result.config.pregrow
    ));
    if let (Some(start), Some(end)) = (result.start_date, result.end_date) {
        out.push_str(&format!("Period:           {start} to {end}\n"));
    }
    let stopped = if result.stopped_early {
        " (stopped early)"
    } else {
        ""
    };
    out.push_str(&format!("Bars:             {}{stopped}\n", result.bars));
    out.push_str(&format!("Initial Cash:     {:.2}\n", result.initial_cash));
    out.push_str(&format!("Final Value:      {:.2}\n", result.final_value));
    out.push_str(&format!("Total Return:     {:.2}%\n", m.total_return * 100.0));
    out.push_str(&format!("Annualized:       {:.2}%\n", m.annualized_return * 100.0));
    out.push_str(&format!("Sharpe Ratio:     {:.2}\n", m.sharpe_ratio));
    out.push_str(&format!(
        "Max Drawdown:     -{:.1}% over {} bars\n",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    ));
    out.push_str(&format!(
        "Total Trades:     {} ({} won, {} lost)\n",
        m.total_trades, m.trades_won, m.trades_lost
    ));
    out.push_str(&format!("Win Rate:         {:.1}%\n", m.win_rate * 100.0));
    out.push_str(&format!("Profit Factor:    {:.2}\n", m.profit_factor));
    out.push_str(&format!("Net P&L:          {:.2}\n", m.net_pnl));
    out.push_str(&format!("Commission:       {:.2}\n", m.total_commission));
    out.push_str(&format!(
        "Orders:           {} notifications, {} still open",
        result.orders.len(),
        result.open_orders
    ));
    out
}

fn run_backtest(config_path: &Path, mode: Option<&str>, pregrow: bool) -> ExitCode {
    let settings = match load_config(config_path) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let run = match apply_overrides(settings.backtest.run, mode, pregrow) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let data_port = CsvAdapter::new(settings.data.path.clone());
    match run_pipeline(&data_port, &settings, run) {
        Ok(result) => {
            println!("{}", format_summary(&result));
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_verify(config_path: &Path) -> ExitCode {
    let settings = match load_config(config_path) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let data_port = CsvAdapter::new(settings.data.path.clone());
    match verify_pipeline(&data_port, &settings) {
        Ok(VerifyOutcome::Agree { bars, lines }) => {
            println!("ok: {lines} lines over {bars} bars agree under all run configurations");
            ExitCode::SUCCESS
        }
        Ok(VerifyOutcome::Lines(d)) => {
            warn!("line divergence: {d}");
            println!("divergence: {d}");
            ExitCode::from(DIVERGENCE_EXIT)
        }
        Ok(VerifyOutcome::Run { left, right, what }) => {
            println!(
                "divergence: {what} differ between {} (pregrow {}) and {} (pregrow {})",
                left.mode, left.pregrow, right.mode, right.pregrow
            );
            ExitCode::from(DIVERGENCE_EXIT)
        }
        Err(e) => fail(&e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    match load_config(config_path) {
        Ok(settings) => {
            println!("config is valid");
            println!(
                "  run:      {} (pregrow {})",
                settings.backtest.run.mode, settings.backtest.run.pregrow
            );
            println!(
                "  data:     {} [{}]",
                settings.data.path.display(),
                settings.data.feeds.join(", ")
            );
            println!("  cash:     {:.2}", settings.backtest.cash);
            println!(
                "  strategy: sma {} / {}, stake {}, signal {}",
                settings.strategy.fast,
                settings.strategy.slow,
                settings.strategy.stake,
                settings.strategy.signal
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let settings = match load_config(config_path) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    match CsvAdapter::new(settings.data.path).list_symbols() {
        Ok(symbols) => {
            for s in symbols {
                println!("{s}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
