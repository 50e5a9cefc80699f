//! Configuration loading and validation.
//!
//! Every value is read as a string and parsed here, so a malformed number
//! is reported as `ConfigInvalid` instead of falling back to a default.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::backtest::BacktestConfig;
use crate::domain::commission::CommissionInfo;
use crate::domain::error::EngineError;
use crate::domain::scheduler::{RunConfig, RunMode};
use crate::domain::strategy::{Signal, SmaCrossParams};
use crate::ports::config_port::ConfigPort;

/// Where the bars come from.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub path: PathBuf,
    pub feeds: Vec<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Everything a `run` needs, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backtest: BacktestConfig,
    pub data: DataSettings,
    pub strategy: SmaCrossParams,
}

pub fn load_settings(config: &dyn ConfigPort) -> Result<Settings, EngineError> {
    let run = run_config(config)?;
    let (cash, commission) = broker_settings(config)?;
    Ok(Settings {
        backtest: BacktestConfig {
            run,
            cash,
            commission,
        },
        data: data_settings(config)?,
        strategy: strategy_params(config)?,
    })
}

/// `[run]`: `mode` (default incremental) and `pregrow` (default false).
pub fn run_config(config: &dyn ConfigPort) -> Result<RunConfig, EngineError> {
    let mode = match config.get_string("run", "mode") {
        None => RunMode::default(),
        Some(s) => RunMode::parse(&s)
            .ok_or_else(|| invalid("run", "mode", "expected incremental or batch"))?,
    };
    let pregrow = config.get_bool("run", "pregrow", false);
    Ok(RunConfig::new(mode, pregrow))
}

/// `[broker]`: starting cash and the default commission scheme.
pub fn broker_settings(config: &dyn ConfigPort) -> Result<(f64, CommissionInfo), EngineError> {
    let cash = parse(config, "broker", "cash")?.unwrap_or(BacktestConfig::default().cash);
    if cash <= 0.0 {
        return Err(invalid("broker", "cash", "cash must be positive"));
    }

    let commission = parse(config, "broker", "commission")?.unwrap_or(0.0);
    if commission < 0.0 {
        return Err(invalid("broker", "commission", "commission must be non-negative"));
    }

    let multiplier = parse(config, "broker", "multiplier")?.unwrap_or(1.0);
    if multiplier <= 0.0 {
        return Err(invalid("broker", "multiplier", "multiplier must be positive"));
    }

    let info = match parse::<f64>(config, "broker", "margin")? {
        None => {
            if multiplier != 1.0 {
                return Err(invalid("broker", "multiplier", "multiplier requires margin"));
            }
            CommissionInfo::stocklike(commission)
        }
        Some(margin) if margin > 0.0 => CommissionInfo::futures(commission, multiplier, margin),
        Some(_) => return Err(invalid("broker", "margin", "margin must be positive")),
    };
    Ok((cash, info))
}

/// `[data]`: directory, feed names and an optional date range.
pub fn data_settings(config: &dyn ConfigPort) -> Result<DataSettings, EngineError> {
    let path = required(config, "data", "path")?;
    let feeds: Vec<String> = required(config, "data", "feeds")?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if feeds.is_empty() {
        return Err(invalid("data", "feeds", "at least one feed is required"));
    }

    let start = date(config, "start_date")?;
    let end = date(config, "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(invalid("data", "start_date", "start_date must not be after end_date"));
        }
    }
    Ok(DataSettings {
        path: PathBuf::from(path),
        feeds,
        start,
        end,
    })
}

/// `[strategy]`: the crossover strategy's parameters. The whole section is
/// optional.
pub fn strategy_params(config: &dyn ConfigPort) -> Result<SmaCrossParams, EngineError> {
    let defaults = SmaCrossParams::default();
    let fast = parse(config, "strategy", "fast")?.unwrap_or(defaults.fast);
    let slow = parse(config, "strategy", "slow")?.unwrap_or(defaults.slow);
    if fast == 0 {
        return Err(invalid("strategy", "fast", "fast must be at least 1"));
    }
    if slow == 0 {
        return Err(invalid("strategy", "slow", "slow must be at least 1"));
    }
    if fast >= slow {
        return Err(invalid("strategy", "fast", "fast must be shorter than slow"));
    }

    let stake = parse(config, "strategy", "stake")?.unwrap_or(defaults.stake);
    if !stake.is_finite() || stake <= 0.0 {
        return Err(invalid("strategy", "stake", "stake must be positive"));
    }

    let signal = match config.get_string("strategy", "signal") {
        None => defaults.signal,
        Some(s) => Signal::parse(&s).ok_or_else(|| {
            invalid("strategy", "signal", "expected crossover or crossup")
        })?,
    };
    Ok(SmaCrossParams {
        fast,
        slow,
        stake,
        signal,
    })
}

fn invalid(section: &str, key: &str, reason: &str) -> EngineError {
    EngineError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, EngineError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(EngineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn parse<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, EngineError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, &format!("cannot parse {s:?}"))),
    }
}

fn date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, EngineError> {
    match config.get_string("data", key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid("data", key, &format!("invalid {key} format, expected YYYY-MM-DD"))
            }),
    }
}
