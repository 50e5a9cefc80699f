#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use linetrader::domain::error::EngineError;
pub use linetrader::domain::ohlcv::OhlcvBar;
use linetrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, name: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(name.to_string(), bars);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        name: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, EngineError> {
        let bars: Vec<OhlcvBar> = self
            .data
            .get(name)
            .map(|bars| {
                bars.iter()
                    .filter(|b| {
                        start.is_none_or(|s| b.date >= s) && end.is_none_or(|e| b.date <= e)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(EngineError::NoData {
                name: name.to_string(),
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, EngineError> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn day(i: usize) -> NaiveDate {
    date("2023-01-02").checked_add_days(Days::new(i as u64)).unwrap()
}

pub fn make_bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
    OhlcvBar {
        date: day(i),
        open,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

/// Bars oscillating around 100 with a slow drift; opens gap slightly from
/// the previous close so every price field is distinct.
pub fn wave_bars(n: usize) -> Vec<OhlcvBar> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + 8.0 * (x / 6.0).sin() + 0.05 * x;
            let open = close - 0.5 * (x / 3.0).cos();
            make_bar(i, open, open.max(close) + 1.0, open.min(close) - 1.0, close)
        })
        .collect()
}

pub fn write_csv(dir: &Path, name: &str, bars: &[OhlcvBar]) {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    std::fs::write(dir.join(format!("{name}.csv")), out).unwrap();
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
