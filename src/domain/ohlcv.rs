//! OHLCV bar representation.

use chrono::{Days, NaiveDate};

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// A flat bar where every price field equals `price`.
    pub fn flat(date: NaiveDate, price: f64) -> Self {
        OhlcvBar {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }
}

/// First day of the synthetic calendar used for series without dates.
pub fn synthetic_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 3).unwrap_or(NaiveDate::MIN)
}

/// Turn a plain series of values into flat daily bars on a synthetic calendar.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    let epoch = synthetic_epoch();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let date = epoch
                .checked_add_days(Days::new(i as u64))
                .unwrap_or(NaiveDate::MAX);
            OhlcvBar::flat(date, close)
        })
        .collect()
}
