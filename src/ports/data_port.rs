//! Data access port.

use crate::domain::error::EngineError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `name`, sorted by date and limited to `[start, end]` where
    /// given.
    fn fetch_ohlcv(
        &self,
        name: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, EngineError>;

    fn list_symbols(&self) -> Result<Vec<String>, EngineError>;
}
