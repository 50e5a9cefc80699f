//! Cash and position ledger with the per-bar equity curve.
//!
//! Only the broker mutates a `Portfolio`; everyone else sees it through
//! `&Broker`.

use chrono::NaiveDate;

use super::commission::CommissionInfo;
use super::position::{ClosedTrade, Position};

static FLAT: Position = Position {
    size: 0.0,
    price: 0.0,
    opened: None,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub cash: f64,
    pub value: f64,
}

/// Cash effect and bookkeeping of one executed fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillOutcome {
    pub commission: f64,
    /// Realized P&L of the closing part, before commission.
    pub pnl: f64,
    pub cash_delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_cash: f64,
    positions: Vec<Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Portfolio {
            cash: initial_cash,
            initial_cash,
            positions: Vec::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn position(&self, feed: usize) -> &Position {
        self.positions.get(feed).unwrap_or(&FLAT)
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Cash change a fill of `size` at `price` would cause, without applying
    /// it.
    pub fn cash_delta(&self, info: &CommissionInfo, feed: usize, size: f64, price: f64) -> f64 {
        let position = self.position(feed);
        let change = position.split(size);
        let commission = info.commission(size, price);
        match info.margin {
            None => -size * price - commission,
            Some(_) => {
                let released = info.operating_cost(change.closed, price);
                let pnl = info.profit_and_loss(-change.closed, change.prior_price, price);
                let locked = info.operating_cost(change.opened, price);
                released + pnl - locked - commission
            }
        }
    }

    /// Apply a fill to cash and position, recording a closed trade for any
    /// part that reduced the prior position.
    pub fn apply_fill(
        &mut self,
        info: &CommissionInfo,
        feed: usize,
        feed_name: &str,
        size: f64,
        price: f64,
        date: NaiveDate,
    ) -> FillOutcome {
        let cash_delta = self.cash_delta(info, feed, size, price);
        let commission = info.commission(size, price);
        if self.positions.len() <= feed {
            self.positions.resize(feed + 1, Position::default());
        }
        let prior_opened = self.positions[feed].opened;
        let change = self.positions[feed].update(size, price, date);
        self.cash += cash_delta;

        let mut pnl = 0.0;
        if change.closed != 0.0 {
            let held = -change.closed;
            pnl = info.profit_and_loss(held, change.prior_price, price);
            let closing_commission = commission * (change.closed / size).abs();
            self.closed_trades.push(ClosedTrade {
                feed: feed_name.to_string(),
                size: held,
                entry_price: change.prior_price,
                exit_price: price,
                entry_date: prior_opened.unwrap_or(date),
                exit_date: date,
                gross_pnl: pnl,
                commission: closing_commission,
                pnl: pnl - closing_commission,
            });
        }
        FillOutcome {
            commission,
            pnl,
            cash_delta,
        }
    }

    /// Account value: cash plus every position marked at `prices[feed]`.
    pub fn value(&self, infos: &[CommissionInfo], prices: &[f64]) -> f64 {
        let held: f64 = self
            .positions
            .iter()
            .enumerate()
            .filter(|(_, pos)| !pos.is_flat())
            .map(|(feed, pos)| {
                let info = infos.get(feed).copied().unwrap_or_default();
                let price = prices.get(feed).copied().unwrap_or(pos.price);
                info.position_value(pos.size, pos.price, price)
            })
            .sum();
        self.cash + held
    }

    pub fn record_equity(&mut self, date: NaiveDate, value: f64) {
        self.equity_curve.push(EquityPoint {
            date,
            cash: self.cash,
            value,
        });
    }
}
