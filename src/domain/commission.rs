//! Per-instrument commission and cost model.
//!
//! Stock-like instruments (no margin) pay a fraction of traded value and tie
//! up the full price. Futures-like instruments (margin set) pay a fixed
//! amount per unit, tie up `margin` per unit, and scale P&L by `multiplier`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommissionInfo {
    pub commission: f64,
    pub multiplier: f64,
    pub margin: Option<f64>,
}

impl Default for CommissionInfo {
    fn default() -> Self {
        CommissionInfo::stocklike(0.0)
    }
}

impl CommissionInfo {
    /// `commission` is a fraction of traded value (0.001 = 0.1%).
    pub fn stocklike(commission: f64) -> Self {
        CommissionInfo {
            commission,
            multiplier: 1.0,
            margin: None,
        }
    }

    /// `commission` is charged per unit traded.
    pub fn futures(commission: f64, multiplier: f64, margin: f64) -> Self {
        CommissionInfo {
            commission,
            multiplier,
            margin: Some(margin),
        }
    }

    pub fn is_stocklike(&self) -> bool {
        self.margin.is_none()
    }

    pub fn commission(&self, size: f64, price: f64) -> f64 {
        match self.margin {
            None => size.abs() * price * self.commission,
            Some(_) => size.abs() * self.commission,
        }
    }

    /// Cash tied up by holding `size` units at `price`.
    pub fn operating_cost(&self, size: f64, price: f64) -> f64 {
        match self.margin {
            None => size.abs() * price,
            Some(margin) => size.abs() * margin,
        }
    }

    /// P&L of `size` units (signed, as held) moving from `entry` to `exit`.
    pub fn profit_and_loss(&self, size: f64, entry: f64, exit: f64) -> f64 {
        size * (exit - entry) * self.multiplier
    }

    /// Contribution of a position to account value at `price`.
    pub fn position_value(&self, size: f64, avg_price: f64, price: f64) -> f64 {
        match self.margin {
            None => size * price,
            Some(margin) => size.abs() * margin + self.profit_and_loss(size, avg_price, price),
        }
    }
}
