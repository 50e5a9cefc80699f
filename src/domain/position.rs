//! Position tracking: signed size, average price, and closed trades.

use chrono::NaiveDate;

/// Net holding in one instrument. Positive size is long.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    pub size: f64,
    pub price: f64,
    pub opened: Option<NaiveDate>,
}

/// How a fill split against the existing position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionChange {
    /// Part of the fill that reduced the prior position (same sign as the
    /// fill).
    pub closed: f64,
    /// Part of the fill that opened or extended a position.
    pub opened: f64,
    /// Average price of the position before the fill.
    pub prior_price: f64,
    /// Signed size before the fill.
    pub prior_size: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }

    /// Split a signed fill into closing and opening parts without applying
    /// it.
    pub fn split(&self, size: f64) -> PositionChange {
        let opposite = self.size != 0.0 && self.size.signum() != size.signum();
        let closed = if opposite {
            size.signum() * size.abs().min(self.size.abs())
        } else {
            0.0
        };
        PositionChange {
            closed,
            opened: size - closed,
            prior_price: self.price,
            prior_size: self.size,
        }
    }

    /// Apply a signed fill at `price`.
    pub fn update(&mut self, size: f64, price: f64, date: NaiveDate) -> PositionChange {
        let change = self.split(size);
        let new_size = self.size + size;
        if change.opened != 0.0 {
            if change.closed != 0.0 || self.size == 0.0 {
                // Flipped through zero or opened from flat.
                self.price = price;
                self.opened = Some(date);
            } else {
                self.price = (self.size * self.price + size * price) / new_size;
            }
        }
        self.size = new_size;
        if self.size == 0.0 {
            self.price = 0.0;
            self.opened = None;
        }
        change
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub feed: String,
    /// Signed size of the closed holding (positive for a long).
    pub size: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    /// P&L before commission.
    pub gross_pnl: f64,
    pub commission: f64,
    /// P&L net of the closing commission.
    pub pnl: f64,
}
