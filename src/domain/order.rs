//! Orders and their lifecycle.
//!
//! ```text
//! Created -> Submitted -> Accepted -> Completed | Expired | Canceled | Margin
//!                      \-> Margin | Canceled
//! ```
//!
//! Each state is its own type. Transitions consume the order and return it in
//! the next state, and terminal states have no transition methods, so an
//! order can never leave a terminal state.

use std::fmt;

use chrono::NaiveDate;

use crate::domain::commission::CommissionInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// How and at what price an order may fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecType {
    /// Next bar's open.
    Market,
    /// Next bar's close.
    Close,
    Limit(f64),
    Stop(f64),
}

impl ExecType {
    pub fn price(&self) -> Option<f64> {
        match self {
            ExecType::Market | ExecType::Close => None,
            ExecType::Limit(p) | ExecType::Stop(p) => Some(*p),
        }
    }
}

impl fmt::Display for ExecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecType::Market => write!(f, "Market"),
            ExecType::Close => write!(f, "Close"),
            ExecType::Limit(p) => write!(f, "Limit({p})"),
            ExecType::Stop(p) => write!(f, "Stop({p})"),
        }
    }
}

/// What a strategy asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    /// Unsigned quantity; the side carries the direction.
    pub size: f64,
    pub exec: ExecType,
    /// Bars after acceptance the order stays live. `None` is good till
    /// canceled.
    pub valid: Option<usize>,
}

impl OrderRequest {
    pub fn market(side: Side, size: f64) -> Self {
        OrderRequest {
            side,
            size,
            exec: ExecType::Market,
            valid: None,
        }
    }

    pub fn with_exec(mut self, exec: ExecType) -> Self {
        self.exec = exec;
        self
    }

    pub fn with_valid(mut self, bars: usize) -> Self {
        self.valid = Some(bars);
        self
    }

    /// Signed size: positive for buys.
    pub fn signed_size(&self) -> f64 {
        self.side.sign() * self.size
    }

    /// Reason the request cannot be accepted, if any.
    pub fn rejection(&self) -> Option<&'static str> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Some("size must be a positive number");
        }
        if let Some(p) = self.exec.price() {
            if !p.is_finite() {
                return Some("priced order needs a finite price");
            }
        }
        if self.valid == Some(0) {
            return Some("validity must be at least one bar");
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Created,
    Submitted,
    Accepted,
    Completed,
    Expired,
    Canceled,
    Margin,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Expired
                | OrderStatus::Canceled
                | OrderStatus::Margin
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Created => "Created",
            OrderStatus::Submitted => "Submitted",
            OrderStatus::Accepted => "Accepted",
            OrderStatus::Completed => "Completed",
            OrderStatus::Expired => "Expired",
            OrderStatus::Canceled => "Canceled",
            OrderStatus::Margin => "Margin",
        };
        write!(f, "{s}")
    }
}

/// Executed fill details.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Execution {
    pub bar: usize,
    pub date: NaiveDate,
    pub price: f64,
    /// Signed executed size.
    pub size: f64,
    pub value: f64,
    pub commission: f64,
    /// Realized P&L of any closing part, before commission.
    pub pnl: f64,
}

mod sealed {
    pub trait Sealed {}
}

/// Marker for order state types.
pub trait OrderState: sealed::Sealed {
    const STATUS: OrderStatus;

    fn execution(&self) -> Option<&Execution> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Created;

#[derive(Debug, Clone)]
pub struct Submitted {
    pub bar: usize,
}

#[derive(Debug, Clone)]
pub struct Accepted {
    pub bar: usize,
}

#[derive(Debug, Clone)]
pub struct Completed {
    pub execution: Execution,
}

#[derive(Debug, Clone)]
pub struct Expired {
    pub bar: usize,
}

#[derive(Debug, Clone)]
pub struct Canceled {
    pub bar: usize,
    pub reason: &'static str,
}

#[derive(Debug, Clone)]
pub struct Margin {
    pub bar: usize,
}

macro_rules! order_state {
    ($($ty:ident => $status:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl OrderState for $ty {
                const STATUS: OrderStatus = OrderStatus::$status;
            }
        )*
    };
}

order_state! {
    Created => Created,
    Submitted => Submitted,
    Accepted => Accepted,
    Expired => Expired,
    Canceled => Canceled,
    Margin => Margin,
}

impl sealed::Sealed for Completed {}
impl OrderState for Completed {
    const STATUS: OrderStatus = OrderStatus::Completed;

    fn execution(&self) -> Option<&Execution> {
        Some(&self.execution)
    }
}

#[derive(Debug, Clone)]
pub struct Order<S: OrderState> {
    id: OrderId,
    feed: usize,
    request: OrderRequest,
    comminfo: CommissionInfo,
    state: S,
}

impl<S: OrderState> Order<S> {
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Index of the data feed the order trades.
    pub fn feed(&self) -> usize {
        self.feed
    }

    pub fn request(&self) -> &OrderRequest {
        &self.request
    }

    pub fn comminfo(&self) -> &CommissionInfo {
        &self.comminfo
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn status(&self) -> OrderStatus {
        S::STATUS
    }

    pub fn is_terminal(&self) -> bool {
        S::STATUS.is_terminal()
    }

    fn into_state<T: OrderState>(self, state: T) -> Order<T> {
        Order {
            id: self.id,
            feed: self.feed,
            request: self.request,
            comminfo: self.comminfo,
            state,
        }
    }

    /// Snapshot sent to the strategy.
    pub fn notification(&self, bar: usize, date: NaiveDate) -> OrderNotification {
        OrderNotification {
            id: self.id,
            feed: self.feed,
            status: S::STATUS,
            request: self.request,
            bar,
            date,
            execution: self.state.execution().copied(),
            reason: None,
        }
    }
}

impl Order<Created> {
    pub fn new(id: OrderId, feed: usize, request: OrderRequest, comminfo: CommissionInfo) -> Self {
        Order {
            id,
            feed,
            request,
            comminfo,
            state: Created,
        }
    }

    pub fn submit(self, bar: usize) -> Order<Submitted> {
        self.into_state(Submitted { bar })
    }
}

impl Order<Submitted> {
    pub fn submitted_bar(&self) -> usize {
        self.state.bar
    }

    pub fn accept(self, bar: usize) -> Order<Accepted> {
        self.into_state(Accepted { bar })
    }

    pub fn margin(self, bar: usize) -> Order<Margin> {
        self.into_state(Margin { bar })
    }

    pub fn cancel(self, bar: usize, reason: &'static str) -> Order<Canceled> {
        self.into_state(Canceled { bar, reason })
    }
}

impl Order<Accepted> {
    pub fn accepted_bar(&self) -> usize {
        self.state.bar
    }

    /// Whether the validity window has run out by `bar`.
    pub fn is_expired_at(&self, bar: usize) -> bool {
        self.request
            .valid
            .is_some_and(|valid| bar >= self.state.bar + valid)
    }

    pub fn complete(self, execution: Execution) -> Order<Completed> {
        self.into_state(Completed { execution })
    }

    pub fn expire(self, bar: usize) -> Order<Expired> {
        self.into_state(Expired { bar })
    }

    pub fn cancel(self, bar: usize, reason: &'static str) -> Order<Canceled> {
        self.into_state(Canceled { bar, reason })
    }

    pub fn margin(self, bar: usize) -> Order<Margin> {
        self.into_state(Margin { bar })
    }
}

impl Order<Completed> {
    pub fn execution(&self) -> &Execution {
        &self.state.execution
    }
}

impl Order<Canceled> {
    pub fn reason(&self) -> &'static str {
        self.state.reason
    }
}

/// Status change delivered to `Strategy::notify_order`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderNotification {
    pub id: OrderId,
    pub feed: usize,
    pub status: OrderStatus,
    pub request: OrderRequest,
    pub bar: usize,
    pub date: NaiveDate,
    pub execution: Option<Execution>,
    pub reason: Option<&'static str>,
}

impl OrderNotification {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }
}

impl fmt::Display for OrderNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.date, self.id, self.status, self.request.side, self.request.size, self.request.exec
        )?;
        if let Some(exec) = &self.execution {
            write!(f, " @ {:.4} comm {:.4}", exec.price, exec.commission)?;
        }
        if let Some(reason) = self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}
