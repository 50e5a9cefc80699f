//! Strategies: declare indicators on the graph, then act once per bar.

use std::fmt;

use chrono::NaiveDate;
use log::debug;

use crate::domain::broker::Broker;
use crate::domain::error::EngineError;
use crate::domain::graph::{Graph, GraphBuilder};
use crate::domain::indicator::{CrossDown, CrossOver, CrossUp, Sma};
use crate::domain::line::{LineBuffer, LineRef, NodeId};
use crate::domain::order::{OrderId, OrderNotification, OrderRequest, Side};
use crate::domain::position::Position;

/// What a strategy sees on each bar. The ledger is only reachable through
/// order requests.
pub struct StrategyContext<'a> {
    graph: &'a Graph,
    broker: &'a mut Broker,
    bar: usize,
    stop_requested: bool,
}

impl<'a> StrategyContext<'a> {
    pub fn new(graph: &'a Graph, broker: &'a mut Broker, bar: usize) -> Self {
        StrategyContext {
            graph,
            broker,
            bar,
            stop_requested: false,
        }
    }

    pub fn bar(&self) -> usize {
        self.bar
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.graph.timeline().get(self.bar).copied()
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn line(&self, r: LineRef) -> &LineBuffer {
        self.graph.line(r)
    }

    /// Value of `r`, `ago` bars back from the current bar.
    pub fn get(&self, r: LineRef, ago: isize) -> f64 {
        self.graph.line(r).get(ago)
    }

    pub fn buy(&mut self, feed: usize, size: f64) -> OrderId {
        self.order(feed, OrderRequest::market(Side::Buy, size))
    }

    pub fn sell(&mut self, feed: usize, size: f64) -> OrderId {
        self.order(feed, OrderRequest::market(Side::Sell, size))
    }

    pub fn order(&mut self, feed: usize, request: OrderRequest) -> OrderId {
        self.broker.submit(feed, request)
    }

    pub fn cancel(&mut self, id: OrderId) -> bool {
        self.broker.cancel(id)
    }

    pub fn position(&self, feed: usize) -> &Position {
        self.broker.position(feed)
    }

    pub fn cash(&self) -> f64 {
        self.broker.cash()
    }

    pub fn value(&self) -> f64 {
        self.broker.value()
    }

    /// Finish the current bar, then end the run.
    pub fn stop_run(&mut self) {
        self.stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }
}

pub trait Strategy {
    /// Add the strategy's indicators to the graph. `feeds` are the data
    /// feeds in registration order.
    fn init(&mut self, builder: &mut GraphBuilder, feeds: &[NodeId]) -> Result<(), EngineError>;

    /// Called while some line in the graph is still warming up.
    fn prenext(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn next(&mut self, ctx: &mut StrategyContext<'_>);

    fn notify_order(&mut self, _note: &OrderNotification) {}

    fn stop(&mut self, _broker: &Broker) {}
}

/// Which crossover line drives [`SmaCross`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    /// Signed `CrossOver` node.
    #[default]
    CrossOver,
    /// Separate `CrossUp` / `CrossDown` composites.
    CrossUp,
}

impl Signal {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "crossover" => Some(Signal::CrossOver),
            "crossup" => Some(Signal::CrossUp),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::CrossOver => write!(f, "crossover"),
            Signal::CrossUp => write!(f, "crossup"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmaCrossParams {
    pub fast: usize,
    pub slow: usize,
    pub stake: f64,
    pub signal: Signal,
}

impl Default for SmaCrossParams {
    fn default() -> Self {
        SmaCrossParams {
            fast: 10,
            slow: 30,
            stake: 1.0,
            signal: Signal::CrossOver,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SignalLines {
    Signed(LineRef),
    Split { up: LineRef, down: LineRef },
}

/// Long-only moving-average crossover on the first feed: buy `stake` on an
/// upward cross when flat, close on a downward cross. At most one order is
/// in flight; the lock is released on the order's terminal notification.
pub struct SmaCross {
    params: SmaCrossParams,
    lines: Option<SignalLines>,
    in_flight: Option<OrderId>,
}

impl SmaCross {
    pub fn new(params: SmaCrossParams) -> Self {
        SmaCross {
            params,
            lines: None,
            in_flight: None,
        }
    }

    pub fn params(&self) -> &SmaCrossParams {
        &self.params
    }

    /// `+1` up, `-1` down, `0` otherwise, on the current bar.
    fn direction(&self, ctx: &StrategyContext<'_>) -> i8 {
        match self.lines {
            Some(SignalLines::Signed(line)) => {
                let v = ctx.get(line, 0);
                if v > 0.0 {
                    1
                } else if v < 0.0 {
                    -1
                } else {
                    0
                }
            }
            Some(SignalLines::Split { up, down }) => {
                if ctx.get(up, 0) > 0.0 {
                    1
                } else if ctx.get(down, 0) > 0.0 {
                    -1
                } else {
                    0
                }
            }
            None => 0,
        }
    }
}

impl Strategy for SmaCross {
    fn init(&mut self, builder: &mut GraphBuilder, feeds: &[NodeId]) -> Result<(), EngineError> {
        let Some(&data) = feeds.first() else {
            return Err(EngineError::NoFeeds);
        };
        let fast = builder.add(Sma::new(self.params.fast)?, &[data.into()])?;
        let slow = builder.add(Sma::new(self.params.slow)?, &[data.into()])?;
        let inputs: [LineRef; 2] = [fast.into(), slow.into()];
        self.lines = Some(match self.params.signal {
            Signal::CrossOver => {
                SignalLines::Signed(builder.add(CrossOver::new(), &inputs)?.into())
            }
            Signal::CrossUp => SignalLines::Split {
                up: CrossUp::build(builder, &inputs)?.cross,
                down: CrossDown::build(builder, &inputs)?.cross,
            },
        });
        Ok(())
    }

    fn next(&mut self, ctx: &mut StrategyContext<'_>) {
        if self.in_flight.is_some() {
            return;
        }
        let position = ctx.position(0).size;
        let id = match self.direction(ctx) {
            1 if position == 0.0 => ctx.buy(0, self.params.stake),
            -1 if position > 0.0 => ctx.sell(0, position),
            _ => return,
        };
        debug!("bar {} order {} in flight", ctx.bar(), id);
        self.in_flight = Some(id);
    }

    fn notify_order(&mut self, note: &OrderNotification) {
        if note.is_terminal() && self.in_flight == Some(note.id) {
            self.in_flight = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::DataFeed;
    use crate::domain::order::OrderStatus;
    use crate::domain::scheduler::{RunConfig, Scheduler};

    #[test]
    fn signal_parse() {
        assert_eq!(Signal::parse("CrossOver"), Some(Signal::CrossOver));
        assert_eq!(Signal::parse(" crossup "), Some(Signal::CrossUp));
        assert_eq!(Signal::parse("macd"), None);
        assert_eq!(Signal::CrossUp.to_string(), "crossup");
    }

    #[test]
    fn init_adds_indicators_for_each_signal() {
        for (signal, extra) in [(Signal::CrossOver, 3), (Signal::CrossUp, 2 + 5 + 5)] {
            let mut g = GraphBuilder::new();
            let data = g.add_feed(DataFeed::from_closes("d", &[1.0; 5])).unwrap();
            let mut s = SmaCross::new(SmaCrossParams {
                fast: 2,
                slow: 3,
                stake: 1.0,
                signal,
            });
            s.init(&mut g, &[data]).unwrap();
            assert_eq!(g.len(), 1 + extra);
        }
    }

    #[test]
    fn init_rejects_zero_period() {
        let mut g = GraphBuilder::new();
        let data = g.add_feed(DataFeed::from_closes("d", &[1.0])).unwrap();
        let mut s = SmaCross::new(SmaCrossParams {
            fast: 0,
            ..SmaCrossParams::default()
        });
        assert!(matches!(
            s.init(&mut g, &[data]),
            Err(EngineError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn init_without_feeds_fails() {
        let mut g = GraphBuilder::new();
        let mut s = SmaCross::new(SmaCrossParams::default());
        assert!(matches!(s.init(&mut g, &[]), Err(EngineError::NoFeeds)));
    }

    #[test]
    fn one_order_in_flight_until_terminal() {
        let mut g = GraphBuilder::new();
        let data = g.add_feed(DataFeed::from_closes("d", &[1.0, 2.0, 3.0])).unwrap();
        let mut s = SmaCross::new(SmaCrossParams {
            fast: 1,
            slow: 1,
            stake: 1.0,
            signal: Signal::CrossOver,
        });
        s.init(&mut g, &[data]).unwrap();
        let mut sched = Scheduler::new(g.build(), RunConfig::default()).unwrap();
        let mut broker = Broker::new(100.0);
        sched.step();

        let mut ctx = StrategyContext::new(sched.graph(), &mut broker, 0);
        let id = ctx.buy(0, 1.0);
        s.in_flight = Some(id);
        s.next(&mut ctx);
        assert_eq!(s.in_flight, Some(id));

        let mut note = broker.drain_notifications().remove(0);
        s.notify_order(&note);
        assert_eq!(s.in_flight, Some(id));
        note.status = OrderStatus::Margin;
        s.notify_order(&note);
        assert_eq!(s.in_flight, None);
    }

    #[test]
    fn context_stop_request() {
        let mut g = GraphBuilder::new();
        g.add_feed(DataFeed::from_closes("d", &[1.0])).unwrap();
        let graph = g.build();
        let mut broker = Broker::new(1.0);
        let mut ctx = StrategyContext::new(&graph, &mut broker, 0);
        assert!(!ctx.stop_requested());
        ctx.stop_run();
        assert!(ctx.stop_requested());
        assert_eq!(ctx.cash(), 1.0);
    }
}
