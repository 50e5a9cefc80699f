//! Run orchestration: feeds, graph, broker and strategy wired into one
//! bar loop.
//!
//! Per bar: the scheduler advances the graph, the broker processes live
//! orders against the new bar, the strategy hears about every transition and
//! then runs (`prenext` during warmup, `next` after), and the equity point is
//! recorded. Teardown runs whether the data ran out or the strategy asked to
//! stop.

use chrono::NaiveDate;
use log::info;
use rayon::prelude::*;

use crate::domain::broker::Broker;
use crate::domain::commission::CommissionInfo;
use crate::domain::error::EngineError;
use crate::domain::graph::{Graph, GraphBuilder};
use crate::domain::indicator::feed::DataFeed;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::order::OrderNotification;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::ClosedTrade;
use crate::domain::scheduler::{RunConfig, Scheduler};
use crate::domain::strategy::{Strategy, StrategyContext};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub run: RunConfig,
    pub cash: f64,
    pub commission: CommissionInfo,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            run: RunConfig::default(),
            cash: 100_000.0,
            commission: CommissionInfo::default(),
        }
    }
}

/// Values of one output line over the bars that were run.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedLine {
    pub node: String,
    pub line: &'static str,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub config: RunConfig,
    pub bars: usize,
    pub stopped_early: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub lines: Vec<NamedLine>,
    pub equity_curve: Vec<EquityPoint>,
    pub orders: Vec<OrderNotification>,
    pub closed_trades: Vec<ClosedTrade>,
    pub open_orders: usize,
    pub initial_cash: f64,
    pub final_cash: f64,
    pub final_value: f64,
    pub metrics: Metrics,
}

impl RunResult {
    /// First line whose node label and line name match.
    pub fn line(&self, node: &str, line: &str) -> Option<&NamedLine> {
        self.lines.iter().find(|l| l.node == node && l.line == line)
    }
}

pub struct Cerebro<S: Strategy> {
    strategy: S,
    config: BacktestConfig,
    feeds: Vec<DataFeed>,
    broker: Broker,
}

impl<S: Strategy> Cerebro<S> {
    pub fn new(strategy: S, config: BacktestConfig) -> Self {
        let mut broker = Broker::new(config.cash);
        broker.set_commission(config.commission);
        Cerebro {
            strategy,
            config,
            feeds: Vec::new(),
            broker,
        }
    }

    /// Register a data feed. Returns its feed index.
    pub fn add_feed(&mut self, feed: DataFeed) -> usize {
        self.feeds.push(feed);
        self.feeds.len() - 1
    }

    /// Commission model for one feed, overriding the configured default.
    pub fn set_feed_commission(&mut self, feed: usize, info: CommissionInfo) {
        self.broker.set_feed_commission(feed, info);
    }

    pub fn run(self) -> Result<RunResult, EngineError> {
        let Cerebro {
            mut strategy,
            config,
            feeds,
            mut broker,
        } = self;
        if feeds.is_empty() {
            return Err(EngineError::NoFeeds);
        }

        let mut builder = GraphBuilder::new();
        let mut names = Vec::with_capacity(feeds.len());
        let mut ids = Vec::with_capacity(feeds.len());
        for feed in feeds {
            if feed.is_empty() {
                return Err(EngineError::NoData {
                    name: feed.name().to_string(),
                });
            }
            names.push(feed.name().to_string());
            ids.push(builder.add_feed(feed)?);
        }
        strategy.init(&mut builder, &ids)?;

        let mut scheduler = Scheduler::new(builder.build(), config.run)?;
        let warmup = scheduler.graph().max_minperiod();
        broker.attach_feeds(names);
        info!(
            "run: {} bars, strategy warmup {} bars, cash {:.2}",
            scheduler.len(),
            warmup,
            broker.cash()
        );

        scheduler.start();
        let mut bars = 0;
        let mut stopped_early = false;
        while let Some(bar) = scheduler.step() {
            bars = bar + 1;
            broker.process_bar(scheduler.graph(), bar);
            deliver(&mut strategy, &mut broker);

            let mut ctx = StrategyContext::new(scheduler.graph(), &mut broker, bar);
            if bar + 1 < warmup {
                strategy.prenext(&mut ctx);
            } else {
                strategy.next(&mut ctx);
            }
            let stop = ctx.stop_requested();
            deliver(&mut strategy, &mut broker);
            broker.record_equity();

            if stop {
                info!("strategy requested stop at bar {bar}");
                stopped_early = bar + 1 < scheduler.len();
                break;
            }
        }

        strategy.stop(&broker);
        scheduler.stop();
        let graph = scheduler.into_graph();
        let lines = collect_lines(&graph, bars);
        let timeline = graph.timeline();
        let open_orders = broker.pending_count();
        let final_cash = broker.cash();
        let final_value = broker.value();
        let orders = broker.history().to_vec();
        let ledger = broker.into_ledger();
        let metrics = Metrics::compute(&ledger);
        info!(
            "run done: {} bars, value {:.2}, return {:.2}%",
            bars,
            final_value,
            metrics.total_return * 100.0
        );

        Ok(RunResult {
            config: config.run,
            bars,
            stopped_early,
            start_date: timeline.first().copied(),
            end_date: bars.checked_sub(1).and_then(|i| timeline.get(i).copied()),
            lines,
            equity_curve: ledger.equity_curve,
            orders,
            closed_trades: ledger.closed_trades,
            open_orders,
            initial_cash: ledger.initial_cash,
            final_cash,
            final_value,
            metrics,
        })
    }
}

fn deliver<S: Strategy>(strategy: &mut S, broker: &mut Broker) {
    for note in broker.drain_notifications() {
        strategy.notify_order(&note);
    }
}

fn collect_lines(graph: &Graph, bars: usize) -> Vec<NamedLine> {
    graph
        .node_ids()
        .flat_map(|id| {
            let label = graph.label(id).to_string();
            graph.lines(id).iter().map(move |(name, buffer)| {
                let slice = buffer.as_slice();
                NamedLine {
                    node: label.clone(),
                    line: name,
                    values: slice[..bars.min(slice.len())].to_vec(),
                }
            })
        })
        .collect()
}

/// Run one backtest per parameter set, in parallel. Every run gets its own
/// copy of the bars and its own `Cerebro`; results come back in `params`
/// order.
pub fn run_many<P, S, F>(
    params: &[P],
    feeds: &[(String, Vec<OhlcvBar>)],
    config: &BacktestConfig,
    make: F,
) -> Vec<Result<RunResult, EngineError>>
where
    P: Sync,
    S: Strategy,
    F: Fn(&P) -> S + Sync,
{
    params
        .par_iter()
        .map(|p| {
            let mut cerebro = Cerebro::new(make(p), config.clone());
            for (name, bars) in feeds {
                cerebro.add_feed(DataFeed::new(name, bars.clone()));
            }
            cerebro.run()
        })
        .collect()
}
