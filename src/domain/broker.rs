//! Simulated broker: order queue, matching and the cash/position ledger.
//!
//! Per bar, before the strategy runs, live orders are processed in
//! submission order:
//!
//! 1. `Submitted` orders from an earlier bar are validated (`Canceled` on a
//!    bad request) and funds-checked at the estimated fill price (`Margin`
//!    if short), then `Accepted`.
//! 2. `Accepted` orders past their validity window are `Expired`.
//! 3. The rest are matched against the bar; a match is re-checked against
//!    cash at the actual price (`Margin` if short) and otherwise executed,
//!    updating the ledger exactly once (`Completed`).
//!
//! Every transition is queued as an [`OrderNotification`] for the strategy.

use std::collections::VecDeque;

use chrono::NaiveDate;
use log::{debug, info};

use crate::domain::commission::CommissionInfo;
use crate::domain::execution::{BarPrices, estimate_price, match_price};
use crate::domain::graph::Graph;
use crate::domain::order::{
    Accepted, Execution, Order, OrderId, OrderNotification, OrderRequest, Submitted,
};
use crate::domain::portfolio::Portfolio;
use crate::domain::position::Position;

enum LiveOrder {
    Submitted(Order<Submitted>),
    Accepted(Order<Accepted>),
}

impl LiveOrder {
    fn id(&self) -> OrderId {
        match self {
            LiveOrder::Submitted(o) => o.id(),
            LiveOrder::Accepted(o) => o.id(),
        }
    }
}

pub struct Broker {
    ledger: Portfolio,
    default_comminfo: CommissionInfo,
    comminfo: Vec<Option<CommissionInfo>>,
    feed_names: Vec<String>,
    marks: Vec<f64>,
    pending: Vec<LiveOrder>,
    next_id: u64,
    bar: usize,
    date: Option<NaiveDate>,
    notifications: VecDeque<OrderNotification>,
    history: Vec<OrderNotification>,
}

impl Broker {
    pub fn new(cash: f64) -> Self {
        Broker {
            ledger: Portfolio::new(cash),
            default_comminfo: CommissionInfo::default(),
            comminfo: Vec::new(),
            feed_names: Vec::new(),
            marks: Vec::new(),
            pending: Vec::new(),
            next_id: 1,
            bar: 0,
            date: None,
            notifications: VecDeque::new(),
            history: Vec::new(),
        }
    }

    /// Commission model for every feed without its own.
    pub fn set_commission(&mut self, info: CommissionInfo) {
        self.default_comminfo = info;
    }

    /// Commission model for one feed, by feed index.
    pub fn set_feed_commission(&mut self, feed: usize, info: CommissionInfo) {
        if self.comminfo.len() <= feed {
            self.comminfo.resize(feed + 1, None);
        }
        self.comminfo[feed] = Some(info);
    }

    pub fn comminfo(&self, feed: usize) -> CommissionInfo {
        self.comminfo
            .get(feed)
            .copied()
            .flatten()
            .unwrap_or(self.default_comminfo)
    }

    /// Feed names, by feed index, for trade records.
    pub fn attach_feeds(&mut self, names: Vec<String>) {
        self.marks = vec![f64::NAN; names.len()];
        self.feed_names = names;
    }

    pub fn ledger(&self) -> &Portfolio {
        &self.ledger
    }

    pub fn cash(&self) -> f64 {
        self.ledger.cash
    }

    pub fn position(&self, feed: usize) -> &Position {
        self.ledger.position(feed)
    }

    /// Cash plus positions marked at the latest close of each feed.
    pub fn value(&self) -> f64 {
        let infos: Vec<CommissionInfo> = (0..self.marks.len()).map(|f| self.comminfo(f)).collect();
        self.ledger.value(&infos, &self.marks)
    }

    /// Every notification issued so far, in order.
    pub fn history(&self) -> &[OrderNotification] {
        &self.history
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn current_date(&self) -> NaiveDate {
        self.date.unwrap_or(NaiveDate::MIN)
    }

    fn notify(&mut self, note: OrderNotification) {
        debug!("order {}", note);
        self.history.push(note.clone());
        self.notifications.push_back(note);
    }

    /// Notifications queued since the last call.
    pub fn drain_notifications(&mut self) -> Vec<OrderNotification> {
        self.notifications.drain(..).collect()
    }

    /// Queue an order. It is looked at from the next bar on.
    pub fn submit(&mut self, feed: usize, request: OrderRequest) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;
        let order = Order::new(id, feed, request, self.comminfo(feed)).submit(self.bar);
        self.notify(order.notification(self.bar, self.current_date()));
        self.pending.push(LiveOrder::Submitted(order));
        id
    }

    /// Cancel a live order. Returns `false` if it is unknown or already
    /// terminal.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        let Some(pos) = self.pending.iter().position(|o| o.id() == id) else {
            return false;
        };
        let (bar, date) = (self.bar, self.current_date());
        let note = match self.pending.remove(pos) {
            LiveOrder::Submitted(o) => o.cancel(bar, "canceled").notification(bar, date),
            LiveOrder::Accepted(o) => o.cancel(bar, "canceled").notification(bar, date),
        };
        self.notify(note.with_reason("canceled"));
        true
    }

    /// Read the current bar of every feed from the graph and process live
    /// orders against it.
    pub fn process_bar(&mut self, graph: &Graph, bar: usize) {
        let Some(&date) = graph.timeline().get(bar) else {
            return;
        };
        self.bar = bar;
        self.date = Some(date);
        let prices: Vec<BarPrices> = graph
            .feeds()
            .iter()
            .map(|&feed| BarPrices::from_feed(graph.lines(feed)))
            .collect();
        self.marks = prices.iter().map(|p| p.close).collect();

        let pending = std::mem::take(&mut self.pending);
        for live in pending {
            let order = match live {
                LiveOrder::Submitted(order) => {
                    if order.submitted_bar() >= bar {
                        self.pending.push(LiveOrder::Submitted(order));
                        continue;
                    }
                    match self.accept(order, &prices, bar, date) {
                        Some(accepted) => accepted,
                        None => continue,
                    }
                }
                LiveOrder::Accepted(order) => order,
            };

            if order.is_expired_at(bar) {
                let expired = order.expire(bar);
                self.notify(expired.notification(bar, date));
                continue;
            }
            self.try_fill(order, &prices, bar, date);
        }
    }

    fn accept(
        &mut self,
        order: Order<Submitted>,
        prices: &[BarPrices],
        bar: usize,
        date: NaiveDate,
    ) -> Option<Order<Accepted>> {
        let rejection = order.request().rejection().or_else(|| {
            (order.feed() >= prices.len()).then_some("unknown data feed")
        });
        if let Some(reason) = rejection {
            let canceled = order.cancel(bar, reason);
            self.notify(canceled.notification(bar, date).with_reason(reason));
            return None;
        }

        let request = *order.request();
        let estimate = estimate_price(request.exec, &prices[order.feed()]);
        if !estimate.is_finite() {
            // No price yet for this feed; look again next bar.
            self.pending.push(LiveOrder::Submitted(order));
            return None;
        }
        let delta = self
            .ledger
            .cash_delta(order.comminfo(), order.feed(), request.signed_size(), estimate);
        if self.ledger.cash + delta < 0.0 {
            let margin = order.margin(bar);
            self.notify(margin.notification(bar, date));
            return None;
        }

        let accepted = order.accept(bar);
        self.notify(accepted.notification(bar, date));
        Some(accepted)
    }

    fn try_fill(
        &mut self,
        order: Order<Accepted>,
        prices: &[BarPrices],
        bar: usize,
        date: NaiveDate,
    ) {
        let request = *order.request();
        let Some(price) = match_price(request.side, request.exec, &prices[order.feed()]) else {
            self.pending.push(LiveOrder::Accepted(order));
            return;
        };

        let size = request.signed_size();
        let info = *order.comminfo();
        let delta = self.ledger.cash_delta(&info, order.feed(), size, price);
        if self.ledger.cash + delta < 0.0 {
            let margin = order.margin(bar);
            self.notify(margin.notification(bar, date));
            return;
        }

        let feed_name = self
            .feed_names
            .get(order.feed())
            .cloned()
            .unwrap_or_else(|| format!("feed{}", order.feed()));
        let outcome = self
            .ledger
            .apply_fill(&info, order.feed(), &feed_name, size, price, date);
        let execution = Execution {
            bar,
            date,
            price,
            size,
            value: info.operating_cost(size, price),
            commission: outcome.commission,
            pnl: outcome.pnl,
        };
        info!(
            "{} {} {} {} @ {:.4} comm {:.4} cash {:.2}",
            date, feed_name, request.side, request.size, price, outcome.commission, self.ledger.cash
        );
        let completed = order.complete(execution);
        self.notify(completed.notification(bar, date));
    }

    /// Append today's cash and value to the equity curve.
    pub fn record_equity(&mut self) {
        let value = self.value();
        let date = self.current_date();
        self.ledger.record_equity(date, value);
    }

    pub fn into_ledger(self) -> Portfolio {
        self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::GraphBuilder;
    use crate::domain::indicator::feed::DataFeed;
    use crate::domain::ohlcv::{OhlcvBar, synthetic_epoch};
    use crate::domain::order::{ExecType, OrderStatus, Side};
    use crate::domain::scheduler::{RunConfig, Scheduler};
    use approx::assert_relative_eq;

    fn bars(rows: &[(f64, f64, f64, f64)]) -> Vec<OhlcvBar> {
        rows.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| OhlcvBar {
                date: synthetic_epoch() + chrono::Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1_000.0,
            })
            .collect()
    }

    fn scheduler(rows: &[(f64, f64, f64, f64)]) -> Scheduler {
        let mut g = GraphBuilder::new();
        g.add_feed(DataFeed::new("T", bars(rows))).unwrap();
        Scheduler::new(g.build(), RunConfig::default()).unwrap()
    }

    fn step(sched: &mut Scheduler, broker: &mut Broker) -> Vec<OrderStatus> {
        let bar = sched.step().unwrap();
        broker.process_bar(sched.graph(), bar);
        broker.drain_notifications().iter().map(|n| n.status).collect()
    }

    fn statuses(broker: &Broker, id: OrderId) -> Vec<OrderStatus> {
        broker
            .history()
            .iter()
            .filter(|n| n.id == id)
            .map(|n| n.status)
            .collect()
    }

    #[test]
    fn funded_market_order_completes_at_next_open() {
        let mut sched = scheduler(&[(10.0, 11.0, 9.0, 10.5), (12.0, 13.0, 11.0, 12.5)]);
        let mut broker = Broker::new(1_000.0);
        broker.attach_feeds(vec!["T".into()]);
        broker.set_commission(CommissionInfo::stocklike(0.01));

        step(&mut sched, &mut broker);
        let id = broker.submit(0, OrderRequest::market(Side::Buy, 10.0));
        assert_eq!(broker.drain_notifications()[0].status, OrderStatus::Submitted);

        let seen = step(&mut sched, &mut broker);
        assert_eq!(seen, vec![OrderStatus::Accepted, OrderStatus::Completed]);
        let done = broker.history().last().unwrap();
        let exec = done.execution.unwrap();
        assert_eq!(exec.price, 12.0);
        assert_eq!(exec.size, 10.0);
        assert_relative_eq!(exec.commission, 1.2);
        // Commission is taken once.
        assert_relative_eq!(broker.cash(), 1_000.0 - 120.0 - 1.2);
        assert_eq!(broker.position(0).size, 10.0);
        assert_relative_eq!(broker.value(), broker.cash() + 125.0);
        assert_eq!(
            statuses(&broker, id),
            vec![OrderStatus::Submitted, OrderStatus::Accepted, OrderStatus::Completed]
        );
    }

    #[test]
    fn insufficient_cash_goes_to_margin_without_fill() {
        let mut sched = scheduler(&[(10.0, 11.0, 9.0, 10.0), (10.0, 11.0, 9.0, 10.0)]);
        let mut broker = Broker::new(50.0);
        step(&mut sched, &mut broker);
        let id = broker.submit(0, OrderRequest::market(Side::Buy, 10.0));
        step(&mut sched, &mut broker);
        assert_eq!(
            statuses(&broker, id),
            vec![OrderStatus::Submitted, OrderStatus::Margin]
        );
        assert_eq!(broker.cash(), 50.0);
        assert!(broker.position(0).is_flat());
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn gap_up_at_fill_time_is_margin() {
        // The stop price is affordable, but the bar gaps through it.
        let mut sched = scheduler(&[(10.0, 10.0, 10.0, 10.0), (30.0, 30.0, 30.0, 30.0)]);
        let mut broker = Broker::new(100.0);
        step(&mut sched, &mut broker);
        let request = OrderRequest::market(Side::Buy, 5.0).with_exec(ExecType::Stop(10.0));
        let id = broker.submit(0, request);
        let seen = step(&mut sched, &mut broker);
        assert_eq!(seen, vec![OrderStatus::Accepted, OrderStatus::Margin]);
        assert_eq!(statuses(&broker, id).last(), Some(&OrderStatus::Margin));
        assert_eq!(broker.cash(), 100.0);
    }

    #[test]
    fn invalid_request_is_canceled() {
        let mut sched = scheduler(&[(10.0, 10.0, 10.0, 10.0), (10.0, 10.0, 10.0, 10.0)]);
        let mut broker = Broker::new(100.0);
        step(&mut sched, &mut broker);
        broker.submit(0, OrderRequest::market(Side::Buy, 0.0));
        step(&mut sched, &mut broker);
        let last = broker.history().last().unwrap();
        assert_eq!(last.status, OrderStatus::Canceled);
        assert!(last.reason.is_some());
    }

    #[test]
    fn limit_order_expires_after_validity() {
        let rows = [(10.0, 10.0, 10.0, 10.0); 5];
        let mut sched = scheduler(&rows);
        let mut broker = Broker::new(1_000.0);
        step(&mut sched, &mut broker);
        let id = broker.submit(
            0,
            OrderRequest::market(Side::Buy, 1.0)
                .with_exec(ExecType::Limit(5.0))
                .with_valid(2),
        );
        step(&mut sched, &mut broker); // accepted, bar 1
        step(&mut sched, &mut broker); // bar 2, still live
        assert_eq!(broker.pending_count(), 1);
        step(&mut sched, &mut broker); // bar 3 expires
        assert_eq!(
            statuses(&broker, id),
            vec![OrderStatus::Submitted, OrderStatus::Accepted, OrderStatus::Expired]
        );
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn cancel_live_order_once() {
        let rows = [(10.0, 10.0, 10.0, 10.0); 3];
        let mut sched = scheduler(&rows);
        let mut broker = Broker::new(1_000.0);
        step(&mut sched, &mut broker);
        let request = OrderRequest::market(Side::Buy, 1.0).with_exec(ExecType::Limit(1.0));
        let id = broker.submit(0, request);
        step(&mut sched, &mut broker);
        assert!(broker.cancel(id));
        assert!(!broker.cancel(id));
        assert_eq!(
            statuses(&broker, id),
            vec![OrderStatus::Submitted, OrderStatus::Accepted, OrderStatus::Canceled]
        );
        step(&mut sched, &mut broker);
        assert_eq!(statuses(&broker, id).len(), 3);
    }

    #[test]
    fn orders_are_processed_in_submission_order() {
        let mut sched = scheduler(&[(10.0, 10.0, 10.0, 10.0), (10.0, 10.0, 10.0, 10.0)]);
        let mut broker = Broker::new(150.0);
        step(&mut sched, &mut broker);
        let first = broker.submit(0, OrderRequest::market(Side::Buy, 10.0));
        let second = broker.submit(0, OrderRequest::market(Side::Buy, 10.0));
        step(&mut sched, &mut broker);
        assert_eq!(statuses(&broker, first).last(), Some(&OrderStatus::Completed));
        assert_eq!(statuses(&broker, second).last(), Some(&OrderStatus::Margin));
    }

    #[test]
    fn per_feed_commission_overrides_default() {
        let mut broker = Broker::new(0.0);
        broker.set_commission(CommissionInfo::stocklike(0.01));
        broker.set_feed_commission(2, CommissionInfo::futures(1.0, 5.0, 100.0));
        assert!(broker.comminfo(0).is_stocklike());
        assert!(!broker.comminfo(2).is_stocklike());
        assert!(broker.comminfo(7).is_stocklike());
    }
}
