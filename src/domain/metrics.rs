//! Run analyzer: returns, drawdown and trade statistics.

use super::portfolio::{EquityPoint, Portfolio};
use super::position::ClosedTrade;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub net_pnl: f64,
    pub total_commission: f64,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let initial = portfolio.initial_cash;

        let final_value = equity_curve.last().map(|p| p.value).unwrap_or(initial);
        let total_return = if initial > 0.0 {
            (final_value - initial) / initial
        } else {
            0.0
        };

        let years = equity_curve.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let trades = TradeStats::from_trades(&portfolio.closed_trades);

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio: compute_sharpe(equity_curve),
            max_drawdown,
            max_drawdown_duration,
            total_trades: trades.total,
            trades_won: trades.won,
            trades_lost: trades.lost,
            win_rate: trades.win_rate(),
            profit_factor: trades.profit_factor(),
            net_pnl: trades.gross_wins - trades.gross_losses,
            total_commission: trades.commission,
        }
    }
}

#[derive(Debug, Default)]
struct TradeStats {
    total: usize,
    won: usize,
    lost: usize,
    gross_wins: f64,
    gross_losses: f64,
    commission: f64,
}

impl TradeStats {
    fn from_trades(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats::default();
        for trade in trades {
            stats.total += 1;
            stats.commission += trade.commission;
            if trade.pnl > 0.0 {
                stats.won += 1;
                stats.gross_wins += trade.pnl;
            } else if trade.pnl < 0.0 {
                stats.lost += 1;
                stats.gross_losses += -trade.pnl;
            }
        }
        stats
    }

    fn win_rate(&self) -> f64 {
        if self.total > 0 {
            self.won as f64 / self.total as f64
        } else {
            0.0
        }
    }

    fn profit_factor(&self) -> f64 {
        if self.gross_losses > 0.0 {
            self.gross_wins / self.gross_losses
        } else if self.gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Largest peak-to-trough fall as a fraction of the peak, and the longest
/// run of bars spent below a peak.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };
    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    let mut duration = 0usize;
    let mut max_duration = 0usize;

    for point in equity_curve {
        if point.value >= peak {
            peak = point.value;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.value) / peak);
            duration += 1;
            max_duration = max_duration.max(duration);
        }
    }
    (max_dd, max_duration)
}

fn compute_sharpe(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            if w[0].value > 0.0 {
                (w[1].value - w[0].value) / w[0].value
            } else {
                0.0
            }
        })
        .collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev > 0.0 {
        mean / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: day(i),
                cash: v,
                value: v,
            })
            .collect()
    }

    fn portfolio(values: &[f64], trades: Vec<ClosedTrade>) -> Portfolio {
        let mut p = Portfolio::new(values.first().copied().unwrap_or(100_000.0));
        p.closed_trades = trades;
        p.equity_curve = curve(values);
        p
    }

    fn trade(pnl: f64) -> ClosedTrade {
        ClosedTrade {
            feed: "T".into(),
            size: 10.0,
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 10.0,
            entry_date: day(0),
            exit_date: day(3),
            gross_pnl: pnl + 1.0,
            commission: 1.0,
            pnl,
        }
    }

    #[test]
    fn empty_run() {
        let m = Metrics::compute(&Portfolio::new(100_000.0));
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn total_return_from_final_value() {
        assert_relative_eq!(
            Metrics::compute(&portfolio(&[100_000.0, 110_000.0], vec![])).total_return,
            0.10
        );
        assert_relative_eq!(
            Metrics::compute(&portfolio(&[100_000.0, 90_000.0], vec![])).total_return,
            -0.10
        );
    }

    #[test]
    fn flat_year_annualizes_to_zero() {
        let m = Metrics::compute(&portfolio(&[100_000.0; 252], vec![]));
        assert_relative_eq!(m.annualized_return, 0.0);
    }

    #[test]
    fn trade_counts_and_win_rate() {
        let trades = vec![trade(100.0), trade(-50.0), trade(200.0), trade(0.0)];
        let m = Metrics::compute(&portfolio(&[100.0, 101.0], trades));
        assert_eq!(m.total_trades, 4);
        assert_eq!(m.trades_won, 2);
        assert_eq!(m.trades_lost, 1);
        assert_relative_eq!(m.win_rate, 0.5);
        assert_relative_eq!(m.profit_factor, 6.0);
        assert_relative_eq!(m.net_pnl, 250.0);
        assert_relative_eq!(m.total_commission, 4.0);
    }

    #[test]
    fn only_winners_have_infinite_profit_factor() {
        let m = Metrics::compute(&portfolio(&[100.0, 101.0], vec![trade(5.0)]));
        assert!(m.profit_factor.is_infinite());
    }

    #[test]
    fn max_drawdown() {
        let (dd, _) = compute_drawdown(&curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]));
        assert_relative_eq!(dd, (110.0 - 80.0) / 110.0);
    }

    #[test]
    fn max_drawdown_duration() {
        let (_, duration) = compute_drawdown(&curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0]));
        assert_eq!(duration, 4);
    }

    #[test]
    fn steady_growth_has_positive_sharpe() {
        let values: Vec<f64> = (0..253).map(|i| 100_000.0 * (1.0 + 0.001 * i as f64)).collect();
        assert!(compute_sharpe(&curve(&values)) > 0.0);
    }
}
