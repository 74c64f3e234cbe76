// In-process broker used by the `run` command and the tests
pub mod synthetic;

pub use synthetic::{MarketScenario, SyntheticMarket};

use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::execution::gateway::{require_usable_bars, BrokerGateway, GatewayError};
use crate::models::{
    AccountInfo, Bar, BrokerPosition, ClosedDeal, DealEntry, OrderRequest, OrderResult,
    OrderStatus, Side, SymbolInfo, Tick, Timeframe,
};

const RETCODE_DONE: u32 = 10009;
const RETCODE_REJECTED: u32 = 10006;
const RETCODE_INVALID_STOPS: u32 = 10016;

struct PaperSymbol {
    info: SymbolInfo,
    spread_points: f64,
    market: Option<SyntheticMarket>,
    m1: Vec<Bar>,
    /// Series set directly, bypassing M1 resampling
    fixed: HashMap<Timeframe, Vec<Bar>>,
    tick: Option<Tick>,
}

impl PaperSymbol {
    fn last_price(&self) -> Option<f64> {
        self.m1
            .last()
            .or_else(|| self.fixed.values().filter_map(|bars| bars.last()).max_by_key(|b| b.timestamp))
            .map(|bar| bar.close)
    }
}

/// Simulated broker account
///
/// Fills market orders at the current bid/ask, closes positions whose stop
/// or target is crossed when the clock advances and keeps a deal history
/// like a real terminal.
pub struct PaperBroker {
    connected: bool,
    balance: f64,
    now: DateTime<Utc>,
    symbols: BTreeMap<String, PaperSymbol>,
    positions: BTreeMap<u64, BrokerPosition>,
    deals: Vec<ClosedDeal>,
    next_ticket: u64,
    next_deal: u64,
    scripted: VecDeque<OrderStatus>,
    submitted: Vec<OrderRequest>,
    modifications: Vec<(u64, f64, f64)>,
}

impl PaperBroker {
    pub fn new(balance: f64, now: DateTime<Utc>) -> Self {
        Self {
            connected: false,
            balance,
            now,
            symbols: BTreeMap::new(),
            positions: BTreeMap::new(),
            deals: Vec::new(),
            next_ticket: 1000,
            next_deal: 5000,
            scripted: VecDeque::new(),
            submitted: Vec::new(),
            modifications: Vec::new(),
        }
    }

    /// Register a tradable symbol, `spread_points` wide
    pub fn add_symbol(&mut self, info: SymbolInfo, spread_points: f64) {
        self.symbols.insert(
            info.symbol.clone(),
            PaperSymbol {
                info,
                spread_points,
                market: None,
                m1: Vec::new(),
                fixed: HashMap::new(),
                tick: None,
            },
        );
    }

    /// Drive `symbol` from a seeded random walk, with `history` M1 bars up to now
    pub fn attach_synthetic_feed(&mut self, symbol: &str, seed: u64, base_price: f64, history: usize) {
        let now = self.now;
        if let Some(paper) = self.symbols.get_mut(symbol) {
            let mut market = SyntheticMarket::new(seed, base_price);
            paper.m1 = market.history(now, history);
            paper.market = Some(market);
        }
    }

    /// Serve `bars` for `timeframe` as-is
    pub fn set_bars(&mut self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) {
        if let Some(paper) = self.symbols.get_mut(symbol) {
            paper.fixed.insert(timeframe, bars);
        }
    }

    pub fn set_tick(&mut self, symbol: &str, bid: f64, ask: f64) {
        let time = self.now;
        if let Some(paper) = self.symbols.get_mut(symbol) {
            paper.tick = Some(Tick { bid, ask, time });
        }
    }

    /// Status returned by the next submissions, in order, before falling back to Done
    pub fn script_order(&mut self, status: OrderStatus) {
        self.scripted.push_back(status);
    }

    pub fn submitted(&self) -> &[OrderRequest] {
        &self.submitted
    }

    pub fn modifications(&self) -> &[(u64, f64, f64)] {
        &self.modifications
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Open a position as if placed by hand in the terminal
    pub fn open_manual(
        &mut self,
        symbol: &str,
        side: Side,
        volume: f64,
        price: f64,
        stop: f64,
        target: f64,
    ) -> u64 {
        let ticket = self.take_ticket();
        self.positions.insert(
            ticket,
            BrokerPosition {
                ticket,
                symbol: symbol.to_string(),
                side,
                volume,
                open_price: price,
                stop,
                target,
                profit: 0.0,
                magic: 0,
                comment: String::new(),
                open_time: self.now,
            },
        );
        ticket
    }

    /// Override the floating profit the broker reports for a position
    pub fn set_profit(&mut self, ticket: u64, profit: f64) {
        if let Some(position) = self.positions.get_mut(&ticket) {
            position.profit = profit;
        }
    }

    /// Append a raw deal to the history, e.g. a duplicate report
    pub fn push_deal(&mut self, deal: ClosedDeal) {
        self.deals.push(deal);
    }

    /// Close a position at `price`, booking the deal at the current time
    pub fn close_at(&mut self, ticket: u64, price: f64) -> Option<f64> {
        let position = self.positions.remove(&ticket)?;
        let info = &self.symbols.get(&position.symbol)?.info;
        let profit = price_profit(info, &position, price);

        self.balance += profit;
        let deal = self.take_deal();
        self.deals.push(ClosedDeal {
            deal,
            position: ticket,
            symbol: position.symbol.clone(),
            entry: DealEntry::Out,
            price,
            profit,
            time: self.now,
        });
        Some(profit)
    }

    /// Move the clock, extend synthetic feeds and settle stops and targets
    pub fn advance_to(&mut self, now: DateTime<Utc>) {
        self.now = now;
        let minute = synthetic::floor_minute(now);

        for paper in self.symbols.values_mut() {
            let Some(market) = paper.market.as_mut() else {
                continue;
            };
            let mut next = paper
                .m1
                .last()
                .map_or(minute, |bar| bar.timestamp + Duration::minutes(1));
            while next <= minute {
                paper.m1.push(market.next_bar(next));
                next += Duration::minutes(1);
            }
        }

        self.mark_to_market();
    }

    /// Refresh floating profit and close positions whose stop or target was hit
    pub fn mark_to_market(&mut self) {
        let mut hits = Vec::new();

        for position in self.positions.values_mut() {
            let Some(paper) = self.symbols.get(&position.symbol) else {
                continue;
            };
            let Ok(tick) = current_tick(paper, self.now) else {
                continue;
            };
            let price = tick.exit_price(position.side);
            position.profit = price_profit(&paper.info, position, price);

            let stop_hit = position.stop > 0.0
                && match position.side {
                    Side::Buy => price <= position.stop,
                    Side::Sell => price >= position.stop,
                };
            let target_hit = position.target > 0.0
                && match position.side {
                    Side::Buy => price >= position.target,
                    Side::Sell => price <= position.target,
                };

            if stop_hit {
                hits.push((position.ticket, position.stop));
            } else if target_hit {
                hits.push((position.ticket, position.target));
            }
        }

        for (ticket, price) in hits {
            if let Some(profit) = self.close_at(ticket, price) {
                tracing::debug!(ticket, "Paper position closed @ {:.5}: ${:.2}", price, profit);
            }
        }
    }

    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn take_deal(&mut self) -> u64 {
        self.next_deal += 1;
        self.next_deal
    }

    fn symbol(&self, symbol: &str) -> Result<&PaperSymbol, GatewayError> {
        self.symbols
            .get(symbol)
            .ok_or_else(|| GatewayError::SymbolUnavailable(symbol.to_string()))
    }

    fn ensure_connected(&self) -> Result<(), GatewayError> {
        if self.connected {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }
}

fn current_tick(paper: &PaperSymbol, now: DateTime<Utc>) -> Result<Tick, GatewayError> {
    if let Some(tick) = paper.tick {
        return Ok(tick);
    }
    let bid = paper
        .last_price()
        .ok_or_else(|| GatewayError::NoTick(paper.info.symbol.clone()))?;
    Ok(Tick {
        bid,
        ask: bid + paper.spread_points * paper.info.point,
        time: now,
    })
}

/// Money made by closing `position` at `price`
fn price_profit(info: &SymbolInfo, position: &BrokerPosition, price: f64) -> f64 {
    if info.tick_size <= 0.0 {
        return 0.0;
    }
    (price - position.open_price) * position.side.sign() / info.tick_size * info.tick_value * position.volume
}

/// Aggregate M1 bars into `timeframe` buckets
fn resample(m1: &[Bar], timeframe: Timeframe) -> Vec<Bar> {
    if timeframe == Timeframe::M1 {
        return m1.to_vec();
    }
    let mut out: Vec<Bar> = Vec::new();
    for bar in m1 {
        let bucket = bar
            .timestamp
            .duration_trunc(timeframe.duration())
            .unwrap_or(bar.timestamp);
        match out.last_mut() {
            Some(last) if last.timestamp == bucket => {
                last.high = last.high.max(bar.high);
                last.low = last.low.min(bar.low);
                last.close = bar.close;
                last.volume += bar.volume;
            }
            _ => out.push(Bar {
                timestamp: bucket,
                ..bar.clone()
            }),
        }
    }
    out
}

impl BrokerGateway for PaperBroker {
    fn connect(&mut self) -> Result<(), GatewayError> {
        self.connected = true;
        tracing::info!("🔌 Paper broker ready (balance ${:.2})", self.balance);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn account(&self) -> Result<AccountInfo, GatewayError> {
        self.ensure_connected()?;
        let floating: f64 = self.positions.values().map(|p| p.profit).sum();
        Ok(AccountInfo {
            balance: self.balance,
            equity: self.balance + floating,
        })
    }

    fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, GatewayError> {
        Ok(self.symbol(symbol)?.info.clone())
    }

    fn ensure_symbol(&mut self, symbol: &str) -> Result<(), GatewayError> {
        self.symbol(symbol).map(|_| ())
    }

    fn bars(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<Vec<Bar>, GatewayError> {
        self.ensure_connected()?;
        let paper = self.symbol(symbol)?;

        let series = match paper.fixed.get(&timeframe) {
            Some(bars) => bars.clone(),
            None => resample(&paper.m1, timeframe),
        };
        let start = series.len().saturating_sub(count);
        require_usable_bars(symbol, timeframe, series[start..].to_vec())
    }

    fn tick(&self, symbol: &str) -> Result<Tick, GatewayError> {
        self.ensure_connected()?;
        current_tick(self.symbol(symbol)?, self.now)
    }

    fn positions(&self, symbol: Option<&str>) -> Result<Vec<BrokerPosition>, GatewayError> {
        self.ensure_connected()?;
        Ok(self
            .positions
            .values()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .cloned()
            .collect())
    }

    fn closed_deals(&self, symbol: &str, limit: usize) -> Result<Vec<ClosedDeal>, GatewayError> {
        self.ensure_connected()?;
        self.symbol(symbol)?;
        let deals: Vec<ClosedDeal> = self.deals.iter().filter(|d| d.symbol == symbol).cloned().collect();
        let start = deals.len().saturating_sub(limit);
        Ok(deals[start..].to_vec())
    }

    fn submit_market_order(&mut self, request: &OrderRequest) -> Result<OrderResult, GatewayError> {
        self.ensure_connected()?;
        self.submitted.push(request.clone());
        let tick = current_tick(self.symbol(&request.symbol)?, self.now)?;

        let status = self.scripted.pop_front().unwrap_or(OrderStatus::Done);
        if status != OrderStatus::Done {
            let (code, comment) = match status {
                OrderStatus::InvalidStops => (RETCODE_INVALID_STOPS, "Invalid stops"),
                _ => (RETCODE_REJECTED, "Rejected"),
            };
            return Ok(OrderResult {
                status,
                ticket: None,
                code,
                price: 0.0,
                comment: comment.to_string(),
            });
        }

        let price = tick.entry_price(request.side);
        let ticket = self.take_ticket();
        self.positions.insert(
            ticket,
            BrokerPosition {
                ticket,
                symbol: request.symbol.clone(),
                side: request.side,
                volume: request.volume,
                open_price: price,
                stop: request.stop,
                target: request.target,
                profit: 0.0,
                magic: request.magic,
                comment: request.comment.clone(),
                open_time: self.now,
            },
        );
        let deal = self.take_deal();
        self.deals.push(ClosedDeal {
            deal,
            position: ticket,
            symbol: request.symbol.clone(),
            entry: DealEntry::In,
            price,
            profit: 0.0,
            time: self.now,
        });

        Ok(OrderResult {
            status,
            ticket: Some(ticket),
            code: RETCODE_DONE,
            price,
            comment: "Request executed".to_string(),
        })
    }

    fn modify_position(&mut self, ticket: u64, stop: f64, target: f64) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        let position = self
            .positions
            .get_mut(&ticket)
            .ok_or(GatewayError::UnknownPosition(ticket))?;
        position.stop = stop;
        position.target = target;
        self.modifications.push((ticket, stop, target));
        Ok(())
    }

    fn close_position(&mut self, ticket: u64) -> Result<OrderResult, GatewayError> {
        self.ensure_connected()?;
        let position = self
            .positions
            .get(&ticket)
            .ok_or(GatewayError::UnknownPosition(ticket))?;
        let tick = current_tick(self.symbol(&position.symbol)?, self.now)?;
        let price = tick.exit_price(position.side);

        self.close_at(ticket, price);
        Ok(OrderResult {
            status: OrderStatus::Done,
            ticket: Some(ticket),
            code: RETCODE_DONE,
            price,
            comment: "Position closed".to_string(),
        })
    }
}

/// Metadata matching a typical retail account for `symbol`
pub fn default_symbol_info(symbol: &str) -> SymbolInfo {
    let (point, tick_value, stops_level) = if symbol.starts_with("XAU") {
        (0.01, 1.0, 20)
    } else if symbol.starts_with("BTC") {
        (0.01, 0.01, 100)
    } else if symbol.contains("JPY") {
        (0.001, 0.67, 10)
    } else {
        (0.00001, 1.0, 10)
    };
    SymbolInfo {
        symbol: symbol.to_string(),
        point,
        tick_size: point,
        tick_value,
        volume_min: 0.01,
        volume_max: 100.0,
        volume_step: 0.01,
        stops_level,
    }
}

/// Starting price for the synthetic feed of `symbol`
pub fn reference_price(symbol: &str) -> f64 {
    match symbol {
        "XAUUSD" => 2350.0,
        "BTCUSD" => 65_000.0,
        "USDJPY" => 155.0,
        "EURJPY" => 168.0,
        "GBPJPY" => 197.0,
        "GBPUSD" => 1.27,
        "USDCHF" => 0.90,
        "AUDUSD" => 0.66,
        "NZDUSD" => 0.60,
        "USDCAD" => 1.37,
        _ => 1.08,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    fn create_test_broker() -> PaperBroker {
        let mut broker = PaperBroker::new(1_000.0, t0());
        broker.add_symbol(default_symbol_info("EURUSD"), 10.0);
        broker.connect().unwrap();
        broker.set_tick("EURUSD", 1.1000, 1.1001);
        broker
    }

    fn buy(stop: f64, target: f64) -> OrderRequest {
        OrderRequest {
            symbol: "EURUSD".to_string(),
            side: Side::Buy,
            volume: 0.1,
            price: 1.1001,
            stop,
            target,
            magic: 777001,
            comment: "SWING".to_string(),
        }
    }

    #[test]
    fn test_market_order_fills_at_ask() {
        let mut broker = create_test_broker();
        let result = broker.submit_market_order(&buy(1.0990, 1.1020)).unwrap();

        assert!(result.is_done());
        assert_eq!(result.price, 1.1001);
        let positions = broker.positions(Some("EURUSD")).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].magic, 777001);
    }

    #[test]
    fn test_scripted_rejection() {
        let mut broker = create_test_broker();
        broker.script_order(OrderStatus::InvalidStops);

        let result = broker.submit_market_order(&buy(1.0990, 1.1020)).unwrap();
        assert_eq!(result.status, OrderStatus::InvalidStops);
        assert!(broker.positions(None).unwrap().is_empty());

        assert!(broker.submit_market_order(&buy(1.0990, 1.1020)).unwrap().is_done());
    }

    #[test]
    fn test_stop_hit_books_out_deal() {
        let mut broker = create_test_broker();
        let ticket = broker.submit_market_order(&buy(1.0990, 1.1020)).unwrap().ticket.unwrap();

        broker.set_tick("EURUSD", 1.0985, 1.0986);
        broker.advance_to(t0() + Duration::minutes(5));

        assert!(broker.positions(None).unwrap().is_empty());
        let deals = broker.closed_deals("EURUSD", 100).unwrap();
        let out = deals.iter().find(|d| d.entry == DealEntry::Out).unwrap();
        assert_eq!(out.position, ticket);
        // (1.0990 - 1.1001) / 0.00001 * 1.0 * 0.1 = -11
        assert!((out.profit + 11.0).abs() < 1e-6);
        assert!((broker.balance() - 989.0).abs() < 1e-6);
    }

    #[test]
    fn test_short_history_is_rejected() {
        let mut broker = create_test_broker();
        broker.attach_synthetic_feed("EURUSD", 1, 1.1, 120);

        assert!(broker.bars("EURUSD", Timeframe::M1, 500).is_ok());
        // 120 minutes is only 8 M15 bars
        assert!(matches!(
            broker.bars("EURUSD", Timeframe::M15, 500),
            Err(GatewayError::InsufficientBars { .. })
        ));
    }

    #[test]
    fn test_resample_buckets() {
        let mut broker = create_test_broker();
        broker.attach_synthetic_feed("EURUSD", 9, 1.1, 15 * 60);

        let m15 = broker.bars("EURUSD", Timeframe::M15, 500).unwrap();
        assert!(m15.len() >= 60);
        for pair in m15.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::minutes(15));
        }
    }

    #[test]
    fn test_advance_extends_feed() {
        let mut broker = create_test_broker();
        broker.attach_synthetic_feed("EURUSD", 5, 1.1, 100);

        broker.advance_to(t0() + Duration::minutes(10));
        let bars = broker.bars("EURUSD", Timeframe::M1, 500).unwrap();
        assert_eq!(bars.len(), 110);
        assert_eq!(bars.last().unwrap().timestamp, t0() + Duration::minutes(10));
    }
}
