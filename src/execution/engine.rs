use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{BotError, Result};
use crate::execution::gateway::BrokerGateway;
use crate::execution::lifecycle::{Admission, EngineState};
use crate::execution::manual::{manual_action, ManualAction};
use crate::execution::orders::{
    adjust_stops, min_stop_distance, submit_with_retry, validate_order, InvalidOrder,
    StopRetryPolicy,
};
use crate::execution::reconciler::ReconciledExit;
use crate::execution::trailing::{evaluate_trailing, TrailDecision, TrailingConfig};
use crate::indicators::{trend_direction, TriangleParams};
use crate::ledger::{Owner, SessionSummary, TrackedPosition, TradeLedger};
use crate::models::{
    AccountInfo, BrokerPosition, OrderRequest, OrderStatus, Side, StrategyTag, SymbolInfo,
    Timeframe, TradeSignal,
};
use crate::notify::{notify_or_log, Notifier};
use crate::risk::{risk_usd, CircuitBreakerTrip, CircuitBreakers, PositionSizer};
use crate::strategy::{
    first_signal, validate_bar_sequence, MarketData, PullbackStrategy, ScalpStrategy,
    SignalConfig, SmartStrategy, Strategy, StreakStrategy, SwingStrategy,
};

/// Cycles between periodic position/signal summaries
const SUMMARY_EVERY_CYCLES: u64 = 20;

/// A strategy plus the execution limits it trades under
pub struct EntryMode {
    pub strategy: Box<dyn Strategy>,
    pub max_spread_points: f64,
    pub min_sl_points: f64,
    pub post_close_cooldown: Duration,
}

impl EntryMode {
    pub fn new(
        strategy: Box<dyn Strategy>,
        max_spread_points: f64,
        min_sl_points: f64,
        post_close_cooldown: Duration,
    ) -> Self {
        Self {
            strategy,
            max_spread_points,
            min_sl_points,
            post_close_cooldown,
        }
    }

    /// Enabled modes in priority order: swing, scalp, pullback, smart, streak
    pub fn from_settings(settings: &Settings) -> Vec<EntryMode> {
        let swing_config = SignalConfig {
            atr_period: settings.atr_period,
            multiplier: settings.supertrend_multiplier,
            ..SignalConfig::default()
        }
        .with_exits(settings.sl_atr_mult, settings.tp_rr);
        let fast_config = swing_config.with_exits(settings.m1_sl_atr_mult, settings.m1_tp_rr);
        let triangle = settings.require_triangle_breakout.then(TriangleParams::default);

        let swing_cooldown = Duration::minutes(settings.swing_cooldown_after_close_mins);
        let fast_cooldown = Duration::minutes(settings.cooldown_after_close_mins);
        let swing_limits = |strategy: Box<dyn Strategy>| {
            EntryMode::new(strategy, settings.max_spread_points, settings.min_sl_points, swing_cooldown)
        };
        let fast_limits = |strategy: Box<dyn Strategy>| {
            EntryMode::new(
                strategy,
                settings.m1_max_spread_points,
                settings.m1_min_sl_points,
                fast_cooldown,
            )
        };

        let mut modes = Vec::new();
        if settings.enable_m15_swing {
            let mut swing = SwingStrategy::new(Timeframe::M15, swing_config);
            if let Some(params) = triangle {
                swing = swing.with_triangle(params);
            }
            modes.push(swing_limits(Box::new(swing)));
        }
        if settings.enable_m1_scalp {
            let mut scalp = ScalpStrategy::new(Timeframe::M1, Timeframe::M15, fast_config)
                .with_min_atr_points(settings.m1_min_atr_points);
            if let Some(params) = triangle {
                scalp = scalp.with_triangle(params);
            }
            modes.push(fast_limits(Box::new(scalp)));
        }
        if settings.enable_pullback {
            let pullback = PullbackStrategy::new(Timeframe::M15, Timeframe::H1, swing_config);
            modes.push(swing_limits(Box::new(pullback)));
        }
        if settings.enable_smart {
            let mut smart = SmartStrategy::new(Timeframe::M1, Timeframe::M15, fast_config);
            if settings.use_h1_confirm {
                smart = smart.with_higher_timeframe(Timeframe::H1);
            }
            modes.push(fast_limits(Box::new(smart)));
        }
        if settings.enable_streak {
            let streak = StreakStrategy::new(Timeframe::M1, Timeframe::M15, fast_config);
            modes.push(fast_limits(Box::new(streak)));
        }
        modes
    }
}

/// Why a symbol or mode produced no order this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Data(String),
    Exposure(CircuitBreakerTrip),
    PositionOpen,
    Halted(CircuitBreakerTrip),
    Spread { points: f64, max: f64 },
    TooFewBars,
    Admission(Admission),
    NoSignal,
    TrendDisagrees,
    RiskTooHigh { risk: f64 },
    Invalid(InvalidOrder),
    Rejected(OrderStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skip {
    pub symbol: String,
    pub mode: Option<StrategyTag>,
    pub reason: SkipReason,
}

/// What happened during one cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub exits: Vec<ReconciledExit>,
    /// Tickets opened this cycle
    pub entries: Vec<u64>,
    pub adopted: Vec<u64>,
    pub trailing_moves: Vec<(u64, f64)>,
    pub manual_closed: Vec<u64>,
    pub manual_protected: Vec<u64>,
    /// Halts that tripped during this cycle
    pub trips: Vec<CircuitBreakerTrip>,
    pub skips: Vec<Skip>,
}

impl CycleReport {
    fn skip(&mut self, symbol: &str, mode: Option<StrategyTag>, reason: SkipReason) {
        tracing::debug!("{} {:?}: skipped ({:?})", symbol, mode, reason);
        self.skips.push(Skip {
            symbol: symbol.to_string(),
            mode,
            reason,
        });
    }

    pub fn skips_for(&self, symbol: &str) -> impl Iterator<Item = &SkipReason> {
        let symbol = symbol.to_string();
        self.skips.iter().filter(move |s| s.symbol == symbol).map(|s| &s.reason)
    }
}

/// Engine positions and their aggregate dollar risk
struct Exposure {
    open_trades: usize,
    open_risk: f64,
    symbols: Vec<String>,
}

/// The trading engine: one `run_cycle` per poll
pub struct Engine<G: BrokerGateway> {
    gateway: G,
    settings: Settings,
    symbols: Vec<String>,
    modes: Vec<EntryMode>,
    ledger: TradeLedger,
    notifier: Arc<dyn Notifier>,
    breakers: CircuitBreakers,
    sizer: PositionSizer,
    retry: StopRetryPolicy,
}

impl<G: BrokerGateway> Engine<G> {
    pub fn new(gateway: G, settings: Settings, ledger: TradeLedger, notifier: Arc<dyn Notifier>) -> Self {
        let modes = EntryMode::from_settings(&settings);
        Self {
            gateway,
            symbols: settings.symbols.clone(),
            breakers: settings.circuit_breakers(),
            sizer: settings.position_sizer(),
            settings,
            modes,
            ledger,
            notifier,
            retry: StopRetryPolicy::default(),
        }
    }

    /// Replace the entry modes built from settings
    pub fn with_modes(mut self, modes: Vec<EntryMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn mode_names(&self) -> Vec<String> {
        self.modes.iter().map(|m| m.strategy.name().to_string()).collect()
    }

    /// Connect, drop unavailable symbols, scale risk for small accounts
    ///
    /// # Errors
    /// Fails when the broker is unreachable or no configured symbol is tradable.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<EngineState> {
        self.gateway.connect()?;
        let account = self.gateway.account()?;

        let mut available = Vec::new();
        for symbol in &self.settings.symbols {
            match self.gateway.ensure_symbol(symbol) {
                Ok(()) => available.push(symbol.clone()),
                Err(e) => tracing::warn!("⚠️  {} unavailable, dropping it: {}", symbol, e),
            }
        }
        if available.is_empty() {
            return Err(BotError::NoSymbols);
        }
        self.symbols = available;

        self.settings = self.settings.clone().scaled_for_balance(account.balance);
        self.breakers = self.settings.circuit_breakers();
        self.sizer = self.settings.position_sizer();

        tracing::info!("🚀 Engine started");
        tracing::info!("  Balance: ${:.2}  Equity: ${:.2}", account.balance, account.equity);
        tracing::info!("  Symbols: {}", self.symbols.join(", "));
        tracing::info!("  Modes: {}", self.mode_names().join(", "));
        notify_or_log(
            self.notifier.as_ref(),
            &format!(
                "🚀 Bot started\nSymbols: {}\nModes: {}\nBalance: ${:.2}",
                self.symbols.join(", "),
                self.mode_names().join(", "),
                account.balance
            ),
        );

        Ok(EngineState::new(account.equity, now))
    }

    /// Log the session summary and disconnect
    pub fn shutdown(&mut self, state: &EngineState) -> SessionSummary {
        let summary = self.ledger.session_summary(Some(state.session_start));
        tracing::info!("📊 Session summary ({} cycles):\n{}", state.cycles, summary);
        self.gateway.disconnect();
        summary
    }

    /// One pass: reconcile exits, update risk gates, manage open positions,
    /// then look for entries
    pub fn run_cycle(&mut self, state: &mut EngineState, now: DateTime<Utc>) -> Result<CycleReport> {
        state.cycles += 1;
        let mut report = CycleReport::default();

        self.reconcile_exits(state, now, &mut report);

        let account = self.gateway.account()?;
        if let Some(trip) = state.session.update_equity(account.equity, &self.breakers) {
            self.announce_halt(&trip, &mut report);
        }

        let positions = self.gateway.positions(None)?;
        self.adopt_untracked(&positions, &mut report);

        let infos = self.symbol_infos(&positions);
        if self.settings.enable_trailing_sl {
            self.trail_stops(state, &positions, &infos, &mut report);
        }
        self.handle_manual(&positions, &infos, &mut report);

        let mut exposure = self.exposure(&positions, &infos);
        for symbol in self.symbols.clone() {
            self.evaluate_symbol(state, &symbol, &account, &mut exposure, now, &mut report);
        }

        if state.cycles % SUMMARY_EVERY_CYCLES == 0 {
            self.log_periodic_summary(state, &exposure, &report);
        }
        Ok(report)
    }

    fn reconcile_exits(&mut self, state: &mut EngineState, now: DateTime<Utc>, report: &mut CycleReport) {
        let exits = state
            .exits
            .reconcile(&self.gateway, &self.symbols, &mut self.ledger, now);

        for exit in &exits {
            state.symbol_mut(&exit.symbol).record_close(exit.time);
            state.trailing_locks.remove(&exit.ticket);

            if exit.tracked {
                let icon = if exit.profit >= 0.0 { "✅" } else { "❌" };
                notify_or_log(
                    self.notifier.as_ref(),
                    &format!("{} {} #{} closed @ {:.5}: ${:.2}", icon, exit.symbol, exit.ticket, exit.price, exit.profit),
                );
            }

            if let Some(trip) = state
                .session
                .record_closed_deal(exit.profit, exit.time, &self.breakers)
            {
                self.announce_halt(&trip, report);
            }
        }
        report.exits = exits;
    }

    fn announce_halt(&self, trip: &CircuitBreakerTrip, report: &mut CycleReport) {
        tracing::warn!("🛑 Trading halted: {}", trip);
        notify_or_log(self.notifier.as_ref(), &format!("🛑 Trading halted: {}", trip));
        report.trips.push(trip.clone());
    }

    /// Ledger entries for broker positions seen for the first time
    fn adopt_untracked(&mut self, positions: &[BrokerPosition], report: &mut CycleReport) {
        for position in positions {
            if self.ledger.contains(position.ticket) {
                continue;
            }
            let owner = if position.magic == self.settings.magic {
                Owner::Engine
            } else {
                Owner::Manual
            };
            tracing::info!(
                ticket = position.ticket,
                "👀 Adopting {:?} position {} {} {}",
                owner,
                position.symbol,
                position.side,
                position.volume
            );
            self.ledger.log_entry(TrackedPosition::adopt(position, owner));
            report.adopted.push(position.ticket);
        }
    }

    fn symbol_infos(&self, positions: &[BrokerPosition]) -> HashMap<String, SymbolInfo> {
        let mut infos = HashMap::new();
        let wanted = positions.iter().map(|p| &p.symbol).chain(self.symbols.iter());
        for symbol in wanted {
            if infos.contains_key(symbol) {
                continue;
            }
            match self.gateway.symbol_info(symbol) {
                Ok(info) => {
                    infos.insert(symbol.clone(), info);
                }
                Err(e) => tracing::warn!("{}: no symbol info: {}", symbol, e),
            }
        }
        infos
    }

    fn trail_stops(
        &mut self,
        state: &mut EngineState,
        positions: &[BrokerPosition],
        infos: &HashMap<String, SymbolInfo>,
        report: &mut CycleReport,
    ) {
        let config = TrailingConfig {
            activate_usd: self.settings.trail_activate_usd,
            distance_usd: self.settings.trail_distance_usd,
        };

        let magic = self.settings.magic;
        for position in positions.iter().filter(|p| p.magic == magic) {
            let Some(info) = infos.get(&position.symbol) else {
                continue;
            };
            let tick = match self.gateway.tick(&position.symbol) {
                Ok(tick) => tick,
                Err(e) => {
                    tracing::warn!(ticket = position.ticket, "{}: no tick for trailing: {}", position.symbol, e);
                    continue;
                }
            };

            let previous = state.trailing_lock(position.ticket);
            let TrailDecision::Move { stop, lock } = evaluate_trailing(position, info, &tick, previous, &config)
            else {
                continue;
            };

            match self.gateway.modify_position(position.ticket, stop, position.target) {
                Ok(()) => {
                    state.trailing_locks.insert(position.ticket, lock);
                    self.ledger.update_levels(position.ticket, stop, position.target);
                    report.trailing_moves.push((position.ticket, stop));
                    tracing::info!(
                        ticket = position.ticket,
                        "🔒 {} trailing stop -> {:.5} (locks ${:.2})",
                        position.symbol,
                        stop,
                        lock
                    );
                }
                Err(e) => {
                    tracing::warn!(ticket = position.ticket, "{}: trailing stop refused: {}", position.symbol, e);
                }
            }
        }
    }

    fn handle_manual(
        &mut self,
        positions: &[BrokerPosition],
        infos: &HashMap<String, SymbolInfo>,
        report: &mut CycleReport,
    ) {
        let magic = self.settings.magic;
        for position in positions.iter().filter(|p| p.magic != magic) {
            match manual_action(position, infos.get(&position.symbol), self.settings.max_risk_usd) {
                ManualAction::Leave => {}
                ManualAction::ForceClose => match self.gateway.close_position(position.ticket) {
                    Ok(result) if result.is_done() => {
                        tracing::warn!(ticket = position.ticket, "✂️  Closed unprotected manual position on {}", position.symbol);
                        notify_or_log(
                            self.notifier.as_ref(),
                            &format!("✂️ Closed manual {} #{} (no SL/TP)", position.symbol, position.ticket),
                        );
                        report.manual_closed.push(position.ticket);
                    }
                    Ok(result) => {
                        tracing::warn!(ticket = position.ticket, "Close refused: {} ({})", result.comment, result.code);
                    }
                    Err(e) => tracing::warn!(ticket = position.ticket, "Close failed: {}", e),
                },
                ManualAction::SetStop(stop) => {
                    match self.gateway.modify_position(position.ticket, stop, position.target) {
                        Ok(()) => {
                            tracing::info!(ticket = position.ticket, "🛡️  Manual {} stop set at {:.5}", position.symbol, stop);
                            self.ledger.update_levels(position.ticket, stop, position.target);
                            report.manual_protected.push(position.ticket);
                        }
                        Err(e) => tracing::warn!(ticket = position.ticket, "Could not set stop: {}", e),
                    }
                }
            }
        }
    }

    fn exposure(&self, positions: &[BrokerPosition], infos: &HashMap<String, SymbolInfo>) -> Exposure {
        let mut exposure = Exposure {
            open_trades: 0,
            open_risk: 0.0,
            symbols: Vec::new(),
        };
        for position in positions.iter().filter(|p| p.magic == self.settings.magic) {
            exposure.open_trades += 1;
            exposure.open_risk += self.position_risk(position, infos.get(&position.symbol));
            exposure.symbols.push(position.symbol.clone());
        }
        exposure
    }

    /// Money lost if the stop is hit, zero once the stop is past entry
    fn position_risk(&self, position: &BrokerPosition, info: Option<&SymbolInfo>) -> f64 {
        let (Some(info), true) = (info, position.stop > 0.0) else {
            return self.settings.max_risk_usd;
        };
        let distance = (position.open_price - position.stop) * position.side.sign();
        if distance <= 0.0 {
            return 0.0;
        }
        risk_usd(info, distance, position.volume)
    }

    fn evaluate_symbol(
        &mut self,
        state: &mut EngineState,
        symbol: &str,
        account: &AccountInfo,
        exposure: &mut Exposure,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let (info, tick) = match (self.gateway.symbol_info(symbol), self.gateway.tick(symbol)) {
            (Ok(info), Ok(tick)) => (info, tick),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("{}: {}", symbol, e);
                report.skip(symbol, None, SkipReason::Data(e.to_string()));
                return;
            }
        };
        let spread_points = if info.point > 0.0 {
            (tick.ask - tick.bid) / info.point
        } else {
            f64::INFINITY
        };

        // too wide for every mode
        let widest = self
            .modes
            .iter()
            .map(|m| m.max_spread_points)
            .fold(f64::NEG_INFINITY, f64::max);
        if spread_points > widest {
            report.skip(
                symbol,
                None,
                SkipReason::Spread {
                    points: spread_points,
                    max: widest,
                },
            );
            return;
        }
        if let Err(trip) = self.breakers.check_exposure(exposure.open_trades, exposure.open_risk) {
            report.skip(symbol, None, SkipReason::Exposure(trip));
            return;
        }
        if exposure.symbols.iter().any(|s| s == symbol) {
            report.skip(symbol, None, SkipReason::PositionOpen);
            return;
        }
        if let Err(trip) = self.breakers.check(&state.session) {
            report.skip(symbol, None, SkipReason::Halted(trip));
            return;
        }

        let mut market = MarketData::new(symbol, info.point);
        let mut admitted: Vec<(usize, DateTime<Utc>)> = Vec::new();

        for (index, mode) in self.modes.iter().enumerate() {
            let tag = mode.strategy.tag();
            if spread_points > mode.max_spread_points {
                report.skip(
                    symbol,
                    Some(tag),
                    SkipReason::Spread {
                        points: spread_points,
                        max: mode.max_spread_points,
                    },
                );
                continue;
            }

            for timeframe in mode.strategy.required_timeframes() {
                if market.has(timeframe) {
                    continue;
                }
                let bars = match self.gateway.bars(symbol, timeframe, self.settings.bars) {
                    Ok(bars) => bars,
                    Err(e) => {
                        tracing::warn!("{}: {}", symbol, e);
                        report.skip(symbol, Some(tag), SkipReason::Data(e.to_string()));
                        return;
                    }
                };
                if let Err(e) = validate_bar_sequence(&bars) {
                    tracing::warn!("{} {}: {}", symbol, timeframe, e);
                    report.skip(symbol, Some(tag), SkipReason::Data(e.to_string()));
                    return;
                }
                market.insert(timeframe, bars);
            }

            let bars = market.bars(mode.strategy.timeframe());
            let Some(last) = bars.last() else {
                report.skip(symbol, Some(tag), SkipReason::TooFewBars);
                continue;
            };
            if bars.len() < mode.strategy.min_bars_required() {
                report.skip(symbol, Some(tag), SkipReason::TooFewBars);
                continue;
            }

            let admission = state.symbol_mut(symbol).admit(
                tag,
                mode.strategy.timeframe(),
                last.timestamp,
                mode.post_close_cooldown,
                self.settings.cooldown_bars,
            );
            if admission.is_ready() {
                admitted.push((index, last.timestamp));
            } else {
                report.skip(symbol, Some(tag), SkipReason::Admission(admission));
            }
        }

        if admitted.is_empty() {
            return;
        }
        self.load_confirmation(symbol, &mut market);

        let mut disagreeing = Vec::new();
        let candidates = admitted.iter().map(|(index, _)| self.modes[*index].strategy.as_ref());
        let winner = first_signal(candidates, &market, |signal| {
            let agrees = self.trend_agrees(&market, signal.side());
            if !agrees {
                disagreeing.push(signal.tag());
            }
            agrees
        });
        let any_disagreed = !disagreeing.is_empty();
        for tag in disagreeing {
            report.skip(symbol, Some(tag), SkipReason::TrendDisagrees);
        }
        let Some((position, signal)) = winner else {
            if !any_disagreed {
                report.skip(symbol, None, SkipReason::NoSignal);
            }
            return;
        };
        let (mode_index, bar_time) = admitted[position];

        tracing::info!(
            "📈 {} {} signal on {} (confidence {:.2})",
            signal.tag(),
            signal.side(),
            symbol,
            signal.confidence()
        );
        self.place_entry(state, mode_index, &signal, &info, tick.entry_price(signal.side()), account, bar_time, exposure, now, report);
    }

    /// Fetch the confirmation timeframe unless a mode already loaded it
    ///
    /// A failed fetch leaves it missing, which never blocks a signal.
    fn load_confirmation(&self, symbol: &str, market: &mut MarketData) {
        let timeframe = self.settings.confirm_timeframe;
        if market.has(timeframe) {
            return;
        }
        match self.gateway.bars(symbol, timeframe, self.settings.bars) {
            Ok(bars) => market.insert(timeframe, bars),
            Err(e) => {
                tracing::warn!("{}: confirmation data unavailable, not blocking: {}", symbol, e);
            }
        }
    }

    /// Confirmation timeframe SuperTrend agrees with `side`, or cannot be read
    fn trend_agrees(&self, market: &MarketData, side: Side) -> bool {
        match trend_direction(
            market.bars(self.settings.confirm_timeframe),
            self.settings.atr_period,
            self.settings.supertrend_multiplier,
        ) {
            Some(trend) => trend.agrees_with(side),
            None => true,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn place_entry(
        &mut self,
        state: &mut EngineState,
        mode_index: usize,
        signal: &TradeSignal,
        info: &SymbolInfo,
        price: f64,
        account: &AccountInfo,
        bar_time: DateTime<Utc>,
        exposure: &mut Exposure,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let symbol = info.symbol.as_str();
        let tag = signal.tag();
        let side = signal.side();
        let mode = &self.modes[mode_index];

        let spec = self.settings.symbol_spec(symbol);
        let broker_min_points = spec.min_stop_points.max(f64::from(info.stops_level));
        let min_distance = min_stop_distance(mode.min_sl_points, broker_min_points, info.point);

        // levels keep the signal's distances, measured from the fill side of the book
        let distance = signal.stop_distance();
        let reward = (signal.target() - signal.entry()).abs();
        let (stop, target) = adjust_stops(
            side,
            price,
            price - side.sign() * distance,
            price + side.sign() * reward,
            min_distance,
        );
        let stop_distance = (price - stop).abs();

        let sized = self
            .sizer
            .size_order(&spec, Some(info), self.settings.risk_per_trade, stop_distance, account.balance);
        let volume = sized.volume;
        let risk = risk_usd(info, stop_distance, volume);
        if sized.raised_to_min && risk > self.settings.max_risk_usd + 1e-9 {
            tracing::info!(
                "{}: minimum volume {} risks ${:.2} > ${:.2}, skipping",
                symbol,
                volume,
                risk,
                self.settings.max_risk_usd
            );
            report.skip(symbol, Some(tag), SkipReason::RiskTooHigh { risk });
            return;
        }

        let request = OrderRequest {
            symbol: symbol.to_string(),
            side,
            volume,
            price,
            stop,
            target,
            magic: self.settings.magic,
            comment: tag.to_string(),
        };
        if let Err(e) = validate_order(&request, min_distance) {
            tracing::warn!("❌ {} order not sent: {}", symbol, e);
            report.skip(symbol, Some(tag), SkipReason::Invalid(e));
            return;
        }

        let broker_min_distance = broker_min_points * info.point;
        let submission = match submit_with_retry(
            &mut self.gateway,
            request,
            &self.retry,
            broker_min_distance,
            min_distance,
        ) {
            Ok(submission) => submission,
            Err(e) => {
                tracing::error!("{}: order submission failed: {}", symbol, e);
                report.skip(symbol, Some(tag), SkipReason::Data(e.to_string()));
                return;
            }
        };

        let result = &submission.result;
        if !result.is_done() {
            tracing::warn!("❌ {} {} rejected: {} ({})", symbol, side, result.comment, result.code);
            notify_or_log(
                self.notifier.as_ref(),
                &format!("❌ {} {} {} rejected: {} ({})", tag, symbol, side, result.comment, result.code),
            );
            report.skip(symbol, Some(tag), SkipReason::Rejected(result.status));
            return;
        }
        let Some(ticket) = result.ticket else {
            tracing::error!("{}: fill without a ticket, not tracked", symbol);
            return;
        };

        let filled = &submission.request;
        let fill_price = if result.price > 0.0 { result.price } else { filled.price };
        self.ledger
            .log_entry(TrackedPosition::from_fill(ticket, filled, fill_price, tag, now));
        state.symbol_mut(symbol).record_entry(bar_time);

        exposure.open_trades += 1;
        exposure.open_risk += risk_usd(info, (fill_price - filled.stop).abs(), filled.volume);
        exposure.symbols.push(symbol.to_string());
        report.entries.push(ticket);

        tracing::info!(
            ticket,
            "✅ {} {} {} {} @ {:.5} SL {:.5} TP {:.5}",
            tag,
            side,
            filled.volume,
            symbol,
            fill_price,
            filled.stop,
            filled.target
        );
        notify_or_log(
            self.notifier.as_ref(),
            &format!(
                "✅ {} {} {} {} @ {:.5}\nSL {:.5} TP {:.5}",
                tag, side, filled.volume, symbol, fill_price, filled.stop, filled.target
            ),
        );
    }

    fn log_periodic_summary(&self, state: &EngineState, exposure: &Exposure, report: &CycleReport) {
        tracing::info!(
            "📊 Cycle {}: {} open ({} risk ${:.2}), daily P&L ${:.2}, drawdown ${:.2}",
            state.cycles,
            exposure.open_trades,
            exposure.symbols.join(","),
            exposure.open_risk,
            state.session.daily_pnl,
            state.session.session_drawdown()
        );

        let mut sweep: BTreeMap<String, usize> = BTreeMap::new();
        for skip in &report.skips {
            let key = match &skip.reason {
                SkipReason::Admission(admission) => format!("{:?}", admission),
                SkipReason::Spread { .. } => "Spread".to_string(),
                SkipReason::Data(_) => "Data".to_string(),
                SkipReason::Exposure(_) => "Exposure".to_string(),
                SkipReason::Halted(_) => "Halted".to_string(),
                other => format!("{:?}", other)
                    .split(|c: char| c == '(' || c == ' ')
                    .next()
                    .unwrap_or("Other")
                    .to_string(),
            };
            *sweep.entry(key).or_default() += 1;
        }
        let sweep: Vec<String> = sweep.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        tracing::info!("🔎 Signal sweep: {} entries, skips [{}]", report.entries.len(), sweep.join(" "));
    }
}
