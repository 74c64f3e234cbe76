// Trade ledger: every position the engine has seen, persisted as JSON
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{BrokerPosition, OrderRequest, Side, StrategyTag};
use crate::persistence::{JsonStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Who manages the position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    Engine,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub volume: f64,
    pub stop: f64,
    pub target: f64,
    pub tag: StrategyTag,
    pub owner: Owner,
    pub status: PositionStatus,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub pnl: Option<f64>,
}

impl TrackedPosition {
    /// Record for an order the engine just filled
    pub fn from_fill(
        ticket: u64,
        request: &OrderRequest,
        fill_price: f64,
        tag: StrategyTag,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket,
            symbol: request.symbol.clone(),
            side: request.side,
            entry_price: fill_price,
            volume: request.volume,
            stop: request.stop,
            target: request.target,
            tag,
            owner: Owner::Engine,
            status: PositionStatus::Open,
            entry_time: time,
            exit_price: None,
            exit_time: None,
            pnl: None,
        }
    }

    /// Record for a broker position first seen without a ledger entry
    pub fn adopt(position: &BrokerPosition, owner: Owner) -> Self {
        let tag = match owner {
            Owner::Manual => StrategyTag::Manual,
            Owner::Engine => StrategyTag::from_comment(&position.comment).unwrap_or(StrategyTag::Swing),
        };
        Self {
            ticket: position.ticket,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.open_price,
            volume: position.volume,
            stop: position.stop,
            target: position.target,
            tag,
            owner,
            status: PositionStatus::Open,
            entry_time: position.open_time,
            exit_price: None,
            exit_time: None,
            pnl: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Result of logging an exit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitOutcome {
    Closed { pnl: f64 },
    /// Ticket already closed, nothing changed
    AlreadyClosed,
    /// Ticket never tracked
    Unknown,
}

/// Aggregates over closed trades of one symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SymbolStats {
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_pnl: f64,
    pub best: f64,
    pub worst: f64,
}

impl SymbolStats {
    fn record(&mut self, pnl: f64) {
        if self.trades == 0 {
            self.best = pnl;
            self.worst = pnl;
        } else {
            self.best = self.best.max(pnl);
            self.worst = self.worst.min(pnl);
        }
        self.trades += 1;
        if pnl > 0.0 {
            self.wins += 1;
        } else if pnl < 0.0 {
            self.losses += 1;
        }
        self.total_pnl += pnl;
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64 * 100.0
        }
    }
}

/// Durable record of every tracked position, ordered by ticket
#[derive(Debug, Default)]
pub struct TradeLedger {
    positions: BTreeMap<u64, TrackedPosition>,
    stats: BTreeMap<String, SymbolStats>,
    store: Option<JsonStore>,
}

impl TradeLedger {
    /// Ledger without a backing file
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the ledger from `store`, rebuilding per-symbol stats
    pub fn open(store: JsonStore) -> Result<Self, StoreError> {
        let records: Vec<TrackedPosition> = store.load()?;
        let mut ledger = Self {
            store: Some(store),
            ..Self::default()
        };
        for record in records {
            if let (PositionStatus::Closed, Some(pnl)) = (record.status, record.pnl) {
                ledger.stats.entry(record.symbol.clone()).or_default().record(pnl);
            }
            ledger.positions.insert(record.ticket, record);
        }

        tracing::info!(
            "📒 Loaded {} trades ({} open)",
            ledger.positions.len(),
            ledger.open_positions().count()
        );
        Ok(ledger)
    }

    /// Add a new position, no-op if the ticket is already tracked
    pub fn log_entry(&mut self, position: TrackedPosition) -> bool {
        if self.positions.contains_key(&position.ticket) {
            return false;
        }
        tracing::info!(
            ticket = position.ticket,
            "📝 {} {} {} @ {:.5} ({:?})",
            position.symbol,
            position.side,
            position.volume,
            position.entry_price,
            position.owner
        );
        self.positions.insert(position.ticket, position);
        self.persist();
        true
    }

    /// Close a position, at most once per ticket
    pub fn log_exit(&mut self, ticket: u64, price: f64, time: DateTime<Utc>, pnl: f64) -> ExitOutcome {
        let Some(position) = self.positions.get_mut(&ticket) else {
            return ExitOutcome::Unknown;
        };
        if !position.is_open() {
            return ExitOutcome::AlreadyClosed;
        }

        position.status = PositionStatus::Closed;
        position.exit_price = Some(price);
        position.exit_time = Some(time);
        position.pnl = Some(pnl);
        self.stats.entry(position.symbol.clone()).or_default().record(pnl);

        self.persist();
        ExitOutcome::Closed { pnl }
    }

    /// Track a stop/target change made at the broker
    pub fn update_levels(&mut self, ticket: u64, stop: f64, target: f64) {
        if let Some(position) = self.positions.get_mut(&ticket) {
            position.stop = stop;
            position.target = target;
            self.persist();
        }
    }

    pub fn get(&self, ticket: u64) -> Option<&TrackedPosition> {
        self.positions.get(&ticket)
    }

    pub fn contains(&self, ticket: u64) -> bool {
        self.positions.contains_key(&ticket)
    }

    pub fn is_closed(&self, ticket: u64) -> bool {
        self.positions.get(&ticket).is_some_and(|p| !p.is_open())
    }

    pub fn positions(&self) -> impl Iterator<Item = &TrackedPosition> {
        self.positions.values()
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &TrackedPosition> {
        self.positions.values().filter(|p| p.is_open())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn symbol_stats(&self, symbol: &str) -> Option<&SymbolStats> {
        self.stats.get(symbol)
    }

    pub fn all_stats(&self) -> &BTreeMap<String, SymbolStats> {
        &self.stats
    }

    /// Per-symbol results for trades entered at or after `since`
    pub fn session_summary(&self, since: Option<DateTime<Utc>>) -> SessionSummary {
        let mut rows: BTreeMap<&str, SummaryRow> = BTreeMap::new();

        for position in self.positions.values() {
            if since.is_some_and(|start| position.entry_time < start) {
                continue;
            }
            let row = rows
                .entry(position.symbol.as_str())
                .or_insert_with(|| SummaryRow::new(&position.symbol));
            row.add(position);
        }

        let mut total = SummaryRow::new("TOTAL");
        for row in rows.values() {
            total.merge(row);
        }

        SessionSummary {
            rows: rows.into_values().collect(),
            total,
        }
    }

    /// Rewrite the backing file, logging rather than failing
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let records: Vec<&TrackedPosition> = self.positions.values().collect();
        if let Err(e) = store.save(&records) {
            tracing::error!("Failed to save trade ledger: {}", e);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub symbol: String,
    pub trades: u32,
    pub open: u32,
    pub wins: u32,
    pub losses: u32,
    pub pnl: f64,
}

impl SummaryRow {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            trades: 0,
            open: 0,
            wins: 0,
            losses: 0,
            pnl: 0.0,
        }
    }

    fn add(&mut self, position: &TrackedPosition) {
        self.trades += 1;
        match position.pnl {
            None => self.open += 1,
            Some(pnl) => {
                if pnl > 0.0 {
                    self.wins += 1;
                } else if pnl < 0.0 {
                    self.losses += 1;
                }
                self.pnl += pnl;
            }
        }
    }

    fn merge(&mut self, other: &SummaryRow) {
        self.trades += other.trades;
        self.open += other.open;
        self.wins += other.wins;
        self.losses += other.losses;
        self.pnl += other.pnl;
    }

    /// Wins over closed trades, in percent
    pub fn win_rate(&self) -> f64 {
        let closed = self.trades - self.open;
        if closed == 0 {
            0.0
        } else {
            self.wins as f64 / closed as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub rows: Vec<SummaryRow>,
    pub total: SummaryRow,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:>6} {:>5} {:>5} {:>6} {:>7} {:>10}",
            "SYMBOL", "TRADES", "OPEN", "WINS", "LOSSES", "WIN%", "P&L"
        )?;
        for row in self.rows.iter().chain(std::iter::once(&self.total)) {
            writeln!(
                f,
                "{:<10} {:>6} {:>5} {:>5} {:>6} {:>6.1}% {:>10.2}",
                row.symbol,
                row.trades,
                row.open,
                row.wins,
                row.losses,
                row.win_rate(),
                row.pnl
            )?;
        }
        Ok(())
    }
}
