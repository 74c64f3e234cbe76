// Read-only status surface and pending configuration changes
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::config::Settings;
use crate::ledger::{Owner, SymbolStats, TradeLedger};
use crate::models::{AccountInfo, BrokerPosition, Side, StrategyTag};
use crate::persistence::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct OpenPositionView {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub stop: f64,
    pub target: f64,
    pub tag: StrategyTag,
    pub owner: Owner,
    /// Floating P&L from the broker, when connected
    pub live_profit: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskView {
    pub risk_per_trade: f64,
    pub max_risk_usd: f64,
    pub max_open_risk_usd: f64,
    pub max_open_trades: usize,
    pub max_session_drawdown_usd: f64,
    pub daily_profit_target_usd: f64,
}

impl From<&Settings> for RiskView {
    fn from(settings: &Settings) -> Self {
        Self {
            risk_per_trade: settings.risk_per_trade,
            max_risk_usd: settings.max_risk_usd,
            max_open_risk_usd: settings.max_open_risk_usd,
            max_open_trades: settings.max_open_trades,
            max_session_drawdown_usd: settings.max_session_drawdown_usd,
            daily_profit_target_usd: settings.daily_profit_target_usd,
        }
    }
}

/// Point-in-time view of the bot for the operator
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    pub account: Option<AccountInfo>,
    pub open_positions: Vec<OpenPositionView>,
    pub symbol_stats: BTreeMap<String, SymbolStats>,
    pub risk: RiskView,
    pub symbols: Vec<String>,
}

impl StatusSnapshot {
    /// Build from the ledger, optionally enriched with live broker data
    pub fn build(
        ledger: &TradeLedger,
        settings: &Settings,
        account: Option<AccountInfo>,
        live: &[BrokerPosition],
        now: DateTime<Utc>,
    ) -> Self {
        let live_profit: HashMap<u64, f64> = live.iter().map(|p| (p.ticket, p.profit)).collect();

        let open_positions = ledger
            .open_positions()
            .map(|p| OpenPositionView {
                ticket: p.ticket,
                symbol: p.symbol.clone(),
                side: p.side,
                volume: p.volume,
                entry_price: p.entry_price,
                stop: p.stop,
                target: p.target,
                tag: p.tag,
                owner: p.owner,
                live_profit: live_profit.get(&p.ticket).copied(),
            })
            .collect();

        Self {
            generated_at: now,
            account,
            open_positions,
            symbol_stats: ledger.all_stats().clone(),
            risk: RiskView::from(settings),
            symbols: settings.symbols.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Risk settings change requested while the bot runs
///
/// Written next to the config and picked up at the next start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_per_trade: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_risk_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open_risk_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open_trades: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_session_drawdown_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_profit_target_usd: Option<f64>,
}

impl RiskOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fields set in `newer` replace ours
    fn merge(self, newer: RiskOverrides) -> Self {
        Self {
            risk_per_trade: newer.risk_per_trade.or(self.risk_per_trade),
            max_risk_usd: newer.max_risk_usd.or(self.max_risk_usd),
            max_open_risk_usd: newer.max_open_risk_usd.or(self.max_open_risk_usd),
            max_open_trades: newer.max_open_trades.or(self.max_open_trades),
            max_session_drawdown_usd: newer.max_session_drawdown_usd.or(self.max_session_drawdown_usd),
            daily_profit_target_usd: newer.daily_profit_target_usd.or(self.daily_profit_target_usd),
        }
    }
}

/// Merge `overrides` into the pending file at `path`, returning the merged set
pub fn write_pending_overrides(path: &Path, overrides: RiskOverrides) -> Result<RiskOverrides, StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json_err = |source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    };

    let existing = match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<RiskOverrides>(&raw).map_err(json_err)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RiskOverrides::default(),
        Err(e) => return Err(io_err(e)),
    };

    let merged = existing.merge(overrides);
    let json = serde_json::to_string_pretty(&merged).map_err(json_err)?;
    std::fs::write(path, json).map_err(io_err)?;

    tracing::info!("📝 Pending overrides written to {} (applied on restart)", path.display());
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TrackedPosition;
    use crate::models::OrderRequest;

    fn ledger_with_open_trade() -> TradeLedger {
        let mut ledger = TradeLedger::in_memory();
        let request = OrderRequest {
            symbol: "XAUUSD".to_string(),
            side: Side::Sell,
            volume: 0.01,
            price: 2350.0,
            stop: 2354.0,
            target: 2344.0,
            magic: 777001,
            comment: "SCALP".to_string(),
        };
        ledger.log_entry(TrackedPosition::from_fill(11, &request, 2350.0, StrategyTag::Scalp, Utc::now()));
        ledger
    }

    #[test]
    fn test_snapshot_without_broker() {
        let ledger = ledger_with_open_trade();
        let snapshot = StatusSnapshot::build(&ledger, &Settings::default(), None, &[], Utc::now());

        assert!(snapshot.account.is_none());
        assert_eq!(snapshot.open_positions.len(), 1);
        assert_eq!(snapshot.open_positions[0].live_profit, None);
        assert_eq!(snapshot.risk.max_open_trades, 15);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"SCALP\""));
    }

    #[test]
    fn test_snapshot_with_live_profit() {
        let ledger = ledger_with_open_trade();
        let live = BrokerPosition {
            ticket: 11,
            symbol: "XAUUSD".to_string(),
            side: Side::Sell,
            volume: 0.01,
            open_price: 2350.0,
            stop: 2354.0,
            target: 2344.0,
            profit: 1.25,
            magic: 777001,
            comment: "SCALP".to_string(),
            open_time: Utc::now(),
        };
        let account = AccountInfo {
            balance: 500.0,
            equity: 501.25,
        };

        let snapshot = StatusSnapshot::build(&ledger, &Settings::default(), Some(account), &[live], Utc::now());
        assert_eq!(snapshot.open_positions[0].live_profit, Some(1.25));
    }

    #[test]
    fn test_pending_overrides_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");

        write_pending_overrides(
            &path,
            RiskOverrides {
                max_risk_usd: Some(2.0),
                ..Default::default()
            },
        )
        .unwrap();
        let merged = write_pending_overrides(
            &path,
            RiskOverrides {
                max_open_trades: Some(5),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(merged.max_risk_usd, Some(2.0));
        assert_eq!(merged.max_open_trades, Some(5));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("risk_per_trade"));
    }
}
