use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::execution::gateway::BrokerGateway;
use crate::ledger::{ExitOutcome, TradeLedger};
use crate::models::DealEntry;

/// Deals fetched per symbol each cycle
pub const DEAL_FETCH_LIMIT: usize = 100;

/// A position close newly picked up from deal history
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledExit {
    pub ticket: u64,
    pub symbol: String,
    pub price: f64,
    pub profit: f64,
    pub time: DateTime<Utc>,
    /// False when the ticket was never in the ledger
    pub tracked: bool,
}

/// Picks up closed positions from broker deal history
#[derive(Debug, Clone)]
pub struct ExitReconciler {
    last_check: DateTime<Utc>,
    /// Tickets already reported, with their deal time
    seen: HashMap<u64, DateTime<Utc>>,
}

impl ExitReconciler {
    /// Start looking one day before `started`
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            last_check: started - Duration::days(1),
            seen: HashMap::new(),
        }
    }

    pub fn last_check(&self) -> DateTime<Utc> {
        self.last_check
    }

    /// Tickets still held for duplicate suppression
    pub fn remembered(&self) -> usize {
        self.seen.len()
    }

    /// Log exits for every position closed since the last check
    ///
    /// A failed fetch for one symbol is logged and the others continue. The
    /// check time only advances when every symbol was fetched.
    pub fn reconcile<G: BrokerGateway + ?Sized>(
        &mut self,
        gateway: &G,
        symbols: &[String],
        ledger: &mut TradeLedger,
        now: DateTime<Utc>,
    ) -> Vec<ReconciledExit> {
        let mut exits = Vec::new();
        let mut complete = true;

        for symbol in symbols {
            let deals = match gateway.closed_deals(symbol, DEAL_FETCH_LIMIT) {
                Ok(deals) => deals,
                Err(e) => {
                    tracing::warn!("{}: failed to fetch deal history: {}", symbol, e);
                    complete = false;
                    continue;
                }
            };

            for deal in deals {
                if deal.entry != DealEntry::Out || deal.time < self.last_check {
                    continue;
                }
                let ticket = deal.position;
                if ledger.is_closed(ticket) || self.seen.contains_key(&ticket) {
                    continue;
                }
                self.seen.insert(ticket, deal.time);

                let tracked = match ledger.log_exit(ticket, deal.price, deal.time, deal.profit) {
                    ExitOutcome::Closed { pnl } => {
                        let icon = if pnl >= 0.0 { "✅" } else { "❌" };
                        tracing::info!(
                            ticket,
                            "{} {} closed @ {:.5}: ${:.2}",
                            icon,
                            deal.symbol,
                            deal.price,
                            pnl
                        );
                        true
                    }
                    ExitOutcome::AlreadyClosed => continue,
                    ExitOutcome::Unknown => {
                        tracing::warn!(ticket, "{}: close for untracked position", deal.symbol);
                        false
                    }
                };

                exits.push(ReconciledExit {
                    ticket,
                    symbol: deal.symbol,
                    price: deal.price,
                    profit: deal.profit,
                    time: deal.time,
                    tracked,
                });
            }
        }

        if complete {
            self.last_check = now;
            // older deals are filtered by time from now on
            let cutoff = self.last_check;
            self.seen.retain(|_, time| *time >= cutoff);
        }
        exits
    }
}
