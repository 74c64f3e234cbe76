use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;
use trendbot::api::TelegramNotifier;
use trendbot::config::{Settings, PENDING_OVERRIDES_PATH};
use trendbot::execution::{Engine, EngineState};
use trendbot::ledger::TradeLedger;
use trendbot::notify::{notify_or_log, Notifier, NullNotifier};
use trendbot::paper::{default_symbol_info, reference_price, PaperBroker};
use trendbot::persistence::JsonStore;
use trendbot::status::{write_pending_overrides, RiskOverrides, StatusSnapshot};

/// M1 history loaded into the paper feed: five days, enough for 50+ H1 bars
const PAPER_HISTORY_MINUTES: usize = 5 * 24 * 60;
const SHUTDOWN_NOTIFY_TIMEOUT_SECS: u64 = 5;

#[derive(Parser)]
#[command(name = "trendbot", version, about = "SuperTrend multi-timeframe trading engine")]
struct Cli {
    /// Settings file (TOML), defaults to ./trendbot.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine loop against the paper broker
    Run {
        /// Starting paper balance
        #[arg(long, default_value_t = 1_000.0)]
        balance: f64,
        /// Seed for the synthetic price feed
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Print a JSON status snapshot of the trade ledger
    Status,
    /// Print per-symbol results from the trade ledger
    Summary,
    /// Queue risk changes, applied at the next start
    SetRisk {
        #[arg(long)]
        risk_per_trade: Option<f64>,
        #[arg(long)]
        max_risk_usd: Option<f64>,
        #[arg(long)]
        max_open_risk_usd: Option<f64>,
        #[arg(long)]
        max_open_trades: Option<usize>,
        #[arg(long)]
        max_session_drawdown_usd: Option<f64>,
        #[arg(long)]
        daily_profit_target_usd: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command.unwrap_or(Command::Run {
        balance: 1_000.0,
        seed: 42,
        cycles: None,
    }) {
        Command::Run {
            balance,
            seed,
            cycles,
        } => run(settings, balance, seed, cycles).await,
        Command::Status => print_status(&settings),
        Command::Summary => print_summary(&settings),
        Command::SetRisk {
            risk_per_trade,
            max_risk_usd,
            max_open_risk_usd,
            max_open_trades,
            max_session_drawdown_usd,
            daily_profit_target_usd,
        } => set_risk(RiskOverrides {
            risk_per_trade,
            max_risk_usd,
            max_open_risk_usd,
            max_open_trades,
            max_session_drawdown_usd,
            daily_profit_target_usd,
        }),
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_ledger(settings: &Settings) -> anyhow::Result<TradeLedger> {
    TradeLedger::open(JsonStore::new(&settings.ledger_path))
        .with_context(|| format!("Failed to open ledger {}", settings.ledger_path.display()))
}

/// Telegram when credentials are configured, otherwise a no-op sink
fn build_notifier(settings: &Settings) -> (Arc<dyn Notifier>, Option<TelegramNotifier>) {
    let Some((token, chat_id)) = settings.telegram_credentials() else {
        tracing::info!("Telegram not configured, notifications disabled");
        return (Arc::new(NullNotifier), None);
    };

    match TelegramNotifier::new(token, chat_id) {
        Ok(telegram) => {
            tracing::info!("📨 Telegram notifications enabled");
            (Arc::new(telegram.clone()), Some(telegram))
        }
        Err(e) => {
            tracing::warn!("Telegram disabled: {}", e);
            (Arc::new(NullNotifier), None)
        }
    }
}

fn paper_broker(settings: &Settings, balance: f64, seed: u64) -> PaperBroker {
    let mut broker = PaperBroker::new(balance, Utc::now());
    for (i, symbol) in settings.symbols.iter().enumerate() {
        let info = default_symbol_info(symbol);
        let spread_points = if symbol.starts_with("BTC") { 15.0 } else { 8.0 };
        broker.add_symbol(info, spread_points);
        broker.attach_synthetic_feed(symbol, seed + i as u64, reference_price(symbol), PAPER_HISTORY_MINUTES);
    }
    broker
}

// ============================================================================
// Commands
// ============================================================================

async fn run(settings: Settings, balance: f64, seed: u64, cycles: Option<u64>) -> anyhow::Result<()> {
    tracing::info!("🚀 trendbot starting (paper broker, balance ${:.2})", balance);

    let ledger = open_ledger(&settings)?;
    let (notifier, telegram) = build_notifier(&settings);
    let poll = Duration::from_secs(settings.poll_interval_secs);
    let backoff = Duration::from_secs(settings.error_backoff_secs);

    let broker = paper_broker(&settings, balance, seed);
    let mut engine = Engine::new(broker, settings, ledger, notifier.clone());
    let mut state = engine.start(Utc::now()).context("Engine startup failed")?;

    tracing::info!("\nPress Ctrl+C to stop...\n");
    run_loop(&mut engine, &mut state, poll, backoff, cycles).await;

    let summary = engine.shutdown(&state);
    let message = format!(
        "🛑 Bot stopped after {} cycles\nTrades: {}  Win rate: {:.1}%  P&L: ${:.2}",
        state.cycles,
        summary.total.trades,
        summary.total.win_rate(),
        summary.total.pnl
    );
    match telegram {
        Some(telegram) => {
            let send = telegram.send(&message);
            match tokio::time::timeout(Duration::from_secs(SHUTDOWN_NOTIFY_TIMEOUT_SECS), send).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Stop notification failed: {}", e),
                Err(_) => tracing::warn!("Stop notification timed out"),
            }
        }
        None => notify_or_log(notifier.as_ref(), &message),
    }

    tracing::info!("👋 trendbot stopped");
    Ok(())
}

/// Cycle, then sleep, until Ctrl+C or the cycle limit
///
/// Ctrl+C is only observed between cycles, so an order in flight always
/// completes.
async fn run_loop(
    engine: &mut Engine<PaperBroker>,
    state: &mut EngineState,
    poll: Duration,
    backoff: Duration,
    cycles: Option<u64>,
) {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let now = Utc::now();
        engine.gateway_mut().advance_to(now);

        let delay = match engine.run_cycle(state, now) {
            Ok(report) => {
                tracing::debug!(
                    "Cycle {}: {} entries, {} exits, {} skips",
                    state.cycles,
                    report.entries.len(),
                    report.exits.len(),
                    report.skips.len()
                );
                poll
            }
            Err(e) => {
                tracing::error!("Cycle {} failed: {}", state.cycles, e);
                backoff
            }
        };

        if cycles.is_some_and(|limit| state.cycles >= limit) {
            tracing::info!("Reached {} cycles", state.cycles);
            break;
        }

        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn print_status(settings: &Settings) -> anyhow::Result<()> {
    let ledger = open_ledger(settings)?;
    let snapshot = StatusSnapshot::build(&ledger, settings, None, &[], Utc::now());
    println!("{}", snapshot.to_json()?);
    Ok(())
}

fn print_summary(settings: &Settings) -> anyhow::Result<()> {
    let ledger = open_ledger(settings)?;
    print!("{}", ledger.session_summary(None));
    Ok(())
}

fn set_risk(overrides: RiskOverrides) -> anyhow::Result<()> {
    if overrides.is_empty() {
        bail!("Nothing to change, pass at least one --option");
    }
    let merged = write_pending_overrides(Path::new(PENDING_OVERRIDES_PATH), overrides)?;
    println!("{}", serde_json::to_string_pretty(&merged)?);
    println!("Changes take effect at the next start.");
    Ok(())
}
