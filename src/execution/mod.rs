// Order execution and position lifecycle module
pub mod engine;
pub mod gateway;
pub mod lifecycle;
pub mod manual;
pub mod orders;
pub mod reconciler;
pub mod trailing;

pub use engine::{CycleReport, Engine, EntryMode, Skip, SkipReason};
pub use gateway::{BrokerGateway, GatewayError, MIN_USABLE_BARS};
pub use lifecycle::{Admission, EngineState, SymbolState};
pub use manual::{manual_action, ManualAction};
pub use orders::{adjust_stops, min_stop_distance, validate_order, InvalidOrder, StopRetryPolicy};
pub use reconciler::{ExitReconciler, ReconciledExit};
pub use trailing::{evaluate_trailing, TrailDecision, TrailingConfig};
