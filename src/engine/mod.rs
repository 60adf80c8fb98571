//! Copy trading engine
//!
//! Routes classified swaps into ledger trades, executes them through a
//! [`SwapExecutor`] and watches ACTIVE positions for TP/SL exits.

mod copy;
pub mod executor;
mod exit_monitor;
mod router;

pub use copy::{CopyEngine, DetectedSwap};
pub use executor::{DisabledExecutor, ExecutorError, PaperExecutor, SwapExecutor, SwapFill};
pub use exit_monitor::{ExitMonitor, TickOutcome};
pub use router::EventRouter;
