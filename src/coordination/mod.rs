//! Coordination layer for process lifetime
//!
//! - Process-level shutdown signal shared by every loop
//! - Registry of background tasks joined on shutdown

pub mod shutdown;
pub mod tasks;

pub use shutdown::{install_signal_handlers, Shutdown, ShutdownSignal, ShutdownToken};
pub use tasks::{ComponentState, TaskSet};
