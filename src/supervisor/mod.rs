//! Supervision of the long-lived parts of the relay
//!
//! - Connection supervisor with classified failures and exponential backoff
//! - Keep-awake self-pinger for the liveness endpoint

pub mod backoff;
pub mod connection;
pub mod keep_awake;

pub use backoff::{BackoffPolicy, BackoffState, RetryDecision};
pub use connection::{ConnectionSupervisor, FatalReason, SupervisorEvent, SupervisorExit};
pub use keep_awake::SelfPinger;
