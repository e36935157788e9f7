//! Boundary of the real-time gateway
//!
//! The connection supervisor only depends on these traits; the Discord
//! implementation lives in `adapters`.

mod traits;

pub use traits::{Connected, EventHandler, EventStream, FailureKind, Gateway, GatewayFailure};
