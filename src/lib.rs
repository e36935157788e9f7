pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod invite;
pub mod relay;
pub mod services;
pub mod supervisor;

pub use config::{ServiceConfig, Settings};
pub use coordination::{ComponentState, Shutdown, ShutdownSignal, ShutdownToken, TaskSet};
pub use error::{RelayError, Result};
pub use gateway::{EventHandler, EventStream, FailureKind, Gateway, GatewayFailure};
pub use relay::{EventRelay, MessageSink, OutgoingMessage};
pub use supervisor::{
    BackoffPolicy, ConnectionSupervisor, FatalReason, SelfPinger, SupervisorEvent, SupervisorExit,
};
