//! Voice presence relay
//!
//! - `presence`: channel and voice-state cache, transition detection
//! - `handler`: the gateway event handler posting notifications and answering commands
//! - `sink`: outgoing message model and delivery seam

pub mod handler;
pub mod presence;
pub mod sink;

pub use handler::EventRelay;
pub use presence::{PresenceCache, VoiceTransition};
pub use sink::{Embed, EmbedField, MessageSink, OutgoingMessage};
