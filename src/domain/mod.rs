pub mod event;
pub mod state;

pub use event::{
    ChannelInfo, ChatMessage, GatewayEvent, GuildSnapshot, Member, ReadyInfo, User, VoiceState,
};
pub use state::{AttemptOutcome, ConnectionAttempt, PingResult, SupervisorState};
