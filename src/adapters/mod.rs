pub mod discord_gateway;
pub mod discord_rest;

pub use discord_gateway::{DiscordGateway, DiscordSession, INTENTS};
pub use discord_rest::DiscordRest;
