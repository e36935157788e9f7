use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "voice-relay")]
#[command(version)]
#[command(about = "Discord voice channel presence relay", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", global = true)]
    pub config_dir: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the relay (default)
    Run,
    /// Ping a deployed relay from outside to keep it awake
    Monitor {
        /// Base URL of the deployed relay
        #[arg(short, long, default_value = "http://localhost:5000")]
        target_url: String,
        /// Minutes between pings
        #[arg(short, long, default_value = "10")]
        interval_minutes: u64,
    },
    /// Print the bot invite link
    Invite {
        /// Application (client) id from the developer portal
        #[arg(long, env = "DISCORD_CLIENT_ID")]
        client_id: String,
    },
}

impl Cli {
    /// Subcommand to run; no subcommand means `run`
    pub fn resolved_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
