use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use voice_relay::adapters::{DiscordGateway, DiscordRest};
use voice_relay::cli::{Cli, Commands};
use voice_relay::config::{ServiceConfig, Settings};
use voice_relay::coordination::{install_signal_handlers, Shutdown, ShutdownSignal, TaskSet};
use voice_relay::error::{RelayError, Result};
use voice_relay::invite;
use voice_relay::relay::EventRelay;
use voice_relay::services::{HealthServer, HealthState, LivenessClient, Metrics, UptimeMonitor};
use voice_relay::supervisor::{BackoffPolicy, ConnectionSupervisor, SelfPinger, SupervisorExit};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

/// Upper bound for joining background tasks on shutdown
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.resolved_command() {
        Commands::Invite { client_id } => {
            init_logging_simple();
            print_invite(&client_id)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Monitor {
            target_url,
            interval_minutes,
        } => {
            let settings = load_settings(&cli.config_dir)?;
            init_logging(&settings.logging);
            run_monitor(&target_url, interval_minutes).await
        }
        Commands::Run => {
            let settings = load_settings(&cli.config_dir)?;
            init_logging(&settings.logging);
            run_relay(settings).await
        }
    }
}

fn load_settings(config_dir: &str) -> Result<Settings> {
    let settings = Settings::load_from(config_dir)?;
    if let Err(errors) = settings.validate() {
        for e in &errors {
            eprintln!("Invalid configuration: {}", e);
        }
        return Err(RelayError::InvalidSetting {
            key: "settings",
            reason: errors.join("; "),
        });
    }
    Ok(settings)
}

fn print_invite(client_id: &str) -> Result<()> {
    let url = invite::invite_url(client_id)?;
    println!("🔗 Link di invito per il bot:");
    println!("{}", url);
    println!();
    println!("📋 Permessi inclusi:");
    for name in invite::permission_names() {
        println!("  - {}", name);
    }
    Ok(())
}

async fn run_monitor(target_url: &str, interval_minutes: u64) -> Result<ExitCode> {
    if interval_minutes == 0 {
        return Err(RelayError::InvalidSetting {
            key: "interval_minutes",
            reason: "must be at least 1".to_string(),
        });
    }

    let shutdown = Arc::new(Shutdown::new());
    install_signal_handlers(Arc::clone(&shutdown));

    let monitor = UptimeMonitor::new(target_url, Duration::from_secs(interval_minutes * 60))?;
    monitor.run(shutdown.token()).await?;
    info!("🛑 Monitor fermato");
    Ok(ExitCode::SUCCESS)
}

async fn run_relay(settings: Settings) -> Result<ExitCode> {
    let config = match ServiceConfig::from_env(settings.keep_awake.interval()) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e);
        }
    };
    info!(
        "🚀 Starting voice relay (notifications to channel {})",
        config.target_channel_id
    );

    let metrics = Arc::new(Metrics::new());
    let shutdown = Arc::new(Shutdown::new());
    install_signal_handlers(Arc::clone(&shutdown));
    let tasks = TaskSet::new();

    let sink = Arc::new(DiscordRest::new(&settings.gateway.api_base, config.token())?);
    let relay = Arc::new(EventRelay::new(
        sink,
        config.target_channel_id,
        Arc::clone(&metrics),
    ));
    let gateway = Arc::new(DiscordGateway::from_settings(
        &settings.gateway,
        Arc::clone(&metrics),
    )?);
    let supervisor = ConnectionSupervisor::new(config.clone(), gateway, relay, Arc::clone(&metrics))
        .with_policy(BackoffPolicy::from(&settings.reconnect))
        .with_handler_timeout(Duration::from_secs(settings.gateway.handler_timeout_secs));

    // Liveness endpoint
    let addr: SocketAddr = format!("{}:{}", settings.http.host, settings.http.port)
        .parse()
        .map_err(|e| RelayError::InvalidSetting {
            key: "http.host",
            reason: format!("{}", e),
        })?;
    let health_state = Arc::new(HealthState::new(
        supervisor.state_receiver(),
        Arc::clone(&metrics),
    ));
    let server = HealthServer::new(health_state, addr);
    let server_shutdown = shutdown.token();
    tasks.spawn("web_server", async move { server.run(server_shutdown).await });

    // Keep-awake, started once the server had time to bind
    let pinger = if settings.keep_awake.enabled {
        let client = LivenessClient::new(
            &settings.local_base_url(),
            settings.keep_awake.request_timeout(),
        )?;
        let pinger = Arc::new(
            SelfPinger::new(
                client,
                config.ping_interval,
                settings.keep_awake.recovery_delay(),
            )
            .with_metrics(Arc::clone(&metrics)),
        );

        let delayed = Arc::clone(&pinger);
        let startup_delay = settings.keep_awake.startup_delay();
        let start_shutdown = shutdown.token();
        tasks.spawn("keep_awake_start", async move {
            tokio::select! {
                _ = tokio::time::sleep(startup_delay) => {
                    delayed.start();
                }
                _ = start_shutdown.cancelled() => {}
            }
            Ok(())
        });
        Some(pinger)
    } else {
        warn!("Keep-awake disabled by configuration");
        None
    };

    let exit = supervisor.run(shutdown.token()).await;

    if !shutdown.is_shutdown_requested() {
        shutdown.request_shutdown(ShutdownSignal::SupervisorExited);
    }
    tasks.join_all(JOIN_TIMEOUT).await;
    if let Some(pinger) = pinger {
        pinger.stop().await;
    }

    match exit {
        SupervisorExit::Stopped => {
            info!("🛑 Bot fermato");
            Ok(ExitCode::SUCCESS)
        }
        SupervisorExit::Fatal(reason) => {
            error!("❌ Errore fatale: {}", reason);
            Ok(ExitCode::FAILURE)
        }
    }
}
