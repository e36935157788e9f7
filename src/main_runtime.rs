use tracing_subscriber::EnvFilter;
use voice_relay::config::LoggingConfig;

pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},voice_relay=debug,hyper=warn", logging.level))
    });

    // Prefer VOICE_RELAY_LOG_DIR, then LOG_DIR, then the configured directory.
    let log_dir = std::env::var("VOICE_RELAY_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .unwrap_or_else(|_| logging.dir.clone());

    // `rolling::daily` panics (and with panic=abort, aborts) when the first
    // file cannot be created, so writability is checked up front.
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".voice_relay_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, "voice-relay.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // The guard must live as long as the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            log_dir
        );
        None
    };

    let (plain_console, json_console) = if logging.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(plain_console)
        .with(json_console)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/voice-relay.log", log_dir);
    }
}

pub fn init_logging_simple() {
    // Console only, for the one-shot subcommands
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
