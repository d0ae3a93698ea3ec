//! Listen reader entry point

use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use listen_cli::{run_shell, App};
use listen_config::{load_settings, Settings};
use listen_core::PlaybackState;
use listen_pipeline::SequencerEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("LISTEN_ENV").ok();
    let settings = load_settings(env.as_deref())?;

    init_tracing(&settings);
    tracing::info!("Starting Listen v{}", env!("CARGO_PKG_VERSION"));

    let app = App::start(&settings).await?;
    spawn_event_printer(&app);

    println!("Listen ready. Type `help` for commands.");

    let input = BufReader::new(tokio::io::stdin());
    run_shell(&app, input, shutdown_signal()).await;

    app.shutdown().await?;
    tracing::info!("Listen stopped");
    Ok(())
}

/// Print playback milestones and errors as they happen
fn spawn_event_printer(app: &App) {
    let mut events = app.reader().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SequencerEvent::UnitStarted { index, text }) if !text.is_empty() => {
                    tracing::debug!(index, "Speaking: {}", text);
                }
                Ok(SequencerEvent::StateChanged {
                    new: PlaybackState::Finished,
                    ..
                }) => println!("Finished reading."),
                Ok(SequencerEvent::Error(message)) => println!("Playback stopped: {}", message),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, saving progress...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, saving progress...");
        }
    }
}

/// Initialize tracing from the observability settings
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("listen={level},listen_cli={level},listen_pipeline={level},listen_persistence={level},listen_config={level}").into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
