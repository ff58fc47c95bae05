//! Pomodoro Viewer - terminal client for the Pomodoro server.
//!
//! # Commands
//!
//! - `pomodoro-viewer status`: Print the current Session once
//! - `pomodoro-viewer watch`: Keep printing the Session until Ctrl+C
//! - `pomodoro-viewer toggle`: Start or pause the countdown
//! - `pomodoro-viewer reset`: Refill the current phase and pause
//! - `pomodoro-viewer settings --focus <min> --break <min>`: Change durations
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pomodoro_server::settings::SettingsRequest;
use pomodoro_server::types::{Command as Intent, SessionSnapshot};
use pomodoro_server::view::SessionView;
use pomodoro_viewer::client::ViewerClient;
use pomodoro_viewer::config::Config;
use pomodoro_viewer::error::ViewerError;
use pomodoro_viewer::render::{render_block, render_line};

/// Pomodoro Viewer - terminal client for the Pomodoro server.
///
/// Shows the focus/break countdown kept by the server and sends
/// start/pause, reset and duration changes to it.
#[derive(Parser, Debug)]
#[command(name = "pomodoro-viewer")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    POMODORO_SERVER_URL  Server URL (default: http://127.0.0.1:8080)
    POMODORO_POLL_MS     Poll interval for 'watch' (default: 1000)
    RUST_LOG             Log level filter (default: warn)

EXAMPLES:
    # Show the current phase and time left
    pomodoro-viewer status

    # Start or pause
    pomodoro-viewer toggle

    # 50 minute focus, 10 minute break
    pomodoro-viewer settings --focus 50 --break 10
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current Session once.
    Status {
        /// Multi-line panel instead of a single line.
        #[arg(short, long)]
        block: bool,
    },

    /// Print the Session on every poll until interrupted.
    ///
    /// Connection failures are retried with backoff and never end the watch.
    Watch,

    /// Start the countdown, or pause it if it is running.
    Toggle,

    /// Refill the current phase and pause.
    Reset,

    /// Change the focus and break durations, in whole minutes.
    Settings {
        /// Focus length in minutes.
        #[arg(long)]
        focus: String,

        /// Break length in minutes.
        #[arg(long = "break")]
        break_minutes: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::from_env().map_err(ViewerError::from)?;
    debug!(server_url = %config.server_url, "Loaded configuration");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(cli.command, config))
}

async fn run(command: Command, config: Config) -> Result<()> {
    let mut client = ViewerClient::new(&config.server_url).map_err(ViewerError::from)?;

    match command {
        Command::Status { block } => {
            let snapshot = client.session().await.map_err(ViewerError::from)?;
            let view = derive(&snapshot);
            if block {
                println!("{}", render_block(&view));
            } else {
                println!("{}", render_line(&view));
            }
        }
        Command::Watch => run_watch(&mut client, &config).await,
        Command::Toggle => send_intent(&client, Intent::ToggleTimer).await?,
        Command::Reset => send_intent(&client, Intent::ResetTimer).await?,
        Command::Settings {
            focus,
            break_minutes,
        } => {
            let durations = SettingsRequest::new(focus.as_str(), break_minutes.as_str())
                .validate()
                .map_err(ViewerError::from)?;
            let request =
                SettingsRequest::new(durations.focus_secs() / 60, durations.break_secs() / 60);

            let response = client
                .update_settings(&request)
                .await
                .map_err(ViewerError::from)?;
            println!(
                "{}",
                render_line(&SessionView::derive(&response.session, &response.durations))
            );
        }
    }

    Ok(())
}

async fn send_intent(client: &ViewerClient, intent: Intent) -> Result<()> {
    let ack = client.command(intent).await.map_err(ViewerError::from)?;

    // The ack carries the Session as written; fetch durations for the bar.
    let snapshot = client.session().await.map_err(ViewerError::from)?;
    let session = ack.session.unwrap_or(snapshot.session);
    println!(
        "{}",
        render_line(&SessionView::derive(&session, &snapshot.durations))
    );
    Ok(())
}

async fn run_watch(client: &mut ViewerClient, config: &Config) {
    let mut poll = interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received Ctrl+C, stopping watch");
                break;
            }
            snapshot = async {
                poll.tick().await;
                client.session_with_retry().await
            } => {
                println!("{}", render_line(&derive(&snapshot)));
            }
        }
    }
}

fn derive(snapshot: &SessionSnapshot) -> SessionView {
    SessionView::derive(&snapshot.session, &snapshot.durations)
}

/// Plain text logging to stderr, filtered by `RUST_LOG` with a default of `warn`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
