//! gerrit-stream - Watch a Gerrit event stream from the command line.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gerrit_stream::config::{ConfigLoader, StreamConfig};
use gerrit_stream::{
    camelize, display, RunOutcome, StreamEmitter, StreamRunner, STREAM_END_EVENT,
    STREAM_WRITE_EVENT,
};

#[derive(Parser)]
#[command(
    name = "gerrit-stream",
    about = "Watch a Gerrit stream-events feed",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the stream and print events as JSON lines.
    Watch {
        /// Gerrit host.
        #[arg(long)]
        host: Option<String>,
        /// Gerrit SSH port.
        #[arg(short, long)]
        port: Option<u16>,
        /// SSH login user.
        #[arg(short, long)]
        user: Option<String>,
        /// Reconnect whenever the stream closes.
        #[arg(long)]
        auto_restart: bool,
        /// Only print these events (camelized names, repeatable).
        #[arg(short, long = "event")]
        events: Vec<String>,
        /// Also print raw stream write/end events.
        #[arg(long)]
        raw: bool,
    },
    /// Print the event name a stream type tag maps to.
    Camelize {
        /// Hyphenated type tag, e.g. patchset-created.
        tag: String,
    },
}

/// Command-line overrides for the watch command.
struct WatchArgs {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    auto_restart: bool,
    events: Vec<String>,
    raw: bool,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>, args: &WatchArgs) -> Result<StreamConfig, String> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config = loader.load().map_err(|e| e.to_string())?;

    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(user) = &args.user {
        config.ssh.user = Some(user.clone());
    }
    config.auto_restart |= args.auto_restart;

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

async fn watch(config: StreamConfig, events: Vec<String>, raw: bool) -> ExitCode {
    let mut emitter = StreamEmitter::with_connector(
        config.host.clone(),
        config.port,
        config.auto_restart,
        config.ssh.connector(),
    )
    .max_line_bytes(config.max_line_bytes);

    let wanted: HashSet<String> = events.into_iter().collect();
    emitter.subscribe_all(move |event, payload| {
        let is_raw = event == STREAM_WRITE_EVENT || event == STREAM_END_EVENT;
        if is_raw && !raw {
            return;
        }
        if !wanted.is_empty() && !wanted.contains(event) {
            return;
        }
        display::print_event(event, payload);
    });

    let mut runner = match StreamRunner::new(emitter) {
        Ok(runner) => runner,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    runner.on_close(display::print_stream_end);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping stream");
            ctrl_c.cancel();
        }
    });

    display::print_watching(&config.host, config.port, config.auto_restart);
    match runner.run(&cancel).await {
        Ok(RunOutcome::Cancelled) => ExitCode::SUCCESS,
        Ok(RunOutcome::StreamClosed) => {
            tracing::info!(host = %config.host, "Stream closed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Stream failed");
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Watch {
            host,
            port,
            user,
            auto_restart,
            events,
            raw,
        } => {
            let args = WatchArgs {
                host,
                port,
                user,
                auto_restart,
                events,
                raw,
            };
            let config = match load_config(cli.config, &args) {
                Ok(config) => config,
                Err(e) => {
                    display::print_error(&e);
                    return ExitCode::FAILURE;
                }
            };
            tracing::info!(
                host = %config.host,
                port = config.port,
                auto_restart = config.auto_restart,
                "Starting stream watcher"
            );
            watch(config, args.events, args.raw).await
        }
        Commands::Camelize { tag } => {
            println!("{}", camelize(&tag));
            ExitCode::SUCCESS
        }
    }
}
