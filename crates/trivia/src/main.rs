//! Trivia binary: runs the quiz server, or joins one as a player.
//!
//! # Usage
//!
//! ```bash
//! # Host a room on the default address; type Y to start the game
//! trivia
//!
//! # Host with a config file and a 15 second round timer
//! trivia --config trivia.json --round-timeout-secs 15
//!
//! # Join as a player
//! trivia --player alice
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trivia::prelude::*;

/// Yes/no quiz over WebSockets
#[derive(Parser, Debug)]
#[command(name = "trivia")]
#[command(version)]
struct Args {
    /// Join a running server as this player instead of hosting
    #[arg(short, long)]
    player: Option<String>,

    /// Address to listen on (server) or connect to (player)
    #[arg(short, long)]
    addr: Option<String>,

    /// JSON config file for the server
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Players required before the game can start
    #[arg(long)]
    min_players: Option<usize>,

    /// Seconds each round waits for answers
    #[arg(long)]
    round_timeout_secs: Option<u64>,

    /// Shuffle the question order
    #[arg(long)]
    shuffle: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run(args));
    // terminal reads park a blocking thread that only returns on the next line
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "trivia exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // players read announcements on stdout, so logs go to stderr
    if args.player.is_some() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }
}

async fn run(args: Args) -> Result<(), TriviaError> {
    match args.player.as_deref() {
        Some(player) => run_player(&args, player).await,
        None => run_server(args).await,
    }
}

async fn run_player(args: &Args, player: &str) -> Result<(), TriviaError> {
    let name = PlayerName::new(player)?;
    let addr = args.addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let url = format!("ws://{addr}");
    tracing::info!(%url, player = %name, "joining");

    run_client(&url, name, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

async fn run_server(args: Args) -> Result<(), TriviaError> {
    let config = load_config(args)?;
    tracing::info!(
        bind = %config.bind,
        min_players = config.room.min_players,
        round_timeout_secs = config.room.round_timeout_secs,
        questions = config.quiz.len(),
        shuffle = config.shuffle,
        "trivia server starting"
    );

    let server = TriviaServerBuilder::from_config(&config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    let room = server.room().clone();
    tokio::spawn(async move {
        if let Err(e) = run_operator(room, BufReader::new(tokio::io::stdin())).await {
            tracing::warn!(error = %e, "operator terminal stopped");
        }
    });

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(args: Args) -> Result<ServerConfig, TriviaError> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(addr) = args.addr {
        config.bind = addr;
    }
    if let Some(min_players) = args.min_players {
        config.room.min_players = min_players;
    }
    if let Some(secs) = args.round_timeout_secs {
        config.room.round_timeout_secs = secs;
    }
    if args.shuffle {
        config.shuffle = true;
    }

    config.validate().map_err(|reason| TriviaError::Config {
        path: args
            .config
            .as_ref()
            .map_or_else(|| "<command line>".to_string(), |p| p.display().to_string()),
        reason,
    })?;
    Ok(config)
}
