use clap::Parser;
use log::info;
use server::config::{BallCommit, ServerConfig, TagMatching};
use server::engine::Engine;
use server::network::Server;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "13274")]
    port: u16,

    /// Seconds without updates before a game or lobby is evicted
    #[arg(long, default_value = "600")]
    entity_timeout: u64,

    /// Seconds between eviction checks of each game or lobby
    #[arg(long, default_value = "60")]
    sweep_interval: u64,

    /// Seconds a connection may stay silent before it is closed
    #[arg(long, default_value = "120")]
    idle_timeout: u64,

    /// Seconds between logged server statistics (0 disables)
    #[arg(long, default_value = "60")]
    stats_interval: u64,

    /// Fixed seed for room codes and spawn positions
    #[arg(long)]
    seed: Option<u64>,

    /// Message tag matching: exact or substring
    #[arg(long, default_value = "exact")]
    tag_matching: TagMatching,

    /// Ball update commit mode: serialized or last-writer-wins
    #[arg(long, default_value = "serialized")]
    ball_commit: BallCommit,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level)).init();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        entity_timeout: Duration::from_secs(args.entity_timeout),
        sweep_interval: Duration::from_secs(args.sweep_interval),
        connection_idle_timeout: Duration::from_secs(args.idle_timeout),
        stats_interval: Duration::from_secs(args.stats_interval),
        rng_seed: args.seed,
        tag_matching: args.tag_matching,
        ball_commit: args.ball_commit,
        ..ServerConfig::default()
    };
    config.validate()?;

    info!("Starting server...");
    info!(
        "Entity timeout {}s, tag matching {:?}, ball commit {:?}",
        args.entity_timeout, config.tag_matching, config.ball_commit
    );

    let engine = Arc::new(Engine::new(config));
    let server = Server::bind(engine).await?;
    server.run().await?;

    Ok(())
}
