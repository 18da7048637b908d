use clap::Parser;
use spotify_session_proxy::{config::Config, server::Server};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spotify-session-proxy")]
#[command(about = "Session-cookie OAuth proxy for the Spotify Web API")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from_file(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let server = Server::new(config).await?;
    server.run().await?;
    Ok(())
}
