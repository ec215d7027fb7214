use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;

/// Parses command-line arguments and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    info!(
        "Starting grid server on {} ({} ticks/s, {:?} broadcast)",
        config.bind_addr(),
        config.tick_rate,
        config.broadcast
    );

    let mut server = Server::new(&config).await?;
    server.run().await?;

    info!("Server stopped");
    Ok(())
}
