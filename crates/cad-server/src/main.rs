use std::net::SocketAddr;

use cad_pipeline::PipelineConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_owned());
    let port = match std::env::var("PORT") {
        Ok(raw) => raw.parse::<u16>()?,
        Err(_) => DEFAULT_PORT,
    };
    let address: SocketAddr = format!("{host}:{port}").parse()?;

    let config = PipelineConfig::from_env();
    info!(%address, output_dir = %config.output_dir.display(), "starting cad-server");

    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, cad_server::app(config)).await?;
    Ok(())
}
