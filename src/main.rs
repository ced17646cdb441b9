use axum::serve;
use docstore_rest::build_app;
use docstore_rest::config::AppConfig;
use log::info;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = AppConfig::load()?;
    info!(
        "Configuration loaded: server={}:{}, {} named script(s)",
        config.server.host,
        config.server.port,
        config.scripts.len()
    );

    run_server(build_app(&config), &config).await
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    info!("Document store running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
