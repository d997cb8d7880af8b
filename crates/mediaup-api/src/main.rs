use mediaup_api::setup;
use mediaup_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (storage, session registry, routes)
    let app = setup::initialize_app(config.clone()).await?;

    // Serve until a shutdown signal, then stop background work
    setup::server::start_server(&config, app).await?;

    Ok(())
}
