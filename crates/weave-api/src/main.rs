use weave_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Database, storage, services, worker pool and routes
    let (state, router) = weave_api::setup::initialize_app(config.clone()).await?;

    weave_api::setup::server::start_server(&config, state, router).await?;

    Ok(())
}
