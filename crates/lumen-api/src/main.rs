use lumen_api::setup;
use lumen_core::Config;

// Use mimalloc as the global allocator.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (_state, router, workers) = setup::initialize_app(&config).await?;

    setup::server::start_server(&config, router, workers).await?;

    Ok(())
}
