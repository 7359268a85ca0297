use payment_relay::{config::Config, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,payment_relay=debug");

    let config = Config::from_env()?;
    let application = Application::build(config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to start: {}", e))?;
    application.run_until_stopped().await?;

    Ok(())
}
