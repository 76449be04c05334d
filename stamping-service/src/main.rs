use service_core::observability::init_tracing;
use stamping_service::{config::Config, Application};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.service_name, "info,stamping_service=debug");

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
