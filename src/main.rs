use anyhow::Result;
use catalog_watch_lib::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("catalog_watch_lib=info".parse()?)
                .add_directive("catalog_watch=info".parse()?),
        )
        .init();

    let settings = Settings::load()?;
    catalog_watch_lib::run(settings).await?;

    Ok(())
}
