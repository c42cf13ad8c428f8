/// Athena Portal - university academic portal backend
use athena_portal::{config::ServerConfig, context::AppContext, error::PortalResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> PortalResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "athena_portal=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ___   __  __
   /   | / /_/ /_  ___  ____  ____ _
  / /| |/ __/ __ \/ _ \/ __ \/ __ `/
 / ___ / /_/ / / /  __/ / / / /_/ /
/_/  |_\__/_/ /_/\___/_/ /_/\__,_/

        Athena Academic Portal v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
