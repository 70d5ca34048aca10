/// Squad dashboard server binary
use squad_dashboard::{server, AppContext, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   _____                       __   ____            __    __                         __
  / ___/____ ___  ______ _____/ /  / __ \____ _____/ /_  / /_  ____  ____ __________/ /
  \__ \/ __ `/ / / / __ `/ __  /  / / / / __ `/ ___/ __ \/ __ \/ __ \/ __ `/ ___/ __  /
 ___/ / /_/ / /_/ / /_/ / /_/ /  / /_/ / /_/ (__  ) / / / /_/ / /_/ / /_/ / /  / /_/ /
/____/\__, /\__,_/\__,_/\__,_/  /_____/\__,_/____/_/ /_/_.___/\____/\__,_/_/   \__,_/
        /_/
        Squad server dashboard v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
