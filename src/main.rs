/// Siglat trust service binary
use anyhow::Context as _;
use siglat_trust::{
    config::{LoggingConfig, ServerConfig},
    context::AppContext,
    jobs::JobScheduler,
    server,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env().context("failed to load configuration")?;

    init_tracing(&config.logging);

    print_banner();

    // Create application context
    let ctx = AppContext::new(config)
        .await
        .context("failed to initialize application context")?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(logging.env_filter());

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_banner() {
    println!(
        r#"
   _____ _       __      __
  / ___/(_)___ _/ /___ _/ /_
  \__ \/ / __ `/ / __ `/ __/
 ___/ / / /_/ / / /_/ / /_
/____/_/\__, /_/\__,_/\__/
       /____/
        Trust service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
