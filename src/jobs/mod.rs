use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::refresh_token_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Delete revoked and expired refresh tokens
    async fn refresh_token_cleanup_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.token_cleanup_interval.max(1);
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;
            info!("Running refresh token cleanup");

            let started = Instant::now();
            match tasks::cleanup_refresh_tokens(&scheduler.context).await {
                Ok(count) => {
                    crate::metrics::record_background_job(
                        "token_cleanup",
                        "success",
                        started.elapsed().as_secs_f64(),
                    );
                    if count > 0 {
                        info!("Cleaned up {} inactive refresh tokens", count);
                    } else {
                        info!("Token cleanup: no inactive refresh tokens found");
                    }
                }
                Err(e) => {
                    crate::metrics::record_background_job(
                        "token_cleanup",
                        "failure",
                        started.elapsed().as_secs_f64(),
                    );
                    error!("Failed to cleanup refresh tokens: {}", e);
                }
            }
        }
    }

    /// Database health probe
    async fn health_check_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.jobs.health_check_interval.max(1);
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;

            let started = Instant::now();
            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    crate::metrics::record_background_job(
                        "health_check",
                        "success",
                        started.elapsed().as_secs_f64(),
                    );
                }
                Err(e) => {
                    crate::metrics::record_background_job(
                        "health_check",
                        "failure",
                        started.elapsed().as_secs_f64(),
                    );
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
