/// Background task implementations
use crate::{context::AppContext, error::TrustResult};

/// Delete refresh tokens that are revoked or past expiry
pub async fn cleanup_refresh_tokens(ctx: &AppContext) -> TrustResult<u64> {
    ctx.token_service.cleanup_expired().await
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> TrustResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::CodeSender;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NullSender;

    #[async_trait]
    impl CodeSender for NullSender {
        async fn send_code(&self, _destination: &str, _code: &str, _display_name: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_tasks_run_against_fresh_database() {
        let ctx = AppContext::for_tests(Arc::new(NullSender)).await.unwrap();
        health_check(&ctx).await.unwrap();
        assert_eq!(cleanup_refresh_tokens(&ctx).await.unwrap(), 0);
    }
}
