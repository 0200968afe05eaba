/// API routes and handlers
pub mod admin;
pub mod auth;
pub mod contact;
pub mod middleware;
pub mod verification;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes(ctx: &AppContext) -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(contact::routes())
        .merge(verification::routes(ctx.config.verification.max_image_bytes))
        .merge(admin::routes())
}
