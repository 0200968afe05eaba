/// Reviewer endpoints; every route requires the Admin role
use crate::{
    audit::VerificationLogView,
    auth::{AdminPrincipal, RequestMeta},
    context::AppContext,
    db::token::LoginAttempt,
    error::TrustResult,
    verification::{LogQuery, TransitionOutcome, TransitionRequest, VerificationRequestView},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/admin/verifications", get(list_verifications))
        .route("/api/v1/admin/verification/:id/status", put(update_status))
        .route("/api/v1/admin/verification-logs", get(list_logs))
        .route("/api/v1/admin/verification/:id/logs", get(logs_for_verification))
        .route("/api/v1/admin/login-logs", get(login_logs))
}

/// Query parameters for the login audit listing
#[derive(Debug, Deserialize)]
pub struct LoginLogQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Reviewer queue
async fn list_verifications(
    State(ctx): State<AppContext>,
    AdminPrincipal(admin): AdminPrincipal,
) -> TrustResult<Json<Vec<VerificationRequestView>>> {
    Ok(Json(ctx.review_workflow.list_requests(&admin).await?))
}

/// Apply a review decision
async fn update_status(
    State(ctx): State<AppContext>,
    AdminPrincipal(admin): AdminPrincipal,
    meta: RequestMeta,
    Path(id): Path<i64>,
    Json(req): Json<TransitionRequest>,
) -> TrustResult<Json<TransitionOutcome>> {
    let outcome = ctx
        .review_workflow
        .transition(&admin, id, &req.status, req.remarks, meta)
        .await?;

    Ok(Json(outcome))
}

/// Review history, optionally for one request
async fn list_logs(
    State(ctx): State<AppContext>,
    AdminPrincipal(admin): AdminPrincipal,
    Query(query): Query<LogQuery>,
) -> TrustResult<Json<Vec<VerificationLogView>>> {
    Ok(Json(
        ctx.review_workflow
            .list_logs(&admin, query.verification_id)
            .await?,
    ))
}

async fn logs_for_verification(
    State(ctx): State<AppContext>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<i64>,
) -> TrustResult<Json<Vec<VerificationLogView>>> {
    Ok(Json(ctx.review_workflow.list_logs(&admin, Some(id)).await?))
}

/// Most recent login attempts
async fn login_logs(
    State(ctx): State<AppContext>,
    AdminPrincipal(_admin): AdminPrincipal,
    Query(query): Query<LoginLogQuery>,
) -> TrustResult<Json<Vec<LoginAttempt>>> {
    let limit = query.limit.unwrap_or(crate::audit::DEFAULT_LOGIN_LIMIT);
    Ok(Json(ctx.audit_log.recent_logins(limit).await?))
}
