/// Email and phone ownership challenge endpoints
use crate::{
    auth::{AuthenticatedPrincipal, RequestMeta},
    challenge::{
        CodeIssued, ContactVerificationStatus, SendCodeRequest, VerifiedContact,
        VerifyCodeRequest,
    },
    context::AppContext,
    error::TrustResult,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

/// Build contact verification routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/v1/contact/send-code", post(send_code))
        .route("/api/v1/contact/verify", post(verify_code))
        .route("/api/v1/contact/status", get(status))
}

/// Issue a code to the claimed email or phone number
async fn send_code(
    State(ctx): State<AppContext>,
    principal: AuthenticatedPrincipal,
    meta: RequestMeta,
    Json(req): Json<SendCodeRequest>,
) -> TrustResult<Json<CodeIssued>> {
    let issued = ctx
        .challenge_service
        .request_code(&principal, &req.verification_type, &req.contact_value, meta)
        .await?;

    Ok(Json(issued))
}

/// Redeem a code and mark the channel verified
async fn verify_code(
    State(ctx): State<AppContext>,
    principal: AuthenticatedPrincipal,
    Json(req): Json<VerifyCodeRequest>,
) -> TrustResult<Json<VerifiedContact>> {
    let verified = ctx
        .challenge_service
        .verify_code(
            &principal,
            &req.verification_type,
            &req.contact_value,
            &req.verification_code,
        )
        .await?;

    Ok(Json(verified))
}

/// Verification state of both channels
async fn status(
    State(ctx): State<AppContext>,
    principal: AuthenticatedPrincipal,
) -> TrustResult<Json<ContactVerificationStatus>> {
    Ok(Json(ctx.challenge_service.status(&principal).await?))
}
