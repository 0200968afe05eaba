/// Document verification endpoints for end users
use crate::{
    auth::AuthenticatedPrincipal,
    context::AppContext,
    db::verification::VerificationType,
    error::{TrustError, TrustResult},
    verification::{AccountVerificationView, DocumentImage, SubmitVerification},
};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

/// Headroom for the text fields sent alongside the image
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build verification routes
pub fn routes(max_image_bytes: usize) -> Router<AppContext> {
    Router::new()
        .route("/api/v1/verification/types", get(list_types))
        .route("/api/v1/verification/status", get(current_status))
        .route(
            "/api/v1/verification/submit",
            post(submit).layer(DefaultBodyLimit::max(max_image_bytes + FORM_OVERHEAD_BYTES)),
        )
        .route("/api/v1/verification/image/:id", get(document_image))
}

/// Active document types; no authentication required
async fn list_types(State(ctx): State<AppContext>) -> TrustResult<Json<Vec<VerificationType>>> {
    Ok(Json(ctx.review_workflow.list_types().await?))
}

/// Most recent request of the caller, or null
async fn current_status(
    State(ctx): State<AppContext>,
    principal: AuthenticatedPrincipal,
) -> TrustResult<Json<Option<AccountVerificationView>>> {
    Ok(Json(ctx.review_workflow.current_status(&principal).await?))
}

/// Submit a document for review (multipart form)
async fn submit(
    State(ctx): State<AppContext>,
    principal: AuthenticatedPrincipal,
    multipart: Multipart,
) -> TrustResult<(StatusCode, Json<AccountVerificationView>)> {
    let request = read_submission(multipart, ctx.config.verification.max_image_bytes).await?;
    let view = ctx.review_workflow.submit(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Raw document image with its stored content type
async fn document_image(
    State(ctx): State<AppContext>,
    principal: AuthenticatedPrincipal,
    Path(id): Path<i64>,
) -> TrustResult<impl IntoResponse> {
    let image = ctx.review_workflow.document_image(&principal, id).await?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.bytes))
}

async fn read_submission(
    mut multipart: Multipart,
    max_image_bytes: usize,
) -> TrustResult<SubmitVerification> {
    let malformed = |e: MultipartError| form_error(e, max_image_bytes);
    let mut verification_type_id = None;
    let mut document_number = String::new();
    let mut document_name = String::new();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "verificationTypeId" => {
                let text = field.text().await.map_err(malformed)?;
                let id = text.trim().parse::<i64>().map_err(|_| {
                    TrustError::Validation("verificationTypeId must be a number".to_string())
                })?;
                verification_type_id = Some(id);
            }
            "documentNumber" => document_number = field.text().await.map_err(malformed)?,
            "documentName" => document_name = field.text().await.map_err(malformed)?,
            "documentImage" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                // An empty file part counts as no image
                if !bytes.is_empty() {
                    image = Some(DocumentImage {
                        bytes: bytes.to_vec(),
                        content_type,
                    });
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let verification_type_id = verification_type_id
        .ok_or_else(|| TrustError::Validation("verificationTypeId is required".to_string()))?;

    Ok(SubmitVerification {
        verification_type_id,
        document_number,
        document_name,
        image,
    })
}

fn form_error(e: MultipartError, max_image_bytes: usize) -> TrustError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return TrustError::Validation(format!(
            "Image size must be less than {} bytes",
            max_image_bytes
        ));
    }
    TrustError::Validation(format!("Malformed form data: {}", e))
}
