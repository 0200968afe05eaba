/// Submission and review of identity documents
use super::{
    AccountVerificationView, DocumentImage, SubmitVerification, TransitionOutcome,
    VerificationRequestView, VerificationStatus,
};
use crate::{
    audit::{AuditLog, NewVerificationLog, VerificationLogView},
    auth::{AuthenticatedPrincipal, RequestMeta},
    config::VerificationConfig,
    db::verification::VerificationType,
    error::{TrustError, TrustResult},
    metrics,
};
use chrono::Utc;
use image::ImageFormat;
use sqlx::SqlitePool;

const VIEW_SELECT: &str = "SELECT v.id, v.user_id, v.verification_type_id, v.document_number,
        v.document_name, v.image_mime_type, v.status, v.admin_notes, v.reviewed_by_user_id,
        v.reviewed_at, v.created_at, v.updated_at,
        t.name AS verification_type_name, t.description AS verification_type_description
    FROM account_verification v
    JOIN verification_type t ON t.id = v.verification_type_id";

/// Review workflow over `account_verification`
#[derive(Clone)]
pub struct ReviewWorkflow {
    db: SqlitePool,
    audit: AuditLog,
    config: VerificationConfig,
}

impl ReviewWorkflow {
    pub fn new(db: SqlitePool, audit: AuditLog, config: VerificationConfig) -> Self {
        Self { db, audit, config }
    }

    /// Submit a document for review.
    ///
    /// At most one request per user may be pending, under review or approved.
    pub async fn submit(
        &self,
        principal: &AuthenticatedPrincipal,
        request: SubmitVerification,
    ) -> TrustResult<AccountVerificationView> {
        let verification_type = sqlx::query_as::<_, VerificationType>(
            "SELECT id, name, description, is_active FROM verification_type
             WHERE id = ?1 AND is_active = 1",
        )
        .bind(request.verification_type_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| TrustError::Validation("Invalid verification type".to_string()))?;

        if self.has_active_request(&principal.user_id).await? {
            return Err(active_request_conflict());
        }

        let (image_bytes, image_mime_type) = match request.image {
            Some(image) => {
                let mime = self.validate_image(&image)?;
                (Some(image.bytes), Some(mime))
            }
            None => (None, None),
        };

        let now = Utc::now();

        // Guard and insert are one statement so concurrent submissions cannot both pass
        let result = sqlx::query(&format!(
            "INSERT INTO account_verification (user_id, verification_type_id, document_number,
                                               document_name, document_image, image_mime_type,
                                               status, created_at, updated_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7
             WHERE NOT EXISTS (
                 SELECT 1 FROM account_verification
                 WHERE user_id = ?1 AND status IN ({})
             )",
            VerificationStatus::active_sql_list()
        ))
        .bind(&principal.user_id)
        .bind(verification_type.id)
        .bind(request.document_number.trim())
        .bind(request.document_name.trim())
        .bind(image_bytes)
        .bind(image_mime_type)
        .bind(now)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(active_request_conflict());
        }

        let id = result.last_insert_rowid();
        metrics::record_submission(&verification_type.name);
        tracing::info!(
            user_id = %principal.user_id,
            verification_id = id,
            verification_type = %verification_type.name,
            "Verification submitted"
        );

        self.fetch_view(id)
            .await?
            .ok_or_else(|| TrustError::Internal("Submitted verification vanished".to_string()))
    }

    /// Move a request to a new status and append its log entry.
    ///
    /// The status update and the log row commit together or not at all.
    pub async fn transition(
        &self,
        reviewer: &AuthenticatedPrincipal,
        verification_id: i64,
        new_status: &str,
        remarks: Option<String>,
        meta: RequestMeta,
    ) -> TrustResult<TransitionOutcome> {
        let result = self
            .apply_transition(reviewer, verification_id, new_status, remarks, meta)
            .await;

        if let Err(e) = &result {
            if e.is_system() {
                tracing::error!(
                    verification_id,
                    reviewer = %reviewer.user_id,
                    requested = new_status,
                    "Verification transition failed: {}",
                    e
                );
            } else {
                tracing::warn!(
                    verification_id,
                    reviewer = %reviewer.user_id,
                    requested = new_status,
                    kind = e.kind().as_str(),
                    "Verification transition rejected: {}",
                    e
                );
            }
        }

        result
    }

    async fn apply_transition(
        &self,
        reviewer: &AuthenticatedPrincipal,
        verification_id: i64,
        new_status: &str,
        remarks: Option<String>,
        meta: RequestMeta,
    ) -> TrustResult<TransitionOutcome> {
        reviewer.require_admin()?;
        let new_status = VerificationStatus::parse(new_status)?;
        let remarks = remarks
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let mut tx = self.db.begin().await?;

        // Take the write lock before reading the current status
        let touched = sqlx::query("UPDATE account_verification SET updated_at = updated_at WHERE id = ?1")
            .bind(verification_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(TrustError::NotFound("Verification not found".to_string()));
        }

        let previous: String = sqlx::query_scalar("SELECT status FROM account_verification WHERE id = ?1")
            .bind(verification_id)
            .fetch_one(&mut *tx)
            .await?;
        let previous = VerificationStatus::parse(&previous)
            .map_err(|_| TrustError::Internal(format!("Stored status {} is not recognized", previous)))?;

        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE account_verification
             SET status = ?1, admin_notes = ?2, reviewed_by_user_id = ?3, reviewed_at = ?4,
                 updated_at = ?4
             WHERE id = ?5 AND status = ?6",
        )
        .bind(new_status.as_str())
        .bind(&remarks)
        .bind(&reviewer.user_id)
        .bind(now)
        .bind(verification_id)
        .bind(previous.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(TrustError::Conflict(
                "Verification was modified by another reviewer".to_string(),
            ));
        }

        let log = AuditLog::append_transition(
            &mut tx,
            NewVerificationLog {
                verification_id,
                admin_user_id: reviewer.user_id.clone(),
                previous_status: previous,
                new_status,
                reason: remarks.clone(),
                admin_remarks: remarks,
                meta,
            },
        )
        .await?;

        tx.commit().await?;

        metrics::record_review_transition(&log.action);
        tracing::info!(
            verification_id,
            reviewer = %reviewer.user_id,
            previous = previous.as_str(),
            new = new_status.as_str(),
            action = %log.action,
            "Verification status changed"
        );

        let verification = self
            .fetch_view(verification_id)
            .await?
            .ok_or_else(|| TrustError::NotFound("Verification not found".to_string()))?;

        Ok(TransitionOutcome {
            verification,
            log_id: log.id,
            action: log.action,
            previous_status: log.previous_status,
            new_status: log.new_status,
            action_timestamp: log.action_timestamp,
        })
    }

    /// Review history, newest first
    pub async fn list_logs(
        &self,
        reviewer: &AuthenticatedPrincipal,
        verification_id: Option<i64>,
    ) -> TrustResult<Vec<VerificationLogView>> {
        reviewer.require_admin()?;
        self.audit.list_transitions(verification_id).await
    }

    /// Active document types ordered by name
    pub async fn list_types(&self) -> TrustResult<Vec<VerificationType>> {
        let types = sqlx::query_as::<_, VerificationType>(
            "SELECT id, name, description, is_active FROM verification_type
             WHERE is_active = 1 ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(types)
    }

    /// The principal's most recent request, if any
    pub async fn current_status(
        &self,
        principal: &AuthenticatedPrincipal,
    ) -> TrustResult<Option<AccountVerificationView>> {
        let view = sqlx::query_as::<_, AccountVerificationView>(&format!(
            "{} WHERE v.user_id = ?1 ORDER BY v.created_at DESC, v.id DESC LIMIT 1",
            VIEW_SELECT
        ))
        .bind(&principal.user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(view)
    }

    /// Image attached to a request. Owners see their own; admins see any.
    pub async fn document_image(
        &self,
        principal: &AuthenticatedPrincipal,
        verification_id: i64,
    ) -> TrustResult<DocumentImage> {
        let row: Option<(String, Option<Vec<u8>>, Option<String>)> = sqlx::query_as(
            "SELECT user_id, document_image, image_mime_type FROM account_verification WHERE id = ?1",
        )
        .bind(verification_id)
        .fetch_optional(&self.db)
        .await?;

        let (owner, bytes, mime) = match row {
            Some(row) if row.0 == principal.user_id || principal.is_admin() => row,
            _ => return Err(TrustError::NotFound("Verification not found".to_string())),
        };

        let bytes = bytes
            .filter(|b| !b.is_empty())
            .ok_or_else(|| TrustError::NotFound("No image found for this verification".to_string()))?;

        tracing::debug!(verification_id, owner = %owner, "Serving document image");

        Ok(DocumentImage {
            bytes,
            content_type: mime.unwrap_or_else(|| "application/octet-stream".to_string()),
        })
    }

    /// Reviewer queue, newest first
    pub async fn list_requests(
        &self,
        reviewer: &AuthenticatedPrincipal,
    ) -> TrustResult<Vec<VerificationRequestView>> {
        reviewer.require_admin()?;

        let rows = sqlx::query_as::<_, VerificationRequestView>(
            "SELECT v.id, v.user_id, v.verification_type_id, v.document_number,
                    v.document_name, v.image_mime_type, v.status, v.admin_notes,
                    v.reviewed_by_user_id, v.reviewed_at, v.created_at, v.updated_at,
                    t.name AS verification_type_name,
                    TRIM(i.first_name || ' ' || COALESCE(i.middle_name || ' ', '') || i.last_name)
                        AS user_name,
                    i.email AS user_email,
                    v.document_image IS NOT NULL AS has_image
             FROM account_verification v
             JOIN verification_type t ON t.id = v.verification_type_id
             JOIN identity i ON i.id = v.user_id
             ORDER BY v.created_at DESC, v.id DESC",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn has_active_request(&self, user_id: &str) -> TrustResult<bool> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM account_verification
             WHERE user_id = ?1 AND status IN ({})",
            VerificationStatus::active_sql_list()
        ))
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count > 0)
    }

    async fn fetch_view(&self, id: i64) -> TrustResult<Option<AccountVerificationView>> {
        let view = sqlx::query_as::<_, AccountVerificationView>(&format!("{} WHERE v.id = ?1", VIEW_SELECT))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(view)
    }

    /// Check declared type, size and actual content; returns the normalized mime type
    fn validate_image(&self, image: &DocumentImage) -> TrustResult<String> {
        let mime = image.content_type.trim().to_lowercase();

        if !self.config.allowed_mime_types.iter().any(|allowed| *allowed == mime) {
            return Err(TrustError::Validation(
                "Invalid image format. Only JPEG, PNG, and GIF are allowed".to_string(),
            ));
        }

        if image.bytes.is_empty() {
            return Err(TrustError::Validation("Image is empty".to_string()));
        }

        if image.bytes.len() > self.config.max_image_bytes {
            return Err(TrustError::Validation(format!(
                "Image size must be less than {} bytes",
                self.config.max_image_bytes
            )));
        }

        let expected = match mime.as_str() {
            "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
            "image/png" => ImageFormat::Png,
            "image/gif" => ImageFormat::Gif,
            _ => {
                return Err(TrustError::Validation(format!("Unsupported image type {}", mime)));
            }
        };

        match image::guess_format(&image.bytes) {
            Ok(actual) if actual == expected => Ok(mime),
            _ => Err(TrustError::Validation(
                "Image content does not match its declared type".to_string(),
            )),
        }
    }
}

fn active_request_conflict() -> TrustError {
    TrustError::Conflict(
        "You already have a verification request that is pending, under review, or approved"
            .to_string(),
    )
}
