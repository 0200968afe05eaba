/// SQLite-backed credential store using runtime queries
use super::CredentialStore;
use crate::{
    db::identity::{Identity, IdentityColumn},
    error::TrustResult,
};
use async_trait::async_trait;
use sqlx::SqlitePool;

const IDENTITY_COLUMNS: &str = "id, first_name, middle_name, last_name, email, phone_number,
    password_hash, role_id, email_verified, email_verified_at, phone_verified,
    phone_verified_at, created_at, updated_at";

/// Credential store over the `identity` and `role` tables
#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_by_email(&self, email: &str) -> TrustResult<Option<Identity>> {
        // email is declared COLLATE NOCASE
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {} FROM identity WHERE email = ?1",
            IDENTITY_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?;

        Ok(identity)
    }

    async fn find_by_id(&self, id: &str) -> TrustResult<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {} FROM identity WHERE id = ?1",
            IDENTITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(identity)
    }

    async fn find_by_column(&self, column: IdentityColumn, value: &str) -> TrustResult<Vec<Identity>> {
        let identities = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {} FROM identity WHERE {} = ?1 ORDER BY created_at",
            IDENTITY_COLUMNS,
            column.as_str()
        ))
        .bind(value)
        .fetch_all(&self.db)
        .await?;

        Ok(identities)
    }

    async fn upsert(&self, identity: &Identity) -> TrustResult<()> {
        sqlx::query(
            "INSERT INTO identity (id, first_name, middle_name, last_name, email, phone_number,
                                   password_hash, role_id, email_verified, email_verified_at,
                                   phone_verified, phone_verified_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                middle_name = excluded.middle_name,
                last_name = excluded.last_name,
                email = excluded.email,
                phone_number = excluded.phone_number,
                password_hash = excluded.password_hash,
                role_id = excluded.role_id,
                email_verified = excluded.email_verified,
                email_verified_at = excluded.email_verified_at,
                phone_verified = excluded.phone_verified,
                phone_verified_at = excluded.phone_verified_at,
                updated_at = excluded.updated_at",
        )
        .bind(&identity.id)
        .bind(&identity.first_name)
        .bind(&identity.middle_name)
        .bind(&identity.last_name)
        .bind(&identity.email)
        .bind(&identity.phone_number)
        .bind(&identity.password_hash)
        .bind(identity.role_id)
        .bind(identity.email_verified)
        .bind(identity.email_verified_at)
        .bind(identity.phone_verified)
        .bind(identity.phone_verified_at)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> TrustResult<bool> {
        let result = sqlx::query("DELETE FROM identity WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn role_name(&self, role_id: i64) -> TrustResult<Option<String>> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM role WHERE id = ?1")
            .bind(role_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Utc;

    fn sample(id: &str, email: &str, role_id: i64) -> Identity {
        let now = Utc::now();
        Identity {
            id: id.to_string(),
            first_name: "Jose".to_string(),
            middle_name: Some("P".to_string()),
            last_name: "Rizal".to_string(),
            email: email.to_string(),
            phone_number: "+639170000000".to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            role_id,
            email_verified: false,
            email_verified_at: None,
            phone_verified: false,
            phone_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let store = SqliteCredentialStore::new(db::memory_pool().await.unwrap());
        store.upsert(&sample("u1", "jose@example.ph", 2)).await.unwrap();

        let by_email = store.find_by_email("JOSE@example.ph").await.unwrap().unwrap();
        assert_eq!(by_email.id, "u1");

        let by_id = store.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(by_id.email, "jose@example.ph");

        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let store = SqliteCredentialStore::new(db::memory_pool().await.unwrap());
        let mut identity = sample("u1", "jose@example.ph", 2);
        store.upsert(&identity).await.unwrap();

        identity.phone_verified = true;
        identity.phone_verified_at = Some(Utc::now());
        store.upsert(&identity).await.unwrap();

        let stored = store.find_by_id("u1").await.unwrap().unwrap();
        assert!(stored.phone_verified);
        assert!(stored.phone_verified_at.is_some());
    }

    #[tokio::test]
    async fn test_find_by_column_and_delete() {
        let store = SqliteCredentialStore::new(db::memory_pool().await.unwrap());
        store.upsert(&sample("admin", "admin@example.ph", 1)).await.unwrap();
        store.upsert(&sample("user", "user@example.ph", 2)).await.unwrap();

        let admins = store.find_by_column(IdentityColumn::RoleId, "1").await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].id, "admin");

        assert!(store.delete("user").await.unwrap());
        assert!(!store.delete("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_role_name() {
        let store = SqliteCredentialStore::new(db::memory_pool().await.unwrap());
        assert_eq!(store.role_name(1).await.unwrap().as_deref(), Some("Admin"));
        assert_eq!(store.role_name(2).await.unwrap().as_deref(), Some("User"));
        assert!(store.role_name(42).await.unwrap().is_none());
    }
}
