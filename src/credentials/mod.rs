/// Credential store and password hashing
///
/// The trust services consume identities through [`CredentialStore`] and
/// check passwords through [`PasswordHasher`]; both are injected so the core
/// never depends on a particular database layout or hashing algorithm.

mod store;

pub use store::SqliteCredentialStore;

use crate::{
    db::identity::{Identity, IdentityColumn},
    error::{TrustError, TrustResult},
};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

/// Role id assigned to self-registered identities
pub const DEFAULT_ROLE_ID: i64 = 2;

/// Durable record of identities, password hashes and roles
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Case-insensitive lookup by email
    async fn find_by_email(&self, email: &str) -> TrustResult<Option<Identity>>;

    async fn find_by_id(&self, id: &str) -> TrustResult<Option<Identity>>;

    /// Generic lookup on one of the indexed identity columns
    async fn find_by_column(&self, column: IdentityColumn, value: &str) -> TrustResult<Vec<Identity>>;

    /// Insert the identity or replace the row with the same id
    async fn upsert(&self, identity: &Identity) -> TrustResult<()>;

    /// Returns whether a row was removed
    async fn delete(&self, id: &str) -> TrustResult<bool>;

    /// Resolve a role id to its name
    async fn role_name(&self, role_id: i64) -> TrustResult<Option<String>>;
}

/// One-way password hashing with a verify contract
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> TrustResult<String>;

    /// Returns false on mismatch; malformed stored hashes are errors
    fn verify(&self, password: &str, hash: &str) -> TrustResult<bool>;
}

/// Argon2id hasher with the crate's default parameters
#[derive(Debug, Default, Clone)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> TrustResult<String> {
        use argon2::password_hash::{rand_core::OsRng, PasswordHasher as _, SaltString};

        let salt = SaltString::generate(&mut OsRng);
        argon2::Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| TrustError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn verify(&self, password: &str, hash: &str) -> TrustResult<bool> {
        use argon2::password_hash::{PasswordHash, PasswordVerifier};

        let parsed = PasswordHash::new(hash)
            .map_err(|e| TrustError::Internal(format!("Stored password hash is malformed: {}", e)))?;

        Ok(argon2::Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Fields supplied when registering a new identity
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub role_id: i64,
}

/// Register a new identity with both contact channels unverified
pub async fn register_identity(
    store: &dyn CredentialStore,
    hasher: &dyn PasswordHasher,
    new: NewIdentity,
) -> TrustResult<Identity> {
    let email = new.email.trim().to_string();

    if store.find_by_email(&email).await?.is_some() {
        return Err(TrustError::Conflict("Email already exists".to_string()));
    }

    if store.role_name(new.role_id).await?.is_none() {
        return Err(TrustError::Validation(format!("Unknown role id {}", new.role_id)));
    }

    let now = Utc::now();
    let identity = Identity {
        id: Uuid::new_v4().to_string(),
        first_name: new.first_name,
        middle_name: new.middle_name,
        last_name: new.last_name,
        email,
        phone_number: new.phone_number.trim().to_string(),
        password_hash: hasher.hash(&new.password)?,
        role_id: new.role_id,
        email_verified: false,
        email_verified_at: None,
        phone_verified: false,
        phone_verified_at: None,
        created_at: now,
        updated_at: now,
    };

    store.upsert(&identity).await?;
    tracing::info!(user_id = %identity.id, "registered identity");

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_argon2_round_trip() {
        let hasher = Argon2Hasher;
        let hash = hasher.hash("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(hasher.verify("correct horse battery staple", &hash).unwrap());
        assert!(!hasher.verify("wrong", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(Argon2Hasher.verify("pw", "not-a-phc-string").is_err());
    }

    #[tokio::test]
    async fn test_register_identity_conflict() {
        let pool = db::memory_pool().await.unwrap();
        let store = SqliteCredentialStore::new(pool);

        let new = NewIdentity {
            first_name: "Maria".to_string(),
            middle_name: None,
            last_name: "Santos".to_string(),
            email: "maria@example.ph".to_string(),
            phone_number: "+639171234567".to_string(),
            password: "Sup3r-secret".to_string(),
            role_id: DEFAULT_ROLE_ID,
        };

        let identity = register_identity(&store, &Argon2Hasher, new.clone()).await.unwrap();
        assert!(!identity.email_verified);
        assert!(!identity.phone_verified);

        let mut shouting = new;
        shouting.email = "MARIA@example.ph".to_string();
        let err = register_identity(&store, &Argon2Hasher, shouting).await.unwrap_err();
        assert!(matches!(err, TrustError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_register_identity_unknown_role() {
        let pool = db::memory_pool().await.unwrap();
        let store = SqliteCredentialStore::new(pool);

        let err = register_identity(
            &store,
            &Argon2Hasher,
            NewIdentity {
                first_name: "A".to_string(),
                middle_name: None,
                last_name: "B".to_string(),
                email: "ab@example.ph".to_string(),
                phone_number: String::new(),
                password: "password".to_string(),
                role_id: 99,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TrustError::Validation(_)));
    }
}
