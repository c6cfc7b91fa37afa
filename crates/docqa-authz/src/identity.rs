//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::model::{Actor, ActorId};

/// Identifier for an API key.
pub type ApiKeyId = String;

/// Representation of a user within the identity store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    /// Stable identifier (UUID).
    pub id: ActorId,
    /// Login email, unique per store.
    pub email: String,
    /// Display name; also used for name lookups.
    pub full_name: String,
    /// Administrator flag fixed at creation.
    pub is_admin: bool,
    /// Whether the user can authenticate.
    pub active: bool,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// Actor snapshot handed to the authorization gate.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// Registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    /// Login email.
    pub email: String,
    /// Plaintext password; hashed before storage.
    pub password: String,
    /// Optional display name, defaults to the email.
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Partial profile update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    /// New display name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// New login email.
    #[serde(default)]
    pub email: Option<String>,
    /// New password.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredUser {
    account: UserAccount,
    password_hash: String,
}

/// Stored representation of an API key (only the hash is kept).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredApiKey {
    user_id: ActorId,
    hash: String,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

/// Claims returned when a bearer key is validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// User identifier bound to the key.
    pub subject: ActorId,
    /// Administrator flag of the subject.
    pub is_admin: bool,
    /// Issued timestamp.
    pub issued_at: DateTime<Utc>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenClaims {
    /// Actor snapshot for the authenticated subject.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.subject.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// API key returned to the caller (secret string plus metadata).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKey {
    /// Key identifier.
    pub id: ApiKeyId,
    /// Plaintext secret (base64 encoded) the caller must store securely.
    pub secret: String,
    /// Expiry if configured.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Errors returned by the identity subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Attempted to create a user that already exists.
    #[error("user already exists")]
    UserExists,
    /// User not found.
    #[error("user not found")]
    UserNotFound,
    /// Email or password rejected.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// Malformed registration or update payload.
    #[error("invalid user data: {0}")]
    InvalidInput(String),
    /// Account disabled.
    #[error("user is inactive")]
    Inactive,
    /// API key lookup failure.
    #[error("api key invalid")]
    InvalidApiKey,
    /// API key expired.
    #[error("api key expired")]
    ApiKeyExpired,
    /// Password hashing backend failure.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// In-memory identity provider: user registry plus bearer API keys.
#[derive(Debug, Default, Clone)]
pub struct IdentityProvider {
    users: Arc<RwLock<HashMap<ActorId, StoredUser>>>,
    api_keys: Arc<RwLock<HashMap<ApiKeyId, StoredApiKey>>>,
}

impl IdentityProvider {
    /// Create an empty identity provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a regular user.
    pub fn register(&self, request: NewUser) -> Result<UserAccount, IdentityError> {
        self.create_user(request, false)
    }

    /// Register an administrator (bootstrap only; never reachable from the API).
    pub fn register_admin(&self, request: NewUser) -> Result<UserAccount, IdentityError> {
        self.create_user(request, true)
    }

    fn create_user(&self, request: NewUser, is_admin: bool) -> Result<UserAccount, IdentityError> {
        let email = normalise_email(&request.email)?;
        validate_password(&request.password)?;
        let password_hash = hash_password(&request.password)?;

        let mut users = self.users.write();
        if users.values().any(|stored| stored.account.email == email) {
            return Err(IdentityError::UserExists);
        }
        let account = UserAccount {
            id: uuid::Uuid::new_v4().to_string(),
            full_name: request
                .full_name
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| email.clone()),
            email,
            is_admin,
            active: true,
            created_at: Utc::now(),
        };
        users.insert(
            account.id.clone(),
            StoredUser {
                account: account.clone(),
                password_hash,
            },
        );
        debug!(user = %account.id, is_admin, "user registered");
        Ok(account)
    }

    /// Retrieve a user by id.
    pub fn get_user(&self, user_id: &str) -> Option<UserAccount> {
        self.users
            .read()
            .get(user_id)
            .map(|stored| stored.account.clone())
    }

    /// Retrieve a user by login email.
    pub fn find_by_email(&self, email: &str) -> Option<UserAccount> {
        let email = email.trim().to_ascii_lowercase();
        self.users
            .read()
            .values()
            .find(|stored| stored.account.email == email)
            .map(|stored| stored.account.clone())
    }

    /// Retrieve the first user with the given display name.
    pub fn find_by_name(&self, full_name: &str) -> Option<UserAccount> {
        self.list_users()
            .into_iter()
            .find(|account| account.full_name == full_name)
    }

    /// All users ordered by email.
    pub fn list_users(&self) -> Vec<UserAccount> {
        let mut users: Vec<UserAccount> = self
            .users
            .read()
            .values()
            .map(|stored| stored.account.clone())
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    /// Apply a partial profile update.
    pub fn update_user(&self, user_id: &str, update: UserUpdate) -> Result<UserAccount, IdentityError> {
        let email = update.email.as_deref().map(normalise_email).transpose()?;
        let password_hash = match update.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let mut users = self.users.write();
        if let Some(email) = &email {
            if users
                .values()
                .any(|stored| stored.account.email == *email && stored.account.id != user_id)
            {
                return Err(IdentityError::UserExists);
            }
        }
        let stored = users.get_mut(user_id).ok_or(IdentityError::UserNotFound)?;
        if let Some(name) = update.full_name.map(|name| name.trim().to_owned()) {
            if !name.is_empty() {
                stored.account.full_name = name;
            }
        }
        if let Some(email) = email {
            stored.account.email = email;
        }
        if let Some(hash) = password_hash {
            stored.password_hash = hash;
        }
        Ok(stored.account.clone())
    }

    /// Delete a user and revoke all of its keys.
    pub fn remove_user(&self, user_id: &str) -> Result<UserAccount, IdentityError> {
        let removed = self
            .users
            .write()
            .remove(user_id)
            .ok_or(IdentityError::UserNotFound)?;
        self.api_keys
            .write()
            .retain(|_id, key| key.user_id != user_id);
        Ok(removed.account)
    }

    /// Verify credentials and issue a bearer key.
    pub fn login(
        &self,
        email: &str,
        password: &str,
        ttl: Option<Duration>,
    ) -> Result<ApiKey, IdentityError> {
        let email = email.trim().to_ascii_lowercase();
        let user_id = {
            let users = self.users.read();
            let stored = users
                .values()
                .find(|stored| stored.account.email == email)
                .ok_or(IdentityError::InvalidCredentials)?;
            if !verify_password(&stored.password_hash, password) {
                return Err(IdentityError::InvalidCredentials);
            }
            stored.account.id.clone()
        };
        self.issue_api_key(&user_id, ttl)
    }

    /// Issue a new API key associated with the user.
    pub fn issue_api_key(&self, user_id: &str, ttl: Option<Duration>) -> Result<ApiKey, IdentityError> {
        let user = self.get_user(user_id).ok_or(IdentityError::UserNotFound)?;
        if !user.active {
            return Err(IdentityError::Inactive);
        }

        let mut secret_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let secret = BASE64.encode(secret_bytes);
        let now = Utc::now();
        let expires_at = ttl.map(|delta| now + delta);
        let id = uuid::Uuid::new_v4().to_string();

        self.api_keys.write().insert(
            id.clone(),
            StoredApiKey {
                user_id: user.id,
                hash: hash_secret(&secret),
                issued_at: now,
                expires_at,
            },
        );

        Ok(ApiKey {
            id,
            secret,
            expires_at,
        })
    }

    /// Validate a bearer secret and return claims for downstream services.
    pub fn authenticate(&self, secret: &str) -> Result<TokenClaims, IdentityError> {
        let hash = hash_secret(secret);
        let key = self
            .api_keys
            .read()
            .values()
            .find(|stored| stored.hash == hash)
            .cloned()
            .ok_or(IdentityError::InvalidApiKey)?;

        if let Some(expiry) = key.expires_at {
            if Utc::now() > expiry {
                return Err(IdentityError::ApiKeyExpired);
            }
        }

        let user = self
            .get_user(&key.user_id)
            .ok_or(IdentityError::UserNotFound)?;
        if !user.active {
            return Err(IdentityError::Inactive);
        }

        Ok(TokenClaims {
            subject: user.id,
            is_admin: user.is_admin,
            issued_at: key.issued_at,
            expires_at: key.expires_at,
        })
    }

    /// Revoke an API key by identifier.
    pub fn revoke_api_key(&self, id: &str) -> bool {
        self.api_keys.write().remove(id).is_some()
    }

    /// Enumerate API keys for a user (metadata only).
    pub fn list_api_keys(
        &self,
        user_id: &str,
    ) -> Vec<(ApiKeyId, DateTime<Utc>, Option<DateTime<Utc>>)> {
        self.api_keys
            .read()
            .iter()
            .filter(|(_id, key)| key.user_id == user_id)
            .map(|(id, key)| (id.clone(), key.issued_at, key.expires_at))
            .collect()
    }
}

fn normalise_email(raw: &str) -> Result<String, IdentityError> {
    let email = raw.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(IdentityError::InvalidInput(format!("'{raw}' is not an email address"))),
    }
}

fn validate_password(password: &str) -> Result<(), IdentityError> {
    if password.is_empty() {
        return Err(IdentityError::InvalidInput("password cannot be empty".into()));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, IdentityError> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|err| IdentityError::Hashing(err.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| IdentityError::Hashing(err.to_string()))
}

fn verify_password(hash: &str, password: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, password: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password: password.into(),
            full_name: None,
        }
    }

    #[test]
    fn login_and_authenticate() {
        let provider = IdentityProvider::new();
        let user = provider.register(new_user("Alice@Example.com", "s3cret")).unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(!user.is_admin);

        let key = provider
            .login("alice@example.com", "s3cret", Some(Duration::minutes(10)))
            .unwrap();
        let claims = provider.authenticate(&key.secret).unwrap();
        assert_eq!(claims.actor(), Actor::new(user.id.clone()));
        assert_eq!(provider.list_api_keys(&user.id).len(), 1);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let provider = IdentityProvider::new();
        provider.register(new_user("bob@example.com", "right")).unwrap();
        assert_eq!(
            provider.login("bob@example.com", "wrong", None),
            Err(IdentityError::InvalidCredentials)
        );
        assert_eq!(
            provider.login("nobody@example.com", "right", None),
            Err(IdentityError::InvalidCredentials)
        );
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let provider = IdentityProvider::new();
        provider.register(new_user("carol@example.com", "pw")).unwrap();
        assert_eq!(
            provider.register(new_user("CAROL@example.com", "pw")),
            Err(IdentityError::UserExists)
        );
        assert!(matches!(
            provider.register(new_user("not-an-email", "pw")),
            Err(IdentityError::InvalidInput(_))
        ));
    }

    #[test]
    fn admin_flag_flows_into_claims() {
        let provider = IdentityProvider::new();
        let admin = provider.register_admin(new_user("root@example.com", "pw")).unwrap();
        let key = provider.issue_api_key(&admin.id, None).unwrap();
        assert!(provider.authenticate(&key.secret).unwrap().actor().is_admin);
    }

    #[test]
    fn expired_and_revoked_keys_fail() {
        let provider = IdentityProvider::new();
        let user = provider.register(new_user("dave@example.com", "pw")).unwrap();
        let expired = provider
            .issue_api_key(&user.id, Some(Duration::seconds(-1)))
            .unwrap();
        assert_eq!(
            provider.authenticate(&expired.secret),
            Err(IdentityError::ApiKeyExpired)
        );
        let key = provider.issue_api_key(&user.id, None).unwrap();
        assert!(provider.revoke_api_key(&key.id));
        assert_eq!(
            provider.authenticate(&key.secret),
            Err(IdentityError::InvalidApiKey)
        );
    }

    #[test]
    fn update_and_remove_user() {
        let provider = IdentityProvider::new();
        let user = provider.register(new_user("erin@example.com", "pw")).unwrap();
        let updated = provider
            .update_user(
                &user.id,
                UserUpdate {
                    full_name: Some("Erin E.".into()),
                    password: Some("new-pw".into()),
                    ..UserUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.full_name, "Erin E.");
        assert_eq!(provider.find_by_name("Erin E.").unwrap().id, user.id);
        assert!(provider.login("erin@example.com", "new-pw", None).is_ok());

        let key = provider.issue_api_key(&user.id, None).unwrap();
        provider.remove_user(&user.id).unwrap();
        assert!(provider.get_user(&user.id).is_none());
        assert_eq!(
            provider.authenticate(&key.secret),
            Err(IdentityError::InvalidApiKey)
        );
        assert_eq!(
            provider.remove_user(&user.id),
            Err(IdentityError::UserNotFound)
        );
    }
}
