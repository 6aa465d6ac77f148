//! Admin authentication.
//!
//! 1. Email and password are checked by an [`IdentityProvider`].
//! 2. The account is an admin only if `users/{uid}.isAdmin` is `true`;
//!    otherwise the provider sign-in is reverted.
//! 3. A successful sign-in gets an opaque bearer token backed by
//!    [`SessionStore`]. Every admin request re-checks the admin flag.

use crate::repository::RosterRepository;
use crate::secret::SecretHash;
use crate::types::UserProfile;
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use roster_core::document::DocumentError;
use roster_core::environment::Clock;
use roster_web::{AppError, BearerToken};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Message for a signed-in account without the admin flag.
pub const NOT_ADMIN_MESSAGE: &str = "관리자 권한이 없는 계정입니다.";

/// Message for an unknown email or a wrong password.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "이메일 또는 비밀번호가 올바르지 않습니다.";

/// Authentication errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown email or wrong password
    #[error("이메일 또는 비밀번호가 올바르지 않습니다.")]
    InvalidCredentials,
    /// The account is not an admin
    #[error("관리자 권한이 없는 계정입니다.")]
    NotAdmin,
    /// No session for the token
    #[error("Session not found")]
    SessionNotFound,
    /// The session has expired
    #[error("Session expired")]
    SessionExpired,
    /// Reading the user profile failed
    #[error(transparent)]
    Storage(#[from] DocumentError),
    /// Internal bookkeeping failed
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        let message = error.to_string();
        match error {
            AuthError::InvalidCredentials => {
                Self::unauthorized(message).with_code("INVALID_CREDENTIALS")
            },
            AuthError::NotAdmin => Self::forbidden(message).with_code("NOT_ADMIN"),
            AuthError::SessionNotFound => Self::unauthorized(message).with_code("SESSION_NOT_FOUND"),
            AuthError::SessionExpired => Self::unauthorized(message).with_code("SESSION_EXPIRED"),
            AuthError::Storage(source) => Self::from(source),
            AuthError::Internal(_) => Self::internal(message),
        }
    }
}

/// Result alias for authentication.
pub type Result<T> = std::result::Result<T, AuthError>;

/// A verified account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Stable account id, the key into `users`
    pub uid: String,
    /// Sign-in email
    pub email: String,
}

/// Email/password accounts.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Check credentials.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] for an unknown email or a wrong
    /// password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// Revert a sign-in.
    ///
    /// # Errors
    ///
    /// Provider specific.
    async fn sign_out(&self, identity: &Identity) -> Result<()>;
}

#[derive(Clone)]
struct Account {
    uid: String,
    secret: SecretHash,
}

/// Accounts held in memory, seeded from configuration.
#[derive(Clone, Default)]
pub struct InMemoryIdentityProvider {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryIdentityProvider {
    /// No accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account and return its uid.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the account table is poisoned.
    pub fn add_account(&self, email: &str, password: &str) -> Result<String> {
        let key = normalize_email(email);
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| AuthError::Internal("Account lock poisoned".to_string()))?;
        let uid = accounts
            .get(&key)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), |account| account.uid.clone());
        accounts.insert(
            key,
            Account {
                uid: uid.clone(),
                secret: SecretHash::new(password),
            },
        );
        Ok(uid)
    }
}

impl std::fmt::Debug for InMemoryIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIdentityProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let key = normalize_email(email);
        let account = self
            .accounts
            .read()
            .map_err(|_| AuthError::Internal("Account lock poisoned".to_string()))?
            .get(&key)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        if !account.secret.verify(password) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Identity {
            uid: account.uid,
            email: key,
        })
    }

    async fn sign_out(&self, identity: &Identity) -> Result<()> {
        tracing::debug!(uid = %identity.uid, "Provider sign-in reverted");
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A signed-in admin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Account id
    pub uid: String,
    /// Sign-in email
    pub email: String,
    /// When the token stops working
    pub expires_at: DateTime<Utc>,
}

/// Opaque bearer tokens with a fixed lifetime.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl SessionStore {
    /// Sessions lasting `ttl`, timed by `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| AuthError::Internal("Session lock poisoned".to_string()))
    }

    /// Open a session and return its token.
    ///
    /// Sessions that have already expired are dropped first, so the table
    /// only grows with live sign-ins.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the session table is poisoned.
    pub fn create(&self, identity: &Identity) -> Result<(String, Session)> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let now = self.clock.now();
        let session = Session {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let mut sessions = self.lock()?;
        sessions.retain(|_, existing| existing.expires_at > now);
        sessions.insert(token.clone(), session.clone());
        Ok((token, session))
    }

    /// The live session for `token`. Expired sessions are dropped.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionNotFound`] or [`AuthError::SessionExpired`].
    pub fn get(&self, token: &str) -> Result<Session> {
        let mut sessions = self.lock()?;
        let session = sessions.get(token).cloned().ok_or(AuthError::SessionNotFound)?;
        if session.expires_at <= self.clock.now() {
            sessions.remove(token);
            return Err(AuthError::SessionExpired);
        }
        Ok(session)
    }

    /// End a session. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the session table is poisoned.
    pub fn delete(&self, token: &str) -> Result<()> {
        self.lock()?.remove(token);
        Ok(())
    }

    /// Drop expired sessions and return how many were removed.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the session table is poisoned.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        Ok(before - sessions.len())
    }

    /// Number of stored sessions, expired ones included until purged.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the session table is poisoned.
    pub fn session_count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Purge expired sessions every `period` until the returned task is
    /// aborted.
    pub fn spawn_sweeper(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let sessions = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                match sessions.purge_expired() {
                    Ok(0) => {},
                    Ok(purged) => tracing::debug!(purged, "Expired admin sessions purged"),
                    Err(error) => {
                        tracing::error!(%error, "Session sweeper stopped");
                        return;
                    },
                }
            }
        })
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Response to a successful admin sign-in.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLogin {
    /// Bearer token for the admin endpoints
    pub token: String,
    /// Sign-in email
    pub email: String,
    /// When the token stops working
    pub expires_at: DateTime<Utc>,
}

/// Admin sign-in and request authorization.
#[derive(Clone)]
pub struct AdminAuth {
    identity: Arc<dyn IdentityProvider>,
    sessions: SessionStore,
    records: RosterRepository,
}

impl AdminAuth {
    /// Authentication over `identity`, with admin flags read from `records`.
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        sessions: SessionStore,
        records: RosterRepository,
    ) -> Self {
        Self {
            identity,
            sessions,
            records,
        }
    }

    /// The session table.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    async fn is_admin(&self, uid: &str) -> Result<bool> {
        Ok(self
            .records
            .user(uid)
            .await?
            .is_some_and(|profile| profile.is_admin))
    }

    /// Sign in an admin.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`], [`AuthError::NotAdmin`] (after the
    /// provider sign-in is reverted) or a storage failure.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AdminLogin> {
        let identity = match self.identity.sign_in(email, password).await {
            Ok(identity) => identity,
            Err(error) => {
                tracing::info!("Admin sign-in refused");
                return Err(error);
            },
        };

        if !self.is_admin(&identity.uid).await? {
            self.identity.sign_out(&identity).await?;
            tracing::warn!(uid = %identity.uid, "Sign-in by non-admin account");
            return Err(AuthError::NotAdmin);
        }

        let (token, session) = self.sessions.create(&identity)?;
        tracing::info!(uid = %session.uid, "Admin signed in");
        Ok(AdminLogin {
            token,
            email: session.email,
            expires_at: session.expires_at,
        })
    }

    /// The admin behind `token`.
    ///
    /// # Errors
    ///
    /// Session errors, [`AuthError::NotAdmin`] if the flag was revoked, or a
    /// storage failure.
    pub async fn authorize(&self, token: &str) -> Result<Session> {
        let session = self.sessions.get(token)?;
        if !self.is_admin(&session.uid).await? {
            self.sessions.delete(token)?;
            return Err(AuthError::NotAdmin);
        }
        Ok(session)
    }

    /// End the session behind `token`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Internal`] if the session table is poisoned.
    pub fn logout(&self, token: &str) -> Result<()> {
        self.sessions.delete(token)?;
        tracing::info!("Admin signed out");
        Ok(())
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

/// Create an account and mark it as admin.
///
/// # Errors
///
/// Account or profile write failures.
pub async fn seed_admin(
    provider: &InMemoryIdentityProvider,
    records: &RosterRepository,
    email: &str,
    password: &str,
) -> Result<String> {
    let uid = provider.add_account(email, password)?;
    records
        .put_user(
            &uid,
            &UserProfile {
                email: normalize_email(email),
                is_admin: true,
            },
        )
        .await?;
    tracing::info!(%uid, "Admin account seeded");
    Ok(uid)
}

/// An authorized admin request.
///
/// Use as a handler parameter to require a valid admin session.
#[derive(Debug, Clone)]
pub struct AdminSession {
    /// The bearer token
    pub token: String,
    /// The session behind it
    pub session: Session,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
    AdminAuth: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let auth = AdminAuth::from_ref(state);
        let session = auth.authorize(&token).await?;
        Ok(Self { token, session })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use roster_testing::{InMemoryDocumentStore, ManualClock, test_clock};

    fn auth_with(clock: Arc<dyn Clock>) -> (AdminAuth, InMemoryIdentityProvider, RosterRepository) {
        let provider = InMemoryIdentityProvider::new();
        let records = RosterRepository::new(Arc::new(InMemoryDocumentStore::new()));
        let auth = AdminAuth::new(
            Arc::new(provider.clone()),
            SessionStore::new(clock, Duration::from_secs(60)),
            records.clone(),
        );
        (auth, provider, records)
    }

    #[tokio::test]
    async fn test_admin_login_and_authorize() {
        let (auth, provider, records) = auth_with(Arc::new(test_clock()));
        seed_admin(&provider, &records, "Admin@Ewha.kr", "pw").await.unwrap();

        let login = auth.login("admin@ewha.kr", "pw").await.unwrap();
        let session = auth.authorize(&login.token).await.unwrap();
        assert_eq!(session.email, "admin@ewha.kr");

        auth.logout(&login.token).unwrap();
        assert!(matches!(
            auth.authorize(&login.token).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email() {
        let (auth, provider, records) = auth_with(Arc::new(test_clock()));
        seed_admin(&provider, &records, "admin@ewha.kr", "pw").await.unwrap();

        assert!(matches!(
            auth.login("admin@ewha.kr", "nope").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("who@ewha.kr", "pw").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_non_admin_is_refused() {
        let (auth, provider, records) = auth_with(Arc::new(test_clock()));
        let uid = provider.add_account("student@ewha.kr", "pw").unwrap();
        records
            .put_user(
                &uid,
                &UserProfile {
                    email: "student@ewha.kr".to_string(),
                    is_admin: false,
                },
            )
            .await
            .unwrap();

        let error = auth.login("student@ewha.kr", "pw").await.unwrap_err();
        assert!(matches!(error, AuthError::NotAdmin));
        assert_eq!(AppError::from(error).message(), NOT_ADMIN_MESSAGE);

        // No profile at all is not an admin either.
        provider.add_account("nobody@ewha.kr", "pw").unwrap();
        assert!(matches!(
            auth.login("nobody@ewha.kr", "pw").await,
            Err(AuthError::NotAdmin)
        ));
    }

    #[tokio::test]
    async fn test_revoked_admin_loses_session() {
        let (auth, provider, records) = auth_with(Arc::new(test_clock()));
        let uid = seed_admin(&provider, &records, "admin@ewha.kr", "pw").await.unwrap();
        let login = auth.login("admin@ewha.kr", "pw").await.unwrap();

        records
            .put_user(
                &uid,
                &UserProfile {
                    email: "admin@ewha.kr".to_string(),
                    is_admin: false,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            auth.authorize(&login.token).await,
            Err(AuthError::NotAdmin)
        ));
    }

    #[test]
    fn test_sessions_expire() {
        let clock = Arc::new(ManualClock::stepping());
        let sessions = SessionStore::new(clock.clone(), Duration::from_secs(60));
        let identity = Identity {
            uid: "u".to_string(),
            email: "a@b.c".to_string(),
        };

        let (token, _) = sessions.create(&identity).unwrap();
        assert!(sessions.get(&token).is_ok());

        clock.advance(Duration::from_secs(120));
        assert!(matches!(sessions.get(&token), Err(AuthError::SessionExpired)));

        sessions.create(&identity).unwrap();
        clock.advance(Duration::from_secs(120));
        assert_eq!(sessions.purge_expired().unwrap(), 1);
    }

    #[test]
    fn test_new_sign_in_drops_sessions_nobody_reads() {
        let clock = Arc::new(ManualClock::stepping());
        let sessions = SessionStore::new(clock.clone(), Duration::from_secs(60));
        let identity = Identity {
            uid: "u".to_string(),
            email: "a@b.c".to_string(),
        };

        for _ in 0..5 {
            sessions.create(&identity).unwrap();
        }
        assert_eq!(sessions.session_count().unwrap(), 5);

        clock.advance(Duration::from_secs(120));
        let (fresh, _) = sessions.create(&identity).unwrap();

        assert_eq!(sessions.session_count().unwrap(), 1);
        assert!(sessions.get(&fresh).is_ok());
    }

    #[tokio::test]
    async fn test_sweeper_purges_abandoned_sessions() {
        let clock = Arc::new(ManualClock::stepping());
        let sessions = SessionStore::new(clock.clone(), Duration::from_secs(60));
        let identity = Identity {
            uid: "u".to_string(),
            email: "a@b.c".to_string(),
        };
        sessions.create(&identity).unwrap();
        sessions.create(&identity).unwrap();

        clock.advance(Duration::from_secs(120));
        let sweeper = sessions.spawn_sweeper(Duration::from_millis(10));

        tokio::time::timeout(Duration::from_secs(2), async {
            while sessions.session_count().unwrap() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sweeper purged the expired sessions");
        sweeper.abort();
    }

    #[test]
    fn test_status_mapping() {
        use axum::http::StatusCode;
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::from(AuthError::NotAdmin).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(AuthError::SessionExpired).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
