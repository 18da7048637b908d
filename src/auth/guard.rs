//! Credential lifecycle state machine.
//!
//! Re-evaluated on every inbound request: the cookie transport has no push
//! channel to a stateless layer, so a per-request clock check replaces a
//! scheduler. Refreshes are serialized per refresh token: concurrent
//! expired requests share one upstream call and adopt one credential write
//! instead of racing each other into a lost-update on a rotated token.

use crate::{
    auth::{
        credentials::{Credential, CredentialStore},
        exchange::TokenExchangeClient,
    },
    cache::MemoryCache,
    error::AppError,
};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};
use tokio::sync::Mutex;

/// How long a completed refresh stays adoptable by waiters that lost the
/// race for the same refresh token.
const REFRESH_DEDUPE_WINDOW: StdDuration = StdDuration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum TokenState {
    /// No access token present; callers must fail with AuthRequired.
    NoCredential,
    /// Usable as-is.
    Valid(Credential),
    /// Past expiry with a refresh token in hand.
    ExpiredRefreshable(Credential),
    /// Past expiry, no refresh token. Equivalent to NoCredential.
    ExpiredTerminal,
}

pub fn evaluate(credential: Option<Credential>, now: DateTime<Utc>) -> TokenState {
    match credential {
        None => TokenState::NoCredential,
        Some(cred) if !cred.is_expired(now) => TokenState::Valid(cred),
        Some(cred) if cred.refresh_token.is_some() => TokenState::ExpiredRefreshable(cred),
        Some(_) => TokenState::ExpiredTerminal,
    }
}

pub struct TokenLifecycleGuard {
    exchange: Arc<TokenExchangeClient>,
    expiry_margin: Duration,
    /// Per-refresh-token serialization, keyed by token hash.
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Completed refreshes, keyed by the hash of the token that was spent.
    recent_refreshes: MemoryCache,
}

impl TokenLifecycleGuard {
    pub fn new(exchange: Arc<TokenExchangeClient>, expiry_margin: Duration) -> Self {
        Self {
            exchange,
            expiry_margin,
            refresh_locks: Mutex::new(HashMap::new()),
            recent_refreshes: MemoryCache::new(),
        }
    }

    /// Snapshot the store and return a usable credential, refreshing if the
    /// access token has expired and a refresh token is present. Fails with
    /// `AuthRequired` when no fresh login can help it.
    pub async fn ensure_valid(
        &self,
        store: &dyn CredentialStore,
    ) -> Result<Credential, AppError> {
        match evaluate(store.load().await, Utc::now()) {
            TokenState::Valid(credential) => Ok(credential),
            TokenState::NoCredential | TokenState::ExpiredTerminal => Err(AppError::AuthRequired),
            TokenState::ExpiredRefreshable(expired) => self.refresh(store, expired).await,
        }
    }

    async fn refresh(
        &self,
        store: &dyn CredentialStore,
        expired: Credential,
    ) -> Result<Credential, AppError> {
        let refresh_token = expired
            .refresh_token
            .ok_or(AppError::AuthRequired)?;
        let key = hash_token(&refresh_token);

        let gate = {
            let mut locks = self.refresh_locks.lock().await;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let held = gate.lock().await;

        // A concurrent request may have spent this refresh token while we
        // waited; adopt its credential instead of re-refreshing.
        if let Some(credential) = self
            .recent_refreshes
            .get::<Credential>(&key)
            .await
            .ok()
            .flatten()
        {
            if !credential.is_expired(Utc::now()) {
                store.store(&credential).await;
                drop(held);
                self.release(&key, gate).await;
                return Ok(credential);
            }
        }

        let result = self.exchange.exchange_refresh_token(&refresh_token).await;
        let outcome = match result {
            Ok(grant) => {
                let credential =
                    grant.into_credential(self.expiry_margin, Utc::now(), Some(refresh_token));
                store.store(&credential).await;
                if self
                    .recent_refreshes
                    .set(&key, &credential, REFRESH_DEDUPE_WINDOW)
                    .await
                    .is_err()
                {
                    tracing::warn!("failed to record refresh for dedupe");
                }
                tracing::debug!("access token refreshed");
                Ok(credential)
            }
            Err(err) => {
                // Fail closed: no retry, no stale token. The caller must
                // re-authenticate.
                store.clear().await;
                Err(AppError::RefreshFailed(err.to_string()))
            }
        };

        drop(held);
        self.release(&key, gate).await;
        outcome
    }

    /// Drop the lock entry once nobody else holds a handle to it.
    async fn release(&self, key: &str, gate: Arc<Mutex<()>>) {
        drop(gate);
        let mut locks = self.refresh_locks.lock().await;
        if locks.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(key);
        }
    }
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
