//! Authorization-code flow: login redirect with a CSRF state nonce, and
//! callback validation + code exchange.

use crate::{
    auth::{credentials::Credential, exchange::TokenExchangeClient},
    error::AppError,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Redirect target plus the nonce the transport must persist against the
/// pending flow.
#[derive(Debug)]
pub struct LoginRedirect {
    pub authorization_url: Url,
    pub state_nonce: String,
}

pub struct AuthorizationFlowController {
    exchange: Arc<TokenExchangeClient>,
    expiry_margin: Duration,
}

impl AuthorizationFlowController {
    pub fn new(exchange: Arc<TokenExchangeClient>, expiry_margin: Duration) -> Self {
        Self {
            exchange,
            expiry_margin,
        }
    }

    /// Start a login. No prior session required. The caller binds the nonce
    /// to the pending flow (cookie-scoped, short absolute lifetime).
    pub fn begin_login(&self, redirect_uri: &str) -> Result<LoginRedirect, AppError> {
        let state_nonce = Uuid::new_v4().to_string();
        let authorization_url = self
            .exchange
            .authorization_url(redirect_uri, &state_nonce)?;

        Ok(LoginRedirect {
            authorization_url,
            state_nonce,
        })
    }

    /// Validate the callback and exchange the code. The caller clears the
    /// stored nonce on success and failure alike, so a nonce is never
    /// compared twice.
    pub async fn complete_login(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        stored_nonce: Option<&str>,
        redirect_uri: &str,
    ) -> Result<Credential, AppError> {
        let code = code.ok_or(AppError::MissingCode)?;

        match (state, stored_nonce) {
            (Some(state), Some(nonce)) if state == nonce => {}
            _ => return Err(AppError::StateMismatch),
        }

        let grant = self.exchange.exchange_code(code, redirect_uri).await?;
        Ok(grant.into_credential(self.expiry_margin, Utc::now(), None))
    }
}
