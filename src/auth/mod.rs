//! Credential lifecycle: cookie-bound session state, OAuth2 exchanges,
//! the login flow, and the per-request token guard.

pub mod credentials;
pub mod exchange;
pub mod flow;
pub mod guard;

pub use credentials::{Credential, CredentialStore};
pub use exchange::{TokenExchangeClient, TokenGrant};
pub use flow::AuthorizationFlowController;
pub use guard::{TokenLifecycleGuard, TokenState};
