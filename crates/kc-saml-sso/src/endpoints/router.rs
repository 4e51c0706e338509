//! SAML router configuration.
//!
//! Provides the Axum router for the SSO endpoint.

use axum::{Router, routing::get};

use super::sso::{sso_post, sso_redirect};
use super::state::{SamlRealmProvider, SamlState};

/// Creates the SAML protocol router.
///
/// # Endpoints
///
/// | Method   | Path                            | Handler        | Description                 |
/// |----------|---------------------------------|----------------|-----------------------------|
/// | GET      | `/realms/{realm}/protocol/saml` | `sso_redirect` | SSO, HTTP-Redirect binding  |
/// | POST     | `/realms/{realm}/protocol/saml` | `sso_post`     | SSO, HTTP-POST binding      |
///
/// # Usage
///
/// ```rust,ignore
/// use kc_saml_sso::endpoints::{saml_router, SamlState};
///
/// let state = SamlState::new(realm_provider, SamlProtocolConfig::from_env()?);
/// let app = Router::new()
///     .merge(saml_router())
///     .with_state(state);
/// ```
pub fn saml_router<R: SamlRealmProvider>() -> Router<SamlState<R>> {
    Router::new().route(
        "/realms/{realm}/protocol/saml",
        get(sso_redirect::<R>).post(sso_post::<R>),
    )
}
