//! SAML endpoint handlers.
//!
//! The SSO endpoint receives AuthnRequests over HTTP-POST and HTTP-Redirect.
//! Realm data comes from a [`SamlRealmProvider`]; accepted requests go to a
//! [`LoginHandoff`].
//!
//! # Example
//!
//! ```rust,ignore
//! use kc_saml_sso::endpoints::saml_router;
//! use axum::Router;
//!
//! let app = Router::new()
//!     .merge(saml_router())
//!     .with_state(saml_state);
//! ```

mod router;
mod sso;
mod state;

pub use router::*;
pub use sso::*;
pub use state::*;
