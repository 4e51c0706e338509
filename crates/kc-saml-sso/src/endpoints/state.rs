//! SAML endpoint state management.

use std::sync::Arc;

use crate::bindings::html_escape;
use crate::config::SamlProtocolConfig;
use crate::validation::{
    AuthnRequestContext, AuthnRequestValidator, DestinationPolicy, ServiceProviderConfig,
};

/// SAML endpoint state.
///
/// Contains the configuration and services needed by the SSO endpoint.
pub struct SamlState<R>
where
    R: SamlRealmProvider,
{
    /// Realm provider for looking up realm configuration.
    pub realm_provider: Arc<R>,
    /// Receives accepted requests.
    pub login: Arc<dyn LoginHandoff>,
    /// Protocol settings.
    pub config: Arc<SamlProtocolConfig>,
    validator: AuthnRequestValidator,
}

impl<R: SamlRealmProvider> Clone for SamlState<R> {
    fn clone(&self) -> Self {
        Self {
            realm_provider: Arc::clone(&self.realm_provider),
            login: Arc::clone(&self.login),
            config: Arc::clone(&self.config),
            validator: self.validator.clone(),
        }
    }
}

impl<R: SamlRealmProvider> SamlState<R> {
    /// Creates a new SAML state that hands accepted requests to [`DefaultLoginPage`].
    pub fn new(realm_provider: Arc<R>, config: SamlProtocolConfig) -> Self {
        Self {
            realm_provider,
            login: Arc::new(DefaultLoginPage),
            validator: AuthnRequestValidator::new(&config),
            config: Arc::new(config),
        }
    }

    /// Replaces the login collaborator.
    #[must_use]
    pub fn with_login(mut self, login: Arc<dyn LoginHandoff>) -> Self {
        self.login = login;
        self
    }

    /// The request validator built from the configured limits.
    #[must_use]
    pub const fn validator(&self) -> &AuthnRequestValidator {
        &self.validator
    }
}

/// Provider for SAML realm configuration.
#[async_trait::async_trait]
pub trait SamlRealmProvider: Send + Sync + 'static {
    /// Checks if a realm exists.
    async fn realm_exists(&self, realm: &str) -> Result<bool, SamlRealmError>;

    /// Gets the realm endpoint and known-protocols table as one snapshot.
    async fn destination_policy(&self, realm: &str) -> Result<DestinationPolicy, SamlRealmError>;

    /// Gets a service provider by entity ID.
    async fn get_service_provider(
        &self,
        realm: &str,
        entity_id: &str,
    ) -> Result<Option<ServiceProviderConfig>, SamlRealmError>;
}

/// Error type for realm provider operations.
#[derive(Debug, thiserror::Error)]
pub enum SamlRealmError {
    /// Realm not found.
    #[error("realm not found: {0}")]
    RealmNotFound(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Login collaborator: takes over once a request has been accepted.
#[async_trait::async_trait]
pub trait LoginHandoff: Send + Sync + 'static {
    /// Returns the HTML page that starts the login for `context`.
    async fn begin_login(&self, context: AuthnRequestContext) -> Result<String, SamlRealmError>;
}

/// Renders a plain username/password form.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLoginPage;

#[async_trait::async_trait]
impl LoginHandoff for DefaultLoginPage {
    async fn begin_login(&self, context: AuthnRequestContext) -> Result<String, SamlRealmError> {
        Ok(render_login_page(&context))
    }
}

fn render_login_page(context: &AuthnRequestContext) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign in to {realm}</title></head>
<body>
<h1>Sign in to {realm}</h1>
<p>Continue to {client}</p>
<form id="kc-form-login" method="post" action="/realms/{realm}/login-actions/authenticate">
<input type="text" name="username" autofocus/>
<input type="password" name="password"/>
<input type="submit" name="login" value="Log In"/>
</form>
</body>
</html>"#,
        realm = html_escape(&context.realm),
        client = html_escape(&context.client_id),
    )
}
