//! Shared harness for the end-to-end tests.
//!
//! Builds the SSO router over an in-memory realm with two clients, one plain
//! and one that signs its requests, and drives it with `oneshot` requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use kc_saml_sso::bindings::BindingRequest;
use kc_saml_sso::endpoints::{
    saml_router, DefaultLoginPage, LoginHandoff, SamlRealmError, SamlRealmProvider, SamlState,
};
use kc_saml_sso::signature::{VerificationKey, XmlSigner};
use kc_saml_sso::validation::{
    AuthnRequestContext, DestinationPolicy, KnownProtocols, ServiceProviderConfig,
};
use kc_saml_sso::SamlProtocolConfig;

/// Realm the clients live in.
pub const REALM: &str = "test";
/// SSO endpoint of [`REALM`].
pub const ENDPOINT: &str = "http://localhost:8180/realms/test/protocol/saml";
/// Client that does not sign.
pub const SALES_POST: &str = "http://localhost:8280/sales-post/";
/// ACS of [`SALES_POST`].
pub const SALES_POST_ACS: &str = "http://localhost:8280/sales-post/saml";
/// Client that must sign.
pub const SALES_POST_SIG: &str = "http://localhost:8280/sales-post-sig/";
/// ACS of [`SALES_POST_SIG`].
pub const SALES_POST_SIG_ACS: &str = "http://localhost:8280/sales-post-sig/saml";

const SP_KEY_PEM: &str = include_str!("../../../crates/kc-saml-sso/tests/fixtures/sp-signing.key.pem");
const SP_CERT_PEM: &str = include_str!("../../../crates/kc-saml-sso/tests/fixtures/sp-signing.crt.pem");
const OTHER_KEY_PEM: &str =
    include_str!("../../../crates/kc-saml-sso/tests/fixtures/other-signing.key.pem");

/// The signing key registered for [`SALES_POST_SIG`].
pub fn sp_signer() -> anyhow::Result<XmlSigner> {
    Ok(XmlSigner::from_pem(SP_KEY_PEM, Some(SP_CERT_PEM))?)
}

/// A key nobody registered.
pub fn other_signer() -> anyhow::Result<XmlSigner> {
    Ok(XmlSigner::from_pem(OTHER_KEY_PEM, None)?)
}

struct RealmEntry {
    policy: DestinationPolicy,
    clients: HashMap<String, ServiceProviderConfig>,
}

/// Realm provider backed by a map.
#[derive(Default)]
pub struct InMemoryRealmProvider {
    realms: HashMap<String, RealmEntry>,
}

impl InMemoryRealmProvider {
    /// Adds a realm served at `policy`.
    #[must_use]
    pub fn with_realm(mut self, name: &str, policy: DestinationPolicy) -> Self {
        self.realms.insert(
            name.to_string(),
            RealmEntry {
                policy,
                clients: HashMap::new(),
            },
        );
        self
    }

    /// Registers a client in `realm`.
    #[must_use]
    pub fn with_client(mut self, realm: &str, client: ServiceProviderConfig) -> Self {
        if let Some(entry) = self.realms.get_mut(realm) {
            entry.clients.insert(client.entity_id.clone(), client);
        }
        self
    }
}

#[async_trait::async_trait]
impl SamlRealmProvider for InMemoryRealmProvider {
    async fn realm_exists(&self, realm: &str) -> Result<bool, SamlRealmError> {
        Ok(self.realms.contains_key(realm))
    }

    async fn destination_policy(&self, realm: &str) -> Result<DestinationPolicy, SamlRealmError> {
        self.realms
            .get(realm)
            .map(|entry| entry.policy.clone())
            .ok_or_else(|| SamlRealmError::RealmNotFound(realm.to_string()))
    }

    async fn get_service_provider(
        &self,
        realm: &str,
        entity_id: &str,
    ) -> Result<Option<ServiceProviderConfig>, SamlRealmError> {
        Ok(self
            .realms
            .get(realm)
            .and_then(|entry| entry.clients.get(entity_id).cloned()))
    }
}

/// Login collaborator that remembers every context it was given.
#[derive(Default)]
pub struct RecordingLogin {
    contexts: Mutex<Vec<AuthnRequestContext>>,
}

impl RecordingLogin {
    /// The most recent accepted request.
    pub fn last(&self) -> Option<AuthnRequestContext> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// How many requests were handed over.
    pub fn count(&self) -> usize {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait::async_trait]
impl LoginHandoff for RecordingLogin {
    async fn begin_login(&self, context: AuthnRequestContext) -> Result<String, SamlRealmError> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context.clone());
        DefaultLoginPage.begin_login(context).await
    }
}

/// Test environment: the router plus the login recorder behind it.
pub struct TestEnv {
    router: Router,
    /// Receives accepted requests.
    pub login: Arc<RecordingLogin>,
}

/// Status and body of a response.
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Body as text.
    pub body: String,
}

impl TestEnv {
    /// Creates the environment with the server listening on port 8180 for
    /// plain http.
    pub fn new() -> anyhow::Result<Self> {
        let config = SamlProtocolConfig::default()
            .with_known_protocols(KnownProtocols::parse("http=8180,https=8543")?);
        Self::with_config(config)
    }

    /// Creates the environment with custom protocol settings.
    pub fn with_config(config: SamlProtocolConfig) -> anyhow::Result<Self> {
        // Initialize tracing for tests
        let _ = tracing_subscriber::fmt()
            .with_env_filter("kc_saml_sso=debug")
            .with_test_writer()
            .try_init();

        let policy = DestinationPolicy::new(ENDPOINT, Arc::clone(&config.known_protocols))?;
        let provider = InMemoryRealmProvider::default()
            .with_realm(REALM, policy)
            .with_client(
                REALM,
                ServiceProviderConfig::new(SALES_POST).with_default_acs_url(SALES_POST_ACS),
            )
            .with_client(
                REALM,
                ServiceProviderConfig::new(SALES_POST_SIG)
                    .with_signing_key(VerificationKey::from_certificate_pem(SP_CERT_PEM)?),
            );

        let login = Arc::new(RecordingLogin::default());
        let state = SamlState::new(Arc::new(provider), config).with_login(login.clone());
        let router = saml_router().with_state(state);

        Ok(Self { router, login })
    }

    /// Sends an encoded SAML request.
    pub async fn send(&self, request: BindingRequest) -> anyhow::Result<TestResponse> {
        self.send_http(request.into_http_request()?).await
    }

    /// Sends an arbitrary HTTP request.
    pub async fn send_http(&self, request: Request<Body>) -> anyhow::Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok(TestResponse {
            status,
            body: String::from_utf8(bytes.to_vec())?,
        })
    }
}
