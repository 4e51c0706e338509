//! Single Sign-On endpoint.
//!
//! Receives AuthnRequests on both bindings, runs them through the validator
//! and hands accepted requests to the login collaborator.

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tracing::{error, warn};

use crate::bindings::{HttpRedirectBinding, SamlMessageType};
use crate::error::SamlError;
use crate::validation::{InboundMessage, ValidationOutcome};

use super::state::{SamlRealmProvider, SamlState};

/// Form data for SSO POST binding.
#[derive(Debug, Deserialize)]
pub struct SsoPostForm {
    /// The SAML request (base64-encoded).
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,

    /// Relay state.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// GET handler for SSO endpoint (HTTP-Redirect binding).
///
/// The query is taken raw so the detached signature can be checked against
/// the parameters exactly as sent.
pub async fn sso_redirect<R: SamlRealmProvider>(
    State(state): State<SamlState<R>>,
    Path(realm): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let inbound = query
        .filter(|q| HttpRedirectBinding::carries_message(q, SamlMessageType::Request))
        .map(|raw_query| InboundMessage::Redirect { raw_query });
    respond(handle_sso(&state, &realm, inbound).await)
}

/// POST handler for SSO endpoint (HTTP-POST binding).
pub async fn sso_post<R: SamlRealmProvider>(
    State(state): State<SamlState<R>>,
    Path(realm): Path<String>,
    Form(form): Form<SsoPostForm>,
) -> Response {
    let inbound = form.saml_request.map(|saml_request| InboundMessage::Post {
        saml_request,
        relay_state: form.relay_state,
    });
    respond(handle_sso(&state, &realm, inbound).await)
}

/// Validates one request and decides the HTTP outcome.
async fn handle_sso<R: SamlRealmProvider>(
    state: &SamlState<R>,
    realm: &str,
    inbound: Option<InboundMessage>,
) -> Result<Response, SamlError> {
    // Check realm exists
    if !state.realm_provider.realm_exists(realm).await.map_err(|e| {
        SamlError::Internal(format!("Failed to check realm: {e}"))
    })? {
        return Err(SamlError::RealmNotFound(realm.to_string()));
    }

    let inbound = inbound
        .ok_or_else(|| SamlError::InvalidRequest("SAMLRequest parameter required".to_string()))?;

    let outcome = match state.validator().decode(&inbound) {
        Ok(decoded) => {
            let client = state
                .realm_provider
                .get_service_provider(realm, decoded.issuer())
                .await
                .map_err(|e| SamlError::Internal(format!("Failed to get SP config: {e}")))?;
            let policy = state
                .realm_provider
                .destination_policy(realm)
                .await
                .map_err(|e| SamlError::Internal(format!("Failed to get realm endpoint: {e}")))?;
            decoded.validate(realm, client.as_ref(), &policy)
        }
        Err(err) => ValidationOutcome::rejected(realm, None, &err),
    };

    match outcome {
        ValidationOutcome::Accepted(context) => {
            let page = state
                .login
                .begin_login(context)
                .await
                .map_err(|e| SamlError::Internal(format!("Failed to start login: {e}")))?;
            Ok((StatusCode::OK, Html(page)).into_response())
        }
        ValidationOutcome::Rejected(_) => {
            let status = StatusCode::from_u16(state.config.rejection_status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Ok((status, Html(invalid_request_page())).into_response())
        }
    }
}

fn respond(result: Result<Response, SamlError>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

/// Creates an error response. The error text is logged, never rendered.
fn error_response(err: &SamlError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "SAML endpoint failure");
    } else {
        warn!(error = %err, "SAML endpoint refused request");
    }

    let body = if status == StatusCode::BAD_REQUEST {
        invalid_request_page()
    } else {
        error_page(status.canonical_reason().unwrap_or("Error"))
    };
    (status, Html(body)).into_response()
}

fn invalid_request_page() -> String {
    error_page("Invalid Request")
}

fn error_page(title: &str) -> String {
    format!(
        r"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body>
<h1>{title}</h1>
</body>
</html>"
    )
}
