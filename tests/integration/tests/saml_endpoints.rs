//! SAML SSO endpoint integration tests.
//!
//! Each test builds an AuthnRequest the way a service provider would and
//! sends it through the router.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};

use kc_integration_tests::{
    other_signer, sp_signer, TestEnv, ENDPOINT, REALM, SALES_POST, SALES_POST_ACS,
    SALES_POST_SIG, SALES_POST_SIG_ACS,
};
use base64::Engine;
use kc_saml_sso::bindings::{BindingRequest, DecodeLimits, HttpPostBinding};
use kc_saml_sso::client::SamlRequestBuilder;
use kc_saml_sso::document::XmlDocument;
use kc_saml_sso::types::{NameIdFormat, ResponseBuilder, SamlBinding, SamlResponse, Status};
use kc_saml_sso::SamlProtocolConfig;

const EXTERNALLY_SIGNED: &str =
    include_str!("../../../crates/kc-saml-sso/tests/fixtures/signed-authn-request.xml");

const BINDINGS: [SamlBinding; 2] = [SamlBinding::HttpPost, SamlBinding::HttpRedirect];

fn sales_post(binding: SamlBinding) -> SamlRequestBuilder {
    SamlRequestBuilder::authn_request(ENDPOINT, SALES_POST, SALES_POST_ACS, binding)
}

fn sales_post_sig(binding: SamlBinding) -> SamlRequestBuilder {
    SamlRequestBuilder::authn_request(ENDPOINT, SALES_POST_SIG, SALES_POST_SIG_ACS, binding)
}

/// Unsigned requests may leave out the destination.
#[tokio::test]
async fn test_no_destination_unsigned_is_accepted() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    for binding in BINDINGS {
        let response = env.send(sales_post(binding).no_destination().build()?).await?;

        assert_eq!(response.status, StatusCode::OK, "{binding:?}");
        assert!(response.body.contains("login"), "{binding:?}: {}", response.body);

        let context = env.login.last().ok_or_else(|| anyhow::anyhow!("no handoff"))?;
        assert_eq!(context.realm, REALM);
        assert_eq!(context.client_id, SALES_POST);
        assert_eq!(context.assertion_consumer_service_url, SALES_POST_ACS);
        assert_eq!(context.destination, None);
    }
    assert_eq!(env.login.count(), 2);

    Ok(())
}

/// Signed requests must name their destination.
#[tokio::test]
async fn test_no_destination_signed_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    for binding in BINDINGS {
        let request = sales_post_sig(binding)
            .no_destination()
            .sign_with(sp_signer()?)
            .build()?;
        let response = env.send(request).await?;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR, "{binding:?}");
        assert!(response.body.contains("Invalid Request"));
    }
    assert_eq!(env.login.count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_signed_with_destination_is_accepted() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    for binding in BINDINGS {
        let request = sales_post_sig(binding)
            .relay_state("some-state")
            .sign_with(sp_signer()?)
            .build()?;
        let response = env.send(request).await?;

        assert_eq!(response.status, StatusCode::OK, "{binding:?}: {}", response.body);
        let context = env.login.last().ok_or_else(|| anyhow::anyhow!("no handoff"))?;
        assert_eq!(context.relay_state.as_deref(), Some("some-state"));
        assert_eq!(context.destination.as_deref(), Some(ENDPOINT));
    }

    Ok(())
}

#[tokio::test]
async fn test_signed_with_unregistered_key_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    for binding in BINDINGS {
        let request = sales_post_sig(binding).sign_with(other_signer()?).build()?;
        let response = env.send(request).await?;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR, "{binding:?}");
    }

    Ok(())
}

/// A destination without a port uses the port the server runs on for the scheme.
#[tokio::test]
async fn test_destination_port_handling() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let cases = [
        ("http://localhost/realms/test/protocol/saml", StatusCode::OK),
        ("http://localhost:8180/realms/test/protocol/saml", StatusCode::OK),
        ("http://localhost:8180/realms/test/protocol/saml/", StatusCode::OK),
        (
            "http://localhost:123/realms/test/protocol/saml",
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (
            "http://localhost:80/realms/test/protocol/saml",
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (
            "http://localhost:8180/realms/other/protocol/saml",
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for binding in BINDINGS {
        for (destination, expected) in cases {
            let request = sales_post(binding).destination(destination).build()?;
            let response = env.send(request).await?;
            assert_eq!(response.status, expected, "{binding:?} {destination}");
            if expected != StatusCode::OK {
                assert!(response.body.contains("Invalid Request"));
                assert!(!response.body.contains("123"));
            }
        }
    }

    Ok(())
}

/// The request ID travels through the login handoff and back out in the
/// response exactly as sent.
#[tokio::test]
async fn test_request_id_is_not_expanded() -> anyhow::Result<()> {
    const POISONED_ID: &str = "${java.version}";
    let env = TestEnv::new()?;

    let request = sales_post(SamlBinding::HttpPost)
        .relay_state("relay")
        .transform_document(|doc: XmlDocument| {
            doc.transform(|d| {
                d.set_element_attribute("samlp:AuthnRequest", "ID", POISONED_ID);
            })
        })
        .build()?;
    let response = env.send(request).await?;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let context = env.login.last().ok_or_else(|| anyhow::anyhow!("no handoff"))?;
    assert_eq!(context.request_id, POISONED_ID);

    let reply = ResponseBuilder::new(format!("http://localhost:8180/realms/{REALM}"))
        .for_request(&context)
        .status(Status::success())
        .subject("bburke", NameIdFormat::Unspecified)
        .build();
    let page = HttpPostBinding::encode_response(
        &reply.to_document(),
        &context.assertion_consumer_service_url,
        context.relay_state.as_deref(),
    );

    let decoded = HttpPostBinding::decode_html(&page, &DecodeLimits::default())?;
    assert_eq!(decoded.relay_state.as_deref(), Some("relay"));
    let parsed = SamlResponse::from_document(&XmlDocument::parse(&decoded.xml)?)?;
    assert!(parsed.is_success());
    assert_eq!(parsed.in_response_to.as_deref(), Some(POISONED_ID));
    assert_eq!(parsed.destination.as_deref(), Some(SALES_POST_ACS));

    Ok(())
}

/// The detached signature covers the parameters in the order they were sent.
#[tokio::test]
async fn test_redirect_reordered_parameters_are_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let request = sales_post_sig(SamlBinding::HttpRedirect)
        .relay_state("state")
        .sign_with(sp_signer()?)
        .build()?;
    let (base, query) = request
        .url
        .split_once('?')
        .ok_or_else(|| anyhow::anyhow!("no query"))?;
    let mut params: Vec<&str> = query.split('&').collect();
    params.swap(0, 1);
    let reordered = format!("{base}?{}", params.join("&"));

    let response = env
        .send_http(Request::builder().method(Method::GET).uri(reordered).body(Body::empty())?)
        .await?;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    Ok(())
}

#[tokio::test]
async fn test_unknown_client_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let request = SamlRequestBuilder::authn_request(
        ENDPOINT,
        "http://localhost:8280/unknown/",
        "http://localhost:8280/unknown/saml",
        SamlBinding::HttpPost,
    )
    .build()?;
    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body.contains("Invalid Request"));

    Ok(())
}

#[tokio::test]
async fn test_missing_acs_uses_client_default() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let request = sales_post(SamlBinding::HttpRedirect)
        .modify_request(|mut r| {
            r.assertion_consumer_service_url = None;
            r
        })
        .build()?;
    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::OK);
    let context = env.login.last().ok_or_else(|| anyhow::anyhow!("no handoff"))?;
    assert_eq!(context.assertion_consumer_service_url, SALES_POST_ACS);

    Ok(())
}

/// A request signed by a different XML-DSig implementation, with its own
/// prefixes and whitespace, is accepted byte for byte as sent.
#[tokio::test]
async fn test_externally_signed_request_is_accepted() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let request = BindingRequest {
        binding: SamlBinding::HttpPost,
        method: Method::POST,
        url: ENDPOINT.to_string(),
        form: vec![(
            "SAMLRequest".to_string(),
            base64::engine::general_purpose::STANDARD.encode(EXTERNALLY_SIGNED),
        )],
    };
    let response = env.send(request).await?;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let context = env.login.last().ok_or_else(|| anyhow::anyhow!("no handoff"))?;
    assert_eq!(context.client_id, SALES_POST_SIG);
    assert_eq!(context.request_id, "ID_3f6b2c9e-8d41-4c1a-9b7e-5a0d2e6f1c84");
    assert_eq!(context.assertion_consumer_service_url, SALES_POST_SIG_ACS);

    let tampered = EXTERNALLY_SIGNED.replace(r#"ForceAuthn="false""#, r#"ForceAuthn="true""#);
    let request = BindingRequest {
        binding: SamlBinding::HttpPost,
        method: Method::POST,
        url: ENDPOINT.to_string(),
        form: vec![(
            "SAMLRequest".to_string(),
            base64::engine::general_purpose::STANDARD.encode(tampered),
        )],
    };
    let response = env.send(request).await?;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(env.login.count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_sso_missing_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let get = Request::builder()
        .method(Method::GET)
        .uri("/realms/test/protocol/saml")
        .body(Body::empty())?;
    let response = env.send_http(get).await?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body.contains("Invalid Request"));

    // Parameter names are matched as sent, without percent-decoding.
    let encoded_key = Request::builder()
        .method(Method::GET)
        .uri("/realms/test/protocol/saml?SAML%52equest=abc")
        .body(Body::empty())?;
    let response = env.send_http(encoded_key).await?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let post = Request::builder()
        .method(Method::POST)
        .uri("/realms/test/protocol/saml")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("RelayState=x"))?;
    let response = env.send_http(post).await?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_malformed_request_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let post = Request::builder()
        .method(Method::POST)
        .uri("/realms/test/protocol/saml")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("SAMLRequest=not-base64%21"))?;
    let response = env.send_http(post).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body.contains("Invalid Request"));

    Ok(())
}

#[tokio::test]
async fn test_sso_nonexistent_realm() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let request = SamlRequestBuilder::authn_request(
        "http://localhost:8180/realms/nonexistent/protocol/saml",
        SALES_POST,
        SALES_POST_ACS,
        SamlBinding::HttpRedirect,
    )
    .build()?;
    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_rejection_status_is_configurable() -> anyhow::Result<()> {
    let config = SamlProtocolConfig::default().with_rejection_status(400);
    let env = TestEnv::with_config(config)?;

    let request = sales_post(SamlBinding::HttpPost)
        .destination("http://localhost:123/realms/test/protocol/saml")
        .build()?;
    let response = env.send(request).await?;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body.contains("Invalid Request"));

    Ok(())
}
