// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for `QueryChannel`
//!
//! These tests use wiremock to stand in for the portal and check the channel's
//! token handling and error classification.

use std::time::Duration;

use registry_lookup::{QueryChannel, QueryError};
use shared_types::{IdentityNumber, SourceMethod};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

use fixtures::*;

async fn authenticated_channel(
    server: &MockServer,
    token: Option<&str>,
    query_timeout: Duration,
) -> QueryChannel {
    let authenticator = StaticAuthenticator {
        token: token.map(str::to_string),
        ..Default::default()
    };
    let mut channel = QueryChannel::new(0, channel_config(server, query_timeout));
    channel.authenticate(&authenticator).await.unwrap();
    channel
}

fn short_id() -> IdentityNumber {
    IdentityNumber::parse(SHORT_ID).unwrap()
}

/// Login token is used directly, without fetching the portal page
#[tokio::test]
async fn query_uses_login_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PORTAL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(portal_page("vs-page")))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .and(header("faces-request", "partial/ajax"))
        .and(header("cookie", "JSESSIONID=session-0"))
        .and(body_string_contains("javax.faces.ViewState=vs-login"))
        .and(body_string_contains(SHORT_ID))
        .respond_with(ResponseTemplate::new(200).set_body_string(partial_response(
            "PEREZ JUAN",
            "AV. AMAZONAS",
            "vs-next",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let channel = authenticated_channel(&server, Some(LOGIN_TOKEN), Duration::from_secs(2)).await;
    assert!(channel.is_authenticated());

    let record = channel.query(&short_id()).await.unwrap();
    assert_eq!(record.legal_name, "PEREZ JUAN");
    assert_eq!(record.address, "AV. AMAZONAS");
    assert_eq!(record.email, "buyer@example.com");
    assert_eq!(record.identification_type, "CEDULA");
    assert_eq!(record.method, SourceMethod::Fast);
}

/// Without a login token the channel fetches one from the portal page first
#[tokio::test]
async fn query_fetches_missing_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PORTAL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(portal_page("vs-page")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .and(body_string_contains("javax.faces.ViewState=vs-page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(partial_response(
            "PEREZ JUAN",
            "",
            "vs-next",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let channel = authenticated_channel(&server, None, Duration::from_secs(2)).await;
    let record = channel.query(&short_id()).await.unwrap();
    assert_eq!(record.legal_name, "PEREZ JUAN");
}

/// The token returned by a partial response is reused on the next query
#[tokio::test]
async fn query_carries_forward_new_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .and(body_string_contains("javax.faces.ViewState=vs-login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(partial_response(
            "PEREZ JUAN",
            "",
            "vs-second",
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .and(body_string_contains("javax.faces.ViewState=vs-second"))
        .respond_with(ResponseTemplate::new(200).set_body_string(partial_response(
            "PEREZ JUAN",
            "",
            "vs-third",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let channel = authenticated_channel(&server, Some(LOGIN_TOKEN), Duration::from_secs(2)).await;
    let first = channel.query(&short_id()).await.unwrap();
    let second = channel.query(&short_id()).await.unwrap();
    assert_eq!(first, second);
}

/// A JSF redirect to the login page means the session is gone
#[tokio::test]
async fn redirect_is_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(redirect_response()))
        .mount(&server)
        .await;

    let channel = authenticated_channel(&server, Some(LOGIN_TOKEN), Duration::from_secs(2)).await;
    let error = channel.query(&short_id()).await.unwrap_err();
    assert!(matches!(error, QueryError::Unauthorized));
    assert!(error.is_session_lost());
}

/// HTTP 403 means the session is gone
#[tokio::test]
async fn forbidden_is_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let channel = authenticated_channel(&server, Some(LOGIN_TOKEN), Duration::from_secs(2)).await;
    assert!(matches!(
        channel.query(&short_id()).await,
        Err(QueryError::Unauthorized)
    ));
}

/// A response without a legal name is not found
#[tokio::test]
async fn empty_legal_name_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(partial_response("", "", "vs-next")),
        )
        .mount(&server)
        .await;

    let channel = authenticated_channel(&server, Some(LOGIN_TOKEN), Duration::from_secs(2)).await;
    assert!(matches!(
        channel.query(&short_id()).await,
        Err(QueryError::NotFound)
    ));
}

/// Server errors are upstream errors, not session loss
#[tokio::test]
async fn server_error_is_upstream() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let channel = authenticated_channel(&server, Some(LOGIN_TOKEN), Duration::from_secs(2)).await;
    match channel.query(&short_id()).await {
        Err(QueryError::Upstream { status, message }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "bad gateway");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

/// A slow portal is cut off at the query timeout
#[tokio::test]
async fn slow_portal_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(PORTAL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(partial_response("PEREZ JUAN", "", "vs-next"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let channel =
        authenticated_channel(&server, Some(LOGIN_TOKEN), Duration::from_millis(200)).await;
    let started = std::time::Instant::now();
    let result = channel.query(&short_id()).await;

    assert!(matches!(result, Err(QueryError::Timeout { timeout_ms: 200 })));
    assert!(started.elapsed() < Duration::from_secs(1));
}
