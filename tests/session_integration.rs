use reddit_client::authenticator::Authenticator;
use reddit_client::authorizer::{Authorizer, Grant};
use reddit_client::session::{RequestOptions, Session};
use reqwest::Method;
use std::sync::Arc;

async fn authorized_session(server: &mockito::ServerGuard) -> (Session, mockito::Mock) {
    let token_mock = server
        .mock("POST", "/api/v1/access_token")
        .match_header("authorization", mockito::Matcher::Any)
        .match_header("connection", "close")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"abc123","expires_in":3600,"scope":"read identity"}"#)
        .create_async()
        .await;

    let authenticator = Arc::new(Authenticator::trusted("id", "secret"));
    let authorizer = Arc::new(Authorizer::new(
        authenticator,
        reqwest::Client::new(),
        server.url(),
        Grant::ReadOnly { device_id: None },
    ));
    let session = Session::new(
        reqwest::Client::new(),
        authorizer,
        "test-agent/0.1",
        server.url(),
        server.url(),
    );
    (session, token_mock)
}

#[tokio::test]
async fn read_only_flow_returns_json_body() {
    let mut server = mockito::Server::new_async().await;
    let (session, _token_mock) = authorized_session(&server).await;

    let api_mock = server
        .mock("GET", "/api/v1/user/bboe/trophies")
        .match_query(mockito::Matcher::Any)
        .match_header("authorization", "bearer abc123")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"trophies": []}"#)
        .create_async()
        .await;

    let body = session
        .request(Method::GET, "/api/v1/user/bboe/trophies", RequestOptions::new())
        .await
        .unwrap();

    api_mock.assert_async().await;
    assert_eq!(body.unwrap()["trophies"], serde_json::json!([]));
}

#[tokio::test]
async fn retryable_503_eventually_returns_success() {
    let mut server = mockito::Server::new_async().await;
    let (session, _token_mock) = authorized_session(&server).await;

    let fail_mock = server
        .mock("GET", "/api/v1/me")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .expect(2)
        .create_async()
        .await;
    let ok_mock = server
        .mock("GET", "/api/v1/me")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name":"bboe"}"#)
        .create_async()
        .await;

    let body = session.request(Method::GET, "/api/v1/me", RequestOptions::new()).await.unwrap();

    fail_mock.assert_async().await;
    ok_mock.assert_async().await;
    assert_eq!(body.unwrap()["name"], "bboe");
}

#[tokio::test]
async fn three_consecutive_503s_surface_server_error() {
    let mut server = mockito::Server::new_async().await;
    let (session, _token_mock) = authorized_session(&server).await;

    let _fail_mock = server
        .mock("GET", "/api/v1/me")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let err = session.request(Method::GET, "/api/v1/me", RequestOptions::new()).await.unwrap_err();

    match err {
        reddit_client::error::Error::Response(reddit_client::error::ResponseError::ServerError { status }) => {
            assert_eq!(status, 503)
        }
        other => panic!("expected ServerError, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_headers_are_parsed_without_error() {
    let mut server = mockito::Server::new_async().await;
    let (session, _token_mock) = authorized_session(&server).await;

    let _api_mock = server
        .mock("GET", "/api/v1/me")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("x-ratelimit-remaining", "60")
        .with_header("x-ratelimit-used", "540")
        .with_header("x-ratelimit-reset", "300")
        .with_body(r#"{"name":"bboe"}"#)
        .create_async()
        .await;

    let body = session.request(Method::GET, "/api/v1/me", RequestOptions::new()).await.unwrap();
    assert_eq!(body.unwrap()["name"], "bboe");
}

#[tokio::test]
async fn oauth_error_body_surfaces_as_oauth_error() {
    let mut server = mockito::Server::new_async().await;

    let _token_mock = server
        .mock("POST", "/api/v1/access_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"invalid_grant","error_description":"None"}"#)
        .create_async()
        .await;

    let authenticator = Arc::new(Authenticator::trusted("id", "secret"));
    let authorizer = Arc::new(Authorizer::new(
        authenticator,
        reqwest::Client::new(),
        server.url(),
        Grant::ReadOnly { device_id: None },
    ));

    let err = authorizer.refresh().await.unwrap_err();
    match err {
        reddit_client::error::Error::OAuth(oauth_error) => {
            assert_eq!(oauth_error.error, "invalid_grant");
            assert_eq!(oauth_error.description, None);
        }
        other => panic!("expected OAuth error, got {other:?}"),
    }
}

#[tokio::test]
async fn not_found_surfaces_as_not_found_error() {
    let mut server = mockito::Server::new_async().await;
    let (session, _token_mock) = authorized_session(&server).await;

    let _api_mock = server
        .mock("GET", "/api/v1/r/doesnotexist/about")
        .match_query(mockito::Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let err = session
        .request(Method::GET, "/api/v1/r/doesnotexist/about", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        reddit_client::error::Error::Response(reddit_client::error::ResponseError::NotFound)
    ));
}
