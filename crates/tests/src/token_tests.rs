use drivelink_services::{TokenError, TokenProvider, TokenSource};

use crate::fixtures::mock_backend::MockBackend;

#[tokio::test]
async fn returns_token_from_backend() {
    let backend = MockBackend::spawn().await;
    backend.set_tokens(&["abc"]);
    let provider = TokenProvider::new(reqwest::Client::new(), &backend.api_url());

    let token = provider.generate_token("user-1").await.unwrap();

    assert_eq!(token, "abc");
    let requests = backend.requests_to("/api/paragon/token");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].body["userId"], "user-1");
}

#[tokio::test]
async fn every_call_hits_the_backend() {
    let backend = MockBackend::spawn().await;
    backend.set_tokens(&["first", "second"]);
    let provider = TokenProvider::new(reqwest::Client::new(), &backend.api_url());

    let first = provider.generate_token("user-1").await.unwrap();
    let second = provider.generate_token("user-1").await.unwrap();

    assert_eq!(first, "first");
    assert_eq!(second, "second");
    assert_eq!(backend.requests_to("/api/paragon/token").len(), 2);
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_ignored() {
    let backend = MockBackend::spawn().await;
    let provider = TokenProvider::new(reqwest::Client::new(), &format!("{}/", backend.api_url()));

    assert_eq!(provider.generate_token("user-1").await.unwrap(), "token-1");
}

#[tokio::test]
async fn non_success_status_carries_status_and_body() {
    let backend = MockBackend::spawn().await;
    backend.fail_tokens(500, "boom");
    let provider = TokenProvider::new(reqwest::Client::new(), &backend.api_url());

    let err = provider.generate_token("user-1").await.unwrap_err();

    assert_eq!(
        err,
        TokenError::Backend {
            status: 500,
            body: "boom".to_string()
        }
    );
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn empty_token_is_invalid() {
    let backend = MockBackend::spawn().await;
    backend.set_tokens(&[""]);
    let provider = TokenProvider::new(reqwest::Client::new(), &backend.api_url());

    let err = provider.generate_token("user-1").await.unwrap_err();

    assert!(matches!(err, TokenError::InvalidResponse(_)));
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    // Nothing listens on port 9 locally.
    let provider = TokenProvider::new(reqwest::Client::new(), "http://127.0.0.1:9/api");

    let err = provider.generate_token("user-1").await.unwrap_err();

    assert!(matches!(err, TokenError::Network(_)));
}
