use crate::http_utils::{
    auth_bearer, body_snippet, check_content_type, media_type, HttpClient, HttpClientError,
    HttpRequest, HttpResponse, MIME_TYPE_JSON, MIME_TYPE_JWT,
};

use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::StatusCode;
use oauth2::AccessToken;
use pretty_assertions::assert_eq;

fn headers_with_content_type(content_type: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers
}

#[test]
fn test_media_type_ignores_parameters() {
    assert_eq!(
        media_type(&headers_with_content_type("application/jwt; charset=UTF-8")),
        Some(MIME_TYPE_JWT.to_string())
    );
    assert_eq!(
        media_type(&headers_with_content_type("Application/JSON")),
        Some(MIME_TYPE_JSON.to_string())
    );
    assert_eq!(media_type(&HeaderMap::new()), None);
}

#[test]
fn test_check_content_type() {
    check_content_type(
        &headers_with_content_type("application/json;charset=utf-8"),
        MIME_TYPE_JSON,
    )
    .unwrap();
    check_content_type(&HeaderMap::new(), MIME_TYPE_JSON).unwrap();
    assert_eq!(
        check_content_type(&headers_with_content_type("text/html"), MIME_TYPE_JSON),
        Err(
            "Unexpected response Content-Type: \"text/html\", should be `application/json`"
                .to_string()
        )
    );
}

#[test]
fn test_auth_bearer() {
    let (name, value) = auth_bearer(&AccessToken::new("abc123".to_string())).unwrap();
    assert_eq!(name, AUTHORIZATION);
    assert_eq!(value.to_str().unwrap(), "Bearer abc123");
    assert!(value.is_sensitive());

    auth_bearer(&AccessToken::new("bad\ntoken".to_string()))
        .expect_err("newline should be rejected");
}

#[test]
fn test_body_snippet() {
    assert_eq!(body_snippet(b"short body"), "short body");

    let long_body = vec![b'a'; 300];
    let snippet = body_snippet(&long_body);
    assert_eq!(snippet.len(), 259);
    assert!(snippet.ends_with("..."));
}

#[tokio::test]
async fn test_closure_client() {
    let client = |request: HttpRequest| -> Result<HttpResponse, HttpClientError> {
        assert_eq!(request.uri(), "https://example.com/keys");
        Ok(http::Response::builder()
            .status(StatusCode::OK)
            .body(b"{}".to_vec())?)
    };

    let request = http::Request::builder()
        .uri("https://example.com/keys")
        .body(Vec::new())
        .unwrap();
    let response = HttpClient::call(&client, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), b"{}");
}
