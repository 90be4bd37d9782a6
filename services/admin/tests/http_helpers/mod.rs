use axum::body::Body;
use axum::http::Request;

pub const IDENTITY_HEADER: &str = "x-portcullis-user";

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    json_request_as(method, uri, super::common::ROOT, body)
}

pub fn json_request_as(
    method: &str,
    uri: &str,
    user: &str,
    body: serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header(IDENTITY_HEADER, user)
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[allow(dead_code)]
pub fn request_as(method: &str, uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(IDENTITY_HEADER, user);
    }
    builder.body(Body::empty()).expect("request")
}
