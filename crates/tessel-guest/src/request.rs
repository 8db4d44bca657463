use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tessel_world::{Fields, IncomingResponse, Method, OutgoingRequest};
use url::Url;

use crate::error::GuestError;

/// Reusable description of an HTTP request.
///
/// Unlike [`OutgoingRequest`], this can be cloned and turned into a fresh
/// outgoing request for every attempt.
#[derive(Debug, Clone)]
pub struct Request {
  method: Method,
  url: String,
  headers: Vec<(String, String)>,
  body: Bytes,
}

impl Request {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      headers: Vec::new(),
      body: Bytes::new(),
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn post(url: impl Into<String>) -> Self {
    Self::new(Method::Post, url)
  }

  pub fn put(url: impl Into<String>) -> Self {
    Self::new(Method::Put, url)
  }

  pub fn patch(url: impl Into<String>) -> Self {
    Self::new(Method::Patch, url)
  }

  pub fn delete(url: impl Into<String>) -> Self {
    Self::new(Method::Delete, url)
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = body.into();
    self
  }

  /// Serialize `value` as the body, setting `content-type` unless already set.
  pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, GuestError> {
    self.body = Bytes::from(serde_json::to_vec(value)?);
    let has_content_type = self
      .headers
      .iter()
      .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    if !has_content_type {
      self
        .headers
        .push(("content-type".to_string(), "application/json".to_string()));
    }
    Ok(self)
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Build a fresh outgoing request.
  pub fn to_outgoing(&self) -> Result<OutgoingRequest, GuestError> {
    let url = Url::parse(&self.url)?;
    let headers = Fields::from_list(self.headers.iter().map(|(n, v)| (n, v.as_str())))?;
    let mut request = OutgoingRequest::from_url(self.method.clone(), &url, headers)?;
    request.set_body(self.body.clone());
    Ok(request)
  }
}

/// A received HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
  pub status: u16,
  pub headers: Fields,
  pub body: Bytes,
}

impl Response {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First value of `name`, if it is valid UTF-8.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(name)
      .first()
      .and_then(|v| std::str::from_utf8(v).ok())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T, GuestError> {
    Ok(serde_json::from_slice(&self.body)?)
  }
}

impl From<IncomingResponse> for Response {
  fn from(response: IncomingResponse) -> Self {
    Self {
      status: response.status,
      headers: response.headers,
      body: response.body,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde::Deserialize;
  use tessel_world::{ErrorCode, Scheme};

  use super::*;

  #[test]
  fn test_to_outgoing() {
    let request = Request::post("https://api.example.com/v1/items?limit=2")
      .header("X-Trace", "abc")
      .body("payload");

    let outgoing = request.to_outgoing().unwrap();
    assert_eq!(outgoing.method(), &Method::Post);
    assert_eq!(outgoing.scheme(), Some(&Scheme::Https));
    assert_eq!(outgoing.authority(), Some("api.example.com"));
    assert_eq!(outgoing.path_with_query(), "/v1/items?limit=2");
    assert_eq!(outgoing.headers().get("x-trace"), vec![b"abc".as_slice()]);
    assert_eq!(outgoing.body(), &Bytes::from("payload"));

    // A second build is independent of the first.
    assert!(request.to_outgoing().is_ok());
  }

  #[test]
  fn test_json_sets_content_type_once() {
    let request = Request::put("http://example.com/")
      .json(&serde_json::json!({"a": 1}))
      .unwrap();
    let outgoing = request.to_outgoing().unwrap();
    assert_eq!(
      outgoing.headers().get("content-type"),
      vec![b"application/json".as_slice()]
    );
    assert_eq!(outgoing.body(), &Bytes::from(r#"{"a":1}"#));

    let request = Request::post("http://example.com/")
      .header("Content-Type", "application/vnd.api+json")
      .json(&[1, 2])
      .unwrap();
    let outgoing = request.to_outgoing().unwrap();
    assert_eq!(outgoing.headers().get("content-type").len(), 1);
  }

  #[test]
  fn test_invalid_inputs() {
    assert!(matches!(
      Request::get("not a url").to_outgoing(),
      Err(GuestError::InvalidUrl(_))
    ));
    assert!(matches!(
      Request::get("http://example.com/")
        .header("bad header", "x")
        .to_outgoing(),
      Err(GuestError::Header(_))
    ));
    assert!(matches!(
      Request::get("http://user:pw@example.com/").to_outgoing(),
      Err(GuestError::Request(ErrorCode::InvalidRequest(_)))
    ));
  }

  #[test]
  fn test_response_helpers() {
    #[derive(Deserialize)]
    struct Price {
      usd: f64,
    }

    let response = Response::from(IncomingResponse {
      status: 200,
      headers: Fields::from_list([("Content-Type", "application/json")]).unwrap(),
      body: Bytes::from(r#"{"usd": 1.5}"#),
    });

    assert!(response.is_success());
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(response.json::<Price>().unwrap().usd, 1.5);
    assert_eq!(response.text(), r#"{"usd": 1.5}"#);
  }
}
