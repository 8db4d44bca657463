//! HTTP value types exchanged through the outgoing-request capability.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::error_code::ErrorCode;
use crate::future::FutureIncomingResponse;

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
  Connect,
  Options,
  Trace,
  Patch,
  Other(String),
}

impl Method {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Get => "GET",
      Self::Head => "HEAD",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Delete => "DELETE",
      Self::Connect => "CONNECT",
      Self::Options => "OPTIONS",
      Self::Trace => "TRACE",
      Self::Patch => "PATCH",
      Self::Other(method) => method,
    }
  }
}

impl From<&str> for Method {
  /// Known methods are matched case-insensitively; anything else is kept
  /// verbatim as [`Method::Other`].
  fn from(method: &str) -> Self {
    match method.to_ascii_uppercase().as_str() {
      "GET" => Self::Get,
      "HEAD" => Self::Head,
      "POST" => Self::Post,
      "PUT" => Self::Put,
      "DELETE" => Self::Delete,
      "CONNECT" => Self::Connect,
      "OPTIONS" => Self::Options,
      "TRACE" => Self::Trace,
      "PATCH" => Self::Patch,
      _ => Self::Other(method.to_string()),
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// URL scheme of an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
  Http,
  Https,
  Other(String),
}

impl Scheme {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Http => "http",
      Self::Https => "https",
      Self::Other(scheme) => scheme,
    }
  }
}

impl From<&str> for Scheme {
  fn from(scheme: &str) -> Self {
    match scheme.to_ascii_lowercase().as_str() {
      "http" => Self::Http,
      "https" => Self::Https,
      _ => Self::Other(scheme.to_string()),
    }
  }
}

impl fmt::Display for Scheme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors from building a header list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
  #[error("invalid header name: {0:?}")]
  InvalidName(String),

  #[error("invalid value for header `{0}`")]
  InvalidValue(String),

  /// Headers the host manages itself and guests may not set.
  #[error("header `{0}` may not be set by guests")]
  Forbidden(String),
}

const FORBIDDEN_HEADERS: &[&str] = &[
  "connection",
  "host",
  "http2-settings",
  "keep-alive",
  "proxy-connection",
  "te",
  "transfer-encoding",
  "upgrade",
];

/// Ordered list of header fields. Names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
  entries: Vec<(String, Vec<u8>)>,
}

impl Fields {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a header list, rejecting the first invalid entry.
  pub fn from_list<N, V>(entries: impl IntoIterator<Item = (N, V)>) -> Result<Self, HeaderError>
  where
    N: AsRef<str>,
    V: Into<Vec<u8>>,
  {
    let mut fields = Self::new();
    for (name, value) in entries {
      fields.append(name.as_ref(), value)?;
    }
    Ok(fields)
  }

  /// Append a value, keeping any existing values for the same name.
  pub fn append(&mut self, name: &str, value: impl Into<Vec<u8>>) -> Result<(), HeaderError> {
    let name = validate_name(name)?;
    if FORBIDDEN_HEADERS.contains(&name.as_str()) {
      return Err(HeaderError::Forbidden(name));
    }
    self.push_checked(name, value.into())
  }

  /// Append a header received from a peer.
  ///
  /// Same syntax checks as [`Fields::append`], without the list of headers
  /// guests may not set.
  pub fn append_received(
    &mut self,
    name: &str,
    value: impl Into<Vec<u8>>,
  ) -> Result<(), HeaderError> {
    let name = validate_name(name)?;
    self.push_checked(name, value.into())
  }

  fn push_checked(&mut self, name: String, value: Vec<u8>) -> Result<(), HeaderError> {
    if !is_valid_value(&value) {
      return Err(HeaderError::InvalidValue(name));
    }
    self.entries.push((name, value));
    Ok(())
  }

  /// Replace every value for `name` with `value`.
  pub fn set(&mut self, name: &str, value: impl Into<Vec<u8>>) -> Result<(), HeaderError> {
    self.delete(name);
    self.append(name, value)
  }

  pub fn delete(&mut self, name: &str) {
    let name = name.to_ascii_lowercase();
    self.entries.retain(|(n, _)| *n != name);
  }

  pub fn get(&self, name: &str) -> Vec<&[u8]> {
    let name = name.to_ascii_lowercase();
    self
      .entries
      .iter()
      .filter(|(n, _)| *n == name)
      .map(|(_, v)| v.as_slice())
      .collect()
  }

  pub fn has(&self, name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    self.entries.iter().any(|(n, _)| *n == name)
  }

  pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
    self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

fn validate_name(name: &str) -> Result<String, HeaderError> {
  let is_token = !name.is_empty()
    && name.bytes().all(|b| {
      b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
    });
  if !is_token {
    return Err(HeaderError::InvalidName(name.to_string()));
  }

  Ok(name.to_ascii_lowercase())
}

/// Visible ASCII, space, tab and obs-text.
fn is_valid_value(value: &[u8]) -> bool {
  value
    .iter()
    .all(|&b| b == b'\t' || (b >= 0x20 && b != 0x7f))
}

/// A request a guest wants the host to send.
///
/// Built by the guest and moved into [`OutgoingHandler::handle`] on
/// submission, so it can be submitted at most once.
#[derive(Debug)]
pub struct OutgoingRequest {
  method: Method,
  scheme: Option<Scheme>,
  authority: Option<String>,
  path_with_query: Option<String>,
  headers: Fields,
  body: Bytes,
}

impl OutgoingRequest {
  /// A `GET` request with no destination set yet.
  pub fn new(headers: Fields) -> Self {
    Self {
      method: Method::Get,
      scheme: None,
      authority: None,
      path_with_query: None,
      headers,
      body: Bytes::new(),
    }
  }

  /// Build a request targeting `url`.
  pub fn from_url(method: Method, url: &Url, headers: Fields) -> Result<Self, ErrorCode> {
    if !url.username().is_empty() || url.password().is_some() {
      return Err(ErrorCode::invalid_request(
        "credentials in the url authority are not supported",
      ));
    }

    let mut request = Self::new(headers);
    request.set_method(method)?;
    request.set_scheme(Some(Scheme::from(url.scheme())))?;
    request.set_authority(Some(url.authority()))?;

    let path = match url.query() {
      Some(query) => format!("{}?{query}", url.path()),
      None => url.path().to_string(),
    };
    request.set_path_with_query(Some(&path))?;

    Ok(request)
  }

  pub fn set_method(&mut self, method: Method) -> Result<(), ErrorCode> {
    if let Method::Other(name) = &method {
      let is_token = !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
      if !is_token {
        return Err(ErrorCode::invalid_request(format!("invalid method: {name:?}")));
      }
    }
    self.method = method;
    Ok(())
  }

  pub fn set_scheme(&mut self, scheme: Option<Scheme>) -> Result<(), ErrorCode> {
    if let Some(Scheme::Other(name)) = &scheme {
      let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && name
          .chars()
          .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
      if !valid {
        return Err(ErrorCode::invalid_request(format!("invalid scheme: {name:?}")));
      }
    }
    self.scheme = scheme;
    Ok(())
  }

  pub fn set_authority(&mut self, authority: Option<&str>) -> Result<(), ErrorCode> {
    if let Some(authority) = authority {
      split_authority(authority)?;
    }
    self.authority = authority.map(str::to_string);
    Ok(())
  }

  pub fn set_path_with_query(&mut self, path: Option<&str>) -> Result<(), ErrorCode> {
    if let Some(path) = path {
      let valid = path.starts_with('/')
        && !path
          .chars()
          .any(|c| c.is_whitespace() || c.is_control() || c == '#');
      if !valid {
        return Err(ErrorCode::invalid_request(format!("invalid path: {path:?}")));
      }
    }
    self.path_with_query = path.map(str::to_string);
    Ok(())
  }

  pub fn set_body(&mut self, body: impl Into<Bytes>) {
    self.body = body.into();
  }

  pub fn headers_mut(&mut self) -> &mut Fields {
    &mut self.headers
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn scheme(&self) -> Option<&Scheme> {
    self.scheme.as_ref()
  }

  pub fn authority(&self) -> Option<&str> {
    self.authority.as_deref()
  }

  /// Path and query, defaulting to `/` when unset.
  pub fn path_with_query(&self) -> &str {
    self.path_with_query.as_deref().unwrap_or("/")
  }

  pub fn headers(&self) -> &Fields {
    &self.headers
  }

  pub fn body(&self) -> &Bytes {
    &self.body
  }

  /// Host and port named by the authority, if one is set.
  pub fn host_and_port(&self) -> Option<Result<(String, Option<u16>), ErrorCode>> {
    self.authority.as_deref().map(split_authority)
  }

  /// Split the request into its parts. Used by hosts after validation.
  pub fn into_parts(self) -> RequestParts {
    RequestParts {
      method: self.method,
      scheme: self.scheme,
      authority: self.authority,
      path_with_query: self.path_with_query.unwrap_or_else(|| "/".to_string()),
      headers: self.headers,
      body: self.body,
    }
  }
}

/// The owned parts of a submitted [`OutgoingRequest`].
#[derive(Debug, Clone)]
pub struct RequestParts {
  pub method: Method,
  pub scheme: Option<Scheme>,
  pub authority: Option<String>,
  pub path_with_query: String,
  pub headers: Fields,
  pub body: Bytes,
}

/// Parse `host[:port]`, with bracketed IPv6 hosts.
fn split_authority(authority: &str) -> Result<(String, Option<u16>), ErrorCode> {
  let invalid = || ErrorCode::invalid_request(format!("invalid authority: {authority:?}"));

  if authority.is_empty()
    || authority
      .chars()
      .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@'))
  {
    return Err(invalid());
  }

  let url = Url::parse(&format!("http://{authority}/")).map_err(|_| invalid())?;
  let host = url.host_str().ok_or_else(invalid)?;
  if host.is_empty() {
    return Err(invalid());
  }

  let port = match authority.rsplit_once(':') {
    Some((_, port)) if !authority.ends_with(']') => Some(port.parse::<u16>().map_err(|_| invalid())?),
    _ => None,
  };

  Ok((host.trim_matches(['[', ']']).to_string(), port))
}

/// Transport tuning for one request. Unset fields fall back to host defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
  pub connect_timeout: Option<Duration>,
  pub first_byte_timeout: Option<Duration>,
  pub between_bytes_timeout: Option<Duration>,
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = Some(timeout);
    self
  }

  pub fn with_first_byte_timeout(mut self, timeout: Duration) -> Self {
    self.first_byte_timeout = Some(timeout);
    self
  }

  pub fn with_between_bytes_timeout(mut self, timeout: Duration) -> Self {
    self.between_bytes_timeout = Some(timeout);
    self
  }

  /// Fill unset fields from `defaults`.
  pub fn merge_defaults(self, defaults: &RequestOptions) -> RequestOptions {
    RequestOptions {
      connect_timeout: self.connect_timeout.or(defaults.connect_timeout),
      first_byte_timeout: self.first_byte_timeout.or(defaults.first_byte_timeout),
      between_bytes_timeout: self.between_bytes_timeout.or(defaults.between_bytes_timeout),
    }
  }

  /// Reject zero timeouts, which could never be met.
  pub fn validate(&self) -> Result<(), ErrorCode> {
    let fields = [
      ("connect_timeout", self.connect_timeout),
      ("first_byte_timeout", self.first_byte_timeout),
      ("between_bytes_timeout", self.between_bytes_timeout),
    ];
    for (name, value) in fields {
      if value == Some(Duration::ZERO) {
        return Err(ErrorCode::invalid_request(format!("{name} must be non-zero")));
      }
    }
    Ok(())
  }
}

/// A fully received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingResponse {
  pub status: u16,
  pub headers: Fields,
  pub body: Bytes,
}

/// The outgoing-request capability.
///
/// `handle` validates the request synchronously. A request that is malformed
/// or not permitted is rejected with `Err` and never sent. Otherwise the host
/// starts the request and returns a pending future straight away; failures
/// after that point arrive through the future.
pub trait OutgoingHandler {
  fn handle(
    &self,
    request: OutgoingRequest,
    options: Option<RequestOptions>,
  ) -> Result<FutureIncomingResponse, ErrorCode>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fields_lowercase_and_multi_value() {
    let mut fields = Fields::new();
    fields.append("X-Trace", "a").unwrap();
    fields.append("x-trace", "b").unwrap();

    assert!(fields.has("X-TRACE"));
    assert_eq!(fields.get("x-trace"), vec![b"a".as_slice(), b"b".as_slice()]);

    fields.set("X-Trace", "c").unwrap();
    assert_eq!(fields.get("x-trace"), vec![b"c".as_slice()]);

    fields.delete("x-trace");
    assert!(fields.is_empty());
  }

  #[test]
  fn test_fields_reject_bad_entries() {
    let mut fields = Fields::new();
    assert_eq!(
      fields.append("bad name", "v"),
      Err(HeaderError::InvalidName("bad name".to_string()))
    );
    assert_eq!(
      fields.append("x-ok", "line\r\nbreak"),
      Err(HeaderError::InvalidValue("x-ok".to_string()))
    );
    assert_eq!(
      fields.append("Host", "example.com"),
      Err(HeaderError::Forbidden("host".to_string()))
    );
    for value in [b"a\x01b".as_slice(), b"a\x1fb".as_slice(), b"del\x7f".as_slice()] {
      assert_eq!(
        fields.append("x-ok", value),
        Err(HeaderError::InvalidValue("x-ok".to_string()))
      );
    }
    assert!(fields.is_empty());

    fields.append("x-ok", "tab\tand space").unwrap();
    fields.append("x-ok", b"caf\xe9".as_slice()).unwrap();
    assert_eq!(fields.len(), 2);
  }

  #[test]
  fn test_append_received_keeps_hop_headers() {
    let mut fields = Fields::new();
    fields.append_received("Connection", "close").unwrap();
    fields.append_received("upgrade", "h2c").unwrap();

    assert_eq!(fields.get("connection"), vec![b"close".as_slice()]);
    assert_eq!(fields.get("upgrade"), vec![b"h2c".as_slice()]);
    assert_eq!(
      fields.append_received("bad name", "v"),
      Err(HeaderError::InvalidName("bad name".to_string()))
    );
    assert_eq!(
      fields.append_received("x-ok", "a\x01b"),
      Err(HeaderError::InvalidValue("x-ok".to_string()))
    );
  }

  #[test]
  fn test_from_url() {
    let url = Url::parse("https://api.example.com:8443/v1/items?limit=5").unwrap();
    let request = OutgoingRequest::from_url(Method::Post, &url, Fields::new()).unwrap();

    assert_eq!(request.method(), &Method::Post);
    assert_eq!(request.scheme(), Some(&Scheme::Https));
    assert_eq!(request.authority(), Some("api.example.com:8443"));
    assert_eq!(request.path_with_query(), "/v1/items?limit=5");
    assert_eq!(
      request.host_and_port().unwrap().unwrap(),
      ("api.example.com".to_string(), Some(8443))
    );
  }

  #[test]
  fn test_from_url_rejects_credentials() {
    let url = Url::parse("https://user:pw@example.com/").unwrap();
    let result = OutgoingRequest::from_url(Method::Get, &url, Fields::new());
    assert!(matches!(result, Err(ErrorCode::InvalidRequest(_))));
  }

  #[test]
  fn test_setters_validate() {
    let mut request = OutgoingRequest::new(Fields::new());

    assert!(request.set_authority(Some("")).is_err());
    assert!(request.set_authority(Some("a b")).is_err());
    assert!(request.set_authority(Some("host:notaport")).is_err());
    assert!(request.set_path_with_query(Some("no-leading-slash")).is_err());
    assert!(request.set_method(Method::Other("BAD METHOD".into())).is_err());
    assert!(request.set_scheme(Some(Scheme::Other("1ftp".into()))).is_err());

    assert!(request.set_authority(Some("[::1]:8080")).is_ok());
    assert_eq!(
      request.host_and_port().unwrap().unwrap(),
      ("::1".to_string(), Some(8080))
    );
    assert_eq!(request.path_with_query(), "/");
  }

  #[test]
  fn test_method_and_scheme_parsing() {
    assert_eq!(Method::from("get"), Method::Get);
    assert_eq!(Method::from("PURGE"), Method::Other("PURGE".into()));
    assert_eq!(Scheme::from("HTTPS"), Scheme::Https);
    assert_eq!(Scheme::from("ftp").as_str(), "ftp");
  }

  #[test]
  fn test_options_merge_and_validate() {
    let defaults = RequestOptions::new()
      .with_connect_timeout(Duration::from_secs(5))
      .with_first_byte_timeout(Duration::from_secs(10));
    let options = RequestOptions::new().with_connect_timeout(Duration::from_secs(1));

    let merged = options.merge_defaults(&defaults);
    assert_eq!(merged.connect_timeout, Some(Duration::from_secs(1)));
    assert_eq!(merged.first_byte_timeout, Some(Duration::from_secs(10)));
    assert_eq!(merged.between_bytes_timeout, None);
    assert!(merged.validate().is_ok());

    let zero = RequestOptions::new().with_between_bytes_timeout(Duration::ZERO);
    assert!(matches!(zero.validate(), Err(ErrorCode::InvalidRequest(_))));
  }
}
