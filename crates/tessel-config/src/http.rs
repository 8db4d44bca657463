use serde::{Deserialize, Serialize};

/// Outgoing HTTP grant for guests.
///
/// An empty `allowed_hosts` list denies every destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
  /// Host patterns: `"*"`, an exact host, or `"*.example.com"`.
  #[serde(default)]
  pub allowed_hosts: Vec<String>,

  #[serde(default = "default_schemes")]
  pub allowed_schemes: Vec<String>,

  /// Ports guests may connect to. Unset allows any port.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub allowed_ports: Option<Vec<u16>>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_request_body_bytes: Option<u64>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_response_body_bytes: Option<u64>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub connect_timeout_ms: Option<u64>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub first_byte_timeout_ms: Option<u64>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub between_bytes_timeout_ms: Option<u64>,
}

fn default_schemes() -> Vec<String> {
  vec!["http".to_string(), "https".to_string()]
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      allowed_hosts: Vec::new(),
      allowed_schemes: default_schemes(),
      allowed_ports: None,
      max_request_body_bytes: None,
      max_response_body_bytes: None,
      connect_timeout_ms: None,
      first_byte_timeout_ms: None,
      between_bytes_timeout_ms: None,
    }
  }
}
