use tessel_config::HttpConfig;
use tessel_world::Scheme;

/// One entry of the host allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
  /// `*`
  Any,
  /// `api.example.com`
  Exact(String),
  /// `*.example.com`, subdomains only.
  Subdomain(String),
}

impl HostPattern {
  fn parse(pattern: &str) -> Self {
    let pattern = pattern.trim().to_ascii_lowercase();
    if pattern == "*" {
      Self::Any
    } else if let Some(suffix) = pattern.strip_prefix("*.") {
      Self::Subdomain(suffix.to_string())
    } else {
      Self::Exact(pattern.trim_matches(['[', ']']).to_string())
    }
  }

  fn matches(&self, host: &str) -> bool {
    match self {
      Self::Any => true,
      Self::Exact(exact) => exact == host,
      Self::Subdomain(suffix) => host
        .strip_suffix(suffix.as_str())
        .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
    }
  }
}

/// Which destinations guests may reach, and how much they may move.
///
/// The default policy denies everything.
#[derive(Debug, Clone)]
pub struct HttpPolicy {
  allowed_hosts: Vec<HostPattern>,
  allowed_schemes: Vec<String>,
  allowed_ports: Option<Vec<u16>>,
  max_request_body_bytes: Option<u64>,
  max_response_body_bytes: Option<u64>,
}

impl Default for HttpPolicy {
  fn default() -> Self {
    Self::deny_all()
  }
}

impl HttpPolicy {
  pub fn deny_all() -> Self {
    Self {
      allowed_hosts: Vec::new(),
      allowed_schemes: vec!["http".to_string(), "https".to_string()],
      allowed_ports: None,
      max_request_body_bytes: None,
      max_response_body_bytes: None,
    }
  }

  /// Allow the given host patterns over http and https on any port.
  pub fn allow_hosts<I, S>(hosts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self {
      allowed_hosts: hosts
        .into_iter()
        .map(|h| HostPattern::parse(h.as_ref()))
        .collect(),
      ..Self::deny_all()
    }
  }

  pub fn from_config(config: &HttpConfig) -> Self {
    Self {
      allowed_hosts: config
        .allowed_hosts
        .iter()
        .map(|h| HostPattern::parse(h))
        .collect(),
      allowed_schemes: config
        .allowed_schemes
        .iter()
        .map(|s| s.to_ascii_lowercase())
        .collect(),
      allowed_ports: config.allowed_ports.clone(),
      max_request_body_bytes: config.max_request_body_bytes,
      max_response_body_bytes: config.max_response_body_bytes,
    }
  }

  pub fn with_allowed_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
    self.allowed_ports = Some(ports.into_iter().collect());
    self
  }

  pub fn with_max_request_body_bytes(mut self, limit: u64) -> Self {
    self.max_request_body_bytes = Some(limit);
    self
  }

  pub fn with_max_response_body_bytes(mut self, limit: u64) -> Self {
    self.max_response_body_bytes = Some(limit);
    self
  }

  pub fn max_request_body_bytes(&self) -> Option<u64> {
    self.max_request_body_bytes
  }

  pub fn max_response_body_bytes(&self) -> Option<u64> {
    self.max_response_body_bytes
  }

  pub fn allows_host(&self, host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let host = host.trim_matches(['[', ']']);
    self.allowed_hosts.iter().any(|p| p.matches(host))
  }

  pub fn allows_scheme(&self, scheme: &Scheme) -> bool {
    self.allowed_schemes.iter().any(|s| s == scheme.as_str())
  }

  pub fn allows_port(&self, port: u16) -> bool {
    match &self.allowed_ports {
      Some(ports) => ports.contains(&port),
      None => true,
    }
  }

  /// Whether a request to `scheme://host:port` is permitted.
  pub fn permits(&self, scheme: &Scheme, host: &str, port: u16) -> bool {
    self.allows_scheme(scheme) && self.allows_host(host) && self.allows_port(port)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_denies_everything() {
    let policy = HttpPolicy::default();
    assert!(!policy.permits(&Scheme::Https, "example.com", 443));
  }

  #[test]
  fn test_exact_host_case_insensitive() {
    let policy = HttpPolicy::allow_hosts(["API.example.com"]);
    assert!(policy.allows_host("api.example.com"));
    assert!(policy.allows_host("Api.Example.Com"));
    assert!(!policy.allows_host("example.com"));
    assert!(!policy.allows_host("evil-api.example.com"));
  }

  #[test]
  fn test_subdomain_pattern() {
    let policy = HttpPolicy::allow_hosts(["*.example.com"]);
    assert!(policy.allows_host("api.example.com"));
    assert!(policy.allows_host("a.b.example.com"));
    assert!(!policy.allows_host("example.com"));
    assert!(!policy.allows_host("notexample.com"));
  }

  #[test]
  fn test_wildcard_allows_any_host() {
    let policy = HttpPolicy::allow_hosts(["*"]);
    assert!(policy.allows_host("anything.test"));
    assert!(policy.allows_host("127.0.0.1"));
  }

  #[test]
  fn test_ipv6_host() {
    let policy = HttpPolicy::allow_hosts(["[::1]"]);
    assert!(policy.allows_host("::1"));
    assert!(policy.allows_host("[::1]"));
  }

  #[test]
  fn test_ports_and_schemes() {
    let policy = HttpPolicy::allow_hosts(["*"]).with_allowed_ports([443]);
    assert!(policy.permits(&Scheme::Https, "example.com", 443));
    assert!(!policy.permits(&Scheme::Https, "example.com", 8443));
    assert!(!policy.permits(&Scheme::Other("ftp".into()), "example.com", 443));
  }

  #[test]
  fn test_from_config() {
    let config = HttpConfig {
      allowed_hosts: vec!["localhost".into()],
      allowed_schemes: vec!["HTTP".into()],
      max_response_body_bytes: Some(1024),
      ..HttpConfig::default()
    };
    let policy = HttpPolicy::from_config(&config);

    assert!(policy.permits(&Scheme::Http, "localhost", 8080));
    assert!(!policy.permits(&Scheme::Https, "localhost", 443));
    assert_eq!(policy.max_response_body_bytes(), Some(1024));
    assert_eq!(policy.max_request_body_bytes(), None);
  }
}
