//! Performs one HTTP request and reports the response.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Deserialize;
use tessel_guest::{Request, RetryPolicy};
use tessel_world::{Imports, Level, Method, RequestOptions, Task, TaskRequest, TaskResult};

/// Most extra attempts a single fetch may ask for.
pub const MAX_RETRIES: u32 = 5;

/// Config key whose value is sent as `authorization` when the input sets none.
pub const AUTHORIZATION_KEY: &str = "FETCH_AUTHORIZATION";

/// Expected input schema for fetch tasks.
#[derive(Debug, Deserialize)]
struct FetchInput {
  #[serde(default = "default_method")]
  method: String,
  url: String,
  #[serde(default)]
  headers: HashMap<String, String>,
  /// Strings are sent as-is; anything else is sent as JSON.
  #[serde(default)]
  body: Option<serde_json::Value>,
  /// Extra attempts on transient failures.
  #[serde(default)]
  retries: u32,
  /// First-byte timeout for each attempt.
  #[serde(default)]
  timeout_ms: Option<u64>,
}

fn default_method() -> String {
  "GET".to_string()
}

/// `{method, url, headers, body}` in, `{status, headers, body}` out.
///
/// A non-2xx status is still a successful fetch. Transport failures become
/// the task's error message.
#[derive(Debug, Clone)]
pub struct Fetch {
  backoff: Duration,
}

impl Default for Fetch {
  fn default() -> Self {
    Self {
      backoff: Duration::from_millis(250),
    }
  }
}

impl Fetch {
  pub fn with_backoff(backoff: Duration) -> Self {
    Self { backoff }
  }
}

impl Task for Fetch {
  fn run_task(&self, host: &dyn Imports, request: TaskRequest) -> TaskResult {
    let input: FetchInput =
      serde_json::from_slice(request.as_bytes()).map_err(|e| format!("invalid input: {e}"))?;

    if input.retries > MAX_RETRIES {
      return Err(format!(
        "invalid input: retries must be at most {MAX_RETRIES}, got {}",
        input.retries
      ));
    }
    let method = parse_method(&input.method)?;
    let mut request = Request::new(method.clone(), input.url.as_str());

    let has_authorization = input
      .headers
      .keys()
      .any(|k| k.eq_ignore_ascii_case("authorization"));
    for (name, value) in &input.headers {
      request = request.header(name, value);
    }
    if !has_authorization {
      if let Some(token) = host.config_get(AUTHORIZATION_KEY) {
        request = request.header("authorization", token);
      }
    }

    request = match input.body {
      None => request,
      Some(serde_json::Value::String(text)) => request.body(text),
      Some(value) => request
        .json(&value)
        .map_err(|e| format!("invalid body: {e}"))?,
    };

    let options = input
      .timeout_ms
      .map(|ms| RequestOptions::new().with_first_byte_timeout(Duration::from_millis(ms)));
    let policy = RetryPolicy::new(input.retries + 1, self.backoff);

    host.log(Level::Info, &format!("{method} {}", input.url));
    let response = policy
      .send_with_options(host, &request, options)
      .map_err(|e| format!("{method} {} failed: {e}", input.url))?;
    host.log(Level::Debug, &format!("received status {}", response.status));

    let mut headers: BTreeMap<&str, String> = BTreeMap::new();
    for (name, value) in response.headers.entries() {
      let value = String::from_utf8_lossy(value);
      headers
        .entry(name)
        .and_modify(|existing| {
          existing.push_str(", ");
          existing.push_str(&value);
        })
        .or_insert_with(|| value.into_owned());
    }

    // Parse body as JSON when possible, fall back to text
    let text = response.text();
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

    let output = serde_json::json!({
      "status": response.status,
      "headers": headers,
      "body": body,
    });
    serde_json::to_vec(&output).map_err(|e| format!("failed to encode output: {e}"))
  }
}

fn parse_method(method: &str) -> Result<Method, String> {
  match Method::from(method) {
    Method::Other(_) | Method::Connect | Method::Trace => {
      Err(format!("unsupported HTTP method: {method}"))
    }
    method => Ok(method),
  }
}
