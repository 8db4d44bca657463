//! Configuration host capability.
//!
//! Read-only string values granted to a task, such as API keys. Guests see
//! them through `Imports::config_get`.

use std::collections::HashMap;
use std::sync::Arc;

/// Values a task may read. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct ConfigCapability {
  values: Arc<HashMap<String, String>>,
}

impl ConfigCapability {
  pub fn new(values: HashMap<String, String>) -> Self {
    Self {
      values: Arc::new(values),
    }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.values.get(key).map(String::as_str)
  }

  /// Granted keys, sorted.
  pub fn keys(&self) -> Vec<&str> {
    let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

impl FromIterator<(String, String)> for ConfigCapability {
  fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
    Self::new(iter.into_iter().collect())
  }
}
