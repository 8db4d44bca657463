use std::collections::BTreeMap;
use std::sync::Arc;

use tessel_world::Task;
use thiserror::Error;

use crate::fetch::Fetch;
use crate::square::Square;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
  #[error("task not found: {name}")]
  NotFound { name: String },

  #[error("task already registered: {name}")]
  Duplicate { name: String },
}

/// Tasks available to run, by name.
#[derive(Clone, Default)]
pub struct TaskRegistry {
  tasks: BTreeMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding `square` and `fetch`.
  pub fn builtin() -> Self {
    let mut registry = Self::new();
    registry.tasks.insert("square".to_string(), Arc::new(Square));
    registry
      .tasks
      .insert("fetch".to_string(), Arc::new(Fetch::default()));
    registry
  }

  pub fn register(
    &mut self,
    name: impl Into<String>,
    task: Arc<dyn Task>,
  ) -> Result<(), RegistryError> {
    let name = name.into();
    if self.tasks.contains_key(&name) {
      return Err(RegistryError::Duplicate { name });
    }
    self.tasks.insert(name, task);
    Ok(())
  }

  pub fn get(&self, name: &str) -> Result<Arc<dyn Task>, RegistryError> {
    self
      .tasks
      .get(name)
      .cloned()
      .ok_or_else(|| RegistryError::NotFound {
        name: name.to_string(),
      })
  }

  /// Registered names, sorted.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.tasks.keys().map(String::as_str)
  }
}
