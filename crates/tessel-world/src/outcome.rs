//! Checked extraction for `Result` and `Option`.
//!
//! Every fallible operation in tessel returns a plain `Result` or `Option`.
//! Inspection (`is_ok`, `is_some`, `match`) and shape-preserving transforms
//! (`map`, `map_err`) come from std. What std lacks is extraction that reports
//! the wrong variant as a value instead of panicking, which is what the
//! extension traits here provide.

use thiserror::Error;

/// A contract was used out of order or on the wrong variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
  /// A value was extracted from the wrong variant.
  #[error("expected `{expected}` variant, found `{found}`")]
  WrongVariant {
    expected: &'static str,
    found: &'static str,
  },

  /// A one-shot value was read a second time.
  #[error("value has already been consumed")]
  AlreadyConsumed,

  /// The underlying resource was reclaimed by the host.
  #[error("resource has been reclaimed by the host")]
  Reclaimed,
}

impl PreconditionError {
  fn wrong_variant(expected: &'static str, found: &'static str) -> Self {
    Self::WrongVariant { expected, found }
  }
}

/// Checked extraction for [`Result`].
pub trait ResultExt<T, E> {
  /// Take the `Ok` value, or report that the result was `Err`.
  fn extract_ok(self) -> Result<T, PreconditionError>;

  /// Take the `Err` value, or report that the result was `Ok`.
  fn extract_err(self) -> Result<E, PreconditionError>;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
  fn extract_ok(self) -> Result<T, PreconditionError> {
    match self {
      Ok(value) => Ok(value),
      Err(_) => Err(PreconditionError::wrong_variant("Ok", "Err")),
    }
  }

  fn extract_err(self) -> Result<E, PreconditionError> {
    match self {
      Ok(_) => Err(PreconditionError::wrong_variant("Err", "Ok")),
      Err(error) => Ok(error),
    }
  }
}

/// Checked extraction for [`Option`].
pub trait OptionExt<T> {
  /// Take the `Some` value, or report that the option was `None`.
  fn extract_some(self) -> Result<T, PreconditionError>;

  /// Confirm the option is `None`.
  fn extract_none(self) -> Result<(), PreconditionError>;
}

impl<T> OptionExt<T> for Option<T> {
  fn extract_some(self) -> Result<T, PreconditionError> {
    self.ok_or(PreconditionError::wrong_variant("Some", "None"))
  }

  fn extract_none(self) -> Result<(), PreconditionError> {
    match self {
      Some(_) => Err(PreconditionError::wrong_variant("None", "Some")),
      None => Ok(()),
    }
  }
}
