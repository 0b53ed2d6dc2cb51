//! Error types for `trellis-core`.

use thiserror::Error;

/// Boxed error used at the seams where backends and resolvers plug in.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The backing store failed. Surfaced unmodified; the core never retries.
  #[error("storage error: {0}")]
  Storage(#[source] BoxError),

  #[error("no resolver registered for entity type {0:?}")]
  UnknownType(String),

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("resolver for {type_tag:?} failed: {source}")]
  Resolver {
    type_tag: String,
    #[source]
    source:   BoxError,
  },
}

impl Error {
  /// Wrap a backend error.
  pub fn storage<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
