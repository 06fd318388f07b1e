use thiserror::Error;

pub type SlipResult<T, E = SlipError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SlipError {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("tree-sitter error: {0}")]
  TreeSitter(#[from] tree_sitter::LanguageError),

  #[error("{path}: rewrite did not stabilize after {cycles} cycles")]
  CycleBudgetExceeded { path: String, cycles: usize },

  #[error("other: {0}")]
  Other(String),
}

impl From<&str> for SlipError {
  fn from(s: &str) -> Self {
    SlipError::Other(s.to_owned())
  }
}
