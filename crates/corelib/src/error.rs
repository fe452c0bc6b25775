//! Core shared errors (renderer-agnostic).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
