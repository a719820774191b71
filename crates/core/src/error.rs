//! Shared error type for the VTS voice gateway
//!
//! Each component downstream of this crate defines its own error enum and
//! converts into this one at the crate boundary, mirroring the
//! `ServerError` used by the server crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
