/*!
 * @file error.rs
 * @brief mongolink error handling
 */

use std::fmt::Display;

use serde::{de, ser};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("communication error: {0}")]
    Communication(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no document matched")]
    NotFound,

    #[error("operation exceeded time limit: {0}")]
    OperationTimeout(String),

    #[error("BSON kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: String, found: String },

    #[error("missing document key: {0}")]
    MissingKey(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("BSON error: {0}")]
    Bson(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Communication(err.to_string())
    }
}

impl Error {
    pub(crate) fn kind_mismatch(expected: &str, found: &str) -> Self {
        Error::KindMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Bson(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Bson(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        Error::MissingKey(field.to_string())
    }

    fn invalid_type(unexp: de::Unexpected<'_>, exp: &dyn de::Expected) -> Self {
        Error::KindMismatch {
            expected: exp.to_string(),
            found: unexp.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
