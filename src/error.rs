use thiserror::Error;

/// Errors returned by set operations and their storage backends.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid timestamp '{input}': {reason}")]
    InvalidTimestamp { input: String, reason: String },

    #[error("element must not be empty")]
    InvalidElement,

    #[error("storage operation '{op}' failed after {attempts} attempt(s): {source}")]
    Storage {
        op: &'static str,
        attempts: u32,
        #[source]
        source: sled::Error,
    },

    #[error("codec error: {0}")]
    Codec(#[from] serde_cbor::Error),
}

impl Error {
    pub(crate) fn invalid_timestamp<S: ToString>(input: &str, reason: S) -> Self {
        Error::InvalidTimestamp {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}
