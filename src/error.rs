use std::path::PathBuf;

/// Errors from encoding or decoding a build token.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The token is shorter than the minimum of 7 characters (major, branch code, sequence).
    #[error("Build token `{token}` should be at least 7 characters long, but is {len}")]
    TooShort { token: String, len: usize },

    /// A numeric field of the token is not made of ASCII digits.
    #[error("Build token `{token}` should have digits in its {field} field")]
    InvalidNumber { token: String, field: &'static str },

    /// A value does not fit the fixed-width field it is encoded into.
    #[error("Value {value} for {field} should be at most {max} to fit the build token")]
    Overflow {
        field: &'static str,
        value: u32,
        max: u32,
    },
}

/// Errors from the persisted counter store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Could not access counter store at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not serialize counter store: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another process held the store's lock for longer than we were willing to wait.
    #[error("Counter store `{path}` is locked by another process")]
    Locked { path: PathBuf },
}

/// Errors from reading or writing the definitions file.
#[derive(thiserror::Error, Debug)]
pub enum FileError {
    #[error("Version file should exist at `{path}`")]
    NotFound { path: PathBuf },

    #[error("Could not access version file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any error this library can return.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    File(#[from] FileError),
}
