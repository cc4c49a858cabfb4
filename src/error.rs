use thiserror::Error;

/// Code reported when the SDK or a shared client already exists.
pub const INIT_CLIENT_EXISTS: &str = "init::clientExists";
/// Code reported when the SDK or a client must be initialized first.
pub const INIT_CLIENT_FIRST: &str = "init::clientFirst";
/// Code reported when a shared client timed out before becoming ready.
pub const INIT_CLIENT_TIMED_OUT: &str = "init::clientTimedOut";

/// Errors raised by the service itself.
///
/// Anything coming from the wrapped SDK is carried untouched in
/// [`SplitError::Sdk`].
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("there is another instance of the SDK")]
    AlreadyInitialized,

    #[error("client for key {0} is already initialized")]
    AlreadyExists(String),

    #[error("plugin should be initialized")]
    NotInitialized,

    #[error("client for key {0} should be initialized first")]
    ClientNotInitialized(String),

    #[error("client for key {0} timed out")]
    ClientTimedOut(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Sdk(#[from] anyhow::Error),
}

impl SplitError {
    /// Stable string code, matching the codes emitted on error channels.
    pub fn code(&self) -> &'static str {
        match self {
            SplitError::AlreadyInitialized | SplitError::AlreadyExists(_) => INIT_CLIENT_EXISTS,
            SplitError::NotInitialized | SplitError::ClientNotInitialized(_) => INIT_CLIENT_FIRST,
            SplitError::ClientTimedOut(_) => INIT_CLIENT_TIMED_OUT,
            SplitError::InvalidArguments(_) => "input::invalid",
            SplitError::Sdk(_) => "sdk::error",
        }
    }
}
