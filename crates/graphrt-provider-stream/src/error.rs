use graphrt::error::RegistryError;
use graphrt::KernelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("compute stream `{0}` is shut down")]
    Closed(String),
    #[error("fence state for stream `{0}` is poisoned")]
    Poisoned(String),
    #[error("work on stream `{stream}` failed: {message}")]
    Device { stream: String, message: String },
    #[error("failed to start compute stream `{stream}`: {source}")]
    Spawn {
        stream: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<StreamError> for KernelError {
    fn from(err: StreamError) -> Self {
        KernelError::execution(err.to_string())
    }
}
