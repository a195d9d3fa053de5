use thiserror::Error;

/// Errors returned by `RecognitionAdapter`
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The host exposes no speech recognition engine under either name.
    #[error("Unsupported speech recognition capability.")]
    UnsupportedCapability,

    #[error("Recognition session has not been initialized")]
    NotInitialized,

    /// Engine failure, passed through untranslated
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

pub type Result<T, E = AdapterError> = std::result::Result<T, E>;
