use crate::target::Eye;

/// Errors that can occur while managing render targets.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render target index {0} is out of range (0..3)")]
    InvalidBufferIndex(usize),

    #[error("{0:?} eye targets are not used in the current configuration")]
    EyeNotConfigured(Eye),

    #[error("right eye target {0} needs its left eye target first")]
    MissingLeftEye(usize),

    #[error("{0:?} render target chain is incomplete")]
    IncompleteChain(Eye),

    #[error("render backend error: {0}")]
    Backend(String),
}
