use thiserror::Error;

use super::verification_result::VerificationResult;

/// Failure to obtain any answer from the verification backend. A rejected
/// face is not an error; it is a failed [`VerificationResult`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("{0}")]
    Transport(String),
    #[error("invalid verifier configuration: {0}")]
    Config(String),
}

/// Submits one captured image and reports whether it matched the user.
///
/// Called at most once per capture attempt, from a worker thread.
pub trait FaceVerifier: Send + Sync {
    fn verify(&self, image: &[u8]) -> Result<VerificationResult, VerificationError>;
}
