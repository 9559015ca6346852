//! Shared error taxonomy and wire-codec helpers used across every `halp-*` crate.
//!
//! Keeping one `Error` enum here (instead of ad hoc `anyhow::Error` strings per
//! crate) means the orchestrator and pipeline can match on concrete variants
//! when deciding how a verification step failed, per the error taxonomy.

use std::fmt;

/// Hex/base64 wire-codec helpers shared by every crate's external interfaces.
pub mod codec;

/// Error taxonomy. Each variant carries only information safe to surface —
/// never raw field or scalar values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied value failed a structural or range check.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A byte string did not decode to a valid curve point.
    #[error("invalid point encoding")]
    InvalidPoint,

    /// A byte string did not decode to a valid scalar.
    #[error("invalid scalar encoding")]
    InvalidScalar,

    /// A SNARK or BBS+ proof failed verification.
    #[error("proof verification failed")]
    InvalidProof,

    /// The SNARK's and BBS+'s views of the commitment disagree.
    #[error("commitment binding mismatch")]
    BindingMismatch,

    /// The referenced challenge is unknown, already consumed, or mismatched.
    #[error("challenge not found or does not match")]
    InvalidChallenge,

    /// The challenge's TTL elapsed before it was used.
    #[error("challenge expired")]
    ChallengeExpired,

    /// The claimed registry root is not one the verifier currently accepts.
    #[error("registry root does not match an accepted root")]
    RegistryRootMismatch,

    /// This nullifier has already been registered.
    #[error("nullifier already registered")]
    NullifierReused,

    /// The resource already exists.
    #[error("already exists")]
    AlreadyExists,

    /// The resource does not exist.
    #[error("not found")]
    NotFound,

    /// More attributes were supplied than the parameter set supports.
    #[error("too many attributes: {count} > max {max}")]
    TooManyAttributes { count: usize, max: usize },

    /// Witness assembly exhausted its retry budget without a valid sample.
    #[error("witness value out of range after exhausting retries")]
    WitnessOutOfRange,

    /// The operation did not complete within its allotted time.
    #[error("operation timed out")]
    Timeout,

    /// An invariant the caller cannot act on was violated.
    #[error("internal error")]
    Internal,
}

/// HTTP status code an out-of-scope I/O layer would plausibly surface for a
/// given error. The core never produces an HTTP response itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusHint(pub u16);

impl fmt::Display for StatusHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error {
    /// Maps this variant to the HTTP status code an out-of-scope I/O layer
    /// would plausibly surface for it.
    pub fn status_hint(&self) -> StatusHint {
        let code = match self {
            Error::InvalidInput(_) => 400,
            Error::InvalidPoint => 400,
            Error::InvalidScalar => 400,
            Error::TooManyAttributes { .. } => 400,
            Error::InvalidProof => 401,
            Error::BindingMismatch => 401,
            Error::InvalidChallenge => 401,
            Error::ChallengeExpired => 401,
            Error::RegistryRootMismatch => 401,
            Error::NullifierReused => 409,
            Error::AlreadyExists => 409,
            Error::NotFound => 404,
            Error::WitnessOutOfRange => 500,
            Error::Timeout => 504,
            Error::Internal => 500,
        };
        StatusHint(code)
    }
}

/// Shorthand for `Result<T, Error>`, used across every `halp-*` crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_hints_match_taxonomy() {
        assert_eq!(Error::NullifierReused.status_hint().0, 409);
        assert_eq!(Error::InvalidProof.status_hint().0, 401);
        assert_eq!(Error::NotFound.status_hint().0, 404);
        assert_eq!(Error::Timeout.status_hint().0, 504);
    }
}
