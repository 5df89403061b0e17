//! Host-visible error taxonomy.
//!
//! Every host-reachable call reports failures through [`HostError`]. The
//! native boundary maps each variant to a stable status code.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub type HostResult<T> = Result<T, HostError>;

/// Failure classes surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostError {
    /// A handle or pointer passed by the host is null or not live.
    InvalidHandle,
    /// Identifier outside the most recent command range, or no range at all.
    OutOfRange,
    /// Memory for a new instance could not be obtained.
    AllocationFailure,
    /// Internal fault caught at the host boundary.
    HostApiFailure,
    /// Invocation by verb string; only index invocation is supported.
    UnsupportedVerbForm,
    /// Unknown or mismatched request kind.
    UnsupportedRequest,
    /// Output buffer cannot hold the text plus terminator.
    BufferTooSmall,
    /// Host asked for the default action only. Not a real failure.
    DefaultOnlyQuery,
}

impl HostError {
    /// Stable short name used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidHandle => "invalid_handle",
            Self::OutOfRange => "out_of_range",
            Self::AllocationFailure => "allocation_failure",
            Self::HostApiFailure => "host_api_failure",
            Self::UnsupportedVerbForm => "unsupported_verb_form",
            Self::UnsupportedRequest => "unsupported_request",
            Self::BufferTooSmall => "buffer_too_small",
            Self::DefaultOnlyQuery => "default_only_query",
        }
    }
}

impl Display for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHandle => write!(f, "host passed an invalid handle"),
            Self::OutOfRange => write!(f, "command identifier is outside the active range"),
            Self::AllocationFailure => write!(f, "failed to allocate extension instance"),
            Self::HostApiFailure => write!(f, "internal failure while serving host call"),
            Self::UnsupportedVerbForm => write!(f, "verb-form invocation is not supported"),
            Self::UnsupportedRequest => write!(f, "request kind is not supported"),
            Self::BufferTooSmall => write!(f, "output buffer is too small"),
            Self::DefaultOnlyQuery => write!(f, "default-only menu query ignored"),
        }
    }
}

impl Error for HostError {}

#[cfg(test)]
mod tests {
    use super::HostError;

    #[test]
    fn log_names_are_snake_case() {
        for error in [
            HostError::InvalidHandle,
            HostError::OutOfRange,
            HostError::AllocationFailure,
            HostError::HostApiFailure,
            HostError::UnsupportedVerbForm,
            HostError::UnsupportedRequest,
            HostError::BufferTooSmall,
            HostError::DefaultOnlyQuery,
        ] {
            let name = error.as_str();
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
            assert!(!error.to_string().is_empty());
        }
    }
}
