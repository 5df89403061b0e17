//! Host call boundary.
//!
//! A panic unwinding into the host would take the whole desktop shell down.
//! Every host-reachable operation runs through [`at_host_boundary`], which
//! converts a panic into the operation's neutral result.

use crate::logging::payload_summary;
use log::error;
use std::panic::{self, AssertUnwindSafe};

/// Runs `f`; on panic logs the payload and returns `neutral` instead.
pub fn at_host_boundary<T>(operation: &'static str, neutral: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            error!(
                "event=host_call module=boundary status=error operation={} panic={}",
                operation,
                payload_summary(payload.as_ref())
            );
            neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::at_host_boundary;
    use crate::error::HostError;

    #[test]
    fn passes_through_normal_results() {
        assert_eq!(at_host_boundary("contribute_menu", 0_u32, || 3), 3);
    }

    #[test]
    fn converts_panics_to_neutral_result() {
        let result: Result<(), HostError> =
            at_host_boundary("invoke", Err(HostError::HostApiFailure), || {
                panic!("helper table corrupted")
            });
        assert_eq!(result, Err(HostError::HostApiFailure));
    }
}
