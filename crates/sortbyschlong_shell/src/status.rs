//! Status codes returned across the native boundary.
//!
//! # Invariants
//! - Every [`HostError`] maps to exactly one failure code.
//! - Contribution counts are success codes carrying the count in the low word.

use sortbyschlong_core::{FactoryError, HostError, HostResult, RegistryError};

pub type Status = i32;

pub const S_OK: Status = 0;
pub const S_FALSE: Status = 1;
pub const E_NOINTERFACE: Status = 0x8000_4002_u32 as i32;
pub const E_POINTER: Status = 0x8000_4003_u32 as i32;
pub const E_FAIL: Status = 0x8000_4005_u32 as i32;
pub const E_OUTOFMEMORY: Status = 0x8007_000E_u32 as i32;
pub const E_INVALIDARG: Status = 0x8007_0057_u32 as i32;
pub const CLASS_E_NOAGGREGATION: Status = 0x8004_0110_u32 as i32;
pub const CLASS_E_CLASSNOTAVAILABLE: Status = 0x8004_0111_u32 as i32;

const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
const FACILITY_WIN32: u32 = 7;

/// `HRESULT_FROM_WIN32`.
pub const fn from_win32(code: u32) -> Status {
    if code as i32 <= 0 {
        code as i32
    } else {
        ((code & 0x0000_FFFF) | (FACILITY_WIN32 << 16) | 0x8000_0000) as i32
    }
}

/// Success code whose low word is the number of identifiers consumed.
pub fn contribution_status(consumed: u32) -> Status {
    (consumed & 0x0000_FFFF) as i32
}

pub fn host_error_status(error: HostError) -> Status {
    match error {
        HostError::OutOfRange | HostError::UnsupportedRequest => E_INVALIDARG,
        HostError::InvalidHandle => E_POINTER,
        HostError::AllocationFailure => E_OUTOFMEMORY,
        HostError::HostApiFailure | HostError::UnsupportedVerbForm => E_FAIL,
        HostError::BufferTooSmall => from_win32(ERROR_INSUFFICIENT_BUFFER),
        HostError::DefaultOnlyQuery => S_OK,
    }
}

pub fn result_status<T>(result: HostResult<T>) -> Status {
    match result {
        Ok(_) => S_OK,
        Err(error) => host_error_status(error),
    }
}

pub fn factory_error_status(error: FactoryError) -> Status {
    match error {
        FactoryError::NoAggregation => CLASS_E_NOAGGREGATION,
        FactoryError::Allocation => E_OUTOFMEMORY,
    }
}

pub fn registry_error_status(error: &RegistryError) -> Status {
    match error {
        RegistryError::NotFound(_) => S_OK,
        RegistryError::Failed { code, .. } => from_win32(*code),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        contribution_status, from_win32, host_error_status, registry_error_status, result_status,
        E_FAIL, E_INVALIDARG, E_OUTOFMEMORY, E_POINTER, S_OK,
    };
    use sortbyschlong_core::{HostError, RegistryError};

    #[test]
    fn host_errors_map_to_stable_codes() {
        assert_eq!(host_error_status(HostError::OutOfRange), E_INVALIDARG);
        assert_eq!(host_error_status(HostError::UnsupportedRequest), E_INVALIDARG);
        assert_eq!(host_error_status(HostError::InvalidHandle), E_POINTER);
        assert_eq!(host_error_status(HostError::AllocationFailure), E_OUTOFMEMORY);
        assert_eq!(host_error_status(HostError::HostApiFailure), E_FAIL);
        assert_eq!(host_error_status(HostError::UnsupportedVerbForm), E_FAIL);
        assert_eq!(
            host_error_status(HostError::BufferTooSmall) as u32,
            0x8007_007A
        );
        assert_eq!(result_status::<()>(Ok(())), S_OK);
    }

    #[test]
    fn contribution_count_is_a_success_code() {
        assert_eq!(contribution_status(0), 0);
        assert_eq!(contribution_status(3), 3);
        assert!(contribution_status(0x7FFF) >= 0);
    }

    #[test]
    fn win32_codes_gain_facility() {
        assert_eq!(from_win32(0), 0);
        assert_eq!(from_win32(5) as u32, 0x8007_0005);
        let failed = RegistryError::Failed {
            operation: "delete_tree",
            key: "HKCU\\x".to_string(),
            code: 5,
        };
        assert_eq!(registry_error_status(&failed) as u32, 0x8007_0005);
        assert_eq!(
            registry_error_status(&RegistryError::NotFound("HKCU\\x".to_string())),
            S_OK
        );
    }
}
