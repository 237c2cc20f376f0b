//! Framework status taxonomy.
//!
//! Every fallible framework operation returns [`Result`]. The error side is
//! [`FwkError`], a compact enum that round-trips to the signed status code
//! carried inside event response payloads.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// A specialized [`Result`](core::result::Result) type for framework operations.
pub type Result<T> = core::result::Result<T, FwkError>;

/// Wire status code for a successful operation.
pub const STATUS_SUCCESS: i32 = 0;

/// Wire status code for an operation that was accepted and will complete
/// asynchronously.
pub const STATUS_PENDING: i32 = 1;

/// Framework error kinds, as a Rust error enum.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FwkError {
    /// Invalid argument, including a malformed or out-of-range identifier.
    Param,
    /// Wrong lifecycle phase, or a conflicting in-flight operation.
    State,
    /// A bounded resource is exhausted: event queue full, subscription pool empty.
    NoMem,
    /// The request came from a peer that is not allowed to make it.
    Access,
    /// The operation is not implemented by the target module or driver.
    Support,
    /// The resource is temporarily unavailable; the caller may retry.
    Busy,
    /// Hardware did not respond within its budget.
    Timeout,
    /// An event handler returned a non-success status.
    Handler,
    /// Hardware fault.
    Device,
    /// The subsystem has not been initialized yet.
    Init,
    /// Out of supported numeric range.
    Range,
}

impl FwkError {
    /// Converts a wire status code to a `Result`.
    ///
    /// `STATUS_SUCCESS` and `STATUS_PENDING` are both `Ok`; every negative
    /// code maps to its error kind. Unknown codes collapse to
    /// [`FwkError::Param`].
    pub fn status_to_result(status: i32) -> Result<()> {
        match status {
            STATUS_SUCCESS | STATUS_PENDING => Ok(()),
            -1 => Err(FwkError::Param),
            -2 => Err(FwkError::State),
            -3 => Err(FwkError::NoMem),
            -4 => Err(FwkError::Access),
            -5 => Err(FwkError::Support),
            -6 => Err(FwkError::Busy),
            -7 => Err(FwkError::Timeout),
            -8 => Err(FwkError::Handler),
            -9 => Err(FwkError::Device),
            -10 => Err(FwkError::Init),
            -11 => Err(FwkError::Range),
            _ => Err(FwkError::Param),
        }
    }

    /// The wire status code for this error.
    pub const fn status(self) -> i32 {
        match self {
            FwkError::Param => -1,
            FwkError::State => -2,
            FwkError::NoMem => -3,
            FwkError::Access => -4,
            FwkError::Support => -5,
            FwkError::Busy => -6,
            FwkError::Timeout => -7,
            FwkError::Handler => -8,
            FwkError::Device => -9,
            FwkError::Init => -10,
            FwkError::Range => -11,
        }
    }
}

impl From<FwkError> for i32 {
    fn from(e: FwkError) -> i32 {
        e.status()
    }
}

impl core::fmt::Display for FwkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            FwkError::Param => "invalid parameter",
            FwkError::State => "invalid state",
            FwkError::NoMem => "out of memory",
            FwkError::Access => "access denied",
            FwkError::Support => "not supported",
            FwkError::Busy => "busy",
            FwkError::Timeout => "timeout",
            FwkError::Handler => "handler error",
            FwkError::Device => "device error",
            FwkError::Init => "not initialized",
            FwkError::Range => "out of range",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(FwkError::Param)]
    #[test_case(FwkError::State)]
    #[test_case(FwkError::NoMem)]
    #[test_case(FwkError::Access)]
    #[test_case(FwkError::Support)]
    #[test_case(FwkError::Busy)]
    #[test_case(FwkError::Timeout)]
    #[test_case(FwkError::Handler)]
    #[test_case(FwkError::Device)]
    #[test_case(FwkError::Init)]
    #[test_case(FwkError::Range)]
    fn status_codes_round_trip(err: FwkError) {
        assert_eq!(FwkError::status_to_result(err.status()), Err(err));
    }

    #[test]
    fn success_and_pending_are_ok() {
        assert_eq!(FwkError::status_to_result(STATUS_SUCCESS), Ok(()));
        assert_eq!(FwkError::status_to_result(STATUS_PENDING), Ok(()));
    }

    #[test]
    fn unknown_code_is_a_parameter_error() {
        assert_eq!(FwkError::status_to_result(-1000), Err(FwkError::Param));
    }

    #[test]
    fn status_codes_are_distinct_and_negative() {
        let all = [
            FwkError::Param,
            FwkError::State,
            FwkError::NoMem,
            FwkError::Access,
            FwkError::Support,
            FwkError::Busy,
            FwkError::Timeout,
            FwkError::Handler,
            FwkError::Device,
            FwkError::Init,
            FwkError::Range,
        ];
        for (i, a) in all.iter().enumerate() {
            assert!(a.status() < 0);
            for b in &all[i + 1..] {
                assert_ne!(a.status(), b.status());
            }
        }
    }
}
