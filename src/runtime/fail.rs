// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::libc::c_int;
use ::std::{
    error,
    fmt,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Failure
#[derive(Clone)]
pub struct Fail {
    /// Error code.
    pub errno: c_int,
    /// Cause.
    pub cause: String,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Failures
impl Fail {
    /// Creates a new Failure.
    pub fn new(errno: i32, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
        }
    }

    /// Creates a Failure carrying the calling thread's current `errno`, for a
    /// host call that just reported an error.
    pub fn last_os_error(syscall: &str) -> Self {
        let errno: c_int = unsafe { *libc::__errno_location() };
        Self {
            errno,
            cause: format!("{}() failed (errno={})", syscall, errno),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Display Trait Implementation for Failures
impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

/// Debug Trait Implementation for Failures
impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Error Trait Implementation for Failures
impl error::Error for Fail {}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::Fail;
    use ::anyhow::Result;

    #[test]
    fn fail_carries_errno_and_cause() -> Result<()> {
        let fail: Fail = Fail::new(libc::EINVAL, "bad argument");
        crate::ensure_eq!(fail.errno, libc::EINVAL);
        crate::ensure_eq!(fail.cause, "bad argument".to_string());
        crate::ensure_eq!(format!("{}", fail), "bad argument".to_string());
        Ok(())
    }
}
