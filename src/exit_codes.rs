//! Exit code constants for the tasklock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 3: Durable store failure
//! - 4: Lock not acquired (held elsewhere, contention, verification failure)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// Durable store failure: commit conflict, I/O or backend errors.
pub const STORE_FAILURE: i32 = 3;

/// Lock failure: the lock is held elsewhere or could not be confirmed.
pub const LOCK_FAILURE: i32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, STORE_FAILURE, LOCK_FAILURE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
