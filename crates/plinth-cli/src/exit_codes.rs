//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors (also used on cancellation)
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Option error - an option is missing or malformed
pub const OPTION_ERROR: i32 = 2;

/// Precondition error - the cluster is not in a state the command accepts
pub const PRECONDITION_ERROR: i32 = 3;

/// Command error - helm or kubectl failed
pub const COMMAND_ERROR: i32 = 4;

/// Timeout error - a readiness wait exceeded its budget
pub const TIMEOUT_ERROR: i32 = 5;

/// Configuration error - the platform catalog is invalid
pub const CONFIG_ERROR: i32 = 6;
