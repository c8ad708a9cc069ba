//! Exit code constants for agentrace.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `DATA_CORRUPTION` | A document on disk failed to parse or validate |
//! | 4 | `NOT_FOUND` | Trace, suggestion or required file does not exist |
//! | 5 | `INVALID_TRANSITION` | Suggestion state change not allowed |

/// Exit codes matching the documented exit code table.
///
/// ```rust
/// use agentrace_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(3), ExitCode::DATA_CORRUPTION);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid flags or configuration values
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Data corruption - a manifest, state or history file did not parse
    pub const DATA_CORRUPTION: ExitCode = ExitCode(3);

    /// Not found - trace, suggestion or required file missing
    pub const NOT_FOUND: ExitCode = ExitCode(4);

    /// Invalid transition - suggestion status change rejected by the state table
    pub const INVALID_TRANSITION: ExitCode = ExitCode(5);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ExitCode::SUCCESS,
            ExitCode::INTERNAL,
            ExitCode::CLI_ARGS,
            ExitCode::DATA_CORRUPTION,
            ExitCode::NOT_FOUND,
            ExitCode::INVALID_TRANSITION,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_round_trip_i32() {
        let raw: i32 = ExitCode::NOT_FOUND.into();
        assert_eq!(ExitCode::from(raw), ExitCode::NOT_FOUND);
    }
}
