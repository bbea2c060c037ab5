//! Error types for the tja2fumen library

use std::io;

/// Fatal error type for tja2fumen operations
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// I/O error while opening, reading or writing a chart file
    #[error("I/O error: {0}")]
    IoError(String),

    /// No decoder produced a clean decoding of the input text
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// Malformed TJA input
    #[error("parse error: {0}")]
    ParseError(String),

    /// Truncated or malformed fumen binary
    #[error("fumen read error: {0}")]
    FumenReadError(String),
}

impl From<io::Error> for ConvertError {
    fn from(error: io::Error) -> Self {
        Self::IoError(error.to_string())
    }
}

/// Non-fatal diagnostics collected while parsing and converting a chart.
///
/// Warnings never abort a conversion; the offending construct is repaired
/// in place and the repair is recorded here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvertWarning {
    #[error("unsupported command '#{0}' ignored")]
    UnknownCommand(String),

    #[error("unknown note symbol '{symbol}' downgraded to {downgraded}")]
    DowngradedNote { symbol: char, downgraded: &'static str },

    #[error("unrecognized note symbol '{0}' skipped")]
    SkippedSymbol(char),

    #[error("LEVEL {0} out of range, clamped to {1}")]
    LevelClamped(i32, i32),

    #[error("BALLOON list exhausted, padding with {0} hits")]
    BalloonListPadded(i32),

    #[error("unterminated drumroll, closed at the end of the chart")]
    UnterminatedRoll,

    #[error("drumroll crosses a branch fork, closed at the fork boundary")]
    RollCutAtFork,

    #[error("drumroll opened while another is still open, previous one closed")]
    NestedRoll,

    #[error("negative #DELAY clamped to zero")]
    NegativeDelay,

    #[error("branch streams have unequal lengths ({normal}/{advanced}/{master}), padded from the longest")]
    BranchLengthPadded {
        normal: usize,
        advanced: usize,
        master: usize,
    },

    #[error("#SECTION without a preceding #BRANCHSTART has no condition to repeat")]
    SectionWithoutBranch,
}
