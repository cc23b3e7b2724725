//! Pattern code to actuator-enable mapping.
//!
//! "Red" is the ID (reduce) actuator pair, "Exp" the OD (expand) pair.
//! Code 5 marks a repeat-loop point and code 8 switches everything off.

use serde::Serialize;

/// Highest defined pattern code.
pub const MAX_PATTERN_CODE: i32 = 8;

/// Code used for unknown codes and for absent steps.
pub const ALL_OFF_CODE: i32 = 8;

/// Repeat-loop pattern code.
pub const REPEAT_CODE: i32 = 5;

/// The five enable flags written for each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRow {
    /// ID actuator extend.
    pub red_ext: bool,
    /// ID actuator retract.
    pub red_ret: bool,
    /// OD actuator extend.
    pub exp_ext: bool,
    /// OD actuator retract.
    pub exp_ret: bool,
    /// Repeat-loop marker.
    pub repeat: bool,
}

const fn row(red_ext: bool, red_ret: bool, exp_ext: bool, exp_ret: bool, repeat: bool) -> PatternRow {
    PatternRow {
        red_ext,
        red_ret,
        exp_ext,
        exp_ret,
        repeat,
    }
}

const PATTERN_TABLE: [PatternRow; 9] = [
    row(true, false, false, false, false),  // 0
    row(false, true, false, false, false),  // 1
    row(false, false, true, false, false),  // 2
    row(false, false, false, true, false),  // 3
    row(false, true, false, true, false),   // 4
    row(false, false, false, false, true),  // 5
    row(true, false, true, false, false),   // 6
    row(true, false, false, true, false),   // 7
    row(false, false, false, false, false), // 8
];

impl PatternRow {
    /// The all-off row (code 8).
    pub const ALL_OFF: PatternRow = PATTERN_TABLE[8];

    /// Look up the row for a pattern code.
    ///
    /// Codes outside `0..=8`, and a missing code, map to the all-off row.
    #[must_use]
    pub fn for_code(code: Option<i32>) -> PatternRow {
        code.and_then(|c| usize::try_from(c).ok())
            .and_then(|c| PATTERN_TABLE.get(c).copied())
            .unwrap_or(Self::ALL_OFF)
    }

    /// Flags in write order: redExt, redRet, expExt, expRet, repeat.
    #[must_use]
    pub fn flags(&self) -> [bool; 5] {
        [
            self.red_ext,
            self.red_ret,
            self.exp_ext,
            self.exp_ret,
            self.repeat,
        ]
    }
}

/// Whether `code` is one of the defined pattern codes.
#[must_use]
pub fn is_defined(code: i32) -> bool {
    (0..=MAX_PATTERN_CODE).contains(&code)
}
