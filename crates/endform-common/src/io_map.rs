//! Tag resolver for indexed digital I/O.
//!
//! Maps a small integer index to a controller-resident tag. The table is
//! loaded once at startup and is read-only afterwards. A lookup miss is an
//! error, never a default tag.

use crate::error::{HmiError, HmiResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of an I/O point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Digital input.
    Input,
    /// Digital output.
    Output,
}

/// One row of the I/O table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoMapEntry {
    /// Unique index.
    pub index: u32,
    /// Controller symbol path.
    pub tag: String,
    /// Input or output.
    pub direction: Direction,
    /// Operator-facing label.
    pub label: String,
}

impl IoMapEntry {
    fn new(index: u32, tag: &str, direction: Direction, label: &str) -> Self {
        Self {
            index,
            tag: tag.to_string(),
            direction,
            label: label.to_string(),
        }
    }
}

/// The loaded I/O table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IoMap {
    entries: BTreeMap<u32, IoMapEntry>,
}

impl IoMap {
    /// Build a map, rejecting duplicate indexes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first duplicated index.
    pub fn from_entries(entries: Vec<IoMapEntry>) -> HmiResult<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            let index = entry.index;
            if map.insert(index, entry).is_some() {
                return Err(HmiError::Config(format!("duplicate I/O index {index}")));
            }
        }
        Ok(Self { entries: map })
    }

    /// Resolve an index to its entry.
    ///
    /// # Errors
    ///
    /// Returns [`HmiError::UnknownIndex`] when the index is not in the table.
    pub fn resolve(&self, index: u32) -> HmiResult<&IoMapEntry> {
        self.entries.get(&index).ok_or(HmiError::UnknownIndex(index))
    }

    /// Resolve an index supplied as JSON.
    ///
    /// Accepts a non-negative integer or a string of decimal digits.
    ///
    /// # Errors
    ///
    /// Returns a validation error for anything non-numeric, and
    /// [`HmiError::UnknownIndex`] for a miss.
    pub fn resolve_json(&self, raw: &serde_json::Value) -> HmiResult<&IoMapEntry> {
        self.resolve(parse_index(raw)?)
    }

    /// All entries in index order.
    pub fn entries(&self) -> impl Iterator<Item = &IoMapEntry> {
        self.entries.values()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a JSON index value.
///
/// # Errors
///
/// Returns a validation error for anything but a `u32` or a digit string.
pub fn parse_index(raw: &serde_json::Value) -> HmiResult<u32> {
    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse::<u32>().ok()
        }
        _ => None,
    };
    parsed.ok_or_else(|| HmiError::Validation(format!("invalid I/O index: {raw}")))
}

/// Built-in table for the end-forming cell.
#[must_use]
pub fn default_entries() -> Vec<IoMapEntry> {
    use Direction::{Input, Output};
    vec![
        IoMapEntry::new(0, "GVL_IO.bEStopOk", Input, "E-stop circuit healthy"),
        IoMapEntry::new(1, "GVL_IO.bDoorClosed", Input, "Guard door closed"),
        IoMapEntry::new(2, "GVL_IO.bAirPressureOk", Input, "Air pressure OK"),
        IoMapEntry::new(3, "GVL_IO.bLeftClampClosed", Input, "Left clamp closed"),
        IoMapEntry::new(4, "GVL_IO.bRightClampClosed", Input, "Right clamp closed"),
        IoMapEntry::new(5, "GVL_IO.bLeftTubePresent", Input, "Left tube present"),
        IoMapEntry::new(6, "GVL_IO.bRightTubePresent", Input, "Right tube present"),
        IoMapEntry::new(7, "GVL_IO.bCycleStartPb", Input, "Cycle start pushbutton"),
        IoMapEntry::new(16, "GVL_IO.bLeftClampValve", Output, "Left clamp valve"),
        IoMapEntry::new(17, "GVL_IO.bRightClampValve", Output, "Right clamp valve"),
        IoMapEntry::new(18, "GVL_IO.bCoolantPump", Output, "Coolant pump"),
        IoMapEntry::new(19, "GVL_IO.bStackLightGreen", Output, "Stack light green"),
        IoMapEntry::new(20, "GVL_IO.bStackLightAmber", Output, "Stack light amber"),
        IoMapEntry::new(21, "GVL_IO.bStackLightRed", Output, "Stack light red"),
        IoMapEntry::new(22, "GVL_IO.bPartEject", Output, "Part eject"),
    ]
}
