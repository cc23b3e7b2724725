//! Alarm and machine-status bitfield tables.
//!
//! Both fields are 32-bit unsigned words. Alarm decoding reports unmapped
//! set bits with a generic entry; status decoding drops them.

use serde::Serialize;

/// Display severity (maps to the indicator colour on the panel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational (green/blue).
    Info,
    /// Attention required (amber).
    Warning,
    /// Machine stopped (red).
    Fault,
}

/// Static definition of one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitDef {
    /// Bit position, 0..=31.
    pub bit: u8,
    /// Label.
    pub label: &'static str,
    /// Severity.
    pub severity: Severity,
}

const fn def(bit: u8, label: &'static str, severity: Severity) -> BitDef {
    BitDef {
        bit,
        label,
        severity,
    }
}

/// A decoded, active bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitEntry {
    /// Bit position.
    pub bit: u8,
    /// Label.
    pub label: String,
    /// Severity.
    pub severity: Severity,
}

/// Alarm word layout.
pub const ALARM_BITS: &[BitDef] = &[
    def(0, "Emergency stop pressed", Severity::Fault),
    def(1, "Guard door open", Severity::Fault),
    def(2, "Low air pressure", Severity::Warning),
    def(3, "Left axis 1 drive fault", Severity::Fault),
    def(4, "Left axis 2 drive fault", Severity::Fault),
    def(5, "Right axis 1 drive fault", Severity::Fault),
    def(6, "Right axis 2 drive fault", Severity::Fault),
    def(7, "Left axis following error", Severity::Fault),
    def(8, "Right axis following error", Severity::Fault),
    def(9, "Left clamp not closed", Severity::Warning),
    def(10, "Right clamp not closed", Severity::Warning),
    def(11, "Left tube not detected", Severity::Warning),
    def(12, "Right tube not detected", Severity::Warning),
    def(13, "Axes not homed", Severity::Warning),
    def(14, "Software limit reached", Severity::Fault),
    def(15, "Hydraulic oil temperature high", Severity::Warning),
    def(16, "Coolant level low", Severity::Warning),
    def(17, "Step timeout", Severity::Fault),
];

/// Machine-status word layout.
pub const STATUS_BITS: &[BitDef] = &[
    def(0, "Control power on", Severity::Info),
    def(1, "Machine ready", Severity::Info),
    def(2, "Cycle running", Severity::Info),
    def(3, "Cycle complete", Severity::Info),
    def(4, "Left head homed", Severity::Info),
    def(5, "Right head homed", Severity::Info),
    def(6, "Left program loaded", Severity::Info),
    def(7, "Right program loaded", Severity::Info),
    def(8, "Manual mode", Severity::Warning),
    def(9, "Auto mode", Severity::Info),
    def(10, "Homing in progress", Severity::Warning),
    def(11, "Jog active", Severity::Warning),
];

fn lookup(table: &[BitDef], bit: u8) -> Option<&BitDef> {
    table.iter().find(|d| d.bit == bit)
}

fn set_bits(bits: u32) -> impl Iterator<Item = u8> {
    (0u8..32).filter(move |i| bits & (1u32 << i) != 0)
}

/// Decode an alarm word; unmapped set bits yield `"bit N active"`.
#[must_use]
pub fn decode_alarms(bits: u32, table: &[BitDef]) -> Vec<BitEntry> {
    set_bits(bits)
        .map(|bit| match lookup(table, bit) {
            Some(d) => BitEntry {
                bit,
                label: d.label.to_string(),
                severity: d.severity,
            },
            None => BitEntry {
                bit,
                label: format!("bit {bit} active"),
                severity: Severity::Warning,
            },
        })
        .collect()
}

/// Decode a status word; unmapped set bits are ignored.
#[must_use]
pub fn decode_status(bits: u32, table: &[BitDef]) -> Vec<BitEntry> {
    set_bits(bits)
        .filter_map(|bit| {
            lookup(table, bit).map(|d| BitEntry {
                bit,
                label: d.label.to_string(),
                severity: d.severity,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[BitDef] = &[def(0, "A", Severity::Fault), def(5, "B", Severity::Info)];

    #[test]
    fn test_alarm_decode_with_fallback() {
        let entries = decode_alarms(0b101, TABLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label, "A");
        assert_eq!(entries[1].bit, 2);
        assert_eq!(entries[1].label, "bit 2 active");
    }

    #[test]
    fn test_status_decode_drops_unmapped() {
        let entries = decode_status(0b101, TABLE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "A");
    }

    #[test]
    fn test_high_bit_decodes() {
        let entries = decode_alarms(1 << 31, TABLE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].bit, 31);
    }

    #[test]
    fn test_zero_word_is_empty() {
        assert!(decode_alarms(0, ALARM_BITS).is_empty());
        assert!(decode_status(0, STATUS_BITS).is_empty());
    }

    #[test]
    fn test_tables_have_unique_bits() {
        for table in [ALARM_BITS, STATUS_BITS] {
            for (i, a) in table.iter().enumerate() {
                assert!(a.bit < 32);
                assert!(table[i + 1..].iter().all(|b| b.bit != a.bit));
            }
        }
    }
}
