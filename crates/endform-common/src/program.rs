//! Ten-step tool-motion program model and validation.
//!
//! A [`Program`] is plain data. Steps are keyed by step number (1..=10); a
//! missing step is valid and means "inactive" when translated to PLC writes.
//! [`Program::validate`] is the stricter gate used before persisting or
//! exporting, and requires all ten steps to carry positions.

use crate::error::{HmiError, HmiResult};
use crate::pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Number of steps in a program.
pub const STEP_COUNT: u8 = 10;

/// Minimum program name length (characters).
pub const NAME_MIN_LEN: usize = 3;

/// Maximum program name length (characters).
pub const NAME_MAX_LEN: usize = 32;

/// Default program speed (%).
pub const DEFAULT_SPEED: f64 = 100.0;

/// Default program dwell (ms).
pub const DEFAULT_DWELL_MS: u32 = 500;

/// One of the two independent tool heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Left head.
    Left,
    /// Right head.
    Right,
}

impl Side {
    /// Both sides, left first.
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    /// Lowercase name used in tags, filenames, and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = HmiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(HmiError::Validation(format!(
                "side must be 'left' or 'right', got '{other}'"
            ))),
        }
    }
}

/// Axis command positions for a step.
///
/// Axis 1/2 are side-relative; which is ID and which is OD depends on the
/// head. An omitted axis is not written to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Positions {
    /// Axis 1 command position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis1: Option<f64>,
    /// Axis 2 command position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis2: Option<f64>,
}

impl Positions {
    /// Both axes set.
    #[must_use]
    pub fn new(axis1: f64, axis2: f64) -> Self {
        Self {
            axis1: Some(axis1),
            axis2: Some(axis2),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// A single program step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step number (1..=10), equal to the map key.
    pub step_number: u8,
    /// Operator-facing name.
    #[serde(default)]
    pub step_name: String,
    /// Axis command positions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Positions>,
    /// Pattern code (0..=8). Unknown or missing codes translate as all-off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<i32>,
    /// Step enable.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-step dwell override (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell: Option<u32>,
    /// Repeat target step, meaningful with pattern 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_target: Option<i64>,
    /// Repeat count, meaningful with pattern 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_count: Option<i64>,
    /// Retract readings captured during teach; kept in recipes, not transferred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retract_positions: Option<Positions>,
}

impl Step {
    /// Create an enabled step with positions and a pattern code.
    #[must_use]
    pub fn new(step_number: u8, positions: Positions, pattern: i32) -> Self {
        Self {
            step_number,
            step_name: format!("Step {step_number}"),
            positions: Some(positions),
            pattern: Some(pattern),
            enabled: true,
            dwell: None,
            repeat_target: None,
            repeat_count: None,
            retract_positions: None,
        }
    }

    /// Set the dwell override.
    #[must_use]
    pub fn with_dwell(mut self, dwell_ms: u32) -> Self {
        self.dwell = Some(dwell_ms);
        self
    }

    /// Set repeat target and count.
    #[must_use]
    pub fn with_repeat(mut self, target: i64, count: i64) -> Self {
        self.repeat_target = Some(target);
        self.repeat_count = Some(count);
        self
    }
}

fn default_speed() -> f64 {
    DEFAULT_SPEED
}

fn default_dwell() -> u32 {
    DEFAULT_DWELL_MS
}

/// A complete tool-motion program for one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Program name (3..=32 characters).
    pub name: String,
    /// Head the program targets.
    pub side: Side,
    /// Steps keyed by step number.
    #[serde(default)]
    pub steps: BTreeMap<u8, Step>,
    /// Speed (%).
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Default dwell (ms).
    #[serde(default = "default_dwell")]
    pub dwell: u32,
}

/// Outcome of program validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no errors were found.
    pub valid: bool,
    /// Human-readable problems, in discovery order.
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Check the name length rule shared by validation and import.
///
/// # Errors
///
/// Returns a message when the name is empty, too short, or too long.
pub fn check_name(name: &str) -> Result<(), String> {
    let len = name.trim().chars().count();
    if len == 0 {
        Err("name is required".to_string())
    } else if len < NAME_MIN_LEN {
        Err(format!("name must be at least {NAME_MIN_LEN} characters"))
    } else if len > NAME_MAX_LEN {
        Err(format!("name must be at most {NAME_MAX_LEN} characters"))
    } else {
        Ok(())
    }
}

impl Program {
    /// Create an empty program with default speed and dwell.
    #[must_use]
    pub fn new(name: impl Into<String>, side: Side) -> Self {
        Self {
            name: name.into(),
            side,
            steps: BTreeMap::new(),
            speed: DEFAULT_SPEED,
            dwell: DEFAULT_DWELL_MS,
        }
    }

    /// Insert a step, keyed by its own step number.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.insert(step.step_number, step);
        self
    }

    /// Look up a step by number.
    #[must_use]
    pub fn step(&self, number: u8) -> Option<&Step> {
        self.steps.get(&number)
    }

    /// Validate for persistence or export.
    ///
    /// Stricter than translation: every step 1..=10 must be present with a
    /// positions object.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();

        if let Err(msg) = check_name(&self.name) {
            errors.push(msg);
        }

        for (&key, step) in &self.steps {
            if !(1..=STEP_COUNT).contains(&key) {
                errors.push(format!("step number {key} is outside 1..{STEP_COUNT}"));
            } else if step.step_number != key {
                errors.push(format!(
                    "step {key} carries mismatched step number {}",
                    step.step_number
                ));
            }
            if let Some(code) = step.pattern {
                if !pattern::is_defined(code) {
                    errors.push(format!("step {key} has unknown pattern code {code}"));
                }
            }
        }

        for number in 1..=STEP_COUNT {
            match self.steps.get(&number) {
                None => errors.push(format!("step {number} is missing")),
                Some(step) if step.positions.is_none() => {
                    errors.push(format!("step {number} has no positions"));
                }
                Some(_) => {}
            }
        }

        ValidationReport::from_errors(errors)
    }

    /// Serialize to the persisted JSON form.
    ///
    /// # Errors
    ///
    /// Returns a storage error if serialization fails.
    pub fn to_json(&self) -> HmiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| HmiError::Storage(e.to_string()))
    }

    /// Import from the persisted JSON form.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed documents, bad names, or
    /// step keys outside 1..=10.
    pub fn from_json(json: &str) -> HmiResult<Self> {
        let program: Program = serde_json::from_str(json)
            .map_err(|e| HmiError::Validation(format!("malformed program: {e}")))?;
        check_name(&program.name).map_err(HmiError::Validation)?;
        if let Some(bad) = program
            .steps
            .keys()
            .find(|k| !(1..=STEP_COUNT).contains(*k))
        {
            return Err(HmiError::Validation(format!(
                "step number {bad} is outside 1..{STEP_COUNT}"
            )));
        }
        Ok(program)
    }
}

/// Validate a raw JSON program document.
///
/// Checks the name and side fields before typed decoding so that a bad side
/// is reported as a validation error rather than a decode failure.
#[must_use]
pub fn validate_json(raw: &serde_json::Value) -> ValidationReport {
    let mut errors = Vec::new();

    match raw.get("name").and_then(serde_json::Value::as_str) {
        Some(name) => {
            if let Err(msg) = check_name(name) {
                errors.push(msg);
            }
        }
        None => errors.push("name is required".to_string()),
    }

    match raw.get("side").and_then(serde_json::Value::as_str) {
        Some(side) => {
            if let Err(e) = side.parse::<Side>() {
                errors.push(e.to_string());
            }
        }
        None => errors.push("side is required".to_string()),
    }

    if !errors.is_empty() {
        return ValidationReport::from_errors(errors);
    }

    match serde_json::from_value::<Program>(raw.clone()) {
        Ok(program) => program.validate(),
        Err(e) => ValidationReport::from_errors(vec![format!("malformed program: {e}")]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_program() -> Program {
        (1..=STEP_COUNT).fold(Program::new("Flare 3/8", Side::Left), |p, n| {
            p.with_step(Step::new(n, Positions::new(f64::from(n), 2.5), 0))
        })
    }

    #[test]
    fn test_full_program_is_valid() {
        let report = full_program().validate();
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_name_rules() {
        let mut p = full_program();
        p.name = String::new();
        assert_eq!(p.validate().errors, vec!["name is required"]);

        p.name = "ab".into();
        assert!(!p.validate().valid);

        p.name = "x".repeat(33);
        assert!(!p.validate().valid);

        p.name = "x".repeat(32);
        assert!(p.validate().valid);
    }

    #[test]
    fn test_missing_step_and_positions() {
        let mut p = full_program();
        p.steps.remove(&4);
        if let Some(step) = p.steps.get_mut(&7) {
            step.positions = None;
        }
        let report = p.validate();
        assert!(!report.valid);
        assert!(report.errors.contains(&"step 4 is missing".to_string()));
        assert!(report.errors.contains(&"step 7 has no positions".to_string()));
    }

    #[test]
    fn test_out_of_range_step_key() {
        let mut p = full_program();
        p.steps.insert(11, Step::new(11, Positions::new(0.0, 0.0), 8));
        let report = p.validate();
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("step number 11")));
    }

    #[test]
    fn test_defaults_when_fields_omitted() {
        let p: Program = serde_json::from_value(json!({
            "name": "Bead",
            "side": "right",
            "steps": { "1": { "stepNumber": 1 } }
        }))
        .unwrap();
        assert_eq!(p.speed, 100.0);
        assert_eq!(p.dwell, 500);
        let step = p.step(1).unwrap();
        assert!(step.enabled);
        assert!(step.pattern.is_none());
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut p = full_program();
        p.speed = 75.0;
        p.dwell = 250;
        if let Some(step) = p.steps.get_mut(&5) {
            step.pattern = Some(5);
            step.repeat_target = Some(2);
            step.repeat_count = Some(3);
            step.dwell = Some(1200);
        }
        p.steps.remove(&9);

        let json = p.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_import_rejects_short_name() {
        let err = Program::from_json(r#"{"name":"ab","side":"left"}"#).unwrap_err();
        assert!(matches!(err, HmiError::Validation(_)));
    }

    #[test]
    fn test_validate_json_reports_bad_side() {
        let report = validate_json(&json!({"name": "Flare", "side": "middle"}));
        assert!(!report.valid);
        assert!(report.errors[0].contains("side must be"));
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("left".parse::<Side>().unwrap(), Side::Left);
        assert_eq!(Side::Right.to_string(), "right");
        assert!("LEFT".parse::<Side>().is_err());
    }
}
