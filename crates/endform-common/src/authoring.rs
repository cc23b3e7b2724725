//! Step-by-step program authoring (manual entry or teach-in).
//!
//! Stages advance strictly forward: STEP1 (start position) → STEP2 (work
//! position) → STEP3 (expand/retract, four readings) → STEP4..STEP10
//! (position + pattern) → COMPLETE. Each stage must have all of its readings
//! before `next` succeeds. `previous` keeps recorded data. The flow never
//! talks to the controller; downloading the finished program is a separate
//! action.

use crate::error::{HmiError, HmiResult};
use crate::pattern::{self, ALL_OFF_CODE};
use crate::program::{check_name, Positions, Program, Side, Step, STEP_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Pattern assigned to the expand/retract stage (ID and OD extend).
const EXPAND_STAGE_PATTERN: i32 = 6;

/// A named position reading within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Axis 1 position.
    Axis1,
    /// Axis 2 position.
    Axis2,
    /// Axis 1 at expand.
    Axis1Expand,
    /// Axis 2 at expand.
    Axis2Expand,
    /// Axis 1 at retract.
    Axis1Retract,
    /// Axis 2 at retract.
    Axis2Retract,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Axis1 => "axis1",
            Self::Axis2 => "axis2",
            Self::Axis1Expand => "axis1_expand",
            Self::Axis2Expand => "axis2_expand",
            Self::Axis1Retract => "axis1_retract",
            Self::Axis2Retract => "axis2_retract",
        };
        f.write_str(s)
    }
}

const POSITION_SLOTS: &[Slot] = &[Slot::Axis1, Slot::Axis2];
const EXPAND_RETRACT_SLOTS: &[Slot] = &[
    Slot::Axis1Expand,
    Slot::Axis2Expand,
    Slot::Axis1Retract,
    Slot::Axis2Retract,
];

/// Where the flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Recording step N (1..=10).
    Step(u8),
    /// All steps recorded.
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(n) => write!(f, "STEP{n}"),
            Self::Complete => write!(f, "COMPLETE"),
        }
    }
}

impl Stage {
    /// Readings this stage requires.
    #[must_use]
    pub fn required_slots(&self) -> &'static [Slot] {
        match self {
            Self::Step(3) => EXPAND_RETRACT_SLOTS,
            Self::Step(_) => POSITION_SLOTS,
            Self::Complete => &[],
        }
    }

    /// Whether the operator chooses a pattern at this stage.
    #[must_use]
    pub fn takes_pattern(&self) -> bool {
        matches!(self, Self::Step(n) if *n >= 4)
    }
}

/// Data accumulated for one stage.
#[derive(Debug, Clone, Default, PartialEq)]
struct StageData {
    readings: BTreeMap<Slot, f64>,
    pattern: Option<i32>,
    dwell: Option<u32>,
    repeat: Option<(i64, i64)>,
}

/// In-progress program authoring session.
#[derive(Debug, Clone)]
pub struct AuthoringFlow {
    name: String,
    side: Side,
    stage: Stage,
    data: BTreeMap<u8, StageData>,
}

impl AuthoringFlow {
    /// Start a new session at STEP1.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the name is empty, too short, or too
    /// long.
    pub fn new(name: impl Into<String>, side: Side) -> HmiResult<Self> {
        let name = name.into();
        check_name(&name).map_err(HmiError::Validation)?;
        Ok(Self {
            name,
            side,
            stage: Stage::Step(1),
            data: BTreeMap::new(),
        })
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Target side.
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    fn current_step(&self) -> HmiResult<u8> {
        match self.stage {
            Stage::Step(n) => Ok(n),
            Stage::Complete => Err(HmiError::Validation(
                "program is complete; go back to edit".to_string(),
            )),
        }
    }

    fn current_data(&mut self) -> HmiResult<&mut StageData> {
        let n = self.current_step()?;
        Ok(self.data.entry(n).or_default())
    }

    /// Record one reading for the current stage.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the slot does not belong to the current
    /// stage, the value is not finite, or the flow is complete.
    pub fn record(&mut self, slot: Slot, value: f64) -> HmiResult<()> {
        let stage = self.stage;
        if !stage.required_slots().contains(&slot) {
            return Err(HmiError::Validation(format!(
                "{slot} is not recorded at {stage}"
            )));
        }
        if !value.is_finite() {
            return Err(HmiError::Validation(format!("{slot} must be a finite number")));
        }
        self.current_data()?.readings.insert(slot, value);
        Ok(())
    }

    /// Record a live axis pair into the first incomplete pair of this stage.
    ///
    /// At STEP3 the first capture fills the expand pair and the second the
    /// retract pair; later captures overwrite the retract pair.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the flow is complete.
    pub fn capture(&mut self, axis1: f64, axis2: f64) -> HmiResult<()> {
        let stage = self.stage;
        let data = self.current_data()?;
        let pairs: Vec<[Slot; 2]> = stage
            .required_slots()
            .chunks(2)
            .map(|c| [c[0], c[1]])
            .collect();
        let target = pairs
            .iter()
            .find(|pair| pair.iter().any(|s| !data.readings.contains_key(s)))
            .or_else(|| pairs.last())
            .copied();
        if let Some([a, b]) = target {
            data.readings.insert(a, axis1);
            data.readings.insert(b, axis2);
        }
        Ok(())
    }

    /// Choose the pattern code for the current stage (STEP4..STEP10).
    ///
    /// # Errors
    ///
    /// Returns a validation error for an undefined code or a stage with a
    /// fixed pattern.
    pub fn set_pattern(&mut self, code: i32) -> HmiResult<()> {
        if !self.stage.takes_pattern() {
            return Err(HmiError::Validation(format!(
                "pattern is fixed at {}",
                self.stage
            )));
        }
        if !pattern::is_defined(code) {
            return Err(HmiError::Validation(format!("unknown pattern code {code}")));
        }
        self.current_data()?.pattern = Some(code);
        Ok(())
    }

    /// Override dwell for the current stage.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the flow is complete.
    pub fn set_dwell(&mut self, dwell_ms: u32) -> HmiResult<()> {
        self.current_data()?.dwell = Some(dwell_ms);
        Ok(())
    }

    /// Set repeat target and count for the current stage.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the flow is complete or the target is
    /// not a step number.
    pub fn set_repeat(&mut self, target: i64, count: i64) -> HmiResult<()> {
        if !(1..=i64::from(STEP_COUNT)).contains(&target) || count < 0 {
            return Err(HmiError::Validation(format!(
                "repeat target must be 1..{STEP_COUNT} and count non-negative"
            )));
        }
        self.current_data()?.repeat = Some((target, count));
        Ok(())
    }

    /// Readings still required before `next` can succeed.
    #[must_use]
    pub fn missing_slots(&self) -> Vec<Slot> {
        let Stage::Step(n) = self.stage else {
            return Vec::new();
        };
        let recorded = self.data.get(&n);
        self.stage
            .required_slots()
            .iter()
            .filter(|s| recorded.map_or(true, |d| !d.readings.contains_key(s)))
            .copied()
            .collect()
    }

    /// Advance one stage. Leaving STEP10 completes the flow and returns the
    /// assembled program.
    ///
    /// # Errors
    ///
    /// Returns a validation error listing missing readings, or if the flow
    /// is already complete.
    pub fn next(&mut self) -> HmiResult<Option<Program>> {
        let n = self.current_step()?;
        let missing = self.missing_slots();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
            return Err(HmiError::Validation(format!(
                "STEP{n} is missing {}",
                names.join(", ")
            )));
        }

        if n == STEP_COUNT {
            self.stage = Stage::Complete;
            debug!(name = %self.name, side = %self.side, "Authoring complete");
            Ok(Some(self.program()))
        } else {
            self.stage = Stage::Step(n + 1);
            debug!(stage = %self.stage, "Authoring advanced");
            Ok(None)
        }
    }

    /// Go back one stage, keeping everything recorded.
    ///
    /// # Errors
    ///
    /// Returns a validation error at STEP1.
    pub fn previous(&mut self) -> HmiResult<()> {
        self.stage = match self.stage {
            Stage::Step(1) => {
                return Err(HmiError::Validation("already at STEP1".to_string()));
            }
            Stage::Step(n) => Stage::Step(n - 1),
            Stage::Complete => Stage::Step(STEP_COUNT),
        };
        Ok(())
    }

    /// Discard the session and everything recorded.
    pub fn cancel(self) {
        debug!(name = %self.name, stage = %self.stage, "Authoring cancelled");
    }

    /// Assemble the program from what has been recorded so far.
    ///
    /// Stages with no data are omitted (inactive when downloaded).
    #[must_use]
    pub fn program(&self) -> Program {
        let mut program = Program::new(self.name.clone(), self.side);
        for (&n, data) in &self.data {
            if data.readings.is_empty() && data.pattern.is_none() {
                continue;
            }
            program.steps.insert(n, assemble_step(n, data));
        }
        program
    }
}

fn assemble_step(n: u8, data: &StageData) -> Step {
    let get = |slot: Slot| data.readings.get(&slot).copied();
    let (name, positions, retract, code) = match n {
        1 => (
            "Start position".to_string(),
            Positions {
                axis1: get(Slot::Axis1),
                axis2: get(Slot::Axis2),
            },
            None,
            ALL_OFF_CODE,
        ),
        2 => (
            "Work position".to_string(),
            Positions {
                axis1: get(Slot::Axis1),
                axis2: get(Slot::Axis2),
            },
            None,
            ALL_OFF_CODE,
        ),
        3 => (
            "Expand / retract".to_string(),
            Positions {
                axis1: get(Slot::Axis1Expand),
                axis2: get(Slot::Axis2Expand),
            },
            Some(Positions {
                axis1: get(Slot::Axis1Retract),
                axis2: get(Slot::Axis2Retract),
            }),
            EXPAND_STAGE_PATTERN,
        ),
        _ => (
            format!("Step {n}"),
            Positions {
                axis1: get(Slot::Axis1),
                axis2: get(Slot::Axis2),
            },
            None,
            data.pattern.unwrap_or(ALL_OFF_CODE),
        ),
    };

    let mut step = Step::new(n, positions, code);
    step.step_name = name;
    step.retract_positions = retract;
    step.dwell = data.dwell;
    if let Some((target, count)) = data.repeat {
        step.repeat_target = Some(target);
        step.repeat_count = Some(count);
    }
    step
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_stage(flow: &mut AuthoringFlow, base: f64) {
        for (i, slot) in flow.stage().required_slots().iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            flow.record(*slot, base + i as f64).unwrap();
        }
    }

    #[test]
    fn test_new_rejects_short_name() {
        assert!(matches!(
            AuthoringFlow::new("ab", Side::Left),
            Err(HmiError::Validation(_))
        ));
    }

    #[test]
    fn test_cannot_advance_without_readings() {
        let mut flow = AuthoringFlow::new("Flare", Side::Left).unwrap();
        flow.record(Slot::Axis1, 10.0).unwrap();
        let err = flow.next().unwrap_err();
        assert!(matches!(err, HmiError::Validation(msg) if msg.contains("axis2")));
        assert_eq!(flow.stage(), Stage::Step(1));
    }

    #[test]
    fn test_stage3_requires_four_readings() {
        let mut flow = AuthoringFlow::new("Flare", Side::Left).unwrap();
        fill_stage(&mut flow, 1.0);
        flow.next().unwrap();
        fill_stage(&mut flow, 2.0);
        flow.next().unwrap();
        assert_eq!(flow.stage(), Stage::Step(3));
        assert_eq!(flow.missing_slots().len(), 4);

        assert!(flow.record(Slot::Axis1, 1.0).is_err());
        flow.capture(5.0, 6.0).unwrap();
        assert_eq!(
            flow.missing_slots(),
            vec![Slot::Axis1Retract, Slot::Axis2Retract]
        );
        flow.capture(1.0, 2.0).unwrap();
        assert!(flow.missing_slots().is_empty());
    }

    #[test]
    fn test_full_walk_produces_complete_program() {
        let mut flow = AuthoringFlow::new("Flare", Side::Right).unwrap();
        let mut finished = None;
        for n in 1..=STEP_COUNT {
            fill_stage(&mut flow, f64::from(n) * 10.0);
            if n == 5 {
                flow.set_pattern(5).unwrap();
                flow.set_repeat(4, 2).unwrap();
            } else if n >= 4 {
                flow.set_pattern(0).unwrap();
            }
            finished = flow.next().unwrap();
        }

        assert_eq!(flow.stage(), Stage::Complete);
        let program = finished.expect("program after STEP10");
        assert_eq!(program.side, Side::Right);
        assert!(program.validate().valid);

        let step3 = program.step(3).unwrap();
        assert_eq!(step3.pattern, Some(6));
        assert_eq!(step3.positions.unwrap().axis1, Some(30.0));
        assert_eq!(step3.retract_positions.unwrap().axis1, Some(32.0));

        let step5 = program.step(5).unwrap();
        assert_eq!(step5.repeat_target, Some(4));
        assert_eq!(step5.repeat_count, Some(2));

        assert!(flow.next().is_err());
    }

    #[test]
    fn test_previous_keeps_data() {
        let mut flow = AuthoringFlow::new("Flare", Side::Left).unwrap();
        fill_stage(&mut flow, 1.0);
        flow.next().unwrap();
        flow.record(Slot::Axis1, 42.0).unwrap();

        flow.previous().unwrap();
        assert_eq!(flow.stage(), Stage::Step(1));
        assert!(flow.missing_slots().is_empty());

        flow.next().unwrap();
        assert_eq!(flow.missing_slots(), vec![Slot::Axis2]);
        assert!(flow.previous().is_ok());
        assert!(flow.previous().is_err());
    }

    #[test]
    fn test_pattern_fixed_on_early_stages() {
        let mut flow = AuthoringFlow::new("Flare", Side::Left).unwrap();
        assert!(flow.set_pattern(0).is_err());
    }

    #[test]
    fn test_unknown_pattern_rejected() {
        let mut flow = AuthoringFlow::new("Flare", Side::Left).unwrap();
        for _ in 1..4 {
            fill_stage(&mut flow, 0.0);
            flow.next().unwrap();
        }
        assert!(flow.set_pattern(9).is_err());
        assert!(flow.set_pattern(7).is_ok());
    }

    #[test]
    fn test_partial_program_omits_untouched_steps() {
        let mut flow = AuthoringFlow::new("Flare", Side::Left).unwrap();
        fill_stage(&mut flow, 1.0);
        let program = flow.program();
        assert_eq!(program.steps.len(), 1);
        assert!(!program.validate().valid);
        flow.cancel();
    }
}
