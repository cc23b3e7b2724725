//! Program-to-PLC translation.
//!
//! A program is written into the side's step array, one element per step
//! number, as `{prefix}[{n}].{field}`. Steps go in ascending order. A
//! failed write ends that step only: the error is recorded and the next
//! step is attempted. Nothing already written is rolled back.

use crate::gateway::Gateway;
use endform_common::{HmiResult, PatternRow, Program, Step, TagValue, STEP_COUNT};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Step enable.
pub const FIELD_ENABLE: &str = "bEnable";

/// Pattern flag fields, in [`PatternRow::flags`] order.
pub const PATTERN_FIELDS: [&str; 5] = ["bRedExt", "bRedRet", "bExpExt", "bExpRet", "bRepeat"];

/// Axis 1 command position.
pub const FIELD_AXIS1: &str = "rAxis1Pos";
/// Axis 2 command position.
pub const FIELD_AXIS2: &str = "rAxis2Pos";
/// Dwell (ms).
pub const FIELD_DWELL: &str = "tDwell";
/// Repeat target step.
pub const FIELD_REPEAT_TARGET: &str = "nRepeatTarget";
/// Repeat count.
pub const FIELD_REPEAT_COUNT: &str = "nRepeatCount";

/// Boolean fields of a step element.
pub const STEP_BOOL_FIELDS: [&str; 6] = [
    FIELD_ENABLE,
    PATTERN_FIELDS[0],
    PATTERN_FIELDS[1],
    PATTERN_FIELDS[2],
    PATTERN_FIELDS[3],
    PATTERN_FIELDS[4],
];
/// Real fields of a step element.
pub const STEP_REAL_FIELDS: [&str; 2] = [FIELD_AXIS1, FIELD_AXIS2];
/// Integer fields of a step element.
pub const STEP_INT_FIELDS: [&str; 3] = [FIELD_DWELL, FIELD_REPEAT_TARGET, FIELD_REPEAT_COUNT];

/// Tag name of one field of one step.
#[must_use]
pub fn step_tag(prefix: &str, step: u8, field: &str) -> String {
    format!("{prefix}[{step}].{field}")
}

/// Aggregated result of a program download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// True when every write succeeded.
    pub success: bool,
    /// Per-step failures, `"Step N: message"`, in step order.
    pub errors: Vec<String>,
    /// All failures joined, when there are any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferReport {
    fn from_errors(errors: Vec<String>) -> Self {
        let error = (!errors.is_empty()).then(|| errors.join("; "));
        Self {
            success: errors.is_empty(),
            errors,
            error,
        }
    }
}

impl Gateway {
    /// Write `program` into its side's step array.
    ///
    /// Concurrent downloads are serialised. Never fails as a whole: per-step
    /// failures are collected into the report.
    pub async fn download_program(&self, program: &Program) -> TransferReport {
        let _guard = self.transfer_lock.lock().await;
        let started = Instant::now();
        let prefix = self.tags().side(program.side).program_prefix.clone();
        info!(name = %program.name, side = %program.side, %prefix, "Downloading program");

        let mut errors = Vec::new();
        for n in 1..=STEP_COUNT {
            match program.step(n) {
                None => {
                    if let Err(e) = self.write_empty_step(&prefix, n).await {
                        warn!(step = n, error = %e, "Empty step write failed");
                        errors.push(format!("Step {n} (empty): {e}"));
                    }
                }
                Some(step) => {
                    if let Err(e) = self.write_step(&prefix, n, step).await {
                        warn!(step = n, error = %e, "Step write failed");
                        errors.push(format!("Step {n}: {e}"));
                    }
                }
            }
        }

        let report = TransferReport::from_errors(errors);
        self.metrics()
            .record_download(report.success, started.elapsed().as_secs_f64());
        info!(
            name = %program.name,
            side = %program.side,
            success = report.success,
            failed_steps = report.errors.len(),
            "Program download finished"
        );
        report
    }

    async fn write_empty_step(&self, prefix: &str, n: u8) -> HmiResult<()> {
        for field in PATTERN_FIELDS {
            self.write_tag(&step_tag(prefix, n, field), TagValue::Bool(false), false)
                .await?;
        }
        Ok(())
    }

    async fn write_step(&self, prefix: &str, n: u8, step: &Step) -> HmiResult<()> {
        let row = PatternRow::for_code(step.pattern);
        debug!(step = n, pattern = ?step.pattern, ?row, "Writing step");

        self.write_tag(
            &step_tag(prefix, n, FIELD_ENABLE),
            TagValue::Bool(step.enabled),
            false,
        )
        .await?;
        for (field, flag) in PATTERN_FIELDS.into_iter().zip(row.flags()) {
            self.write_tag(&step_tag(prefix, n, field), TagValue::Bool(flag), false)
                .await?;
        }

        if let Some(positions) = &step.positions {
            if let Some(axis1) = positions.axis1 {
                self.write_tag(&step_tag(prefix, n, FIELD_AXIS1), TagValue::Real(axis1), false)
                    .await?;
            }
            if let Some(axis2) = positions.axis2 {
                self.write_tag(&step_tag(prefix, n, FIELD_AXIS2), TagValue::Real(axis2), false)
                    .await?;
            }
        }
        if let Some(dwell) = step.dwell {
            self.write_tag(&step_tag(prefix, n, FIELD_DWELL), TagValue::from(dwell), false)
                .await?;
        }
        if let Some(target) = step.repeat_target {
            self.write_tag(
                &step_tag(prefix, n, FIELD_REPEAT_TARGET),
                TagValue::Int(target),
                false,
            )
            .await?;
        }
        if let Some(count) = step.repeat_count {
            self.write_tag(
                &step_tag(prefix, n, FIELD_REPEAT_COUNT),
                TagValue::Int(count),
                false,
            )
            .await?;
        }
        Ok(())
    }
}
