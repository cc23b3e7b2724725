//! Live state poller.
//!
//! Each tick reads a fixed set of independent groups. A failed group falls
//! back to its idle value (zero, "Idle", false, no bits) and never stops the
//! others.

use crate::gateway::Gateway;
use crate::live::{LiveState, SideState, StateUpdater};
use endform_common::{
    coerce_numeric, decode_alarms, decode_status, Side, TagValue, ALARM_BITS, STATUS_BITS,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Fixed-interval reader of machine state.
pub struct Poller {
    gateway: Arc<Gateway>,
    updater: StateUpdater,
    interval: Duration,
    tick: u64,
}

impl Poller {
    /// Create a poller.
    pub fn new(gateway: Arc<Gateway>, updater: StateUpdater, interval: Duration) -> Self {
        Self {
            gateway,
            updater,
            interval,
            tick: 0,
        }
    }

    /// Run until `shutdown` changes to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = self.interval.as_millis(), "Live state poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let live = self.poll_once().await;
                    self.updater.publish_live(live);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(ticks = self.tick, "Live state poller stopped");
    }

    /// Perform one tick's reads.
    pub async fn poll_once(&mut self) -> LiveState {
        self.tick += 1;
        let gateway = &self.gateway;
        let tags = gateway.tags();

        let connected = gateway.is_connected();
        let mut live = LiveState {
            connected,
            tick: self.tick,
            timestamp_ms: now_ms(),
            ..LiveState::default()
        };
        if !connected {
            trace!(tick = self.tick, "Poll skipped, PLC not connected");
            return live;
        }

        live.axes = gateway.read_axis_positions().await;
        live.production_count = read_integer(gateway, &tags.production_count).await;
        live.left = read_side(gateway, Side::Left).await;
        live.right = read_side(gateway, Side::Right).await;

        live.alarm_word = read_word(gateway, &tags.alarm_word).await;
        live.alarms = decode_alarms(live.alarm_word, ALARM_BITS);
        live.status_word = read_word(gateway, &tags.status_word).await;
        live.status = decode_status(live.status_word, STATUS_BITS);

        live.connected = gateway.is_connected();
        debug!(
            tick = self.tick,
            alarms = live.alarms.len(),
            parts = live.production_count,
            "Poll tick"
        );
        live
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[allow(clippy::cast_possible_truncation)]
async fn read_integer(gateway: &Gateway, tag: &str) -> i64 {
    gateway.read_numeric(tag).await as i64
}

async fn read_word(gateway: &Gateway, tag: &str) -> u32 {
    low_word(gateway.read_numeric(tag).await)
}

/// DINT words with bit 31 set arrive negative; keep the low 32 bits.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn low_word(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    (value.trunc() as i64) as u32
}

async fn read_side(gateway: &Gateway, side: Side) -> SideState {
    let tags = gateway.tags().side(side);
    let idle = SideState::default();

    let step_number = read_integer(gateway, &tags.step_number).await;
    let step_description = match gateway.read_tag(&tags.step_description).await {
        Ok(TagValue::Text(text)) if !text.trim().is_empty() => text,
        _ => idle.step_description,
    };
    let run_mode = read_flag(gateway, &tags.run_mode).await;
    let jog_mode = read_flag(gateway, &tags.jog_mode).await;

    SideState {
        step_number,
        step_description,
        run_mode,
        jog_mode,
    }
}

async fn read_flag(gateway: &Gateway, tag: &str) -> bool {
    match gateway.read_tag(tag).await {
        Ok(TagValue::Bool(v)) => v,
        Ok(other) => coerce_numeric(&other).abs() > f64::EPSILON,
        Err(_) => false,
    }
}
