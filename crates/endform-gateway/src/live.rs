//! Live machine state shared between the poller, REST API, and WebSocket
//! clients.

use crate::gateway::AxisPositions;
use crate::metrics::GatewayMetrics;
use crate::translator::TransferReport;
use endform_common::{BitEntry, Side};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Per-head cycle feedback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SideState {
    /// Active step number (0 when idle or unreadable).
    pub step_number: i64,
    /// Active step description.
    pub step_description: String,
    /// Run-mode feedback.
    pub run_mode: bool,
    /// Jog-mode feedback.
    pub jog_mode: bool,
}

impl Default for SideState {
    fn default() -> Self {
        Self {
            step_number: 0,
            step_description: String::from("Idle"),
            run_mode: false,
            jog_mode: false,
        }
    }
}

/// One poller snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveState {
    /// Gateway connection state at the time of the tick.
    pub connected: bool,
    /// Actual axis positions.
    pub axes: AxisPositions,
    /// Parts produced.
    pub production_count: i64,
    /// Left head.
    pub left: SideState,
    /// Right head.
    pub right: SideState,
    /// Raw alarm word.
    pub alarm_word: u32,
    /// Decoded active alarms.
    pub alarms: Vec<BitEntry>,
    /// Raw status word.
    pub status_word: u32,
    /// Decoded active status bits.
    pub status: Vec<BitEntry>,
    /// Poller tick counter.
    pub tick: u64,
    /// Wall-clock time of the tick (ms since epoch).
    pub timestamp_ms: u64,
}

impl LiveState {
    /// Feedback for one head.
    #[must_use]
    pub fn side(&self, side: Side) -> &SideState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Message pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StateUpdate {
    /// Full snapshot, sent first on connect.
    #[serde(rename = "full")]
    Full(LiveState),
    /// A new poller tick.
    #[serde(rename = "live")]
    Live(LiveState),
    /// Session state change.
    #[serde(rename = "connection")]
    Connection {
        /// New state.
        connected: bool,
    },
    /// A program download finished.
    #[serde(rename = "download")]
    Download {
        /// Target head.
        side: Side,
        /// Program name.
        name: String,
        /// Download outcome.
        report: TransferReport,
    },
}

/// Shared state container.
#[derive(Debug, Default)]
pub struct SharedState {
    live: RwLock<LiveState>,
}

impl SharedState {
    /// Latest snapshot.
    pub fn snapshot(&self) -> LiveState {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle for publishing state from the poller and handlers.
#[derive(Clone)]
pub struct StateUpdater {
    pub(crate) state: Arc<SharedState>,
    pub(crate) broadcast_tx: broadcast::Sender<StateUpdate>,
    pub(crate) metrics: Arc<GatewayMetrics>,
}

impl StateUpdater {
    /// Create an updater over existing state and channel.
    pub fn new(
        state: Arc<SharedState>,
        broadcast_tx: broadcast::Sender<StateUpdate>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            state,
            broadcast_tx,
            metrics,
        }
    }

    /// Store a tick and push it to subscribers.
    ///
    /// A change in `connected` is also announced on its own.
    pub fn publish_live(&self, live: LiveState) {
        let was_connected = {
            let mut guard = self.state.live.write().unwrap_or_else(PoisonError::into_inner);
            let previous = guard.connected;
            *guard = live.clone();
            previous
        };
        if was_connected != live.connected {
            let _ = self.broadcast_tx.send(StateUpdate::Connection {
                connected: live.connected,
            });
        }
        let _ = self.broadcast_tx.send(StateUpdate::Live(live));
        self.metrics.poll_ticks_total.inc();
    }

    /// Announce a finished download.
    pub fn download_finished(&self, side: Side, name: &str, report: &TransferReport) {
        let _ = self.broadcast_tx.send(StateUpdate::Download {
            side,
            name: name.to_string(),
            report: report.clone(),
        });
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> LiveState {
        self.state.snapshot()
    }

    /// Subscribe to updates.
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.broadcast_tx.subscribe()
    }
}
