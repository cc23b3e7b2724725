//! The controller gateway.
//!
//! One [`Gateway`] owns the single session to the controller. Every
//! operation checks the connection state first and fails fast with
//! [`HmiError::NotConnected`]; a link-level failure during a read or write
//! drops the state to DISCONNECTED. There is no background reconnect: the
//! daemon connects once at startup and [`Gateway::reconfigure_target`]
//! reconnects explicitly.

use crate::client::{ClientError, ClientFactory, TagClient};
use crate::metrics::GatewayMetrics;
use endform_common::{
    coerce_bool, coerce_numeric, validate_net_id, ConnectionMachine, ConnectionState,
    GatewayConfig, HmiError, HmiResult, IoMap, IoMapEntry, Side, TagConfig, TagValue,
    TargetConfig,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one diagnostic read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The read succeeded.
    Ok,
    /// The read failed.
    Error,
}

/// Result record for one tag in a diagnostic batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCheck {
    /// Tag that was read.
    pub tag: String,
    /// ok / error.
    pub status: CheckStatus,
    /// Value read, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TagValue>,
    /// Client message, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TagCheck {
    fn from_result(tag: &str, result: HmiResult<TagValue>) -> Self {
        match result {
            Ok(value) => Self {
                tag: tag.to_string(),
                status: CheckStatus::Ok,
                value: Some(value),
                error: None,
            },
            Err(e) => Self {
                tag: tag.to_string(),
                status: CheckStatus::Error,
                value: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Whether the read succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

/// `GET /status` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Current target address.
    pub ams_net_id: String,
    /// Session state.
    pub connected: bool,
    /// Tags whose latest read failed.
    pub disconnected_tags: Vec<String>,
    /// Latest heartbeat value.
    pub heartbeat: Option<TagValue>,
    /// Heartbeat spelling that answered.
    pub heartbeat_tag: Option<String>,
}

/// Axis pair for one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AxisPair {
    /// Axis 1 actual position.
    pub axis1: f64,
    /// Axis 2 actual position.
    pub axis2: f64,
}

/// Actual positions of all four axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AxisPositions {
    /// Left head.
    pub left: AxisPair,
    /// Right head.
    pub right: AxisPair,
}

impl AxisPositions {
    /// Positions for one side.
    #[must_use]
    pub fn side(&self, side: Side) -> AxisPair {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

/// Outcome of a target change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconfigureOutcome {
    /// Always true once the address passed validation.
    pub success: bool,
    /// The accepted address.
    pub ams_net_id: String,
    /// Whether the follow-on connect succeeded.
    pub connected: bool,
    /// Connect failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

struct Session {
    target: TargetConfig,
    client: Arc<dyn TagClient>,
    machine: ConnectionMachine,
    generation: u64,
}

#[derive(Debug, Default)]
struct HeartbeatMemo {
    tag: Option<String>,
    value: Option<TagValue>,
}

/// Gateway to one controller.
pub struct Gateway {
    factory: Arc<dyn ClientFactory>,
    tags: TagConfig,
    io_map: IoMap,
    pulse_default: Duration,
    session: RwLock<Session>,
    heartbeat: Mutex<HeartbeatMemo>,
    disconnected_tags: Mutex<BTreeSet<String>>,
    pub(crate) transfer_lock: tokio::sync::Mutex<()>,
    reconfigure_lock: tokio::sync::Mutex<()>,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    /// Create a disconnected gateway.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the I/O table is invalid.
    pub fn new(config: &GatewayConfig, factory: Arc<dyn ClientFactory>) -> HmiResult<Self> {
        Self::with_metrics(config, factory, Arc::new(GatewayMetrics::new()))
    }

    /// Create a disconnected gateway reporting into `metrics`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the I/O table is invalid.
    pub fn with_metrics(
        config: &GatewayConfig,
        factory: Arc<dyn ClientFactory>,
        metrics: Arc<GatewayMetrics>,
    ) -> HmiResult<Self> {
        let target = config.target.clone();
        let client: Arc<dyn TagClient> = Arc::from(factory.create(&target));
        Ok(Self {
            factory,
            tags: config.tags.clone(),
            io_map: config.io_map()?,
            pulse_default: config.pulse.default_duration,
            session: RwLock::new(Session {
                target,
                client,
                machine: ConnectionMachine::new(),
                generation: 0,
            }),
            heartbeat: Mutex::new(HeartbeatMemo::default()),
            disconnected_tags: Mutex::new(BTreeSet::new()),
            transfer_lock: tokio::sync::Mutex::new(()),
            reconfigure_lock: tokio::sync::Mutex::new(()),
            metrics,
        })
    }

    fn session(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_mut(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn heartbeat_memo(&self) -> MutexGuard<'_, HeartbeatMemo> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disconnected(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.disconnected_tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Symbol names this gateway was configured with.
    #[must_use]
    pub fn tags(&self) -> &TagConfig {
        &self.tags
    }

    /// The indexed I/O table.
    #[must_use]
    pub fn io_map(&self) -> &IoMap {
        &self.io_map
    }

    /// Metrics collectors.
    #[must_use]
    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session().machine.state()
    }

    /// Whether tag operations may be attempted.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Current target.
    #[must_use]
    pub fn target(&self) -> TargetConfig {
        self.session().target.clone()
    }

    /// Error recorded by the last failed connect or link loss.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.session().machine.last_error().map(str::to_string)
    }

    /// Attempt one connection to the current target.
    ///
    /// A no-op when already connected. On failure the state is left at
    /// DISCONNECTED with the error recorded.
    ///
    /// # Errors
    ///
    /// Returns [`HmiError::Connect`] carrying the client message when the
    /// attempt fails, or an invalid-transition error if another attempt is
    /// in flight.
    pub async fn connect(&self) -> HmiResult<()> {
        let (client, generation, target) = {
            let mut session = self.session_mut();
            if session.machine.state().is_connected() {
                return Ok(());
            }
            session.machine.transition(ConnectionState::Connecting)?;
            (
                Arc::clone(&session.client),
                session.generation,
                session.target.clone(),
            )
        };

        info!(net_id = %target.ams_net_id, port = target.port, "Connecting to PLC");
        let result = match tokio::time::timeout(target.connect_timeout, client.connect()).await {
            Ok(r) => r,
            Err(_) => Err(ClientError::Transport(format!(
                "connect timed out after {}ms",
                target.connect_timeout.as_millis()
            ))),
        };

        let mut session = self.session_mut();
        if session.generation != generation {
            // Target changed while connecting; the new session owns the state.
            return result.map_err(|e| HmiError::Connect(e.to_string()));
        }
        match result {
            Ok(()) => {
                session.machine.transition(ConnectionState::Connected)?;
                self.metrics.record_connect(true);
                info!(net_id = %target.ams_net_id, "PLC connected");
                Ok(())
            }
            Err(e) => {
                session.machine.mark_lost(e.to_string());
                self.metrics.record_connect(false);
                warn!(net_id = %target.ams_net_id, error = %e, "PLC connect failed");
                Err(HmiError::Connect(e.to_string()))
            }
        }
    }

    /// Close the session, ignoring client errors.
    pub async fn disconnect(&self) {
        let client = {
            let mut session = self.session_mut();
            if session.machine.state() == ConnectionState::Disconnected {
                return;
            }
            session.machine.mark_lost("disconnected by request");
            Arc::clone(&session.client)
        };
        self.metrics.connected.set(0);
        if let Err(e) = client.disconnect().await {
            debug!(error = %e, "Ignoring disconnect error");
        }
        info!("PLC disconnected");
    }

    fn active_client(&self) -> HmiResult<(Arc<dyn TagClient>, u64)> {
        let session = self.session();
        if session.machine.state().is_connected() {
            Ok((Arc::clone(&session.client), session.generation))
        } else {
            Err(HmiError::NotConnected)
        }
    }

    fn note_failure(&self, generation: u64, err: &ClientError) {
        if !err.is_transport() {
            return;
        }
        let mut session = self.session_mut();
        if session.generation == generation && session.machine.state().is_connected() {
            session.machine.mark_lost(err.to_string());
            self.metrics.connected.set(0);
            warn!(error = %err, "PLC link lost");
        }
    }

    /// Read a tag.
    ///
    /// # Errors
    ///
    /// [`HmiError::NotConnected`] when disconnected, otherwise
    /// [`HmiError::Read`] with the client's message.
    pub async fn read_tag(&self, tag: &str) -> HmiResult<TagValue> {
        let (client, generation) = self.active_client()?;
        self.metrics.reads_total.inc();
        match client.read_value(tag).await {
            Ok(value) => {
                self.disconnected().remove(tag);
                Ok(value)
            }
            Err(e) => {
                self.metrics.read_failures_total.inc();
                self.note_failure(generation, &e);
                self.disconnected().insert(tag.to_string());
                debug!(tag, error = %e, "Read failed");
                Err(HmiError::Read {
                    tag: tag.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Write a tag. `auto_fill` merges a partial structure over the live
    /// value.
    ///
    /// # Errors
    ///
    /// [`HmiError::NotConnected`] when disconnected, otherwise
    /// [`HmiError::Write`] with the client's message.
    pub async fn write_tag(&self, tag: &str, value: TagValue, auto_fill: bool) -> HmiResult<()> {
        let (client, generation) = self.active_client()?;
        self.metrics.writes_total.inc();
        client
            .write_value(tag, value, auto_fill)
            .await
            .map_err(|e| {
                self.metrics.write_failures_total.inc();
                self.note_failure(generation, &e);
                debug!(tag, error = %e, "Write failed");
                HmiError::Write {
                    tag: tag.to_string(),
                    message: e.to_string(),
                }
            })
    }

    /// Write a boolean after coercing `raw` (`true`, `"true"`, `1` are true).
    ///
    /// Returns the value written.
    ///
    /// # Errors
    ///
    /// As [`Gateway::write_tag`].
    pub async fn write_boolean(&self, tag: &str, raw: Option<&serde_json::Value>) -> HmiResult<bool> {
        let value = coerce_bool(raw);
        self.write_tag(tag, TagValue::Bool(value), false).await?;
        Ok(value)
    }

    /// Write to the configured default tag.
    ///
    /// # Errors
    ///
    /// As [`Gateway::write_tag`].
    pub async fn write_default(&self, value: TagValue) -> HmiResult<String> {
        let tag = self.tags.default_write_tag.clone();
        self.write_tag(&tag, value, false).await?;
        Ok(tag)
    }

    /// Write true, hold, write false.
    ///
    /// The false write is attempted even when the true write failed, so the
    /// tag is never left high by a partial pulse. The first error wins.
    ///
    /// # Errors
    ///
    /// The first write error encountered.
    pub async fn pulse(&self, tag: &str, duration: Option<Duration>) -> HmiResult<()> {
        let duration = duration.unwrap_or(self.pulse_default);
        let high = self.write_tag(tag, TagValue::Bool(true), false).await;
        if high.is_ok() {
            tokio::time::sleep(duration).await;
        } else {
            warn!(tag, "Pulse high write failed, resetting anyway");
        }
        let low = self.write_tag(tag, TagValue::Bool(false), false).await;
        high.and(low)
    }

    /// Default diagnostic tag list: heartbeat candidates and the machine
    /// tags the poller reads.
    #[must_use]
    pub fn default_test_tags(&self) -> Vec<String> {
        let mut tags = self.tags.heartbeat_candidates.clone();
        tags.push(self.tags.production_count.clone());
        tags.push(self.tags.alarm_word.clone());
        tags.push(self.tags.status_word.clone());
        for side in Side::ALL {
            let s = self.tags.side(side);
            tags.push(s.axis1_position.clone());
            tags.push(s.axis2_position.clone());
            tags.push(s.step_number.clone());
        }
        tags
    }

    /// Read each tag, recording per-tag success or failure. Never aborts.
    pub async fn test_tags(&self, tags: &[String]) -> Vec<TagCheck> {
        let owned;
        let tags = if tags.is_empty() {
            owned = self.default_test_tags();
            &owned
        } else {
            tags
        };

        let mut results = Vec::with_capacity(tags.len());
        for tag in tags {
            results.push(TagCheck::from_result(tag, self.read_tag(tag).await));
        }
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        info!(total = results.len(), failed, "Tag test finished");
        results
    }

    fn heartbeat_order(&self, user_tag: Option<&str>) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        let remembered = self.heartbeat_memo().tag.clone();
        for tag in user_tag
            .map(str::to_string)
            .into_iter()
            .chain(remembered)
            .chain(self.tags.heartbeat_candidates.iter().cloned())
        {
            if !tag.is_empty() && !order.contains(&tag) {
                order.push(tag);
            }
        }
        order
    }

    /// Find a heartbeat tag that answers, trying `user_tag` first, then the
    /// last one that worked, then the configured candidates.
    ///
    /// The answering tag and its value are remembered for status reports.
    /// Returns `None` when nothing answers.
    pub async fn probe_heartbeat(&self, user_tag: Option<&str>) -> Option<(String, TagValue)> {
        for tag in self.heartbeat_order(user_tag) {
            if let Ok(value) = self.read_tag(&tag).await {
                let mut memo = self.heartbeat_memo();
                if memo.tag.as_deref() != Some(tag.as_str()) {
                    info!(tag = %tag, "Heartbeat tag discovered");
                }
                memo.tag = Some(tag.clone());
                memo.value = Some(value.clone());
                return Some((tag, value));
            }
            if !self.is_connected() {
                break;
            }
        }
        self.heartbeat_memo().value = None;
        None
    }

    /// Read every heartbeat candidate and report each result.
    pub async fn heartbeat_debug(&self, user_tag: Option<&str>) -> Vec<TagCheck> {
        let mut results = Vec::new();
        for tag in self.heartbeat_order(user_tag) {
            results.push(TagCheck::from_result(&tag, self.read_tag(&tag).await));
        }
        results
    }

    /// The heartbeat tag remembered from the last successful probe.
    #[must_use]
    pub fn heartbeat_tag(&self) -> Option<String> {
        self.heartbeat_memo().tag.clone()
    }

    /// Connection summary, refreshing the heartbeat when connected.
    pub async fn status(&self) -> GatewayStatus {
        if self.is_connected() {
            self.probe_heartbeat(None).await;
        }
        let (heartbeat_tag, heartbeat) = {
            let memo = self.heartbeat_memo();
            (memo.tag.clone(), memo.value.clone())
        };
        GatewayStatus {
            ams_net_id: self.target().ams_net_id,
            connected: self.is_connected(),
            disconnected_tags: self.disconnected().iter().cloned().collect(),
            heartbeat,
            heartbeat_tag,
        }
    }

    /// Actual positions of both heads. Zeros for anything unreadable.
    pub async fn read_axis_positions(&self) -> AxisPositions {
        if !self.is_connected() {
            return AxisPositions::default();
        }
        let mut positions = AxisPositions::default();
        for side in Side::ALL {
            let s = self.tags.side(side);
            let pair = AxisPair {
                axis1: self.read_numeric(&s.axis1_position).await,
                axis2: self.read_numeric(&s.axis2_position).await,
            };
            match side {
                Side::Left => positions.left = pair,
                Side::Right => positions.right = pair,
            }
        }
        positions
    }

    /// Read a tag and coerce it to a number; 0 on any failure.
    pub async fn read_numeric(&self, tag: &str) -> f64 {
        self.read_tag(tag)
            .await
            .map(|v| coerce_numeric(&v))
            .unwrap_or(0.0)
    }

    /// Look up an I/O index.
    ///
    /// # Errors
    ///
    /// [`HmiError::UnknownIndex`] for an index not in the table.
    pub fn resolve_io(&self, index: u32) -> HmiResult<&IoMapEntry> {
        self.io_map.resolve(index)
    }

    /// Read an indexed I/O point.
    ///
    /// # Errors
    ///
    /// Unknown index, or as [`Gateway::read_tag`].
    pub async fn read_io(&self, index: u32) -> HmiResult<TagValue> {
        let tag = self.resolve_io(index)?.tag.clone();
        self.read_tag(&tag).await
    }

    /// Write an indexed I/O point with boolean coercion.
    ///
    /// # Errors
    ///
    /// Unknown index, or as [`Gateway::write_tag`].
    pub async fn write_io(&self, index: u32, raw: Option<&serde_json::Value>) -> HmiResult<(String, bool)> {
        let tag = self.resolve_io(index)?.tag.clone();
        let value = self.write_boolean(&tag, raw).await?;
        Ok((tag, value))
    }

    /// Pulse an indexed I/O point.
    ///
    /// # Errors
    ///
    /// Unknown index, or as [`Gateway::pulse`].
    pub async fn pulse_io(&self, index: u32, duration: Option<Duration>) -> HmiResult<String> {
        let tag = self.resolve_io(index)?.tag.clone();
        self.pulse(&tag, duration).await?;
        Ok(tag)
    }

    /// Re-point the gateway at a new controller address.
    ///
    /// The address is validated before anything is touched. The old session
    /// is closed (errors ignored), a new client is created and connected.
    /// The change is accepted even when the new controller is unreachable;
    /// the connect failure is reported as a warning.
    ///
    /// # Errors
    ///
    /// [`HmiError::Validation`] for a malformed address.
    pub async fn reconfigure_target(&self, ams_net_id: &str) -> HmiResult<ReconfigureOutcome> {
        validate_net_id(ams_net_id)?;
        let _guard = self.reconfigure_lock.lock().await;

        self.disconnect().await;

        {
            let mut session = self.session_mut();
            let mut target = session.target.clone();
            target.ams_net_id = ams_net_id.to_string();
            session.client = Arc::from(self.factory.create(&target));
            session.target = target;
            session.machine = ConnectionMachine::new();
            session.generation += 1;
        }
        *self.heartbeat_memo() = HeartbeatMemo::default();
        self.disconnected().clear();
        info!(net_id = %ams_net_id, "PLC target changed");

        let warning = self.connect().await.err().map(|e| match e {
            HmiError::Connect(msg) => msg,
            other => other.to_string(),
        });
        Ok(ReconfigureOutcome {
            success: true,
            ams_net_id: ams_net_id.to_string(),
            connected: warning.is_none(),
            warning,
        })
    }
}
