//! In-memory controller behind the [`TagClient`] seam.
//!
//! A [`SimulatedPlc`] is a shared tag store. Every [`SimulatedClient`]
//! created from it sees the same tags, so the store survives reconnects and
//! target changes. Faults can be injected per tag, per target, or for the
//! whole link, and every attempted write is journaled.

use crate::client::{ClientError, ClientFactory, TagClient};
use crate::translator::{step_tag, STEP_BOOL_FIELDS, STEP_INT_FIELDS, STEP_REAL_FIELDS};
use async_trait::async_trait;
use endform_common::{GatewayConfig, Side, TagValue, TargetConfig, STEP_COUNT};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// One attempted write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    /// Target tag.
    pub tag: String,
    /// Value as sent by the caller (before auto-fill).
    pub value: TagValue,
    /// Whether the controller accepted it.
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct PlcInner {
    tags: HashMap<String, TagValue>,
    tag_faults: HashMap<String, String>,
    refuse_all: Option<String>,
    refuse_targets: HashMap<String, String>,
    heartbeat: Option<String>,
    journal: Vec<WriteRecord>,
    connects: u64,
}

/// Shared simulated controller.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPlc {
    inner: Arc<Mutex<PlcInner>>,
    link_epoch: Arc<AtomicU64>,
}

impl SimulatedPlc {
    /// Create an empty controller. Unknown symbols are rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller carrying every symbol `config` refers to.
    #[must_use]
    pub fn with_machine_tags(config: &GatewayConfig) -> Self {
        let plc = Self::new();
        plc.seed_machine_tags(config);
        plc
    }

    fn lock(&self) -> MutexGuard<'_, PlcInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create every symbol the gateway, poller, and translator use.
    ///
    /// The first heartbeat candidate counts up on each read.
    pub fn seed_machine_tags(&self, config: &GatewayConfig) {
        let tags = &config.tags;
        self.set_tag(&tags.default_write_tag, TagValue::Int(0));
        self.set_tag(&tags.production_count, TagValue::Int(0));
        self.set_tag(&tags.alarm_word, TagValue::Int(0));
        self.set_tag(&tags.status_word, TagValue::Int(0));
        if let Some(first) = tags.heartbeat_candidates.first() {
            self.set_tag(first, TagValue::Int(0));
            self.set_heartbeat(first);
        }

        for side in Side::ALL {
            let s = tags.side(side);
            self.set_tag(&s.axis1_position, TagValue::Real(0.0));
            self.set_tag(&s.axis2_position, TagValue::Real(0.0));
            self.set_tag(&s.step_number, TagValue::Int(0));
            self.set_tag(&s.step_description, TagValue::Text("Idle".to_string()));
            self.set_tag(&s.run_mode, TagValue::Bool(false));
            self.set_tag(&s.jog_mode, TagValue::Bool(false));

            for n in 1..=STEP_COUNT {
                for field in STEP_BOOL_FIELDS {
                    self.set_tag(&step_tag(&s.program_prefix, n, field), TagValue::Bool(false));
                }
                for field in STEP_REAL_FIELDS {
                    self.set_tag(&step_tag(&s.program_prefix, n, field), TagValue::Real(0.0));
                }
                for field in STEP_INT_FIELDS {
                    self.set_tag(&step_tag(&s.program_prefix, n, field), TagValue::Int(0));
                }
            }
        }

        if let Ok(map) = config.io_map() {
            for entry in map.entries() {
                self.set_tag(&entry.tag, TagValue::Bool(false));
            }
        }
        debug!(count = self.lock().tags.len(), "Seeded simulated controller");
    }

    /// Create or overwrite a symbol.
    pub fn set_tag(&self, tag: &str, value: TagValue) {
        self.lock().tags.insert(tag.to_string(), value);
    }

    /// Current value of a symbol.
    #[must_use]
    pub fn tag(&self, tag: &str) -> Option<TagValue> {
        self.lock().tags.get(tag).cloned()
    }

    /// Make `tag` count up by one on every read.
    pub fn set_heartbeat(&self, tag: &str) {
        self.lock().heartbeat = Some(tag.to_string());
    }

    /// Make every read or write of `tag` fail with `message`.
    pub fn fail_tag(&self, tag: &str, message: &str) {
        self.lock()
            .tag_faults
            .insert(tag.to_string(), message.to_string());
    }

    /// Remove an injected tag fault.
    pub fn clear_tag_fault(&self, tag: &str) {
        self.lock().tag_faults.remove(tag);
    }

    /// Refuse every connect attempt with `message`.
    pub fn refuse_connections(&self, message: &str) {
        self.lock().refuse_all = Some(message.to_string());
    }

    /// Refuse connect attempts to one net id.
    pub fn refuse_target(&self, ams_net_id: &str, message: &str) {
        self.lock()
            .refuse_targets
            .insert(ams_net_id.to_string(), message.to_string());
    }

    /// Clear all connect refusals.
    pub fn accept_connections(&self) {
        let mut inner = self.lock();
        inner.refuse_all = None;
        inner.refuse_targets.clear();
    }

    /// Break every open session. Clients must reconnect.
    pub fn drop_link(&self) {
        self.link_epoch.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated link dropped");
    }

    /// Writes attempted so far, oldest first.
    #[must_use]
    pub fn journal(&self) -> Vec<WriteRecord> {
        self.lock().journal.clone()
    }

    /// Forget journaled writes.
    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    /// Successful connects so far.
    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.lock().connects
    }

    fn open_session(&self, target: &TargetConfig) -> Result<u64, ClientError> {
        let mut inner = self.lock();
        if let Some(msg) = inner
            .refuse_all
            .as_ref()
            .or_else(|| inner.refuse_targets.get(&target.ams_net_id))
        {
            return Err(ClientError::Transport(msg.clone()));
        }
        inner.connects += 1;
        Ok(self.link_epoch.load(Ordering::SeqCst))
    }

    fn read(&self, tag: &str) -> Result<TagValue, ClientError> {
        let mut inner = self.lock();
        if let Some(msg) = inner.tag_faults.get(tag) {
            return Err(ClientError::Rejected(msg.clone()));
        }
        let counting = inner.heartbeat.as_deref() == Some(tag);
        let value = inner
            .tags
            .get_mut(tag)
            .ok_or_else(|| ClientError::Rejected(format!("symbol not found: {tag}")))?;
        if counting {
            if let TagValue::Int(n) = value {
                *n = n.wrapping_add(1);
            }
        }
        Ok(value.clone())
    }

    fn write(&self, tag: &str, value: TagValue, auto_fill: bool) -> Result<(), ClientError> {
        let mut inner = self.lock();
        let outcome = if let Some(msg) = inner.tag_faults.get(tag) {
            Err(ClientError::Rejected(msg.clone()))
        } else if let Some(current) = inner.tags.get(tag) {
            let stored = if auto_fill {
                current.auto_fill(value.clone())
            } else {
                value.clone()
            };
            inner.tags.insert(tag.to_string(), stored);
            Ok(())
        } else {
            Err(ClientError::Rejected(format!("symbol not found: {tag}")))
        };

        inner.journal.push(WriteRecord {
            tag: tag.to_string(),
            value,
            accepted: outcome.is_ok(),
        });
        outcome
    }
}

/// One session against a [`SimulatedPlc`].
#[derive(Debug)]
pub struct SimulatedClient {
    plc: SimulatedPlc,
    target: TargetConfig,
    connected: AtomicBool,
    epoch: AtomicU64,
}

impl SimulatedClient {
    /// Create an unconnected client.
    #[must_use]
    pub fn new(plc: SimulatedPlc, target: TargetConfig) -> Self {
        Self {
            plc,
            target,
            connected: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    fn check_link(&self) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("not connected".to_string()));
        }
        if self.epoch.load(Ordering::SeqCst) != self.plc.link_epoch.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(ClientError::Transport("connection lost".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TagClient for SimulatedClient {
    async fn connect(&self) -> Result<(), ClientError> {
        let epoch = self.plc.open_session(&self.target)?;
        self.epoch.store(epoch, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        debug!(net_id = %self.target.ams_net_id, port = self.target.port, "Simulated session open");
        Ok(())
    }

    async fn read_value(&self, tag: &str) -> Result<TagValue, ClientError> {
        self.check_link()?;
        trace!(tag, "Simulated read");
        self.plc.read(tag)
    }

    async fn write_value(
        &self,
        tag: &str,
        value: TagValue,
        auto_fill: bool,
    ) -> Result<(), ClientError> {
        self.check_link()?;
        trace!(tag, %value, auto_fill, "Simulated write");
        self.plc.write(tag, value, auto_fill)
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out clients bound to one [`SimulatedPlc`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedFactory {
    plc: SimulatedPlc,
}

impl SimulatedFactory {
    /// Create a factory for `plc`.
    #[must_use]
    pub fn new(plc: SimulatedPlc) -> Self {
        Self { plc }
    }

    /// The shared controller.
    #[must_use]
    pub fn plc(&self) -> &SimulatedPlc {
        &self.plc
    }
}

impl ClientFactory for SimulatedFactory {
    fn create(&self, target: &TargetConfig) -> Box<dyn TagClient> {
        Box::new(SimulatedClient::new(self.plc.clone(), target.clone()))
    }
}
