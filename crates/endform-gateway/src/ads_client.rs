//! Beckhoff ADS client behind the [`TagClient`] seam.
//!
//! Built with the `ads` feature. The `ads` crate is blocking, so every call
//! runs on the blocking pool. Symbols are resolved once per session through
//! `SYM_INFOBYNAMEEX` and then accessed by index group and offset.
//!
//! Only scalar symbols are supported (BOOL, integers, REAL, LREAL, STRING).
//! The gateway addresses every step field individually, so structured
//! values are rejected rather than laid out.

use crate::client::{ClientError, ClientFactory, TagClient};
use async_trait::async_trait;
use endform_common::{TagValue, TargetConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Symbol info by name, extended form.
const SYM_INFOBYNAMEEX: u32 = 0xF009;

/// Upper bound on one symbol-info reply.
const SYMBOL_INFO_MAX: usize = 1024;

/// Fixed part of an `AdsSymbolEntry`, before the name.
const SYMBOL_HEADER_LEN: usize = 30;

// ADS data type ids.
const ADST_INT16: u32 = 2;
const ADST_INT32: u32 = 3;
const ADST_REAL32: u32 = 4;
const ADST_REAL64: u32 = 5;
const ADST_INT8: u32 = 16;
const ADST_UINT8: u32 = 17;
const ADST_UINT16: u32 = 18;
const ADST_UINT32: u32 = 19;
const ADST_INT64: u32 = 20;
const ADST_UINT64: u32 = 21;
const ADST_STRING: u32 = 30;
const ADST_BIT: u32 = 33;

/// Location and layout of one resolved symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Index group.
    pub index_group: u32,
    /// Index offset.
    pub index_offset: u32,
    /// Size in bytes.
    pub size: u32,
    /// ADS data type id.
    pub data_type: u32,
    /// IEC type name as declared, e.g. `DINT` or `STRING(80)`.
    pub type_name: String,
}

impl SymbolInfo {
    /// Parse the reply to a `SYM_INFOBYNAMEEX` request.
    ///
    /// # Errors
    ///
    /// Returns a rejection when the reply is shorter than its own lengths.
    pub fn parse(reply: &[u8]) -> Result<Self, ClientError> {
        let short = || ClientError::Rejected("truncated symbol info reply".to_string());
        if reply.len() < SYMBOL_HEADER_LEN {
            return Err(short());
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([reply[at], reply[at + 1], reply[at + 2], reply[at + 3]])
        };
        let u16_at = |at: usize| usize::from(u16::from_le_bytes([reply[at], reply[at + 1]]));

        let name_len = u16_at(24);
        let type_len = u16_at(26);
        // Name and type are each followed by a NUL.
        let type_start = SYMBOL_HEADER_LEN + name_len + 1;
        let type_bytes = reply
            .get(type_start..type_start + type_len)
            .ok_or_else(short)?;

        Ok(Self {
            index_group: u32_at(4),
            index_offset: u32_at(8),
            size: u32_at(12),
            data_type: u32_at(16),
            type_name: String::from_utf8_lossy(type_bytes).into_owned(),
        })
    }

    fn byte_len(&self) -> usize {
        usize::try_from(self.size).unwrap_or(usize::MAX)
    }

    /// Decode raw symbol bytes.
    ///
    /// # Errors
    ///
    /// Returns a rejection for structured types or a short buffer.
    pub fn decode(&self, raw: &[u8]) -> Result<TagValue, ClientError> {
        let need = |n: usize| -> Result<&[u8], ClientError> {
            raw.get(..n).ok_or_else(|| {
                ClientError::Rejected(format!("expected {n} bytes for {}", self.type_name))
            })
        };
        let value = match self.data_type {
            ADST_BIT => TagValue::Bool(need(1)?[0] != 0),
            ADST_INT8 => TagValue::Int(i64::from(i8::from_le_bytes([need(1)?[0]]))),
            ADST_UINT8 => TagValue::Int(i64::from(need(1)?[0])),
            ADST_INT16 => TagValue::Int(i64::from(i16::from_le_bytes(array(need(2)?)))),
            ADST_UINT16 => TagValue::Int(i64::from(u16::from_le_bytes(array(need(2)?)))),
            ADST_INT32 => TagValue::Int(i64::from(i32::from_le_bytes(array(need(4)?)))),
            ADST_UINT32 => TagValue::Int(i64::from(u32::from_le_bytes(array(need(4)?)))),
            ADST_INT64 => TagValue::Int(i64::from_le_bytes(array(need(8)?))),
            ADST_UINT64 => {
                let v = u64::from_le_bytes(array(need(8)?));
                TagValue::Int(i64::try_from(v).map_err(|_| {
                    ClientError::Rejected(format!("{v} does not fit a signed 64-bit value"))
                })?)
            }
            ADST_REAL32 => TagValue::Real(f64::from(f32::from_le_bytes(array(need(4)?)))),
            ADST_REAL64 => TagValue::Real(f64::from_le_bytes(array(need(8)?))),
            ADST_STRING => {
                let bytes = need(self.byte_len().min(raw.len()))?;
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                TagValue::Text(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            _ => {
                return Err(ClientError::Rejected(format!(
                    "unsupported symbol type {}",
                    self.type_name
                )))
            }
        };
        Ok(value)
    }

    /// Encode a value into the symbol's layout.
    ///
    /// # Errors
    ///
    /// Returns a rejection when the value does not fit the symbol type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, value: &TagValue) -> Result<Vec<u8>, ClientError> {
        let mismatch = || {
            ClientError::Rejected(format!("cannot write {value:?} to {}", self.type_name))
        };
        let bytes = match self.data_type {
            ADST_BIT => vec![u8::from(truthy(value).ok_or_else(mismatch)?)],
            ADST_INT8 => narrow::<i8>(value, mismatch)?.to_le_bytes().to_vec(),
            ADST_UINT8 => narrow::<u8>(value, mismatch)?.to_le_bytes().to_vec(),
            ADST_INT16 => narrow::<i16>(value, mismatch)?.to_le_bytes().to_vec(),
            ADST_UINT16 => narrow::<u16>(value, mismatch)?.to_le_bytes().to_vec(),
            ADST_INT32 => narrow::<i32>(value, mismatch)?.to_le_bytes().to_vec(),
            ADST_UINT32 => narrow::<u32>(value, mismatch)?.to_le_bytes().to_vec(),
            ADST_INT64 => integral(value).ok_or_else(mismatch)?.to_le_bytes().to_vec(),
            ADST_UINT64 => narrow::<u64>(value, mismatch)?.to_le_bytes().to_vec(),
            ADST_REAL32 => (value.as_f64().ok_or_else(mismatch)? as f32)
                .to_le_bytes()
                .to_vec(),
            ADST_REAL64 => value.as_f64().ok_or_else(mismatch)?.to_le_bytes().to_vec(),
            ADST_STRING => {
                let TagValue::Text(text) = value else {
                    return Err(mismatch());
                };
                let mut buf = vec![0u8; self.byte_len()];
                // Keep the terminating NUL.
                let n = text.len().min(buf.len().saturating_sub(1));
                buf[..n].copy_from_slice(&text.as_bytes()[..n]);
                buf
            }
            _ => return Err(mismatch()),
        };
        Ok(bytes)
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn truthy(value: &TagValue) -> Option<bool> {
    match value {
        TagValue::Bool(v) => Some(*v),
        TagValue::Int(v) => Some(*v != 0),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integral(value: &TagValue) -> Option<i64> {
    match value {
        TagValue::Int(v) => Some(*v),
        TagValue::Bool(v) => Some(i64::from(*v)),
        TagValue::Real(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

fn narrow<T: TryFrom<i64>>(
    value: &TagValue,
    mismatch: impl Fn() -> ClientError,
) -> Result<T, ClientError> {
    integral(value)
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(mismatch)
}

/// Parse a dotted AMS Net ID into its six octets.
///
/// # Errors
///
/// Returns a rejection unless there are exactly six octets in `0..=255`.
pub fn net_id_octets(net_id: &str) -> Result<[u8; 6], ClientError> {
    let bad = || ClientError::Rejected(format!("AMS Net ID '{net_id}' is not six octets"));
    let parts = net_id
        .split('.')
        .map(|p| p.parse::<u8>().map_err(|_| bad()))
        .collect::<Result<Vec<_>, _>>()?;
    <[u8; 6]>::try_from(parts).map_err(|_| bad())
}

/// Router host for a target: the configured host, or the first four octets
/// of the Net ID.
fn router_host(target: &TargetConfig, octets: [u8; 6]) -> String {
    target.host.clone().unwrap_or_else(|| {
        let [a, b, c, d, ..] = octets;
        format!("{a}.{b}.{c}.{d}")
    })
}

fn map_ads_error(e: ads::Error) -> ClientError {
    match e {
        ads::Error::Io(..) => ClientError::Transport(e.to_string()),
        other => ClientError::Rejected(other.to_string()),
    }
}

struct Session {
    client: ads::Client,
    addr: ads::AmsAddr,
    symbols: HashMap<String, SymbolInfo>,
}

impl Session {
    fn symbol(&mut self, tag: &str) -> Result<SymbolInfo, ClientError> {
        if let Some(info) = self.symbols.get(tag) {
            return Ok(info.clone());
        }
        let mut request = tag.as_bytes().to_vec();
        request.push(0);
        let mut reply = vec![0u8; SYMBOL_INFO_MAX];
        let device = self.client.device(self.addr);
        let n = device
            .write_read(SYM_INFOBYNAMEEX, 0, &request, &mut reply)
            .map_err(|e| match map_ads_error(e) {
                ClientError::Rejected(msg) => ClientError::Rejected(format!("{tag}: {msg}")),
                lost => lost,
            })?;
        let info = SymbolInfo::parse(&reply[..n.min(reply.len())])?;
        trace!(tag, group = info.index_group, offset = info.index_offset, "Resolved symbol");
        self.symbols.insert(tag.to_string(), info.clone());
        Ok(info)
    }
}

/// One ADS session to a controller runtime.
pub struct AdsClient {
    target: TargetConfig,
    session: Arc<Mutex<Option<Session>>>,
}

impl AdsClient {
    /// Create an unconnected client for `target`.
    #[must_use]
    pub fn new(target: &TargetConfig) -> Self {
        Self {
            target: target.clone(),
            session: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_session<T, F>(&self, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> Result<T, ClientError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&session);
            let active = guard
                .as_mut()
                .ok_or_else(|| ClientError::Transport("not connected".to_string()))?;
            let result = f(active);
            if matches!(result, Err(ClientError::Transport(_))) {
                *guard = None;
            }
            result
        })
        .await
        .map_err(|e| ClientError::Transport(format!("client task failed: {e}")))?
    }
}

fn lock(session: &Mutex<Option<Session>>) -> MutexGuard<'_, Option<Session>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TagClient for AdsClient {
    async fn connect(&self) -> Result<(), ClientError> {
        let octets = net_id_octets(&self.target.ams_net_id)?;
        let host = router_host(&self.target, octets);
        let port = self.target.port;
        let timeout: Duration = self.target.connect_timeout;
        let session = Arc::clone(&self.session);

        debug!(host = %host, port, "Opening ADS connection");
        tokio::task::spawn_blocking(move || {
            let client = ads::Client::new(
                (host.as_str(), ads::PORT),
                ads::Timeouts::new(timeout),
                ads::Source::Auto,
            )
            .map_err(|e| ClientError::Transport(e.to_string()))?;
            let [a, b, c, d, e, f] = octets;
            let addr = ads::AmsAddr::new(ads::AmsNetId::new(a, b, c, d, e, f), port);
            // Any reply proves the runtime port is reachable.
            client
                .device(addr)
                .get_state()
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            *lock(&session) = Some(Session {
                client,
                addr,
                symbols: HashMap::new(),
            });
            info!(host = %host, port, "ADS session open");
            Ok(())
        })
        .await
        .map_err(|e| ClientError::Transport(format!("client task failed: {e}")))?
    }

    async fn read_value(&self, tag: &str) -> Result<TagValue, ClientError> {
        let tag = tag.to_string();
        self.with_session(move |s| {
            let info = s.symbol(&tag)?;
            let mut raw = vec![0u8; info.byte_len()];
            s.client
                .device(s.addr)
                .read_exact(info.index_group, info.index_offset, &mut raw)
                .map_err(map_ads_error)?;
            info.decode(&raw)
        })
        .await
    }

    async fn write_value(
        &self,
        tag: &str,
        value: TagValue,
        _auto_fill: bool,
    ) -> Result<(), ClientError> {
        let tag = tag.to_string();
        self.with_session(move |s| {
            let info = s.symbol(&tag)?;
            let raw = info.encode(&value)?;
            s.client
                .device(s.addr)
                .write(info.index_group, info.index_offset, &raw)
                .map_err(map_ads_error)
        })
        .await
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        if lock(&self.session).take().is_some() {
            debug!(net_id = %self.target.ams_net_id, "ADS session closed");
        }
        Ok(())
    }
}

/// Creates [`AdsClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdsFactory;

impl ClientFactory for AdsFactory {
    fn create(&self, target: &TargetConfig) -> Box<dyn TagClient> {
        Box::new(AdsClient::new(target))
    }
}
