//! JSON signal envelope
//!
//! Every control message is a JSON object of the form
//! `{ module, operation, parameter?, response?, session }`. The known
//! module/operation pairs are mapped onto [`SignalKind`]; anything else is
//! kept as [`SignalKind::Unrecognized`] and ignored by the dispatcher.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::constants::*;
use crate::error::ProtocolError;

/// Signal envelope as carried in a signal frame payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(alias = "MODULE")]
    pub module: String,

    #[serde(alias = "OPERATION")]
    pub operation: String,

    #[serde(
        alias = "PARAMETER",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parameter: Option<Value>,

    #[serde(
        alias = "RESPONSE",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response: Option<Value>,

    #[serde(alias = "SESSION", default)]
    pub session: String,
}

impl Signal {
    /// Build a request envelope
    pub fn request(
        module: impl Into<String>,
        operation: impl Into<String>,
        session: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            operation: operation.into(),
            parameter: None,
            response: None,
            session: session.into(),
        }
    }

    /// Build a response envelope with the given response body
    pub fn reply(
        module: impl Into<String>,
        operation: impl Into<String>,
        session: impl Into<String>,
        response: Value,
    ) -> Self {
        Self {
            response: Some(response),
            ..Self::request(module, operation, session)
        }
    }

    pub fn with_parameter(mut self, parameter: Value) -> Self {
        self.parameter = Some(parameter);
        self
    }

    /// Parse an envelope from a frame payload
    pub fn from_slice(payload: &[u8]) -> Result<Self, ProtocolError> {
        // Some firmware pads the JSON with trailing NULs
        let end = payload
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |pos| pos + 1);
        serde_json::from_slice(&payload[..end])
            .map_err(|e| ProtocolError::MalformedSignal(e.to_string()))
    }

    /// Serialize to UTF-8 JSON
    pub fn to_bytes(&self) -> Bytes {
        // A tree of strings and `Value`s always serializes
        serde_json::to_vec(self).map(Bytes::from).unwrap_or_default()
    }

    /// Classify into a known module/operation pair
    pub fn kind(&self) -> SignalKind {
        SignalKind::classify(&self.module, &self.operation)
    }

    /// Look up a parameter field
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.parameter.as_ref().and_then(|p| p.get(name))
    }

    /// ERRORCODE from the response body, if present
    pub fn error_code(&self) -> Option<u64> {
        self.response
            .as_ref()
            .and_then(|r| r.get(FIELD_ERRORCODE))
            .and_then(Value::as_u64)
    }
}

/// Closed set of module/operation pairs the dispatcher understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    Connect,
    Keepalive,
    CreateStream,
    Verify,
    Login,
    MediaTaskStart,
    RequestStream,
    RequestAliveVideo,
    ControlStream,
    Unrecognized { module: String, operation: String },
}

impl SignalKind {
    pub fn classify(module: &str, operation: &str) -> Self {
        match (module, operation) {
            (MODULE_CERTIFICATE, OP_CONNECT) => SignalKind::Connect,
            (MODULE_CERTIFICATE, OP_KEEPALIVE) => SignalKind::Keepalive,
            (MODULE_CERTIFICATE, OP_CREATESTREAM) => SignalKind::CreateStream,
            (MODULE_CERTIFICATE, OP_VERIFY) => SignalKind::Verify,
            (MODULE_CERTIFICATE, OP_LOGIN) => SignalKind::Login,
            (MODULE_MEDIASTREAMMODEL, OP_MEDIATASKSTART) => SignalKind::MediaTaskStart,
            (MODULE_MEDIASTREAMMODEL, OP_REQUESTSTREAM) => SignalKind::RequestStream,
            (MODULE_MEDIASTREAMMODEL, OP_REQUESTALIVEVIDEO) => SignalKind::RequestAliveVideo,
            (MODULE_MEDIASTREAMMODEL, OP_CONTROLSTREAM) => SignalKind::ControlStream,
            _ => SignalKind::Unrecognized {
                module: module.to_string(),
                operation: operation.to_string(),
            },
        }
    }

    /// Operation name, for logging
    pub fn name(&self) -> &str {
        match self {
            SignalKind::Connect => OP_CONNECT,
            SignalKind::Keepalive => OP_KEEPALIVE,
            SignalKind::CreateStream => OP_CREATESTREAM,
            SignalKind::Verify => OP_VERIFY,
            SignalKind::Login => OP_LOGIN,
            SignalKind::MediaTaskStart => OP_MEDIATASKSTART,
            SignalKind::RequestStream => OP_REQUESTSTREAM,
            SignalKind::RequestAliveVideo => OP_REQUESTALIVEVIDEO,
            SignalKind::ControlStream => OP_CONTROLSTREAM,
            SignalKind::Unrecognized { operation, .. } => operation,
        }
    }
}

/// Device identity presented in CERTIFICATE/CONNECT
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device serial number (DSNO)
    pub serial: String,
    /// Device class (DEVCLASS)
    pub class: String,
    /// Device type (DEVTYPE)
    pub device_type: String,
    /// Network description (NET), if reported
    pub network: Option<String>,
    /// Protocol version the device asked for (PRO)
    pub protocol_version: Option<String>,
}

impl DeviceInfo {
    /// Extract identity fields from a CONNECT signal
    pub fn from_connect(signal: &Signal) -> Result<Self, ProtocolError> {
        let required = |name: &'static str| {
            signal
                .param(name)
                .and_then(scalar_to_string)
                .filter(|s| !s.is_empty())
                .ok_or(ProtocolError::MissingParameter {
                    operation: OP_CONNECT,
                    name,
                })
        };

        Ok(Self {
            serial: required("DSNO")?,
            device_type: required("DEVTYPE")?,
            class: required("DEVCLASS")?,
            network: signal.param("NET").and_then(scalar_to_string),
            protocol_version: signal.param("PRO").and_then(scalar_to_string),
        })
    }
}

/// Parameters of MEDIASTREAMMODEL/MEDIATASKSTART
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaTaskParams {
    /// Channel the device will stream on
    pub channel: u32,
    /// Stream type (main = 0, sub = 1)
    pub stream_type: u32,
}

impl MediaTaskParams {
    pub fn from_signal(signal: &Signal) -> Result<Self, ProtocolError> {
        let channel = signal
            .param("CHANNEL")
            .and_then(scalar_to_u32)
            .ok_or(ProtocolError::MissingParameter {
                operation: OP_MEDIATASKSTART,
                name: "CHANNEL",
            })?;
        let stream_type = signal
            .param("STREAMTYPE")
            .and_then(scalar_to_u32)
            .unwrap_or(1);

        Ok(Self {
            channel,
            stream_type,
        })
    }
}

/// Success response body with no extra fields
pub fn success() -> Value {
    success_body(std::iter::empty::<(&'static str, Value)>())
}

/// Build a success response body with extra fields
pub fn success_body(extra: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
    let mut body = Map::new();
    body.insert(FIELD_ERRORCODE.into(), Value::from(ERRORCODE_SUCCESS));
    body.insert(FIELD_ERRORCAUSE.into(), Value::from(""));
    for (key, value) in extra {
        body.insert(key.into(), value);
    }
    Value::Object(body)
}

/// Device firmware sends identifiers both as numbers and as strings
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_to_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
