//! Tagged envelopes exchanged with the transport.
//!
//! Every unit on the wire is `{"tag": <string>, "payload": <json>}`. Inbound
//! tags decode into [`BusAction`]s; the bus answers with [`BusEvent`]s.

use std::fmt::{self, Display, Formatter};

use relay_channels::{ChannelError, ChannelId};
use relay_registry::{ProviderError, RegistryError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const TAG_CREATE: &str = "create";
pub const TAG_CALL: &str = "call";
pub const TAG_CREATE_CHANNEL: &str = "createChannel";
pub const TAG_OUT_TO_CHANNEL: &str = "outToChannel";
pub const TAG_CLOSE_CHANNEL: &str = "closeChannel";

pub const TAG_RETURN: &str = "return";
pub const TAG_FAILURE: &str = "failure";
pub const TAG_CREATE_FAILED: &str = "createFailed";
pub const TAG_INIT_CHANNEL: &str = "initChannel";
pub const TAG_IN_FROM_CHANNEL: &str = "inFromChannel";
pub const TAG_CHANNEL_CLOSED: &str = "channelClosed";
pub const TAG_CHANNEL_FAILURE: &str = "channelFailure";
pub const TAG_ERROR: &str = "error";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub tag: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(tag: impl Into<String>, payload: Value) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }
}

/// Caller-chosen token linking a request to its outcome.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationId {
    /// Any JSON number, echoed back exactly as received.
    Number(serde_json::Number),
    Text(String),
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationId::Number(n) => write!(f, "{n}"),
            CorrelationId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CorrelationId {
    fn from(value: i64) -> Self {
        CorrelationId::Number(value.into())
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        CorrelationId::Text(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub id: CorrelationId,
    pub provider: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRequest {
    #[serde(default)]
    pub id: Option<CorrelationId>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutToChannelRequest {
    pub chan_id: ChannelId,
    pub message: Value,
    #[serde(default)]
    pub id: Option<CorrelationId>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseChannelRequest {
    pub chan_id: ChannelId,
    #[serde(default)]
    pub id: Option<CorrelationId>,
}

/// Decoded inbound instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum BusAction {
    Create(CreateRequest),
    Call(CallRequest),
    CreateChannel(ChannelRequest),
    OutToChannel(OutToChannelRequest),
    CloseChannel(CloseChannelRequest),
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unknown action tag `{0}`")]
    UnknownTag(String),
    #[error("malformed `{tag}` payload: {source}")]
    Payload {
        tag: String,
        id: Option<CorrelationId>,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Correlation id recovered from a malformed payload, if any.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            DecodeError::UnknownTag(_) => None,
            DecodeError::Payload { id, .. } => id.as_ref(),
        }
    }
}

impl BusAction {
    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        let Envelope { tag, payload } = envelope;
        let id = payload
            .get("id")
            .cloned()
            .and_then(|raw| serde_json::from_value::<CorrelationId>(raw).ok());
        let malformed = |source| DecodeError::Payload {
            tag: tag.clone(),
            id: id.clone(),
            source,
        };

        let action = match tag.as_str() {
            TAG_CREATE => BusAction::Create(serde_json::from_value(payload).map_err(malformed)?),
            TAG_CALL => BusAction::Call(serde_json::from_value(payload).map_err(malformed)?),
            TAG_CREATE_CHANNEL if payload.is_null() => {
                BusAction::CreateChannel(ChannelRequest::default())
            }
            TAG_CREATE_CHANNEL => {
                BusAction::CreateChannel(serde_json::from_value(payload).map_err(malformed)?)
            }
            TAG_OUT_TO_CHANNEL => {
                BusAction::OutToChannel(serde_json::from_value(payload).map_err(malformed)?)
            }
            TAG_CLOSE_CHANNEL => {
                BusAction::CloseChannel(serde_json::from_value(payload).map_err(malformed)?)
            }
            _ => return Err(DecodeError::UnknownTag(tag.clone())),
        };
        Ok(action)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            BusAction::Create(_) => TAG_CREATE,
            BusAction::Call(_) => TAG_CALL,
            BusAction::CreateChannel(_) => TAG_CREATE_CHANNEL,
            BusAction::OutToChannel(_) => TAG_OUT_TO_CHANNEL,
            BusAction::CloseChannel(_) => TAG_CLOSE_CHANNEL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    UnknownProvider,
    UnknownMethod,
    ProviderFailure,
    ChannelSetupFailure,
    UnknownProviderType,
    InvalidName,
    UnknownChannel,
    ChannelClosed,
    InvalidAction,
}

/// Structured failure carried by outbound events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl From<&RegistryError> for Failure {
    fn from(err: &RegistryError) -> Self {
        let kind = match err {
            RegistryError::UnknownProvider(_) => FailureKind::UnknownProvider,
            RegistryError::UnknownMethod { .. } => FailureKind::UnknownMethod,
            RegistryError::UnknownProviderType(_) => FailureKind::UnknownProviderType,
            RegistryError::InvalidName => FailureKind::InvalidName,
            RegistryError::Construction { source, .. } => {
                return Failure::new(FailureKind::ProviderFailure, err.to_string())
                    .with_code(source.code());
            }
            RegistryError::AlreadyRegistered(_) => FailureKind::ProviderFailure,
        };
        Failure::new(kind, err.to_string())
    }
}

impl From<&ProviderError> for Failure {
    fn from(err: &ProviderError) -> Self {
        Failure::new(FailureKind::ProviderFailure, err.message()).with_code(err.code())
    }
}

impl From<&ChannelError> for Failure {
    fn from(err: &ChannelError) -> Self {
        let kind = match err {
            ChannelError::UnknownChannel(_) => FailureKind::UnknownChannel,
            ChannelError::Closed(_) => FailureKind::ChannelClosed,
            ChannelError::Duplicate(_) | ChannelError::LimitReached(_) | ChannelError::Setup(_) => {
                FailureKind::ChannelSetupFailure
            }
        };
        Failure::new(kind, err.to_string())
    }
}

impl From<&DecodeError> for Failure {
    fn from(err: &DecodeError) -> Self {
        Failure::new(FailureKind::InvalidAction, err.to_string())
    }
}

/// Outbound notification.
#[derive(Clone, Debug, PartialEq)]
pub enum BusEvent {
    Return {
        id: CorrelationId,
        data: Value,
    },
    Failure {
        id: CorrelationId,
        error: Failure,
    },
    CreateFailed {
        name: String,
        error: Failure,
    },
    InitChannel(ChannelId),
    InFromChannel {
        chan_id: ChannelId,
        message: Value,
    },
    ChannelClosed(ChannelId),
    ChannelFailure {
        chan_id: Option<ChannelId>,
        id: Option<CorrelationId>,
        error: Failure,
    },
    Error {
        id: Option<CorrelationId>,
        error: Failure,
    },
}

impl BusEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            BusEvent::Return { .. } => TAG_RETURN,
            BusEvent::Failure { .. } => TAG_FAILURE,
            BusEvent::CreateFailed { .. } => TAG_CREATE_FAILED,
            BusEvent::InitChannel(_) => TAG_INIT_CHANNEL,
            BusEvent::InFromChannel { .. } => TAG_IN_FROM_CHANNEL,
            BusEvent::ChannelClosed(_) => TAG_CHANNEL_CLOSED,
            BusEvent::ChannelFailure { .. } => TAG_CHANNEL_FAILURE,
            BusEvent::Error { .. } => TAG_ERROR,
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let payload = match self {
            BusEvent::Return { id, data } => json!({ "id": id, "data": data }),
            BusEvent::Failure { id, error } => json!({ "id": id, "error": error }),
            BusEvent::CreateFailed { name, error } => json!({ "name": name, "error": error }),
            BusEvent::InitChannel(chan_id) | BusEvent::ChannelClosed(chan_id) => json!(chan_id),
            BusEvent::InFromChannel { chan_id, message } => {
                json!({ "chanId": chan_id, "message": message })
            }
            BusEvent::ChannelFailure { chan_id, id, error } => {
                json!({ "chanId": chan_id, "id": id, "error": error })
            }
            BusEvent::Error { id, error } => json!({ "id": id, "error": error }),
        };
        Envelope::new(self.tag(), payload)
    }

    /// Correlation id this event answers, when it has one.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            BusEvent::Return { id, .. } | BusEvent::Failure { id, .. } => Some(id),
            BusEvent::ChannelFailure { id, .. } | BusEvent::Error { id, .. } => id.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(tag: &str, payload: Value) -> Result<BusAction, DecodeError> {
        BusAction::from_envelope(Envelope::new(tag, payload))
    }

    #[test]
    fn decodes_call_with_default_args() {
        let action = decode(
            "call",
            json!({"id": 1, "provider": "storage", "method": "keys"}),
        )
        .unwrap();
        assert_eq!(
            action,
            BusAction::Call(CallRequest {
                id: CorrelationId::from(1),
                provider: "storage".into(),
                method: "keys".into(),
                args: Vec::new(),
            })
        );
        assert_eq!(action.tag(), TAG_CALL);
    }

    #[test]
    fn create_channel_accepts_missing_payload() {
        let envelope: Envelope = serde_json::from_str(r#"{"tag":"createChannel"}"#).unwrap();
        let action = BusAction::from_envelope(envelope).unwrap();
        assert_eq!(action, BusAction::CreateChannel(ChannelRequest::default()));

        let action = decode("createChannel", json!({"id": "open-1"})).unwrap();
        assert_eq!(
            action,
            BusAction::CreateChannel(ChannelRequest {
                id: Some("open-1".into())
            })
        );
    }

    #[test]
    fn out_to_channel_uses_camel_case() {
        let action = decode("outToChannel", json!({"chanId": "c1", "message": "ping"})).unwrap();
        match action {
            BusAction::OutToChannel(request) => {
                assert_eq!(request.chan_id.as_str(), "c1");
                assert_eq!(request.message, json!("ping"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn any_json_number_is_a_correlation_id() {
        for id in [json!(1.5), json!(u64::MAX), json!(-3)] {
            let action = decode(
                "call",
                json!({"id": id.clone(), "provider": "core", "method": "echo"}),
            )
            .unwrap();
            let event = match action {
                BusAction::Call(request) => BusEvent::Return {
                    id: request.id,
                    data: Value::Null,
                },
                other => panic!("expected call, got {other:?}"),
            };
            assert_eq!(event.to_envelope().payload["id"], id);
        }
    }

    #[test]
    fn float_id_survives_malformed_payload() {
        let err = decode("call", json!({"id": 2.25, "provider": 5})).unwrap_err();
        let id = err.correlation_id().expect("id recovered");
        assert_eq!(serde_json::to_value(id).unwrap(), json!(2.25));
    }

    #[test]
    fn malformed_payload_keeps_id() {
        let err = decode("call", json!({"id": "abc", "provider": 5})).unwrap_err();
        assert_eq!(err.correlation_id(), Some(&CorrelationId::from("abc")));
        assert_eq!(Failure::from(&err).kind, FailureKind::InvalidAction);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decode("explode", Value::Null).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTag(ref t) if t == "explode"));
        assert!(err.correlation_id().is_none());
    }

    #[test]
    fn events_encode_to_tagged_envelopes() {
        let ret = BusEvent::Return {
            id: CorrelationId::from(1),
            data: json!({"win": 0}),
        };
        assert_eq!(
            serde_json::to_value(ret.to_envelope()).unwrap(),
            json!({"tag": "return", "payload": {"id": 1, "data": {"win": 0}}})
        );

        let init = BusEvent::InitChannel(ChannelId::new("c1"));
        assert_eq!(init.to_envelope(), Envelope::new("initChannel", json!("c1")));

        let failure = BusEvent::Failure {
            id: CorrelationId::from(2),
            error: Failure::new(FailureKind::UnknownProvider, "unknown provider `missing`"),
        };
        assert_eq!(
            failure.to_envelope().payload,
            json!({
                "id": 2,
                "error": {"kind": "UnknownProvider", "message": "unknown provider `missing`"}
            })
        );
        assert_eq!(failure.correlation_id(), Some(&CorrelationId::from(2)));
    }

    #[test]
    fn registry_errors_map_to_kinds() {
        let err = RegistryError::UnknownMethod {
            provider: "p".into(),
            method: "m".into(),
        };
        assert_eq!(Failure::from(&err).kind, FailureKind::UnknownMethod);

        let err = RegistryError::Construction {
            provider_type: "t".into(),
            source: ProviderError::new("offline", "no backend"),
        };
        let failure = Failure::from(&err);
        assert_eq!(failure.kind, FailureKind::ProviderFailure);
        assert_eq!(failure.code.as_deref(), Some("offline"));
    }
}
