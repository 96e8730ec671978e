use bytes::Bytes;
use serde_json::Value;

use crate::domain::errors::DecodeError;

/// Raw message as handed over by the broker client
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    subject: String,
    payload: Bytes,
}

impl BrokerMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Decoded JSON payload, forwarded verbatim as the webhook body
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEnvelope(Value);

impl BroadcastEnvelope {
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(raw)?;
        let value = serde_json::from_str(text)?;
        Ok(Self(value))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for BroadcastEnvelope {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
