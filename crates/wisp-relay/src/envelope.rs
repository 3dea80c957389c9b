//! Frames and envelopes exchanged over the transport.
//!
//! Clients speak JSON objects. The relay only looks at the fields it needs
//! (`type`, `walletAddress`, `to`, `timestamp`); everything else in a routed
//! envelope is forwarded verbatim.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RelayError;
use crate::identity::WalletId;

/// A frame received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame; decoded as UTF-8 JSON like a text frame
    Binary(Vec<u8>),
    /// Keepalive ping, answered with a pong
    Ping(Vec<u8>),
    /// Peer requested close
    Close,
}

/// A frame queued for the transport writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Serialized JSON envelope
    Text(String),
    /// Reply to an inbound ping
    Pong(Vec<u8>),
    /// Close the connection after flushing
    Close,
}

/// An addressed application message.
///
/// Wraps the raw JSON object so unknown fields survive forwarding.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Wrap a JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Application message type (`type`), if any.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Raw destination (`to`), before canonicalization.
    pub fn to(&self) -> Option<&Value> {
        self.0.get("to")
    }

    /// Claimed sender (`from`). Informational only; never verified.
    pub fn sender(&self) -> Option<&str> {
        self.0.get("from").and_then(Value::as_str)
    }

    /// Delivery timestamp in epoch milliseconds, if set.
    pub fn timestamp(&self) -> Option<i64> {
        self.0.get("timestamp").and_then(Value::as_i64)
    }

    /// Set `timestamp` unless the sender already supplied a truthy one.
    pub fn stamp(&mut self, now_millis: i64) {
        let present = self.0.get("timestamp").is_some_and(is_truthy);
        if !present {
            self.0.insert("timestamp".to_string(), Value::from(now_millis));
        }
    }

    /// Access the underlying fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> String {
        // A map of JSON values with string keys always serializes
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// A parsed client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `{"type":"register","walletAddress":"..."}`
    Register {
        /// Raw address as sent by the client
        wallet_address: String,
    },
    /// Any object with a truthy `to`
    Routed(Envelope),
    /// Well-formed JSON the relay has nothing to do with
    Unroutable,
}

impl ClientMessage {
    /// Parse a client frame.
    ///
    /// A `register` frame with no `walletAddress` (or an empty one) falls
    /// through to routing if it carries a `to`. One whose `walletAddress` is
    /// set but not a string is neither registered nor routed.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RelayError::malformed(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(RelayError::malformed("expected a JSON object"));
        };

        if fields.get("type").and_then(Value::as_str) == Some("register") {
            match fields.get("walletAddress") {
                Some(Value::String(addr)) if !addr.is_empty() => {
                    return Ok(Self::Register {
                        wallet_address: addr.clone(),
                    });
                }
                // A claim that can never be an address ends the frame here
                Some(other) if is_truthy(other) => return Ok(Self::Unroutable),
                _ => {}
            }
        }

        if fields.get("to").is_some_and(is_truthy) {
            return Ok(Self::Routed(Envelope::new(fields)));
        }

        Ok(Self::Unroutable)
    }

    /// Parse a binary frame as UTF-8 JSON.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, RelayError> {
        let text = std::str::from_utf8(bytes).map_err(|e| RelayError::malformed(e.to_string()))?;
        Self::parse(text)
    }
}

/// Messages the relay itself originates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Registration acknowledgement
    Registered {
        /// Canonical identity now bound to the connection
        #[serde(rename = "walletAddress")]
        wallet_address: WalletId,
    },
}

impl ServerMessage {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> String {
        // Serializing a plain enum of strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ADDR: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn envelope(value: Value) -> Envelope {
        match value {
            Value::Object(map) => Envelope::new(map),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_parse_register() {
        let msg = ClientMessage::parse(&format!(
            r#"{{"type":"register","walletAddress":"{ADDR}"}}"#
        ))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Register {
                wallet_address: ADDR.to_string()
            }
        );
    }

    #[test]
    fn test_parse_register_without_address_is_unroutable() {
        let msg = ClientMessage::parse(r#"{"type":"register"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unroutable);

        let msg = ClientMessage::parse(r#"{"type":"register","walletAddress":""}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unroutable);
    }

    #[test]
    fn test_parse_register_without_address_but_with_to_is_routed() {
        let msg = ClientMessage::parse(&format!(r#"{{"type":"register","to":"{ADDR}"}}"#)).unwrap();
        assert!(matches!(msg, ClientMessage::Routed(_)));
    }

    #[test]
    fn test_parse_register_with_non_string_address_is_neither_registered_nor_routed() {
        for address in [json!(123), json!(true), json!({"addr": ADDR}), json!([ADDR])] {
            let body = json!({"type": "register", "walletAddress": address, "to": ADDR});
            assert_eq!(
                ClientMessage::parse(&body.to_string()).unwrap(),
                ClientMessage::Unroutable,
                "walletAddress = {address}"
            );
        }

        // Falsy non-string values still fall through to routing
        let body = json!({"type": "register", "walletAddress": 0, "to": ADDR});
        assert!(matches!(
            ClientMessage::parse(&body.to_string()).unwrap(),
            ClientMessage::Routed(_)
        ));
    }

    #[test]
    fn test_parse_routed_keeps_fields() {
        let msg = ClientMessage::parse(&format!(
            r#"{{"type":"msg","to":"{ADDR}","from":"0xabc","text":"hi","nested":{{"a":[1,2]}}}}"#
        ))
        .unwrap();
        let ClientMessage::Routed(env) = msg else {
            panic!("expected routed");
        };
        assert_eq!(env.kind(), Some("msg"));
        assert_eq!(env.to(), Some(&json!(ADDR)));
        assert_eq!(env.sender(), Some("0xabc"));
        assert_eq!(env.fields()["nested"], json!({"a": [1, 2]}));
    }

    #[test]
    fn test_to_json_round_trips_fields() {
        let value = json!({"type": "msg", "to": ADDR, "n": 3, "body": {"a": [1, null]}});
        let env = envelope(value.clone());
        let parsed: Value = serde_json::from_str(&env.to_json()).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_parse_falsy_to_is_unroutable() {
        for body in [r#"{"to":""}"#, r#"{"to":null}"#, r#"{"to":0}"#, r#"{"text":"hi"}"#] {
            assert_eq!(ClientMessage::parse(body).unwrap(), ClientMessage::Unroutable);
        }
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(RelayError::MalformedFrame(_))
        ));
        assert!(matches!(
            ClientMessage::parse("[1,2,3]"),
            Err(RelayError::MalformedFrame(_))
        ));
        assert!(matches!(
            ClientMessage::parse_bytes(&[0xff, 0xfe]),
            Err(RelayError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_parse_bytes_decodes_json() {
        let msg = ClientMessage::parse_bytes(br#"{"type":"register","walletAddress":"0x1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Register { .. }));
    }

    #[test]
    fn test_stamp_sets_missing_timestamp() {
        let mut env = envelope(json!({"to": ADDR}));
        env.stamp(1_700_000_000_000);
        assert_eq!(env.timestamp(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_stamp_keeps_existing_timestamp() {
        let mut env = envelope(json!({"to": ADDR, "timestamp": 42}));
        env.stamp(1_700_000_000_000);
        assert_eq!(env.timestamp(), Some(42));
    }

    #[test]
    fn test_stamp_replaces_falsy_timestamp() {
        for ts in [json!(0), json!(null), json!(""), json!(false)] {
            let mut env = envelope(json!({"to": ADDR, "timestamp": ts}));
            env.stamp(7);
            assert_eq!(env.timestamp(), Some(7));
        }
    }

    #[test]
    fn test_registered_message_shape() {
        let id: WalletId = ADDR.parse().unwrap();
        let json = ServerMessage::Registered { wallet_address: id }.to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({"type": "registered", "walletAddress": ADDR.to_ascii_lowercase()})
        );
    }
}
