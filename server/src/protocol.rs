//! Realtime wire protocol.
//!
//! Every frame is a JSON text frame `{"event": <name>, "data": <payload>}`.
//! Inbound frames are validated here, at the boundary, into a typed
//! [`Command`]; relay handlers never see raw payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RealtimeError;
use crate::types::{ChatMessage, LocationUpdate};

// ═══════════════════════════════════════════════════════════════
// Handshake
// ═══════════════════════════════════════════════════════════════

/// First frame of every connection: `{"auth": {"token": "..."}}`.
#[derive(Debug, Default, Deserialize)]
pub struct Handshake {
    #[serde(default)]
    pub auth: HandshakeAuth,
}

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeAuth {
    #[serde(default)]
    pub token: Option<String>,
}

impl Handshake {
    /// Token presented by the client, if any. Unparsable frames count
    /// as "no token".
    pub fn token_from_frame(text: &str) -> Option<String> {
        serde_json::from_str::<Handshake>(text)
            .ok()
            .and_then(|h| h.auth.token)
            .filter(|t| !t.is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════
// Client → Server
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Non-empty opaque order id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderId(String);

impl OrderId {
    pub fn parse(value: &Value) -> Result<Self, RealtimeError> {
        match value.as_str() {
            Some(s) if !s.is_empty() => Ok(Self(s.to_string())),
            _ => Err(RealtimeError::validation("Invalid or missing orderId")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A latitude/longitude pair inside the WGS84 ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn parse(latitude: &Value, longitude: &Value) -> Result<Self, RealtimeError> {
        let (Some(latitude), Some(longitude)) = (latitude.as_f64(), longitude.as_f64()) else {
            return Err(RealtimeError::validation("Invalid latitude or longitude"));
        };
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(RealtimeError::validation(
                "Latitude or longitude out of range",
            ));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// The two participants of a chat, both non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participants {
    pub sender_email: String,
    pub receiver_email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    JoinOrderRoom(OrderId),
    UpdateLocation {
        order_id: OrderId,
        coordinates: Coordinates,
    },
    JoinChatRoom(Participants),
    SendMessage {
        participants: Participants,
        message: String,
    },
}

fn non_empty_str(data: &Value, field: &str) -> Option<String> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| RealtimeError::validation(format!("Malformed event: {e}")))?;
        let data = &envelope.data;

        match envelope.event.as_str() {
            "joinOrderRoom" => Ok(Self::JoinOrderRoom(OrderId::parse(data)?)),
            "updateLocation" => {
                let order_id = OrderId::parse(data.get("orderId").unwrap_or(&Value::Null))?;
                let coordinates = Coordinates::parse(
                    data.get("latitude").unwrap_or(&Value::Null),
                    data.get("longitude").unwrap_or(&Value::Null),
                )?;
                Ok(Self::UpdateLocation {
                    order_id,
                    coordinates,
                })
            }
            "joinChatRoom" => {
                let (Some(sender_email), Some(receiver_email)) = (
                    non_empty_str(data, "senderEmail"),
                    non_empty_str(data, "receiverEmail"),
                ) else {
                    return Err(RealtimeError::validation("Missing fields in chat room request"));
                };
                Ok(Self::JoinChatRoom(Participants {
                    sender_email,
                    receiver_email,
                }))
            }
            "sendMessage" => {
                let (Some(sender_email), Some(receiver_email), Some(message)) = (
                    non_empty_str(data, "senderEmail"),
                    non_empty_str(data, "receiverEmail"),
                    non_empty_str(data, "message"),
                ) else {
                    return Err(RealtimeError::validation("Missing fields in message"));
                };
                Ok(Self::SendMessage {
                    participants: Participants {
                        sender_email,
                        receiver_email,
                    },
                    message,
                })
            }
            other => Err(RealtimeError::validation(format!("Unknown event: {other}"))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Server → Client
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    ConnectError(ErrorPayload),
    LocationUpdate(LocationUpdate),
    ReceiveMessage(ChatMessage),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectedPayload {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RealtimeError> for ServerEvent {
    fn from(err: &RealtimeError) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: err.to_string(),
            error: err.detail(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(text: &str) -> String {
        Command::parse(text).unwrap_err().to_string()
    }

    #[test]
    fn test_parse_join_order_room() {
        assert_eq!(
            Command::parse(r#"{"event":"joinOrderRoom","data":"order-7"}"#).unwrap(),
            Command::JoinOrderRoom(OrderId("order-7".into()))
        );
        assert_eq!(
            parse_err(r#"{"event":"joinOrderRoom","data":""}"#),
            "Invalid or missing orderId"
        );
        assert_eq!(
            parse_err(r#"{"event":"joinOrderRoom","data":42}"#),
            "Invalid or missing orderId"
        );
        assert_eq!(
            parse_err(r#"{"event":"joinOrderRoom"}"#),
            "Invalid or missing orderId"
        );
    }

    #[test]
    fn test_parse_update_location() {
        let cmd = Command::parse(
            r#"{"event":"updateLocation","data":{"orderId":"o1","latitude":-90,"longitude":180}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::UpdateLocation {
                order_id: OrderId("o1".into()),
                coordinates: Coordinates {
                    latitude: -90.0,
                    longitude: 180.0
                },
            }
        );

        assert_eq!(
            parse_err(r#"{"event":"updateLocation","data":{"latitude":1,"longitude":1}}"#),
            "Invalid or missing orderId"
        );
        assert_eq!(
            parse_err(
                r#"{"event":"updateLocation","data":{"orderId":"o1","latitude":"1","longitude":1}}"#
            ),
            "Invalid latitude or longitude"
        );
    }

    #[test]
    fn test_coordinates_out_of_range() {
        for (lat, lng) in [(90.5, 0.0), (-90.01, 0.0), (0.0, 180.5), (0.0, -181.0)] {
            let err = Coordinates::parse(&Value::from(lat), &Value::from(lng)).unwrap_err();
            assert_eq!(err.to_string(), "Latitude or longitude out of range");
        }
        assert!(Coordinates::parse(&Value::from(90.0), &Value::from(-180.0)).is_ok());
    }

    #[test]
    fn test_parse_chat_events() {
        let cmd = Command::parse(
            r#"{"event":"sendMessage","data":{"senderEmail":"a@x.com","receiverEmail":"b@x.com","message":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(cmd, Command::SendMessage { ref message, .. } if message == "hi"));

        assert_eq!(
            parse_err(
                r#"{"event":"sendMessage","data":{"senderEmail":"a@x.com","receiverEmail":"b@x.com","message":""}}"#
            ),
            "Missing fields in message"
        );
        assert_eq!(
            parse_err(r#"{"event":"joinChatRoom","data":{"senderEmail":"a@x.com"}}"#),
            "Missing fields in chat room request"
        );
    }

    #[test]
    fn test_parse_malformed_frames() {
        assert!(parse_err("not json").starts_with("Malformed event"));
        assert_eq!(parse_err(r#"{"event":"dance","data":{}}"#), "Unknown event: dance");
    }

    #[test]
    fn test_handshake_token() {
        assert_eq!(
            Handshake::token_from_frame(r#"{"auth":{"token":"abc"}}"#).as_deref(),
            Some("abc")
        );
        assert_eq!(Handshake::token_from_frame(r#"{"auth":{}}"#), None);
        assert_eq!(Handshake::token_from_frame(r#"{"auth":{"token":""}}"#), None);
        assert_eq!(Handshake::token_from_frame("garbage"), None);
    }

    #[test]
    fn test_server_event_encoding() {
        let err = RealtimeError::validation("Invalid or missing orderId");
        let json = serde_json::to_value(ServerEvent::from(&err)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "error", "data": {"message": "Invalid or missing orderId"}})
        );
    }
}
