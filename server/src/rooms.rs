//! Room identifiers.

use std::fmt;

use crate::protocol::{OrderId, Participants};

const CHAT_SEPARATOR: char = '_';

/// A broadcast group. Order and chat rooms never collide, even when
/// their textual ids do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Tracking room for one order; id is the order id itself.
    Order(String),
    /// Private room for two participants.
    Chat(String),
}

impl RoomId {
    pub fn order(order_id: &OrderId) -> Self {
        Self::Order(order_id.as_str().to_string())
    }

    /// Both participants compute the same id independently.
    pub fn chat(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self::Chat(format!("{first}{CHAT_SEPARATOR}{second}"))
    }

    pub fn for_participants(p: &Participants) -> Self {
        Self::chat(&p.sender_email, &p.receiver_email)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Order(id) | Self::Chat(id) => id,
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_room_is_symmetric() {
        let pairs = [
            ("a@x.com", "b@x.com"),
            ("zed@x.com", "amy@x.com"),
            ("same@x.com", "same@x.com"),
            ("B@x.com", "a@x.com"),
        ];
        for (a, b) in pairs {
            assert_eq!(RoomId::chat(a, b), RoomId::chat(b, a));
        }
    }

    #[test]
    fn test_chat_room_id() {
        assert_eq!(RoomId::chat("b@x.com", "a@x.com").as_str(), "a@x.com_b@x.com");
        // Byte order: uppercase sorts before lowercase.
        assert_eq!(RoomId::chat("a@x.com", "B@x.com").as_str(), "B@x.com_a@x.com");
    }

    #[test]
    fn test_order_and_chat_namespaces() {
        let order = RoomId::Order("a@x.com_b@x.com".into());
        let chat = RoomId::chat("a@x.com", "b@x.com");
        assert_eq!(order.as_str(), chat.as_str());
        assert_ne!(order, chat);
    }
}
