//! Records exchanged with the document store and relayed to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored document: a JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

// ═══════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Customer,
    DeliveryAgent,
    Admin,
    /// Any role string this server does not know about.
    #[serde(other)]
    Unknown,
}

/// The slice of a user document the realtime relay reads. User
/// documents are schemaless, so only `role` is interpreted and any
/// other field may hold anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub role: Option<Role>,
}

impl UserRecord {
    pub fn from_document(doc: &Document) -> Self {
        let role = doc
            .get("role")
            .and_then(|v| serde_json::from_value::<Role>(v.clone()).ok());
        Self { role }
    }

    pub fn is_delivery_agent(&self) -> bool {
        self.role == Some(Role::DeliveryAgent)
    }
}

// ═══════════════════════════════════════════════════════════════
// Relayed records
// ═══════════════════════════════════════════════════════════════

/// One delivery agent position report. Appended, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub order_id: String,
    pub delivery_agent_email: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// One chat message between two participants. Appended, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_email: String,
    pub receiver_email: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════
// Store write results
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
    pub acknowledged: bool,
    pub inserted_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(value: serde_json::Value) -> UserRecord {
        UserRecord::from_document(value.as_object().unwrap())
    }

    #[test]
    fn test_user_record_roles() {
        assert!(user(json!({"email": "d@x.com", "role": "deliveryAgent"})).is_delivery_agent());

        let odd = user(json!({"email": "o@x.com", "role": "courier"}));
        assert_eq!(odd.role, Some(Role::Unknown));
        assert!(!odd.is_delivery_agent());

        assert_eq!(user(json!({"email": "b@x.com"})).role, None);
        assert_eq!(user(json!({"role": 7})).role, None);
    }

    #[test]
    fn test_user_record_ignores_other_fields() {
        let agent = user(json!({"email": 42, "role": "deliveryAgent", "isBlock": "false"}));
        assert!(agent.is_delivery_agent());
    }

    #[test]
    fn test_location_update_wire_names() {
        let update = LocationUpdate {
            order_id: "o1".into(),
            delivery_agent_email: "d@x.com".into(),
            latitude: 23.8,
            longitude: 90.4,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["orderId"], "o1");
        assert_eq!(value["deliveryAgentEmail"], "d@x.com");
        assert!(value["timestamp"].is_string());
    }
}
