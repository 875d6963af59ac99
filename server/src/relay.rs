//! Realtime event handlers.
//!
//! Per event: validate (already done by [`Command::parse`]), authorize,
//! persist, then broadcast. A record is broadcast only after its write
//! succeeded; any failure goes back to the sender alone.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::RealtimeError;
use crate::protocol::{Command, Coordinates, OrderId, Participants, ServerEvent};
use crate::rooms::RoomId;
use crate::sessions::{SessionGuard, SessionRegistry};
use crate::store::{find_user, to_document, Collection, DocumentStore};
use crate::types::{ChatMessage, LocationUpdate};

pub struct Relay {
    store: Arc<dyn DocumentStore>,
    sessions: Arc<SessionRegistry>,
}

impl Relay {
    pub fn new(store: Arc<dyn DocumentStore>, sessions: Arc<SessionRegistry>) -> Self {
        Self { store, sessions }
    }

    /// Parse and run one inbound frame for `session`.
    pub async fn dispatch(&self, session: &SessionGuard, text: &str) -> Result<(), RealtimeError> {
        match Command::parse(text)? {
            Command::JoinOrderRoom(order_id) => {
                self.join_order_room(session, &order_id);
                Ok(())
            }
            Command::UpdateLocation {
                order_id,
                coordinates,
            } => self.update_location(session, order_id, coordinates).await,
            Command::JoinChatRoom(participants) => {
                self.join_chat_room(session, &participants);
                Ok(())
            }
            Command::SendMessage {
                participants,
                message,
            } => self.send_message(participants, message).await,
        }
    }

    fn join_order_room(&self, session: &SessionGuard, order_id: &OrderId) {
        session.join(RoomId::order(order_id));
        info!(email = %session.email(), order_id = %order_id.as_str(), "joined order room");
    }

    async fn update_location(
        &self,
        session: &SessionGuard,
        order_id: OrderId,
        coordinates: Coordinates,
    ) -> Result<(), RealtimeError> {
        // Role is re-read on every update so revocations apply immediately.
        let user = find_user(self.store.as_ref(), session.email())
            .await
            .map_err(|e| RealtimeError::persistence("Failed to update location", e))?
            .ok_or_else(|| RealtimeError::authorization("User not found"))?;
        if !user.is_delivery_agent() {
            warn!(email = %session.email(), "location update from non-agent rejected");
            return Err(RealtimeError::authorization(
                "unauthorized: Only delivery agents can update location",
            ));
        }

        let update = LocationUpdate {
            order_id: order_id.as_str().to_string(),
            delivery_agent_email: session.email().to_string(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            timestamp: Utc::now(),
        };
        self.persist(Collection::Locations, &update)
            .await
            .map_err(|e| RealtimeError::persistence("Failed to update location", e))?;

        let room = RoomId::order(&order_id);
        let delivered = self
            .sessions
            .broadcast(&room, &ServerEvent::LocationUpdate(update));
        info!(
            order_id = %room,
            lat = coordinates.latitude,
            lng = coordinates.longitude,
            delivered,
            "location update relayed"
        );
        Ok(())
    }

    fn join_chat_room(&self, session: &SessionGuard, participants: &Participants) {
        let room = RoomId::for_participants(participants);
        session.join(room.clone());
        info!(
            email = %session.email(),
            sender = %participants.sender_email,
            receiver = %participants.receiver_email,
            room = %room,
            "joined chat room"
        );
    }

    async fn send_message(
        &self,
        participants: Participants,
        message: String,
    ) -> Result<(), RealtimeError> {
        let room = RoomId::for_participants(&participants);
        let record = ChatMessage {
            sender_email: participants.sender_email,
            receiver_email: participants.receiver_email,
            message,
            timestamp: Utc::now(),
        };
        self.persist(Collection::Messages, &record)
            .await
            .map_err(|e| RealtimeError::persistence("Failed to send message", e))?;

        info!(
            sender = %record.sender_email,
            receiver = %record.receiver_email,
            "message relayed"
        );
        self.sessions
            .broadcast(&room, &ServerEvent::ReceiveMessage(record));
        Ok(())
    }

    async fn persist<T: serde::Serialize>(
        &self,
        collection: Collection,
        record: &T,
    ) -> Result<(), crate::error::StoreError> {
        let doc = to_document(record)?;
        if let Err(e) = self.store.insert_one(collection, doc).await {
            error!(collection = collection.as_str(), "insert failed: {e}");
            return Err(e);
        }
        Ok(())
    }
}
