//! Shared data types and the typed events delivered to listeners.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Identifies one monitored room: a collection endpoint plus a numeric room id.
///
/// Immutable once built; used as the registry's lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomKey {
    collection: String,
    room_id: u64,
}

impl RoomKey {
    /// Build a key, rejecting an empty collection endpoint or a zero room id.
    pub fn new(collection: impl Into<String>, room_id: u64) -> Result<Self, ConfigError> {
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(ConfigError::MalformedRoomKey(
                "collection endpoint cannot be empty".into(),
            ));
        }
        if room_id == 0 {
            return Err(ConfigError::MalformedRoomKey(
                "room id must be greater than zero".into(),
            ));
        }
        Ok(Self {
            collection,
            room_id,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn room_id(&self) -> u64 {
        self.room_id
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.collection, self.room_id)
    }
}

/// Reference to a user identity as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRef {
    /// Service-assigned identity id, unique per collection.
    pub id: String,
    pub display_name: String,
}

/// A single chat message. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the room.
    pub id: u64,
    pub content: String,
    pub posted_by: IdentityRef,
    pub posted_at: DateTime<Utc>,
}

/// One entry of a room's presence snapshot.
///
/// The same identity reappears in every snapshot with fresh activity fields;
/// snapshots are full state, not diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPresence {
    pub user: IdentityRef,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub online: bool,
}

/// Events sent from the core to registered listeners (the UI layer).
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// New messages appeared, sorted by posted time ascending.
    NewMessages {
        room: RoomKey,
        messages: Vec<Message>,
    },
    /// The roster changed; carries the full current snapshot.
    UsersChanged {
        room: RoomKey,
        users: Vec<UserPresence>,
    },
    /// Both watch loops for the room have stopped.
    PollingComplete { room: RoomKey },
}

impl RoomEvent {
    /// The room this event originated from.
    pub fn room(&self) -> &RoomKey {
        match self {
            RoomEvent::NewMessages { room, .. } => room,
            RoomEvent::UsersChanged { room, .. } => room,
            RoomEvent::PollingComplete { room } => room,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_key_validation() {
        assert!(RoomKey::new("https://tfs.example.com/DefaultCollection", 42).is_ok());
        assert!(RoomKey::new("", 42).is_err());
        assert!(RoomKey::new("   ", 42).is_err());
        assert!(RoomKey::new("https://tfs.example.com/DefaultCollection", 0).is_err());
    }

    #[test]
    fn test_room_key_display() {
        let key = RoomKey::new("https://tfs.example.com/Main", 7).unwrap();
        assert_eq!(key.to_string(), "https://tfs.example.com/Main#7");
    }

    #[test]
    fn test_event_room_accessor() {
        let key = RoomKey::new("c", 1).unwrap();
        let event = RoomEvent::PollingComplete { room: key.clone() };
        assert_eq!(event.room(), &key);
    }
}
