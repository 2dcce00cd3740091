//! Boundary to the external room-data service.
//!
//! The core never talks to the network itself; implementations of
//! [`RoomDataService`] live in the embedding application's HTTP/identity
//! layer. Every snapshot call returns the full currently-visible state of
//! the room, never a delta.

use async_trait::async_trait;

use crate::error::FetchError;
use crate::protocol::{IdentityRef, Message, RoomKey, UserPresence};

/// Remote operations the watch core delegates to.
#[async_trait]
pub trait RoomDataService: Send + Sync {
    /// Full currently-visible message set for the room.
    async fn fetch_messages(&self, room: &RoomKey) -> Result<Vec<Message>, FetchError>;

    /// Full roster snapshot for the room.
    async fn fetch_users(&self, room: &RoomKey) -> Result<Vec<UserPresence>, FetchError>;

    /// Best-effort profile image fetch; `Ok(None)` means the identity has
    /// no image, which is not a failure.
    async fn fetch_profile_image(
        &self,
        identity: &IdentityRef,
    ) -> Result<Option<Vec<u8>>, FetchError>;

    /// Post a message to the room, returning it as the service recorded it.
    async fn post_message(&self, room: &RoomKey, text: &str) -> Result<Message, FetchError>;
}
