//! In-memory test doubles for the external service boundary.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use crate::error::FetchError;
use crate::protocol::{IdentityRef, Message, RoomKey, UserPresence};
use crate::service::RoomDataService;

/// Install a test-writer subscriber once so `RUST_LOG` surfaces loop
/// diagnostics in test output.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted in-memory service: tests stage snapshots, pollers fetch them.
pub(crate) struct FakeRoomService {
    messages: Mutex<Vec<Message>>,
    users: Mutex<Vec<UserPresence>>,
    message_fetches: AtomicUsize,
    user_fetches: AtomicUsize,
    profile_fetches: AtomicUsize,
    fail_messages: AtomicBool,
    fail_users: AtomicBool,
    fail_profiles: AtomicBool,
    next_post_id: AtomicU64,
}

impl FakeRoomService {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            users: Mutex::new(Vec::new()),
            message_fetches: AtomicUsize::new(0),
            user_fetches: AtomicUsize::new(0),
            profile_fetches: AtomicUsize::new(0),
            fail_messages: AtomicBool::new(false),
            fail_users: AtomicBool::new(false),
            fail_profiles: AtomicBool::new(false),
            next_post_id: AtomicU64::new(1000),
        }
    }

    pub fn push_message(&self, message: Message) {
        self.messages.lock().push(message);
    }

    pub fn set_users(&self, users: Vec<UserPresence>) {
        *self.users.lock() = users;
    }

    pub fn message_fetches(&self) -> usize {
        self.message_fetches.load(Ordering::Relaxed)
    }

    pub fn user_fetches(&self) -> usize {
        self.user_fetches.load(Ordering::Relaxed)
    }

    pub fn profile_fetches(&self) -> usize {
        self.profile_fetches.load(Ordering::Relaxed)
    }

    pub fn fail_message_fetches(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::Relaxed);
    }

    pub fn fail_user_fetches(&self, fail: bool) {
        self.fail_users.store(fail, Ordering::Relaxed);
    }

    pub fn fail_profile_fetches(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl RoomDataService for FakeRoomService {
    async fn fetch_messages(&self, _room: &RoomKey) -> Result<Vec<Message>, FetchError> {
        self.message_fetches.fetch_add(1, Ordering::Relaxed);
        if self.fail_messages.load(Ordering::Relaxed) {
            return Err(FetchError::Network("message fetch refused".into()));
        }
        Ok(self.messages.lock().clone())
    }

    async fn fetch_users(&self, _room: &RoomKey) -> Result<Vec<UserPresence>, FetchError> {
        self.user_fetches.fetch_add(1, Ordering::Relaxed);
        if self.fail_users.load(Ordering::Relaxed) {
            return Err(FetchError::Network("user fetch refused".into()));
        }
        Ok(self.users.lock().clone())
    }

    async fn fetch_profile_image(
        &self,
        identity: &IdentityRef,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        self.profile_fetches.fetch_add(1, Ordering::Relaxed);
        if self.fail_profiles.load(Ordering::Relaxed) {
            return Err(FetchError::Network("profile fetch refused".into()));
        }
        Ok(Some(identity.id.as_bytes().to_vec()))
    }

    async fn post_message(&self, _room: &RoomKey, text: &str) -> Result<Message, FetchError> {
        let message = Message {
            id: self.next_post_id.fetch_add(1, Ordering::Relaxed),
            content: text.to_string(),
            posted_by: identity("poster"),
            posted_at: Utc::now(),
        };
        self.messages.lock().push(message.clone());
        Ok(message)
    }
}

pub(crate) fn identity(id: &str) -> IdentityRef {
    IdentityRef {
        id: id.into(),
        display_name: format!("User {id}"),
    }
}

pub(crate) fn message(id: u64, author: &str, posted_secs: i64) -> Message {
    Message {
        id,
        content: format!("message {id}"),
        posted_by: identity(author),
        posted_at: Utc.timestamp_opt(posted_secs, 0).unwrap(),
    }
}

pub(crate) fn presence(
    id: &str,
    joined_secs: i64,
    activity_secs: i64,
    online: bool,
) -> UserPresence {
    UserPresence {
        user: identity(id),
        joined_at: Utc.timestamp_opt(joined_secs, 0).unwrap(),
        last_activity: Utc.timestamp_opt(activity_secs, 0).unwrap(),
        online,
    }
}
