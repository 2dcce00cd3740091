//! Per-room monitor owning one message poller and one user poller.

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::WatchConfig;
use crate::error::ConfigError;
use crate::poller::{run_message_poller, run_user_poller, PollerContext};
use crate::profiles::ProfileImageCache;
use crate::protocol::{Message, RoomKey, UserPresence};
use crate::service::RoomDataService;

/// Events buffered per channel before a poller awaits the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Handle to one room's pair of watch loops.
///
/// Cloning is cheap; every clone controls the same loops. The handle never
/// blocks: `stop()` requests cancellation and returns, and completion is
/// only observable through the monitor's channels closing.
#[derive(Clone)]
pub struct RoomMonitor {
    key: RoomKey,
    cancel: CancellationToken,
    message_poll_now: Arc<Notify>,
    user_poll_now: Arc<Notify>,
}

/// Receiving ends of a monitor's event streams, one channel per event kind.
///
/// Each poller owns its sender and drops it when its loop reaches the
/// terminal state, so a closed channel doubles as that loop's completion
/// flag. "Polling complete" is exactly the moment both are closed.
pub struct MonitorChannels {
    pub messages: mpsc::Receiver<Vec<Message>>,
    pub users: mpsc::Receiver<Vec<UserPresence>>,
}

impl RoomMonitor {
    /// Validate the configuration and start both pollers immediately; there
    /// is no lazy start. Must be called within a tokio runtime.
    pub fn spawn(
        key: RoomKey,
        config: &WatchConfig,
        service: Arc<dyn RoomDataService>,
        cache: Arc<ProfileImageCache>,
    ) -> Result<(Self, MonitorChannels), ConfigError> {
        // Bad bounds fail here, synchronously, never mid-loop.
        let message_backoff = config.messages.backoff()?;
        let user_backoff = config.users.backoff()?;

        let cancel = CancellationToken::new();
        let message_poll_now = Arc::new(Notify::new());
        let user_poll_now = Arc::new(Notify::new());

        let (message_tx, message_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (user_tx, user_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(run_message_poller(
            PollerContext {
                room: key.clone(),
                config: config.messages,
                backoff: message_backoff,
                service: Arc::clone(&service),
                cache: Arc::clone(&cache),
                cancel: cancel.clone(),
                poll_now: Arc::clone(&message_poll_now),
            },
            message_tx,
        ));
        tokio::spawn(run_user_poller(
            PollerContext {
                room: key.clone(),
                config: config.users,
                backoff: user_backoff,
                service,
                cache,
                cancel: cancel.clone(),
                poll_now: Arc::clone(&user_poll_now),
            },
            user_tx,
        ));

        debug!(room = %key, "room monitor started");

        Ok((
            Self {
                key,
                cancel,
                message_poll_now,
                user_poll_now,
            },
            MonitorChannels {
                messages: message_rx,
                users: user_rx,
            },
        ))
    }

    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    /// Request cancellation of both loops and return without waiting for
    /// their exit. An in-flight fetch may still complete first.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Cut the current wait short on both loops so the next fetch happens
    /// promptly (used right after posting a message).
    pub fn poll_now(&self) {
        self.message_poll_now.notify_one();
        self.user_poll_now.notify_one();
    }
}
