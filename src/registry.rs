//! Registry of live room monitors and the listener fan-out.
//!
//! The registry owns the authoritative map of watched rooms, enforces the
//! one-monitor-per-room invariant, and re-emits every monitor's events,
//! tagged with the originating room key, to all registered listeners.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::WatchConfig;
use crate::error::RegistryError;
use crate::monitor::{MonitorChannels, RoomMonitor};
use crate::profiles::ProfileImageCache;
use crate::protocol::{Message, RoomEvent, RoomKey};
use crate::service::RoomDataService;

/// Bounded wait for the monitor-map lock.
const LOCK_WAIT: Duration = Duration::from_secs(2);

type MonitorMap = Arc<Mutex<HashMap<RoomKey, RoomMonitor>>>;
type ListenerList = Arc<Mutex<Vec<Sender<RoomEvent>>>>;

/// Creates and retires [`RoomMonitor`]s and routes their events.
///
/// Construct one at application start and hand references to consumers;
/// the registry is internally synchronized.
pub struct MonitorRegistry {
    config: WatchConfig,
    service: Arc<dyn RoomDataService>,
    cache: Arc<ProfileImageCache>,
    monitors: MonitorMap,
    listeners: ListenerList,
}

impl MonitorRegistry {
    pub fn new(config: WatchConfig, service: Arc<dyn RoomDataService>) -> Self {
        Self {
            config,
            service,
            cache: Arc::new(ProfileImageCache::new()),
            monitors: Arc::new(Mutex::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The shared profile cache, for listeners resolving display data.
    pub fn profiles(&self) -> Arc<ProfileImageCache> {
        Arc::clone(&self.cache)
    }

    /// Register a listener. Every event from every monitored room is cloned
    /// to each subscriber; a dropped receiver is pruned on the next fan-out.
    pub fn subscribe(&self) -> Receiver<RoomEvent> {
        let (tx, rx) = unbounded();
        self.listeners.lock().push(tx);
        rx
    }

    /// Start watching a room. Starting an already-watched key is a no-op
    /// returning the live handle. Must be called within a tokio runtime.
    pub fn start_monitoring(&self, key: RoomKey) -> Result<RoomMonitor, RegistryError> {
        let mut monitors = self.lock_monitors()?;
        if let Some(existing) = monitors.get(&key) {
            return Ok(existing.clone());
        }

        // Spawning tasks under the lock is fine; it never touches I/O.
        let (monitor, channels) = RoomMonitor::spawn(
            key.clone(),
            &self.config,
            Arc::clone(&self.service),
            Arc::clone(&self.cache),
        )?;
        monitors.insert(key.clone(), monitor.clone());
        drop(monitors);

        self.spawn_forwarder(key, channels);
        Ok(monitor)
    }

    /// Request cancellation of a room's monitor. Fire-and-forget: the entry
    /// stays in the map until both loops have actually stopped, which is
    /// announced by [`RoomEvent::PollingComplete`].
    pub fn stop_monitoring(&self, key: &RoomKey) -> Result<bool, RegistryError> {
        let monitors = self.lock_monitors()?;
        match monitors.get(key) {
            Some(monitor) => {
                monitor.stop();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether the room currently has a live monitor.
    pub fn is_monitoring(&self, key: &RoomKey) -> Result<bool, RegistryError> {
        Ok(self.lock_monitors()?.contains_key(key))
    }

    /// Cut both of a room's waits short so the next fetches happen promptly.
    pub fn poll_now(&self, key: &RoomKey) -> Result<bool, RegistryError> {
        let monitors = self.lock_monitors()?;
        match monitors.get(key) {
            Some(monitor) => {
                monitor.poll_now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Post a message through the service, then poll promptly so the sender
    /// sees their own post without waiting out the backoff interval.
    pub async fn post_message(
        &self,
        key: &RoomKey,
        text: &str,
    ) -> Result<Message, RegistryError> {
        // The service call completes before any registry lock is taken.
        let message = self.service.post_message(key, text).await?;
        if let Err(err) = self.poll_now(key) {
            warn!(room = %key, error = %err, "posted but could not trigger prompt poll");
        }
        Ok(message)
    }

    fn lock_monitors(&self) -> Result<parking_lot::MutexGuard<'_, HashMap<RoomKey, RoomMonitor>>, RegistryError> {
        self.monitors
            .try_lock_for(LOCK_WAIT)
            .ok_or(RegistryError::LockTimeout(LOCK_WAIT))
    }

    /// Consume one monitor's event channels until both close, fanning every
    /// event out to the listeners; then retire the map entry and announce
    /// completion.
    fn spawn_forwarder(&self, key: RoomKey, mut channels: MonitorChannels) {
        let monitors = Arc::clone(&self.monitors);
        let listeners = Arc::clone(&self.listeners);

        tokio::spawn(async move {
            let mut messages_open = true;
            let mut users_open = true;

            while messages_open || users_open {
                tokio::select! {
                    batch = channels.messages.recv(), if messages_open => match batch {
                        Some(messages) => fan_out(
                            &listeners,
                            RoomEvent::NewMessages {
                                room: key.clone(),
                                messages,
                            },
                        ),
                        None => messages_open = false,
                    },
                    snapshot = channels.users.recv(), if users_open => match snapshot {
                        Some(users) => fan_out(
                            &listeners,
                            RoomEvent::UsersChanged {
                                room: key.clone(),
                                users,
                            },
                        ),
                        None => users_open = false,
                    },
                }
            }

            // Both loops are done. Retire the monitor before announcing so
            // a listener reacting to the announcement can restart the room
            // and get a fresh monitor, not the dead one.
            monitors.lock().remove(&key);
            fan_out(&listeners, RoomEvent::PollingComplete { room: key.clone() });
            debug!(room = %key, "polling complete");
        });
    }
}

/// Clone the event to every listener still alive, pruning the rest.
fn fan_out(listeners: &ListenerList, event: RoomEvent) {
    listeners
        .lock()
        .retain(|listener| listener.send(event.clone()).is_ok());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollerConfig;
    use crate::testutil::FakeRoomService;

    fn fast_config() -> WatchConfig {
        WatchConfig {
            messages: PollerConfig {
                min_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(60),
            },
            users: PollerConfig {
                min_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(60),
            },
        }
    }

    fn room(id: u64) -> RoomKey {
        RoomKey::new("https://tfs.example.com/Main", id).unwrap()
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let registry = MonitorRegistry::new(fast_config(), Arc::new(FakeRoomService::new()));

        let first = registry.start_monitoring(room(1)).unwrap();
        let second = registry.start_monitoring(room(1)).unwrap();
        assert_eq!(first.key(), second.key());
        assert_eq!(registry.monitors.lock().len(), 1);
        assert!(registry.is_monitoring(&room(1)).unwrap());

        first.stop();
    }

    #[tokio::test]
    async fn test_unknown_room_is_not_monitored() {
        let registry = MonitorRegistry::new(fast_config(), Arc::new(FakeRoomService::new()));
        assert!(!registry.is_monitoring(&room(9)).unwrap());
        assert!(!registry.stop_monitoring(&room(9)).unwrap());
        assert!(!registry.poll_now(&room(9)).unwrap());
    }

    #[tokio::test]
    async fn test_fan_out_prunes_dropped_listeners() {
        let listeners: ListenerList = Arc::new(Mutex::new(Vec::new()));
        let (alive_tx, alive_rx) = unbounded();
        let (dead_tx, dead_rx) = unbounded();
        listeners.lock().push(alive_tx);
        listeners.lock().push(dead_tx);
        drop(dead_rx);

        fan_out(&listeners, RoomEvent::PollingComplete { room: room(1) });

        assert_eq!(listeners.lock().len(), 1);
        assert!(matches!(
            alive_rx.try_recv(),
            Ok(RoomEvent::PollingComplete { .. })
        ));
    }
}
