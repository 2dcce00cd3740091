//! Process-wide profile cache.
//!
//! Deduplicates identity-image fetches across all room pollers and hands
//! each newly seen identity a deterministic display color from a fixed
//! cyclic palette. Entries are created once and never overwritten.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::error::CacheError;
use crate::protocol::IdentityRef;
use crate::service::RoomDataService;

/// Bounded wait for the slot-map lock; a miss surfaces as a transient
/// [`CacheError::LockTimeout`] and the caller retries next cycle.
const LOCK_WAIT: Duration = Duration::from_secs(2);

/// ARGB display color assigned to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileColor {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ProfileColor {
    /// Parse a `#aarrggbb` literal.
    fn from_argb_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 8 {
            return None;
        }
        let value = u32::from_str_radix(digits, 16).ok()?;
        Some(Self {
            a: (value >> 24) as u8,
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        })
    }
}

/// The fixed palette, cycled in entry-creation order.
static DEFAULT_PALETTE: Lazy<Vec<ProfileColor>> = Lazy::new(|| {
    ["#ffff6138", "#ff00a388", "#fffffb8c", "#ffbeeb9f", "#ff79bd8f"]
        .iter()
        .map(|hex| ProfileColor::from_argb_hex(hex).expect("palette literals are well-formed"))
        .collect()
});

/// Cached display data for one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileEntry {
    pub identity: IdentityRef,
    /// Raw image bytes; `None` when the identity has no image or the fetch
    /// failed. Color assignment does not depend on fetch success.
    pub image: Option<Vec<u8>>,
    pub color: ProfileColor,
}

/// Shared, internally synchronized cache of [`ProfileEntry`] values.
///
/// The slot-map mutex guards lookup and insertion only; image fetches run
/// outside it. Per-identity single-flight comes from the slot's
/// [`OnceCell`]: the first caller initializes, concurrent callers wait and
/// share the same entry.
pub struct ProfileImageCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<ProfileEntry>>>>,
    created: AtomicUsize,
}

impl ProfileImageCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Look up an identity without triggering a fetch.
    pub fn get(&self, identity_id: &str) -> Result<Option<ProfileEntry>, CacheError> {
        let slots = self
            .slots
            .try_lock_for(LOCK_WAIT)
            .ok_or(CacheError::LockTimeout(LOCK_WAIT))?;
        Ok(slots.get(identity_id).and_then(|slot| slot.get().cloned()))
    }

    /// Number of entries created so far.
    pub fn len(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Idempotent ensure: the first caller for an identity performs the
    /// image fetch and receives the next palette color; every other caller,
    /// concurrent or later, observes the identical entry with no extra
    /// fetch.
    pub async fn ensure(
        &self,
        service: &dyn RoomDataService,
        identity: &IdentityRef,
    ) -> Result<ProfileEntry, CacheError> {
        let slot = {
            let mut slots = self
                .slots
                .try_lock_for(LOCK_WAIT)
                .ok_or(CacheError::LockTimeout(LOCK_WAIT))?;
            Arc::clone(slots.entry(identity.id.clone()).or_default())
        };

        // The map lock is released; the fetch below never runs under it.
        let entry = slot
            .get_or_init(|| async {
                let image = match service.fetch_profile_image(identity).await {
                    Ok(image) => image,
                    Err(err) => {
                        warn!(identity = %identity.id, error = %err, "profile image fetch failed");
                        None
                    }
                };
                let ordinal = self.created.fetch_add(1, Ordering::Relaxed);
                ProfileEntry {
                    identity: identity.clone(),
                    image,
                    color: DEFAULT_PALETTE[ordinal % DEFAULT_PALETTE.len()],
                }
            })
            .await;

        Ok(entry.clone())
    }

    /// Fill the cache for every identity in a batch, first-seen order.
    pub async fn ensure_all<'a, I>(
        &self,
        service: &dyn RoomDataService,
        identities: I,
    ) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = &'a IdentityRef>,
    {
        for identity in identities {
            self.ensure(service, identity).await?;
        }
        Ok(())
    }
}

impl Default for ProfileImageCache {
    fn default() -> Self {
        Self::new()
    }
}
