//! The two watch loops behind a room monitor.
//!
//! Both loops share one shape: fetch a snapshot immediately on start, diff
//! it against the last known state, emit a change event when something new
//! is found, then wait out the backoff interval before the next cycle. The
//! wait is a single cancellable select, so `stop()` and "poll now" take
//! effect without waiting out the remaining interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::config::PollerConfig;
use crate::error::CacheError;
use crate::profiles::ProfileImageCache;
use crate::protocol::{IdentityRef, Message, RoomKey, UserPresence};
use crate::service::RoomDataService;

/// Free functions (rather than closures) so the reference-returning signature
/// is higher-ranked over the borrow, which the spawned futures require.
fn message_author(m: &Message) -> &IdentityRef {
    &m.posted_by
}

fn presence_user(u: &UserPresence) -> &IdentityRef {
    &u.user
}

/// Everything one poller's loop needs; built by the monitor at spawn time.
pub(crate) struct PollerContext<B: BackoffPolicy> {
    pub room: RoomKey,
    pub config: PollerConfig,
    pub backoff: B,
    pub service: Arc<dyn RoomDataService>,
    pub cache: Arc<ProfileImageCache>,
    pub cancel: CancellationToken,
    pub poll_now: Arc<Notify>,
}

/// Pacing state owned exclusively by one poller's loop.
struct PollState {
    interval: Duration,
    last_change: DateTime<Utc>,
}

impl PollState {
    fn new() -> Self {
        Self {
            interval: Duration::ZERO,
            last_change: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// Watch loop for new messages.
///
/// The event sender is dropped when the loop exits; the closed channel is
/// this loop's completion signal to the monitor's consumer.
pub(crate) async fn run_message_poller<B: BackoffPolicy>(
    ctx: PollerContext<B>,
    events: mpsc::Sender<Vec<Message>>,
) {
    let mut state = PollState::new();
    let mut delivered: HashSet<u64> = HashSet::new();

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let outcome = match ctx.service.fetch_messages(&ctx.room).await {
            Ok(snapshot) => {
                match deliver_new_messages(&ctx, &mut state, &mut delivered, snapshot, &events)
                    .await
                {
                    Ok(changed) => Some(changed),
                    Err(err) => {
                        warn!(room = %ctx.room, error = %err, "cycle deferred, retrying next poll");
                        None
                    }
                }
            }
            Err(err) => {
                warn!(room = %ctx.room, error = %err, "message fetch failed");
                None
            }
        };

        advance_interval(&ctx, &mut state, outcome);

        if !wait_for_next_cycle(&ctx.cancel, &ctx.poll_now, state.interval).await {
            break;
        }
    }

    debug!(room = %ctx.room, "message poller stopped");
}

/// Watch loop for roster/presence changes.
pub(crate) async fn run_user_poller<B: BackoffPolicy>(
    ctx: PollerContext<B>,
    events: mpsc::Sender<Vec<UserPresence>>,
) {
    let mut state = PollState::new();

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let outcome = match ctx.service.fetch_users(&ctx.room).await {
            Ok(snapshot) => match deliver_user_changes(&ctx, &mut state, snapshot, &events).await {
                Ok(changed) => Some(changed),
                Err(err) => {
                    warn!(room = %ctx.room, error = %err, "cycle deferred, retrying next poll");
                    None
                }
            },
            Err(err) => {
                warn!(room = %ctx.room, error = %err, "user fetch failed");
                None
            }
        };

        advance_interval(&ctx, &mut state, outcome);

        if !wait_for_next_cycle(&ctx.cancel, &ctx.poll_now, state.interval).await {
            break;
        }
    }

    debug!(room = %ctx.room, "user poller stopped");
}

/// Diff a message snapshot against the watermark and deliver anything new
/// as one ascending batch. Returns whether the cycle found a change; a
/// blocked profile cache aborts the delivery so the whole cycle can rerun.
async fn deliver_new_messages<B: BackoffPolicy>(
    ctx: &PollerContext<B>,
    state: &mut PollState,
    delivered: &mut HashSet<u64>,
    snapshot: Vec<Message>,
    events: &mpsc::Sender<Vec<Message>>,
) -> Result<bool, CacheError> {
    // The id set backs up the watermark: a message carrying the exact
    // watermark timestamp in a later snapshot must not go out twice.
    let mut fresh: Vec<Message> = snapshot
        .into_iter()
        .filter(|m| m.posted_at > state.last_change && !delivered.contains(&m.id))
        .collect();
    if fresh.is_empty() {
        return Ok(false);
    }

    fresh.sort_by_key(|m| m.posted_at);

    // Listeners get complete display data: unseen authors are cached before
    // the batch goes out.
    ctx.cache
        .ensure_all(ctx.service.as_ref(), fresh.iter().map(message_author))
        .await?;

    delivered.extend(fresh.iter().map(|m| m.id));
    if let Some(newest) = fresh.last() {
        state.last_change = state.last_change.max(newest.posted_at);
    }

    debug!(room = %ctx.room, count = fresh.len(), "delivering new messages");
    if events.send(fresh).await.is_err() {
        // No consumer left; wind the whole monitor down.
        ctx.cancel.cancel();
    }
    Ok(true)
}

/// A presence snapshot is a change when any entry moved past the watermark;
/// the whole snapshot is delivered, and the watermark advances to now
/// (presence has no per-entry maximum comparable to message timestamps).
async fn deliver_user_changes<B: BackoffPolicy>(
    ctx: &PollerContext<B>,
    state: &mut PollState,
    snapshot: Vec<UserPresence>,
    events: &mpsc::Sender<Vec<UserPresence>>,
) -> Result<bool, CacheError> {
    let changed = snapshot
        .iter()
        .any(|u| u.joined_at > state.last_change || u.last_activity > state.last_change);
    if !changed {
        return Ok(false);
    }

    ctx.cache
        .ensure_all(ctx.service.as_ref(), snapshot.iter().map(presence_user))
        .await?;

    state.last_change = state.last_change.max(Utc::now());

    debug!(room = %ctx.room, count = snapshot.len(), "delivering roster snapshot");
    if events.send(snapshot).await.is_err() {
        ctx.cancel.cancel();
    }
    Ok(true)
}

/// Move the backoff state forward after a cycle.
///
/// `outcome` is `Some(changed)` for a completed fetch and `None` for a
/// transient failure, which keeps the current step as-is (no reset to the
/// eager floor against a failing endpoint, no growth either).
fn advance_interval<B: BackoffPolicy>(
    ctx: &PollerContext<B>,
    state: &mut PollState,
    outcome: Option<bool>,
) {
    state.interval = match outcome {
        Some(changed) => ctx.backoff.next_interval(state.interval, changed),
        None => state.interval.max(ctx.config.min_interval),
    };
}

/// Wait out the interval. Returns `false` when cancelled; a "poll now"
/// request ends the wait early.
async fn wait_for_next_cycle(
    cancel: &CancellationToken,
    poll_now: &Notify,
    interval: Duration,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = poll_now.notified() => true,
        _ = sleep(interval) => true,
    }
}
