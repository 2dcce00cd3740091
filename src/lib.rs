//! roomwatch: adaptive polling and change notification for remote chat rooms.
//!
//! The core watches a set of rooms for two independently changing facts,
//! new messages and roster changes, and notifies registered listeners as
//! soon as changes appear while pacing requests against the rate-sensitive
//! remote service. Fetching, rendering, and persistence all live outside
//! this crate; the only boundary is the [`service::RoomDataService`] trait.

pub mod backoff;
pub mod config;
pub mod error;
pub mod monitor;
mod poller;
pub mod profiles;
pub mod protocol;
pub mod registry;
pub mod service;

#[cfg(test)]
pub(crate) mod testutil;
