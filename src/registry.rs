//! Process-wide handle tables.
//!
//! The foreign boundary passes opaque `u64` handles instead of pointers.
//! Each table hands out handles from its own monotonic allocator; handle 0
//! is never allocated and always invalid. Entries are held until released,
//! so a handle stays valid for exactly as long as the caller keeps it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::peer::Peer;

/// The reserved never-allocated handle.
pub const INVALID_HANDLE: u64 = 0;

/// Generic handle table. Dropping an entry is explicit (`remove`/`take`);
/// in-flight engine tasks keep their own `Arc` clones, so releasing an
/// entry can never free state a callback still uses.
pub struct Registry<T> {
    next: AtomicU64,
    entries: Mutex<HashMap<u64, T>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a value and return its freshly allocated handle.
    pub fn insert(&self, value: T) -> u64 {
        let handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(handle, value);
        handle
    }

    /// Look up a handle, leaving the entry in place.
    pub fn get(&self, handle: u64) -> Option<T>
    where
        T: Clone,
    {
        self.entries.lock().get(&handle).cloned()
    }

    /// Remove and return the entry, invalidating the handle.
    pub fn take(&self, handle: u64) -> Option<T> {
        self.entries.lock().remove(&handle)
    }

    /// Drop the entry. Returns false for an unknown handle.
    pub fn remove(&self, handle: u64) -> bool {
        self.entries.lock().remove(&handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// Live peers, keyed by the handle returned at creation.
    pub static ref PEERS: Registry<Arc<Peer>> = Registry::new();
    /// Generated or deserialized session descriptions awaiting use.
    /// Applying one takes it out of the table (ownership handoff).
    pub static ref DESCRIPTIONS: Registry<RTCSessionDescription> = Registry::new();
    /// Data channels, local and remote alike.
    pub static ref CHANNELS: Registry<Arc<RTCDataChannel>> = Registry::new();
}
