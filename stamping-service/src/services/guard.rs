//! Per-invoice submission mutual exclusion.
//!
//! A queued second submission for the same invoice is never legitimate, so
//! acquisition is non-blocking and fails immediately. Slots carry a TTL so a
//! crashed holder cannot wedge an invoice forever; acquisition tokens make
//! sure an expired holder's release cannot evict its successor.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Slot {
    token: Uuid,
    acquired_at: Instant,
}

struct GuardInner {
    ttl: Duration,
    slots: DashMap<String, Slot>,
}

#[derive(Clone)]
pub struct SubmissionGuard {
    inner: Arc<GuardInner>,
}

/// Held slot; releases on drop.
pub struct SubmissionPermit {
    key: String,
    token: Uuid,
    inner: Arc<GuardInner>,
}

impl SubmissionGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                ttl,
                slots: DashMap::new(),
            }),
        }
    }

    /// Take the slot for `key`, or `None` if a live submission already holds
    /// it. An expired slot is taken over.
    pub fn try_acquire(&self, key: &str) -> Option<SubmissionPermit> {
        let token = Uuid::new_v4();
        let slot = Slot {
            token,
            acquired_at: Instant::now(),
        };

        match self.inner.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().acquired_at.elapsed() < self.inner.ttl {
                    return None;
                }
                occupied.insert(slot);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
            }
        }

        Some(SubmissionPermit {
            key: key.to_string(),
            token,
            inner: Arc::clone(&self.inner),
        })
    }
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        // Release only a slot this permit still owns; after a TTL takeover
        // the slot belongs to the new holder.
        self.inner
            .slots
            .remove_if(&self.key, |_, slot| slot.token == self.token);
    }
}
