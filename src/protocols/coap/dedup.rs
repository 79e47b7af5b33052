//! Duplicate detection for inbound requests
//!
//! A retransmitted request carries the message id of the original. While
//! the original is still being handled the copy is dropped; once it has been
//! answered the stored response is sent again. Either way the listener runs
//! once per request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How long an answered exchange is remembered (RFC 7252 `EXCHANGE_LIFETIME`)
pub const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);

/// Maximum remembered exchanges
const MAX_ENTRIES: usize = 4096;

type Key = (SocketAddr, u16);

enum Entry {
    InFlight,
    Answered { response: Vec<u8>, at: Instant },
}

/// What is known about an inbound message id
#[derive(Debug, PartialEq, Eq)]
pub enum Seen {
    /// First copy; the caller handles it
    New,
    /// The original is still being handled
    InFlight,
    /// The original was answered with these bytes
    Answered(Vec<u8>),
}

/// Message ids seen per peer
pub struct ExchangeCache {
    lifetime: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<Key, Entry>>,
}

impl ExchangeCache {
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            max_entries: MAX_ENTRIES,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a message id, reporting whether it was seen before
    pub fn begin(&self, peer: SocketAddr, message_id: u16) -> Seen {
        let now = Instant::now();
        let key = (peer, message_id);
        let mut entries = self.entries.lock();

        match entries.get(&key) {
            Some(Entry::InFlight) => return Seen::InFlight,
            Some(Entry::Answered { response, at }) if now.duration_since(*at) < self.lifetime => {
                return Seen::Answered(response.clone());
            }
            _ => {}
        }

        if entries.len() >= self.max_entries {
            entries.retain(|_, entry| match entry {
                Entry::InFlight => true,
                Entry::Answered { at, .. } => now.duration_since(*at) < self.lifetime,
            });
        }

        // still full: forget the oldest answer, never a request in progress
        if entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .filter_map(|(key, entry)| match entry {
                    Entry::Answered { at, .. } => Some((*key, *at)),
                    Entry::InFlight => None,
                })
                .min_by_key(|(_, at)| *at)
                .map(|(key, _)| key);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(key, Entry::InFlight);
        Seen::New
    }

    /// Remember the response sent for a message id
    pub fn finish(&self, peer: SocketAddr, message_id: u16, response: Vec<u8>) {
        self.entries.lock().insert(
            (peer, message_id),
            Entry::Answered {
                response,
                at: Instant::now(),
            },
        );
    }

    /// Forget a message id that produced no response
    pub fn abandon(&self, peer: SocketAddr, message_id: u16) {
        self.entries.lock().remove(&(peer, message_id));
    }
}

impl Default for ExchangeCache {
    fn default() -> Self {
        Self::new(EXCHANGE_LIFETIME)
    }
}
