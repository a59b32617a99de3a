use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use herald_types::models::BroadcastMessage;

/// How long an admin has to press Confirm.
pub const CONFIRMATION_TTL: Duration = Duration::from_secs(10 * 60);

/// A broadcast waiting for its author to press Confirm or Cancel.
#[derive(Debug, Clone)]
pub struct PendingBroadcast {
    pub admin_id: i64,
    pub message: BroadcastMessage,
    created_at: Instant,
}

/// Broadcasts awaiting confirmation, keyed by the token carried in the
/// button callback data. The text itself never goes into callback data,
/// which the platform caps at 64 bytes.
pub struct PendingBroadcasts {
    entries: Mutex<HashMap<u32, PendingBroadcast>>,
    ttl: Duration,
}

impl Default for PendingBroadcasts {
    fn default() -> Self {
        Self::new(CONFIRMATION_TTL)
    }
}

impl PendingBroadcasts {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Park `message` and return its token.
    pub fn insert(&self, admin_id: i64, message: BroadcastMessage) -> u32 {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, p| p.created_at.elapsed() < ttl);

        let mut token = rand::random::<u32>();
        while entries.contains_key(&token) {
            token = rand::random::<u32>();
        }
        entries.insert(
            token,
            PendingBroadcast {
                admin_id,
                message,
                created_at: Instant::now(),
            },
        );
        token
    }

    /// Remove and return the entry for `token` if `admin_id` created it and
    /// it has not expired. Another admin's token is left in place.
    pub fn take(&self, token: u32, admin_id: i64) -> Option<PendingBroadcast> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match entries.get(&token) {
            None => return None,
            Some(p) if p.admin_id != admin_id => return None,
            Some(p) => p.created_at.elapsed() >= self.ttl,
        };

        let entry = entries.remove(&token);
        if expired { None } else { entry }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
