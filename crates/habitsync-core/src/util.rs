//! Shared utility functions used across multiple modules.

use std::hash::{Hash, Hasher};

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Stable-per-process fingerprint of a user id, safe to put in logs.
pub fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_fingerprint_is_deterministic() {
        assert_eq!(user_fingerprint("user-a"), user_fingerprint("user-a"));
        assert_ne!(user_fingerprint("user-a"), user_fingerprint("user-b"));
    }

    #[test]
    fn unix_millis_now_is_positive() {
        assert!(unix_millis_now() > 0);
    }
}
