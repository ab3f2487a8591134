use dashmap::DashSet;

/// Set of user ids currently viewing at least one chat.
///
/// Distinct from raw connectivity: membership moves only on explicit
/// join/leave signals, plus the disconnect cleanup path. Ephemeral by
/// design; rebuilt from zero on restart.
#[derive(Default)]
pub struct PresenceTracker {
    online: DashSet<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the user was not already online
    pub fn mark_online(&self, user_id: impl Into<String>) -> bool {
        self.online.insert(user_id.into())
    }

    /// Returns true if the user was online
    pub fn mark_offline(&self, user_id: &str) -> bool {
        self.online.remove(user_id).is_some()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    /// Sorted snapshot of the online set, ready for an ONLINE_USERS event
    pub fn snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.online.iter().map(|id| id.clone()).collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_online_then_offline_restores_prior_state() {
        let presence = PresenceTracker::new();
        presence.mark_online("u1");

        let before = presence.snapshot();
        presence.mark_online("u2");
        presence.mark_offline("u2");

        assert_eq!(presence.snapshot(), before);
    }

    #[test]
    fn test_membership_is_idempotent() {
        let presence = PresenceTracker::new();
        assert!(presence.mark_online("u1"));
        assert!(!presence.mark_online("u1"));
        assert_eq!(presence.len(), 1);

        assert!(presence.mark_offline("u1"));
        assert!(!presence.mark_offline("u1"));
        assert!(presence.is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let presence = PresenceTracker::new();
        presence.mark_online("u3");
        presence.mark_online("u1");
        presence.mark_online("u2");

        assert_eq!(presence.snapshot(), vec!["u1", "u2", "u3"]);
    }
}
