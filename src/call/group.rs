use std::collections::HashMap;
use std::sync::Mutex;

use crate::hub::ConnId;

/// Group-call rosters, keyed by caller-supplied group name. First joiner
/// creates the roster; the last leaver deletes it.
#[derive(Default)]
pub struct GroupCalls {
    inner: Mutex<HashMap<String, Vec<ConnId>>>,
}

impl GroupCalls {
    /// Adds the connection and returns the members that were already there
    /// (empty for a fresh group) — the joiner signals each of them.
    pub fn join(&self, conn: ConnId, group: &str) -> Vec<ConnId> {
        let mut inner = self.inner.lock().unwrap();
        let roster = inner.entry(group.to_owned()).or_default();
        let prior = roster.clone();
        if !roster.contains(&conn) {
            roster.push(conn);
        }
        prior
    }

    /// Removes the connection and returns who is left to notify. An empty
    /// roster is deleted outright.
    pub fn leave(&self, conn: ConnId, group: &str) -> Vec<ConnId> {
        let mut inner = self.inner.lock().unwrap();
        let Some(roster) = inner.get_mut(group) else {
            return Vec::new();
        };
        roster.retain(|c| *c != conn);
        if roster.is_empty() {
            inner.remove(group);
            return Vec::new();
        }
        roster.clone()
    }

    /// Every group the connection is currently in; disconnects walk this.
    pub fn groups_of(&self, conn: ConnId) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, roster)| roster.contains(&conn))
            .map(|(name, _)| name.clone())
            .collect()
    }

    #[cfg(test)]
    pub fn contains(&self, group: &str) -> bool {
        self.inner.lock().unwrap().contains_key(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn roster_lifecycle() {
        let groups = GroupCalls::default();
        let (x, y) = (Uuid::now_v7(), Uuid::now_v7());

        assert!(groups.join(x, "party").is_empty());
        assert_eq!(groups.join(y, "party"), vec![x]);

        assert_eq!(groups.leave(y, "party"), vec![x]);
        assert!(groups.contains("party"));

        assert!(groups.leave(x, "party").is_empty());
        assert!(!groups.contains("party"));
    }

    #[test]
    fn leave_of_unknown_group_is_a_noop() {
        let groups = GroupCalls::default();
        assert!(groups.leave(Uuid::now_v7(), "nowhere").is_empty());
    }
}
