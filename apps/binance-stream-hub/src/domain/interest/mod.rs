//! Topic Interest Tracking
//!
//! Maps each topic to the set of sessions currently wanting its updates.
//! The registry consults the transitions this table reports to keep the
//! bus subscription invariant: a topic is subscribed on the bus **iff**
//! its interest set is non-empty.
//!
//! This type is pure bookkeeping — it performs no locking and no I/O.
//! The session registry mutates it under its table lock and acts on the
//! returned transitions outside that lock.

use std::collections::{HashMap, HashSet};

use crate::domain::ticks::{Symbol, UserId};

/// Outcome of removing one user from every topic they follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedInterest {
    /// Topics whose interest set became empty and must be unsubscribed.
    pub deactivated: Vec<Symbol>,
}

/// Reference-counted topic → session-id interest sets.
#[derive(Debug, Default)]
pub struct InterestSets {
    topics: HashMap<Symbol, HashSet<UserId>>,
}

impl InterestSets {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a topic's interest set.
    ///
    /// Returns `true` when the set transitioned empty → non-empty, i.e.
    /// the topic needs a bus subscription. Following a topic twice is a
    /// no-op for the second call.
    pub fn follow(&mut self, user_id: UserId, topic: &str) -> bool {
        let set = self.topics.entry(topic.to_string()).or_default();
        let newly_active = set.is_empty();
        set.insert(user_id);
        newly_active
    }

    /// Remove a user from a topic's interest set.
    ///
    /// Returns `true` when the set transitioned non-empty → empty, i.e.
    /// the topic's bus subscription must be dropped. Unfollowing a topic
    /// the user never followed is a no-op.
    pub fn unfollow(&mut self, user_id: UserId, topic: &str) -> bool {
        let Some(set) = self.topics.get_mut(topic) else {
            return false;
        };

        if !set.remove(&user_id) {
            return false;
        }

        if set.is_empty() {
            self.topics.remove(topic);
            return true;
        }

        false
    }

    /// Remove a user from every topic they follow.
    pub fn remove_user(&mut self, user_id: UserId) -> RemovedInterest {
        let mut removed = RemovedInterest::default();

        self.topics.retain(|topic, set| {
            if set.remove(&user_id) && set.is_empty() {
                removed.deactivated.push(topic.clone());
                return false;
            }
            true
        });

        removed
    }

    /// Snapshot the interest set for a topic.
    ///
    /// Used by the dispatch path so enqueueing happens without the table
    /// lock held.
    #[must_use]
    pub fn snapshot(&self, topic: &str) -> Vec<UserId> {
        self.topics
            .get(topic)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether a topic currently has a non-empty interest set.
    #[must_use]
    pub fn is_active(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Number of topics with a non-empty interest set.
    #[must_use]
    pub fn active_topic_count(&self) -> usize {
        self.topics.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_follower_activates_topic() {
        let mut sets = InterestSets::new();
        assert!(sets.follow(1, "btcusdt"));
        assert!(sets.is_active("btcusdt"));
    }

    #[test]
    fn second_follower_does_not_reactivate() {
        let mut sets = InterestSets::new();
        assert!(sets.follow(1, "btcusdt"));
        assert!(!sets.follow(2, "btcusdt"));
    }

    #[test]
    fn duplicate_follow_is_noop() {
        let mut sets = InterestSets::new();
        assert!(sets.follow(1, "btcusdt"));
        assert!(!sets.follow(1, "btcusdt"));
        assert_eq!(sets.snapshot("btcusdt"), vec![1]);
    }

    #[test]
    fn last_unfollow_deactivates_topic() {
        let mut sets = InterestSets::new();
        sets.follow(1, "dogeusdt");
        assert!(sets.unfollow(1, "dogeusdt"));
        assert!(!sets.is_active("dogeusdt"));
    }

    #[test]
    fn unfollow_with_remaining_followers_keeps_topic_active() {
        let mut sets = InterestSets::new();
        sets.follow(1, "ethusdt");
        sets.follow(2, "ethusdt");
        assert!(!sets.unfollow(2, "ethusdt"));
        assert!(sets.is_active("ethusdt"));
    }

    #[test]
    fn unfollow_of_inactive_topic_is_noop() {
        let mut sets = InterestSets::new();
        assert!(!sets.unfollow(1, "btcusdt"));
    }

    #[test]
    fn remove_user_reports_only_emptied_topics() {
        let mut sets = InterestSets::new();
        sets.follow(1, "btcusdt");
        sets.follow(1, "ethusdt");
        sets.follow(2, "ethusdt");

        let removed = sets.remove_user(1);

        assert_eq!(removed.deactivated, vec!["btcusdt".to_string()]);
        assert!(sets.is_active("ethusdt"));
        assert!(!sets.is_active("btcusdt"));
    }

    #[test]
    fn remove_unknown_user_is_noop() {
        let mut sets = InterestSets::new();
        sets.follow(1, "btcusdt");

        let removed = sets.remove_user(99);

        assert!(removed.deactivated.is_empty());
        assert!(sets.is_active("btcusdt"));
    }

    #[test]
    fn snapshot_of_inactive_topic_is_empty() {
        let sets = InterestSets::new();
        assert!(sets.snapshot("btcusdt").is_empty());
    }

    #[test]
    fn active_topic_count_tracks_transitions() {
        let mut sets = InterestSets::new();
        sets.follow(1, "btcusdt");
        sets.follow(1, "ethusdt");
        assert_eq!(sets.active_topic_count(), 2);
        sets.unfollow(1, "btcusdt");
        assert_eq!(sets.active_topic_count(), 1);
    }
}
