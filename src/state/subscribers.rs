use dashmap::DashSet;
use std::sync::Arc;

/// Opted-in broadcast recipients.
///
/// Cheap to clone (an `Arc` bump); the engine writes, the dispatcher reads
/// through [`SubscriptionRegistry::all`], which copies the current members.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionRegistry {
    members: Arc<DashSet<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the recipient was newly added.
    /// Subscribing twice is a no-op.
    pub fn subscribe(&self, id: &str) -> bool {
        self.members.insert(id.to_string())
    }

    /// Returns true if the recipient was a member.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.members.remove(id).is_some()
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Point-in-time copy of every member, sorted so fan-out order is
    /// deterministic. Later mutations do not affect the returned vector.
    pub fn all(&self) -> Vec<String> {
        let mut members: Vec<String> = self.members.iter().map(|id| id.key().clone()).collect();
        members.sort_unstable();
        members
    }
}
