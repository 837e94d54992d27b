use std::collections::HashSet;

use crate::role::PeerId;

/// Difference between the peers we hold connections for and a fresh
/// `roomUsers` snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MembershipDiff {
    pub added: Vec<PeerId>,
    pub removed: Vec<PeerId>,
}

impl MembershipDiff {
    /// `added` keeps snapshot order and `removed` keeps `current` order; the
    /// local id never appears in either.
    pub fn compute<'a>(
        current: impl IntoIterator<Item = &'a PeerId>,
        snapshot: &[PeerId],
        local: &PeerId,
    ) -> Self {
        let current: Vec<&PeerId> = current.into_iter().collect();
        let known: HashSet<&PeerId> = current.iter().copied().collect();
        let incoming: HashSet<&PeerId> = snapshot.iter().collect();

        let removed = current
            .iter()
            .filter(|id| *id != &local && !incoming.contains(*id))
            .map(|id| (*id).clone())
            .collect();

        let mut seen = HashSet::new();
        let added = snapshot
            .iter()
            .filter(|id| *id != local && !known.contains(id) && seen.insert(*id))
            .cloned()
            .collect();

        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<PeerId> {
        raw.iter().map(|id| PeerId::from(*id)).collect()
    }

    #[test]
    fn new_peers_are_added_in_snapshot_order() {
        let local = PeerId::from("me");
        let diff = MembershipDiff::compute(&[], &ids(&["b", "me", "a"]), &local);
        assert_eq!(diff.added, ids(&["b", "a"]));
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn missing_peers_are_removed() {
        let local = PeerId::from("me");
        let current = ids(&["a", "b", "c"]);
        let diff = MembershipDiff::compute(&current, &ids(&["me", "b", "d"]), &local);
        assert_eq!(diff.removed, ids(&["a", "c"]));
        assert_eq!(diff.added, ids(&["d"]));
    }

    #[test]
    fn unchanged_snapshot_is_empty() {
        let local = PeerId::from("me");
        let current = ids(&["a", "b"]);
        let diff = MembershipDiff::compute(&current, &ids(&["a", "me", "b"]), &local);
        assert!(diff.is_empty());
    }

    #[test]
    fn duplicate_ids_in_snapshot_are_added_once() {
        let local = PeerId::from("me");
        let diff = MembershipDiff::compute(&[], &ids(&["a", "a"]), &local);
        assert_eq!(diff.added, ids(&["a"]));
    }
}
