//! Append-only revision graph
//!
//! Revisions live in an arena keyed by id; parent links are ids. Insertion
//! order is kept, and since a revision can only be inserted after its
//! parents, that order is topological.

use crate::error::VcsError;
use crate::revision::{Revision, RevisionId};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// Revision graph
#[derive(Debug, Clone, Default)]
pub struct History {
    revisions: BTreeMap<RevisionId, Arc<Revision>>,
    order: Vec<RevisionId>,
}

impl History {
    /// Create empty history
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a revision
    ///
    /// Inserting a revision that is already present returns the stored copy.
    ///
    /// # Errors
    /// Returns [`VcsError::UnknownRevision`] if a parent is missing
    pub fn insert(&mut self, revision: impl Into<Arc<Revision>>) -> Result<Arc<Revision>, VcsError> {
        let revision = revision.into();
        if let Some(existing) = self.revisions.get(&revision.id()) {
            return Ok(Arc::clone(existing));
        }
        if let Some(missing) = revision
            .parents()
            .iter()
            .find(|parent| !self.revisions.contains_key(*parent))
        {
            return Err(VcsError::UnknownRevision(*missing));
        }
        self.order.push(revision.id());
        self.revisions.insert(revision.id(), Arc::clone(&revision));
        Ok(revision)
    }

    /// Revision by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: &RevisionId) -> Option<&Arc<Revision>> {
        self.revisions.get(id)
    }

    /// Revision by id, or [`VcsError::UnknownRevision`]
    ///
    /// # Errors
    /// Returns error if the id is not in history
    pub fn require(&self, id: RevisionId) -> Result<&Arc<Revision>, VcsError> {
        self.revisions.get(&id).ok_or(VcsError::UnknownRevision(id))
    }

    /// Membership check
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &RevisionId) -> bool {
        self.revisions.contains_key(id)
    }

    /// Number of revisions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if no revision was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Revisions in insertion (topological) order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Revision>> + '_ {
        self.order.iter().filter_map(|id| self.revisions.get(id))
    }

    /// `id` and everything reachable through parent links
    #[must_use]
    pub fn ancestors(&self, id: RevisionId) -> BTreeSet<RevisionId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(rev) = self.revisions.get(&next) {
                stack.extend_from_slice(rev.parents());
            }
        }
        seen.retain(|id| self.revisions.contains_key(id));
        seen
    }

    /// True if `ancestor` is `descendant` or reachable from it
    #[must_use]
    pub fn is_ancestor(&self, ancestor: RevisionId, descendant: RevisionId) -> bool {
        self.contains(&ancestor) && self.ancestors(descendant).contains(&ancestor)
    }

    /// Nearest common ancestor of two revisions
    ///
    /// Walks breadth-first from `b` and returns the first revision that is
    /// also an ancestor of `a`.
    #[must_use]
    pub fn common_ancestor(&self, a: RevisionId, b: RevisionId) -> Option<RevisionId> {
        let of_a = self.ancestors(a);
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([b]);
        while let Some(next) = queue.pop_front() {
            if of_a.contains(&next) {
                return Some(next);
            }
            if !seen.insert(next) {
                continue;
            }
            if let Some(rev) = self.revisions.get(&next) {
                queue.extend(rev.parents().iter().copied());
            }
        }
        None
    }

    /// First-parent chain from `head`, newest first
    #[must_use]
    pub fn first_parent_chain(&self, head: RevisionId) -> Vec<Arc<Revision>> {
        let mut chain = Vec::new();
        let mut cursor = self.revisions.get(&head);
        while let Some(rev) = cursor {
            chain.push(Arc::clone(rev));
            cursor = rev.first_parent().and_then(|id| self.revisions.get(&id));
        }
        chain
    }

    /// Revisions reachable from `head` but not from `base`, oldest first
    #[must_use]
    pub fn between(&self, base: Option<RevisionId>, head: RevisionId) -> Vec<Arc<Revision>> {
        let exclude = base.map(|b| self.ancestors(b)).unwrap_or_default();
        let include = self.ancestors(head);
        self.iter()
            .filter(|rev| include.contains(&rev.id()) && !exclude.contains(&rev.id()))
            .cloned()
            .collect()
    }

    /// Number of field changes revision `id` introduced over its first parent
    #[must_use]
    pub fn change_count(&self, id: RevisionId) -> usize {
        let Some(rev) = self.revisions.get(&id) else {
            return 0;
        };
        let parent = rev.first_parent().and_then(|p| self.revisions.get(&p));
        rev.changes_since(parent.map(Arc::as_ref))
            .iter()
            .map(|(_, fields)| fields.len())
            .sum()
    }

    /// Field changes recorded across the whole history
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.order.iter().map(|id| self.change_count(*id)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use stave_delta::{Delta, DeltaType, FieldDelta, ItemId, ItemSnapshot, Payload};

    fn rev(parents: &[RevisionId], msg: &str) -> Revision {
        Revision::new(parents.to_vec(), msg, "tester", Utc::now(), vec![])
    }

    fn with_title(parents: &[RevisionId], item: ItemId, title: &str) -> Revision {
        let snap = ItemSnapshot::new(item, "Project info", "projectInfo").with_fields(vec![
            FieldDelta::new(
                Delta::new(DeltaType::from_static("projectTitle")),
                Payload::from_value(title),
            ),
        ]);
        Revision::new(parents.to_vec(), title, "tester", Utc::now(), vec![snap])
    }

    /// a ─ b ─ d
    ///  └─ c ─┘
    fn diamond() -> (History, [RevisionId; 4]) {
        let mut history = History::new();
        let a = history.insert(rev(&[], "a")).unwrap().id();
        let b = history.insert(rev(&[a], "b")).unwrap().id();
        let c = history.insert(rev(&[a], "c")).unwrap().id();
        let d = history.insert(rev(&[b, c], "d")).unwrap().id();
        (history, [a, b, c, d])
    }

    #[test]
    fn insert_requires_known_parents() {
        let mut history = History::new();
        let orphan = rev(&[RevisionId::new([7; 32])], "orphan");
        assert!(matches!(
            history.insert(orphan),
            Err(VcsError::UnknownRevision(_))
        ));
        assert!(history.is_empty());
    }

    #[test]
    fn insert_is_idempotent() {
        let mut history = History::new();
        let root = rev(&[], "root");
        history.insert(root.clone()).unwrap();
        history.insert(root).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn ancestry_queries_on_diamond() {
        let (history, [a, b, c, d]) = diamond();
        assert!(history.is_ancestor(a, d));
        assert!(history.is_ancestor(c, d));
        assert!(!history.is_ancestor(b, c));
        assert_eq!(history.common_ancestor(b, c), Some(a));
        assert_eq!(history.common_ancestor(d, c), Some(c));
        assert_eq!(history.ancestors(d).len(), 4);
    }

    #[test]
    fn first_parent_chain_skips_merged_branch() {
        let (history, [a, b, _, d]) = diamond();
        let ids: Vec<_> = history.first_parent_chain(d).iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![d, b, a]);
    }

    #[test]
    fn between_is_oldest_first() {
        let (history, [a, b, c, d]) = diamond();
        let ids: Vec<_> = history.between(Some(a), d).iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![b, c, d]);
        assert_eq!(history.between(None, a).len(), 1);
        assert!(history.between(Some(d), d).is_empty());
    }

    #[test]
    fn unrelated_roots_have_no_common_ancestor() {
        let mut history = History::new();
        let x = history.insert(rev(&[], "x")).unwrap().id();
        let y = history.insert(rev(&[], "y")).unwrap().id();
        assert_eq!(history.common_ancestor(x, y), None);
    }

    #[test]
    fn change_counts_follow_first_parent() {
        let item = ItemId::new();
        let mut history = History::new();
        let a = history.insert(with_title(&[], item, "A")).unwrap().id();
        let b = history.insert(with_title(&[a], item, "B")).unwrap().id();
        history.insert(with_title(&[b], item, "B")).unwrap();
        assert_eq!(history.change_count(a), 1);
        assert_eq!(history.change_count(b), 1);
        assert_eq!(history.total_changes(), 2);
    }

    proptest! {
        #[test]
        fn linear_chain_queries(n in 1usize..12, i in 0usize..12, j in 0usize..12) {
            let (i, j) = (i % n, j % n);
            let mut history = History::new();
            let mut chain = Vec::new();
            for k in 0..n {
                let parents: Vec<_> = chain.last().copied().into_iter().collect();
                chain.push(history.insert(rev(&parents, &k.to_string())).unwrap().id());
            }
            let head = chain[n - 1];

            prop_assert_eq!(history.is_ancestor(chain[i], chain[j]), i <= j);
            prop_assert_eq!(history.between(Some(chain[i]), head).len(), n - 1 - i);
            prop_assert_eq!(history.first_parent_chain(head).len(), n);
            prop_assert_eq!(history.common_ancestor(chain[i], chain[j]), Some(chain[i.min(j)]));
        }
    }
}
