//! Many-to-many membership writes.
//!
//! Write requests carry an `Option<BTreeSet<Id>>` per relation. `None` means
//! the caller did not mention the relation at all; `Some(empty)` is an explicit
//! empty membership. The create path turns a present list into a
//! [`RelationWrite::Connect`], the update path into a [`RelationWrite::Set`].
//!
//! Both store backends compute a [`RelationPlan`] from the current membership
//! and apply it inside the same unit of work as the owning entity write, after
//! checking that every requested id exists.

use std::collections::BTreeSet;

/// Desired membership of one relation, as requested by a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationWrite<Id: Ord> {
    /// Attach the entity to each id. Existing members are kept.
    Connect(BTreeSet<Id>),
    /// Replace the membership with exactly these ids.
    Set(BTreeSet<Id>),
}

impl<Id: Ord + Copy> RelationWrite<Id> {
    /// Relation write for a newly created entity.
    pub fn connect(ids: Option<BTreeSet<Id>>) -> Option<Self> {
        ids.map(Self::Connect)
    }

    /// Relation write for an update of an existing entity.
    pub fn set(ids: Option<BTreeSet<Id>>) -> Option<Self> {
        ids.map(Self::Set)
    }

    /// Every id the write references.
    pub fn ids(&self) -> &BTreeSet<Id> {
        match self {
            Self::Connect(ids) | Self::Set(ids) => ids,
        }
    }

    /// Diff the write against the current membership.
    pub fn plan(&self, current: &BTreeSet<Id>) -> RelationPlan<Id> {
        match self {
            Self::Connect(ids) => RelationPlan {
                attach: ids.difference(current).copied().collect(),
                detach: Vec::new(),
            },
            Self::Set(ids) => RelationPlan {
                attach: ids.difference(current).copied().collect(),
                detach: current.difference(ids).copied().collect(),
            },
        }
    }

    /// Referenced ids for which `exists` returns false, in ascending order.
    pub fn missing(&self, exists: impl Fn(&Id) -> bool) -> Vec<Id> {
        self.ids().iter().filter(|id| !exists(id)).copied().collect()
    }
}

/// Membership changes needed to reach the requested state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationPlan<Id> {
    pub attach: Vec<Id>,
    pub detach: Vec<Id>,
}

impl<Id: Ord + Copy> RelationPlan<Id> {
    pub fn is_noop(&self) -> bool {
        self.attach.is_empty() && self.detach.is_empty()
    }

    /// Apply the plan to an in-memory membership set.
    pub fn apply_to(&self, members: &mut BTreeSet<Id>) {
        for id in &self.detach {
            members.remove(id);
        }
        members.extend(self.attach.iter().copied());
    }
}

/// Collect request ids into a set, collapsing duplicates.
pub fn id_set<Id: Ord, I: IntoIterator<Item = i64>>(ids: I) -> BTreeSet<Id>
where
    Id: From<i64>,
{
    ids.into_iter().map(Id::from).collect()
}
