//! Duplicate resolution: one keep/remove decision per record.
//!
//! Exact groups come from the index and near groups from the sample. A
//! record can sit in both, so overlapping groups are merged with union-find
//! before any decision is taken, and the smallest `(file, line)` of each
//! merged group survives.
//!
//! Exact groups are disjoint among themselves (a record has exactly one
//! fingerprint), so only those touching a near-group member need merging.
//! Every other exact group is decided as it streams in, and the resolver
//! never holds more than the near groups plus the exact groups they touch.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::groups::{DuplicateGroup, GroupKind};
use super::union_find::UnionFind;
use crate::scanner::LocationRef;

/// What happens to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The record survives as its group's representative
    Keep,
    /// The record is deleted
    Remove,
    /// The record is in no duplicate group
    Untouched,
}

/// A final group with its decision applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGroup {
    /// Group id: the exact fingerprint, or the first near cluster id when
    /// groups were merged
    pub id: String,
    /// `Near` if any near cluster contributed
    pub kind: GroupKind,
    /// Surviving record
    pub keep: LocationRef,
    /// Records to delete, sorted
    pub remove: Vec<LocationRef>,
    /// Ids of every detected group merged into this one
    pub sources: Vec<String>,
}

impl ResolvedGroup {
    fn from_group(group: DuplicateGroup) -> Option<Self> {
        let mut members = group.members.into_iter();
        let keep = members.next()?;
        let remove: Vec<LocationRef> = members.collect();
        if remove.is_empty() {
            return None;
        }
        Some(Self {
            sources: vec![group.id.clone()],
            id: group.id,
            kind: group.kind,
            keep,
            remove,
        })
    }

    /// Number of records in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.remove.len() + 1
    }

    /// Always false: a resolved group has a survivor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// The final decisions for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    groups: Vec<ResolvedGroup>,
    removals: BTreeMap<String, BTreeSet<u64>>,
    keeps: BTreeMap<String, BTreeSet<u64>>,
}

impl Resolution {
    /// Build a resolution from already resolved groups, e.g. a loaded report.
    ///
    /// Groups are trusted to be disjoint.
    #[must_use]
    pub fn from_groups(groups: Vec<ResolvedGroup>) -> Self {
        let mut resolution = Self::default();
        for group in groups {
            resolution.record(group);
        }
        resolution
    }

    fn record(&mut self, group: ResolvedGroup) {
        self.keeps
            .entry(group.keep.file.clone())
            .or_default()
            .insert(group.keep.line);
        for location in &group.remove {
            self.removals
                .entry(location.file.clone())
                .or_default()
                .insert(location.line);
        }
        self.groups.push(group);
    }

    /// Decision for one record.
    #[must_use]
    pub fn decision(&self, location: &LocationRef) -> Decision {
        let holds = |map: &BTreeMap<String, BTreeSet<u64>>| {
            map.get(&location.file)
                .is_some_and(|lines| lines.contains(&location.line))
        };
        if holds(&self.removals) {
            Decision::Remove
        } else if holds(&self.keeps) {
            Decision::Keep
        } else {
            Decision::Untouched
        }
    }

    /// All resolved groups: exact groups in fingerprint order, then merged
    /// and near groups in id order.
    #[must_use]
    pub fn groups(&self) -> &[ResolvedGroup] {
        &self.groups
    }

    /// Groups of one kind.
    pub fn groups_of(&self, kind: GroupKind) -> impl Iterator<Item = &ResolvedGroup> {
        self.groups.iter().filter(move |g| g.kind == kind)
    }

    /// Lines to remove from one file, ascending.
    #[must_use]
    pub fn removals_for(&self, file: &str) -> Option<&BTreeSet<u64>> {
        self.removals.get(file)
    }

    /// Per-file removal plan, keyed and ordered by file key.
    #[must_use]
    pub fn removal_plan(&self) -> &BTreeMap<String, BTreeSet<u64>> {
        &self.removals
    }

    /// Files that lose at least one record.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.removals.keys().map(String::as_str)
    }

    /// Total number of records to remove.
    #[must_use]
    pub fn total_removed(&self) -> u64 {
        self.removals.values().map(|lines| lines.len() as u64).sum()
    }

    /// Check if nothing is to be removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
    }
}

/// Merges exact and near groups into a [`Resolution`].
#[derive(Debug)]
pub struct DuplicateResolver {
    near: Vec<DuplicateGroup>,
    near_members: HashSet<LocationRef>,
    held: Vec<DuplicateGroup>,
    resolution: Resolution,
    exact_seen: usize,
}

impl DuplicateResolver {
    /// Start resolving with the near-duplicate groups from clustering.
    #[must_use]
    pub fn new(near: Vec<DuplicateGroup>) -> Self {
        let near_members = near
            .iter()
            .flat_map(|g| g.members.iter().cloned())
            .collect();
        Self {
            near,
            near_members,
            held: Vec::new(),
            resolution: Resolution::default(),
            exact_seen: 0,
        }
    }

    /// Feed one exact group from the index.
    pub fn add_exact(&mut self, group: DuplicateGroup) {
        if !group.has_duplicates() {
            return;
        }
        self.exact_seen += 1;
        if group.members.iter().any(|m| self.near_members.contains(m)) {
            self.held.push(group);
        } else if let Some(resolved) = ResolvedGroup::from_group(group) {
            self.resolution.record(resolved);
        }
    }

    /// Number of exact groups fed so far.
    #[must_use]
    pub fn exact_groups_seen(&self) -> usize {
        self.exact_seen
    }

    /// Merge the near groups with the exact groups that overlap them and
    /// return the final decisions.
    #[must_use]
    pub fn finish(self) -> Resolution {
        let Self {
            near,
            held,
            mut resolution,
            ..
        } = self;

        let mut ids: HashMap<LocationRef, usize> = HashMap::new();
        let mut locations: Vec<LocationRef> = Vec::new();
        let mut uf = UnionFind::default();
        let sources: Vec<DuplicateGroup> = near.into_iter().chain(held).collect();

        for group in &sources {
            let mut first = None;
            for member in &group.members {
                let id = *ids.entry(member.clone()).or_insert_with(|| {
                    locations.push(member.clone());
                    uf.make_set()
                });
                match first {
                    None => first = Some(id),
                    Some(root) => {
                        uf.union(root, id);
                    }
                }
            }
        }

        // Component root -> (members, source ids, any near source)
        let mut components: BTreeMap<usize, (Vec<LocationRef>, Vec<String>, bool)> =
            BTreeMap::new();
        for (id, location) in locations.iter().enumerate() {
            let root = uf.find(id);
            components.entry(root).or_default().0.push(location.clone());
        }
        for group in &sources {
            let Some(member) = group.members.first() else {
                continue;
            };
            let Some(&id) = ids.get(member) else {
                continue;
            };
            let root = uf.find(id);
            if let Some(component) = components.get_mut(&root) {
                component.1.push(group.id.clone());
                component.2 |= group.kind == GroupKind::Near;
            }
        }

        let mut merged: Vec<ResolvedGroup> = components
            .into_values()
            .filter_map(|(members, mut source_ids, has_near)| {
                source_ids.sort();
                source_ids.dedup();
                let kind = if has_near { GroupKind::Near } else { GroupKind::Exact };
                let id = source_ids
                    .iter()
                    .find(|id| id.starts_with("near-"))
                    .or_else(|| source_ids.first())
                    .cloned()
                    .unwrap_or_default();
                let mut resolved =
                    ResolvedGroup::from_group(DuplicateGroup::new(id, kind, members))?;
                resolved.sources = source_ids;
                Some(resolved)
            })
            .collect();
        merged.sort_by(|a, b| a.id.cmp(&b.id));

        for group in merged {
            resolution.record(group);
        }

        log::debug!(
            "Resolved {} groups, {} records to remove from {} files",
            resolution.groups.len(),
            resolution.total_removed(),
            resolution.removals.len()
        );
        resolution
    }

    /// Resolve a complete set of groups in one call.
    #[must_use]
    pub fn resolve<I>(exact: I, near: Vec<DuplicateGroup>) -> Resolution
    where
        I: IntoIterator<Item = DuplicateGroup>,
    {
        let mut resolver = Self::new(near);
        for group in exact {
            resolver.add_exact(group);
        }
        resolver.finish()
    }
}
