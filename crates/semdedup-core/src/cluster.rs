//! Union-find over record ids and grouping of accepted edges.
//!
//! The arena is a map from id to parent id. `find` walks to the root
//! iteratively and then points every visited node straight at it. `union`
//! attaches the second root under the first; roots are therefore arbitrary
//! and may differ between runs, but the partition does not.

use std::collections::{BTreeMap, HashMap};

use crate::models::{DuplicateGroup, GroupMember, ItemRecord, SimilarityEdge};

/// Disjoint sets of `u64` ids.
#[derive(Debug, Default, Clone)]
pub struct UnionFind {
    parent: HashMap<u64, u64>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids seen so far.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of `x`'s set. Unknown ids become singleton sets.
    pub fn find(&mut self, x: u64) -> u64 {
        let mut root = *self.parent.entry(x).or_insert(x);
        while let Some(&next) = self.parent.get(&root) {
            if next == root {
                break;
            }
            root = next;
        }

        let mut node = x;
        while node != root {
            let next = self.parent.get(&node).copied().unwrap_or(root);
            self.parent.insert(node, root);
            node = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`. Returns `false` when already joined.
    pub fn union(&mut self, a: u64, b: u64) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        self.parent.insert(rb, ra);
        true
    }

    /// Every set, keyed by its current root, with members sorted by id.
    pub fn components(&mut self) -> BTreeMap<u64, Vec<u64>> {
        let ids: Vec<u64> = self.parent.keys().copied().collect();
        let mut sets: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for id in ids {
            let root = self.find(id);
            sets.entry(root).or_default().push(id);
        }
        for members in sets.values_mut() {
            members.sort_unstable();
        }
        sets
    }
}

/// Collects accepted edges and turns them into duplicate groups.
#[derive(Debug, Default)]
pub struct Clusterer {
    sets: UnionFind,
    edges: Vec<SimilarityEdge>,
}

impl Clusterer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted edge and join its endpoints.
    pub fn accept(&mut self, edge: SimilarityEdge) {
        self.sets.union(edge.a, edge.b);
        self.edges.push(edge);
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Group every id touched by an accepted edge.
    ///
    /// Groups are ordered by descending size, ties by smallest member id.
    /// Members missing from `records` are left out of the member list.
    pub fn into_groups(mut self, records: &HashMap<u64, ItemRecord>) -> Vec<DuplicateGroup> {
        let components = self.sets.components();

        let mut edges_by_root: HashMap<u64, Vec<SimilarityEdge>> = HashMap::new();
        for edge in std::mem::take(&mut self.edges) {
            let root = self.sets.find(edge.a);
            edges_by_root.entry(root).or_default().push(edge);
        }

        let mut groups: Vec<DuplicateGroup> = components
            .into_iter()
            .map(|(root, ids)| {
                let members = ids
                    .into_iter()
                    .filter_map(|id| {
                        records.get(&id).map(|record| GroupMember {
                            id,
                            record: record.clone(),
                        })
                    })
                    .collect();
                let mut edges = edges_by_root.remove(&root).unwrap_or_default();
                edges.sort_by(|x, y| {
                    y.composite
                        .total_cmp(&x.composite)
                        .then(x.a.cmp(&y.a))
                        .then(x.b.cmp(&y.b))
                });
                DuplicateGroup {
                    root,
                    members,
                    edges,
                }
            })
            .collect();

        groups.sort_by(|x, y| {
            y.len()
                .cmp(&x.len())
                .then(x.member_ids().first().cmp(&y.member_ids().first()))
        });
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn edge(a: u64, b: u64, composite: f64) -> SimilarityEdge {
        SimilarityEdge {
            a,
            b,
            composite,
            semantic: composite,
            meta_scores: BTreeMap::new(),
        }
    }

    fn records(ids: &[u64]) -> HashMap<u64, ItemRecord> {
        ids.iter()
            .map(|id| (*id, ItemRecord::named(format!("item-{id}"))))
            .collect()
    }

    fn partition(groups: &[DuplicateGroup]) -> BTreeSet<Vec<u64>> {
        groups.iter().map(|g| g.member_ids()).collect()
    }

    #[test]
    fn find_compresses_long_chains() {
        let mut uf = UnionFind::new();
        for i in 1..10_000u64 {
            uf.union(i + 1, i);
        }
        let root = uf.find(1);
        assert_eq!(uf.find(9_999), root);
        assert_eq!(uf.components().len(), 1);
    }

    #[test]
    fn union_is_idempotent() {
        let mut uf = UnionFind::new();
        assert!(uf.union(1, 2));
        assert!(!uf.union(2, 1));
        assert_eq!(uf.find(1), uf.find(2));
        assert_ne!(uf.find(3), uf.find(1));
        assert_eq!(uf.len(), 3);
    }

    #[test]
    fn transitive_edges_form_one_group() {
        let mut c = Clusterer::new();
        c.accept(edge(1, 2, 0.9));
        c.accept(edge(2, 3, 0.95));
        c.accept(edge(7, 8, 0.99));
        let groups = c.into_groups(&records(&[1, 2, 3, 7, 8]));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].member_ids(), vec![1, 2, 3]);
        assert_eq!(groups[0].edges[0].composite, 0.95);
        assert_eq!(groups[1].member_ids(), vec![7, 8]);
    }

    #[test]
    fn equal_sizes_order_by_smallest_member() {
        let mut c = Clusterer::new();
        c.accept(edge(9, 10, 0.9));
        c.accept(edge(3, 4, 0.9));
        let groups = c.into_groups(&records(&[3, 4, 9, 10]));
        assert_eq!(groups[0].member_ids(), vec![3, 4]);
        assert_eq!(groups[1].member_ids(), vec![9, 10]);
    }

    #[test]
    fn partition_is_independent_of_edge_order() {
        let base = vec![
            edge(1, 2, 0.9),
            edge(3, 4, 0.9),
            edge(2, 3, 0.9),
            edge(5, 6, 0.9),
            edge(6, 1, 0.9),
            edge(10, 11, 0.9),
        ];
        let recs = records(&[1, 2, 3, 4, 5, 6, 10, 11]);

        let expected = {
            let mut c = Clusterer::new();
            for e in &base {
                c.accept(e.clone());
            }
            partition(&c.into_groups(&recs))
        };

        // Rotations and reversals cover every starting edge and both
        // directions of each chain.
        for shift in 0..base.len() {
            let mut order = base.clone();
            order.rotate_left(shift);
            for reversed in [false, true] {
                if reversed {
                    order.reverse();
                }
                let mut c = Clusterer::new();
                for e in &order {
                    let mut e = e.clone();
                    if shift % 2 == 1 {
                        std::mem::swap(&mut e.a, &mut e.b);
                    }
                    c.accept(e);
                }
                assert_eq!(partition(&c.into_groups(&recs)), expected);
            }
        }
        assert_eq!(
            expected,
            BTreeSet::from([vec![1, 2, 3, 4, 5, 6], vec![10, 11]])
        );
    }
}
