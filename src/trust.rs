//! Directed trust relations between users.

use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Sparse boolean adjacency: `trusts(u)` lists the users `u` trusts.
///
/// The transpose is derived on first use and cached.
#[derive(Default, Clone)]
pub struct TrustGraph {
    trusts: Vec<BTreeSet<usize>>,
    n_edges: usize,
    trusted_by: OnceLock<Vec<BTreeSet<usize>>>,
}

impl TrustGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the edge `truster → trustee`. Returns `false` if the edge already existed.
    pub fn add(&mut self, truster: usize, trustee: usize) -> bool {
        let n_users = truster.max(trustee) + 1;
        if self.trusts.len() < n_users {
            self.trusts.resize_with(n_users, BTreeSet::new);
        }
        let is_inserted = self.trusts[truster].insert(trustee);
        if is_inserted {
            self.n_edges += 1;
            self.trusted_by.take();
        }
        is_inserted
    }

    /// Maximal user ID mentioned in the graph plus one.
    #[must_use]
    pub fn n_users(&self) -> usize {
        self.trusts.len()
    }

    #[must_use]
    pub fn n_edges(&self) -> usize {
        self.n_edges
    }

    /// Users trusted by the user.
    pub fn trusts(&self, user_id: usize) -> impl Iterator<Item = usize> + '_ {
        self.trusts.get(user_id).into_iter().flatten().copied()
    }

    /// Out-degree of the user.
    #[must_use]
    pub fn n_trusted(&self, user_id: usize) -> usize {
        self.trusts.get(user_id).map_or(0, BTreeSet::len)
    }

    /// Users who trust the user.
    pub fn trusted_by(&self, user_id: usize) -> impl Iterator<Item = usize> + '_ {
        self.transposed()
            .get(user_id)
            .into_iter()
            .flatten()
            .copied()
    }

    fn transposed(&self) -> &[BTreeSet<usize>] {
        self.trusted_by.get_or_init(|| {
            let mut trusted_by = vec![BTreeSet::new(); self.trusts.len()];
            for (truster, trustees) in self.trusts.iter().enumerate() {
                for &trustee in trustees {
                    trusted_by[trustee].insert(truster);
                }
            }
            trusted_by
        })
    }
}

impl FromIterator<(usize, usize)> for TrustGraph {
    fn from_iter<T: IntoIterator<Item = (usize, usize)>>(iter: T) -> Self {
        let mut graph = Self::new();
        for (truster, trustee) in iter {
            graph.add(truster, trustee);
        }
        graph
    }
}
