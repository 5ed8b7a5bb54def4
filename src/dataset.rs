//! Sparse rating interactions.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand::Rng;

pub use self::indexed::*;
use crate::prelude::*;

pub mod indexed;
pub mod reader;

/// Single observed `(user, item, rating)` triple.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InteractionRecord {
    pub user_id: usize,
    pub item_id: usize,
    pub rating: i32,
}

/// Lowest and highest rating observed in a training set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RatingBounds {
    pub min: i32,
    pub max: i32,
}

impl RatingBounds {
    #[must_use]
    pub fn range(self) -> f64 {
        f64::from(self.max - self.min)
    }

    /// Clamps the prediction into `[min, max]` when `bound` is set.
    #[must_use]
    pub fn apply(self, prediction: f64, bound: bool) -> f64 {
        if bound {
            prediction.clamp(f64::from(self.min), f64::from(self.max))
        } else {
            prediction
        }
    }
}

/// Aggregates of a non-empty store.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Summary {
    pub n_ratings: usize,

    /// Maximal user ID plus one.
    pub n_users: usize,

    /// Maximal item ID plus one.
    pub n_items: usize,

    pub bounds: RatingBounds,
    pub mean_rating: f64,
}

/// Append-only store of the training interactions.
///
/// Insertion order is the training order. User and item IDs are treated as dense integers,
/// so per-entity parameters get sized by the maximal ID plus one.
#[derive(Debug, Default, Clone)]
pub struct InteractionStore {
    records: Vec<InteractionRecord>,

    min_user_id: Option<usize>,
    max_user_id: Option<usize>,
    min_item_id: Option<usize>,
    max_item_id: Option<usize>,
    bounds: Option<RatingBounds>,
    rating_sum: i64,

    by_user: OnceLock<Vec<Vec<usize>>>,
    by_item: OnceLock<Vec<Vec<usize>>>,
}

impl InteractionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, user_id: usize, item_id: usize, rating: i32) {
        self.records.push(InteractionRecord {
            user_id,
            item_id,
            rating,
        });

        self.min_user_id = Some(self.min_user_id.map_or(user_id, |id| id.min(user_id)));
        self.max_user_id = Some(self.max_user_id.map_or(user_id, |id| id.max(user_id)));
        self.min_item_id = Some(self.min_item_id.map_or(item_id, |id| id.min(item_id)));
        self.max_item_id = Some(self.max_item_id.map_or(item_id, |id| id.max(item_id)));
        self.bounds = Some(match self.bounds {
            Some(bounds) => RatingBounds {
                min: bounds.min.min(rating),
                max: bounds.max.max(rating),
            },
            None => RatingBounds {
                min: rating,
                max: rating,
            },
        });
        self.rating_sum += i64::from(rating);

        self.rebuild_indices();
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[InteractionRecord] {
        &self.records
    }

    /// Returns the record at the position.
    ///
    /// # Panics
    ///
    /// Panics when the position is out of bounds.
    #[must_use]
    pub fn record(&self, position: usize) -> InteractionRecord {
        self.records[position]
    }

    #[must_use]
    pub fn min_user_id(&self) -> Option<usize> {
        self.min_user_id
    }

    #[must_use]
    pub fn max_user_id(&self) -> Option<usize> {
        self.max_user_id
    }

    #[must_use]
    pub fn min_item_id(&self) -> Option<usize> {
        self.min_item_id
    }

    #[must_use]
    pub fn max_item_id(&self) -> Option<usize> {
        self.max_item_id
    }

    #[must_use]
    pub fn n_users(&self) -> usize {
        self.max_user_id.map_or(0, |id| id + 1)
    }

    #[must_use]
    pub fn n_items(&self) -> usize {
        self.max_item_id.map_or(0, |id| id + 1)
    }

    #[must_use]
    pub fn rating_bounds(&self) -> Option<RatingBounds> {
        self.bounds
    }

    #[must_use]
    pub fn mean_rating(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.rating_sum as f64 / self.records.len() as f64)
    }

    /// Aggregates needed by every trainer. Fails on an empty store.
    pub fn summary(&self) -> Result<Summary> {
        match (self.bounds, self.mean_rating()) {
            (Some(bounds), Some(mean_rating)) => Ok(Summary {
                n_ratings: self.count(),
                n_users: self.n_users(),
                n_items: self.n_items(),
                bounds,
                mean_rating,
            }),
            _ => Err(anyhow!("training set is empty")),
        }
    }

    /// Record positions grouped by user ID. Built on the first call and cached.
    pub fn indices_by_user(&self) -> &[Vec<usize>] {
        self.by_user
            .get_or_init(|| self.build_index(self.n_users(), |record| record.user_id))
    }

    /// Record positions grouped by item ID. Built on the first call and cached.
    pub fn indices_by_item(&self) -> &[Vec<usize>] {
        self.by_item
            .get_or_init(|| self.build_index(self.n_items(), |record| record.item_id))
    }

    /// Drops the cached indices, so that the next access rebuilds them.
    pub fn rebuild_indices(&mut self) {
        self.by_user.take();
        self.by_item.take();
    }

    /// Freshly shuffled record positions. Every call reshuffles.
    pub fn random_permutation<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut permutation = (0..self.records.len()).collect_vec();
        permutation.shuffle(rng);
        permutation
    }

    /// Position of the first record matching the user and item.
    #[must_use]
    pub fn position(&self, user_id: usize, item_id: usize) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.user_id == user_id && record.item_id == item_id)
    }

    /// Items rated by the user, in insertion order.
    pub fn items_of(&self, user_id: usize) -> Vec<usize> {
        self.indices_by_user()
            .get(user_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| self.records[position].item_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Converts the store into per-user and per-item event lists and releases the raw triples.
    #[instrument(level = "debug", skip_all, fields(n_ratings = self.count()))]
    pub fn into_indexed_form(self) -> Result<IndexedInteractions> {
        let summary = self.summary()?;

        let by_user_positions = self.indices_by_user();
        let mut user_positions = vec![0; self.records.len()];
        for positions in by_user_positions {
            for (user_position, &position) in positions.iter().enumerate() {
                user_positions[position] = user_position;
            }
        }

        let by_user = by_user_positions
            .iter()
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| {
                        let record = self.records[position];
                        UserEvent {
                            item_id: record.item_id,
                            rating: record.rating,
                        }
                    })
                    .collect_vec()
            })
            .collect_vec();
        let by_item = self
            .indices_by_item()
            .iter()
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| {
                        let record = self.records[position];
                        ItemEvent {
                            user_id: record.user_id,
                            rating: record.rating,
                            user_position: user_positions[position],
                        }
                    })
                    .collect_vec()
            })
            .collect_vec();

        debug!(n_users = summary.n_users, n_items = summary.n_items, "indexed");
        Ok(IndexedInteractions::new(summary, by_user, by_item))
    }

    fn build_index(&self, size: usize, key: fn(&InteractionRecord) -> usize) -> Vec<Vec<usize>> {
        let mut index = vec![Vec::new(); size];
        for (position, record) in self.records.iter().enumerate() {
            index[key(record)].push(position);
        }
        index
    }
}

impl Extend<(usize, usize, i32)> for InteractionStore {
    fn extend<T: IntoIterator<Item = (usize, usize, i32)>>(&mut self, iter: T) {
        for (user_id, item_id, rating) in iter {
            self.add(user_id, item_id, rating);
        }
    }
}

impl FromIterator<(usize, usize, i32)> for InteractionStore {
    fn from_iter<T: IntoIterator<Item = (usize, usize, i32)>>(iter: T) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::fixtures::scenario_store;

    #[test]
    fn aggregates_ok() -> crate::Result {
        let store = scenario_store();
        assert_eq!(store.count(), 5);
        assert_eq!(store.n_users(), 3);
        assert_eq!(store.n_items(), 2);
        assert_eq!(store.min_user_id(), Some(0));
        assert_eq!(store.max_item_id(), Some(1));
        assert_eq!(store.rating_bounds(), Some(RatingBounds { min: 1, max: 5 }));
        assert!((store.summary()?.mean_rating - 3.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn empty_summary_fails() {
        assert!(InteractionStore::new().summary().is_err());
        assert_eq!(InteractionStore::new().mean_rating(), None);
    }

    #[test]
    fn indices_ok() {
        let store = scenario_store();
        assert_eq!(store.indices_by_user(), &[vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(store.indices_by_item(), &[vec![0, 2, 4], vec![1, 3]]);
        assert_eq!(store.items_of(0), vec![0, 1]);
        assert!(store.items_of(42).is_empty());
    }

    #[test]
    fn add_invalidates_indices() {
        let mut store = scenario_store();
        assert_eq!(store.indices_by_user().len(), 3);
        store.add(5, 0, 3);
        assert_eq!(store.indices_by_user().len(), 6);
        assert_eq!(store.indices_by_user()[5], vec![5]);
    }

    #[test]
    fn random_permutation_ok() {
        let store = (0..100).map(|i| (i, i, 1)).collect::<InteractionStore>();
        let mut rng = StdRng::seed_from_u64(42);
        let first = store.random_permutation(&mut rng);
        let second = store.random_permutation(&mut rng);
        assert_ne!(first, second);
        assert_eq!(first.iter().copied().sorted().collect_vec(), (0..100).collect_vec());
    }

    #[test]
    fn position_ok() {
        let store = scenario_store();
        assert_eq!(store.position(1, 1), Some(3));
        assert_eq!(store.position(2, 1), None);
    }

    #[test]
    fn apply_bounds_ok() {
        let bounds = RatingBounds { min: 1, max: 5 };
        assert!((bounds.apply(7.2, true) - 5.0).abs() < f64::EPSILON);
        assert!((bounds.apply(7.2, false) - 7.2).abs() < f64::EPSILON);
        assert!((bounds.apply(-1.0, true) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn into_indexed_form_ok() -> crate::Result {
        let indexed = scenario_store().into_indexed_form()?;
        assert_eq!(indexed.summary.n_ratings, 5);
        assert_eq!(
            indexed.user_events(1),
            &[
                UserEvent {
                    item_id: 0,
                    rating: 4
                },
                UserEvent {
                    item_id: 1,
                    rating: 2
                },
            ],
        );
        let item_events = indexed.item_events(1);
        assert_eq!(item_events.len(), 2);
        assert_eq!(item_events[1].user_id, 1);
        assert_eq!(item_events[1].user_position, 1);
        assert!(indexed.user_events(42).is_empty());
        Ok(())
    }
}
