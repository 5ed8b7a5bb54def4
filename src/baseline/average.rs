use crate::dataset::{InteractionRecord, InteractionStore, Summary};
use crate::predictor::RatingPredictor;
use crate::prelude::*;

/// Predicts the training mean for every query.
pub struct GlobalAverage {
    summary: Summary,
}

impl GlobalAverage {
    pub fn new(store: InteractionStore) -> Result<Self> {
        Ok(Self {
            summary: store.summary()?,
        })
    }
}

impl RatingPredictor for GlobalAverage {
    fn train(&mut self) -> Result {
        info!(mean_rating = self.summary.mean_rating, "trained");
        Ok(())
    }

    fn predict(&self, _user_id: usize, _item_id: usize, bound: bool) -> f64 {
        self.summary.bounds.apply(self.summary.mean_rating, bound)
    }
}

/// Per-entity mean rating with a fallback to the global one.
struct EntityAverage {
    store: InteractionStore,
    summary: Summary,
    key: fn(&InteractionRecord) -> usize,
    averages: Vec<Option<f64>>,
}

impl EntityAverage {
    fn new(store: InteractionStore, key: fn(&InteractionRecord) -> usize) -> Result<Self> {
        Ok(Self {
            summary: store.summary()?,
            store,
            key,
            averages: Vec::new(),
        })
    }

    fn train(&mut self, n_entities: usize) {
        let mut sums = vec![(0_i64, 0_usize); n_entities];
        for record in self.store.records() {
            let (sum, count) = &mut sums[(self.key)(record)];
            *sum += i64::from(record.rating);
            *count += 1;
        }
        self.averages = sums
            .into_iter()
            .map(|(sum, count)| (count != 0).then(|| sum as f64 / count as f64))
            .collect();
    }

    fn predict(&self, entity_id: usize, bound: bool) -> f64 {
        let average = self
            .averages
            .get(entity_id)
            .copied()
            .flatten()
            .unwrap_or(self.summary.mean_rating);
        self.summary.bounds.apply(average, bound)
    }
}

/// Predicts the user's mean rating.
pub struct UserAverage(EntityAverage);

impl UserAverage {
    pub fn new(store: InteractionStore) -> Result<Self> {
        EntityAverage::new(store, |record| record.user_id).map(Self)
    }
}

impl RatingPredictor for UserAverage {
    fn train(&mut self) -> Result {
        self.0.train(self.0.summary.n_users);
        info!(n_users = self.0.summary.n_users, "trained");
        Ok(())
    }

    fn predict(&self, user_id: usize, _item_id: usize, bound: bool) -> f64 {
        self.0.predict(user_id, bound)
    }
}

/// Predicts the item's mean rating.
pub struct ItemAverage(EntityAverage);

impl ItemAverage {
    pub fn new(store: InteractionStore) -> Result<Self> {
        EntityAverage::new(store, |record| record.item_id).map(Self)
    }
}

impl RatingPredictor for ItemAverage {
    fn train(&mut self) -> Result {
        self.0.train(self.0.summary.n_items);
        info!(n_items = self.0.summary.n_items, "trained");
        Ok(())
    }

    fn predict(&self, _user_id: usize, item_id: usize, bound: bool) -> f64 {
        self.0.predict(item_id, bound)
    }
}
