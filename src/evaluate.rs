//! Offline evaluation of a trained predictor.

use crate::dataset::InteractionStore;
use crate::predictor::RatingPredictor;
use crate::prelude::*;

/// Running root-mean-square error.
#[derive(Default, Debug, Copy, Clone)]
pub struct Rmse {
    sum_of_squares: f64,
    count: usize,
}

impl Rmse {
    #[inline]
    pub fn push(&mut self, residual_error: f64) {
        self.sum_of_squares += residual_error * residual_error;
        self.count += 1;
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn average(&self) -> f64 {
        (self.sum_of_squares / self.count.max(1) as f64).sqrt()
    }
}

/// RMSE of the bounded predictions over the test interactions.
#[instrument(level = "info", skip_all, fields(n_ratings = test.count()))]
pub fn rmse(predictor: &impl RatingPredictor, test: &InteractionStore) -> f64 {
    let mut error = Rmse::default();
    for record in test.records() {
        let prediction = predictor.predict(record.user_id, record.item_id, true);
        error.push(prediction - f64::from(record.rating));
    }
    let rmse = error.average();
    info!(rmse, "evaluated");
    rmse
}
