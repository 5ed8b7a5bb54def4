use crate::dataset::{InteractionStore, Summary};
use crate::helpers::seeded_rng;
use crate::math::sgd_assign_pair;
use crate::predictor::RatingPredictor;
use crate::prelude::*;
use crate::sgd::{run_epoch, LatentFactorModel, SgdFactorizationConfig};

/// Probabilistic matrix factorization: `mean + dot(user, item)` with a linear residual.
///
/// See: Salakhutdinov & Mnih, «Probabilistic Matrix Factorization», NIPS 2007.
pub struct ProbabilisticMatrixFactorization {
    store: InteractionStore,
    summary: Summary,
    config: SgdFactorizationConfig,
    model: LatentFactorModel,
}

impl ProbabilisticMatrixFactorization {
    pub fn new(store: InteractionStore, config: SgdFactorizationConfig) -> Result<Self> {
        let summary = store.summary()?;
        config.validate()?;
        let mut model =
            LatentFactorModel::new(summary.n_users, summary.n_items, config.n_factors, false);
        model.global_bias = summary.mean_rating;
        Ok(Self {
            store,
            summary,
            config,
            model,
        })
    }

    #[must_use]
    pub const fn model(&self) -> &LatentFactorModel {
        &self.model
    }
}

impl RatingPredictor for ProbabilisticMatrixFactorization {
    #[instrument(level = "info", skip_all, fields(n_factors = self.config.n_factors))]
    fn train(&mut self) -> Result {
        let config = self.config;
        let mut rng = seeded_rng(config.seed);
        self.model.init(&mut rng)?;

        for epoch in 1..=config.n_epochs {
            let model = &mut self.model;
            run_epoch(epoch, &self.store, &mut rng, |record| {
                let residual_error = f64::from(record.rating) - model.score(record.user_id, record.item_id);
                sgd_assign_pair(
                    model.user_factors.row_mut(record.user_id),
                    model.item_factors.row_mut(record.item_id),
                    residual_error,
                    config.learning_rate,
                    config.user_regularization,
                    config.item_regularization,
                );
                residual_error
            });
        }
        Ok(())
    }

    fn predict(&self, user_id: usize, item_id: usize, bound: bool) -> f64 {
        if !self.model.contains(user_id, item_id) {
            return self.model.global_bias;
        }
        self.summary
            .bounds
            .apply(self.model.score(user_id, item_id), bound)
    }
}
