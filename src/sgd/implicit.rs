use crate::dataset::{InteractionStore, Summary};
use crate::helpers::seeded_rng;
use crate::math::{add_scaled, dot, sgd_assign, Matrix};
use crate::predictor::RatingPredictor;
use crate::prelude::*;
use crate::sgd::{run_epoch, BiasConfig, LatentFactorModel, SgdFactorizationConfig};

/// Biased factorization with implicit feedback: a user is represented by
/// `p[u] + |R(u)|^-½ · Σ y[i]` over the items `R(u)` they rated.
///
/// See: Koren, «Factorization Meets the Neighborhood», KDD 2008.
pub struct SvdPlusPlus {
    store: InteractionStore,
    summary: Summary,
    config: SgdFactorizationConfig,
    bias: BiasConfig,

    /// Materialized user representations after training, item factors and biases.
    model: LatentFactorModel,

    /// Explicit user factors.
    p: Matrix,

    /// Implicit item factors.
    y: Matrix,

    who_rated_what: Vec<Vec<usize>>,
}

impl SvdPlusPlus {
    pub fn new(store: InteractionStore, config: SgdFactorizationConfig, bias: BiasConfig) -> Result<Self> {
        let summary = store.summary()?;
        config.validate()?;
        let mut model =
            LatentFactorModel::new(summary.n_users, summary.n_items, config.n_factors, true);
        model.global_bias = summary.mean_rating;
        Ok(Self {
            who_rated_what: (0..summary.n_users).map(|user_id| store.items_of(user_id)).collect(),
            p: Matrix::zeros(summary.n_users, config.n_factors),
            y: Matrix::zeros(summary.n_items, config.n_factors),
            store,
            summary,
            config,
            bias,
            model,
        })
    }

    #[must_use]
    pub const fn model(&self) -> &LatentFactorModel {
        &self.model
    }

    /// `p[u] + |R(u)|^-½ · Σ y[i]`.
    fn user_representation(p: &Matrix, y: &Matrix, rated: &[usize], user_id: usize) -> Vec<f64> {
        let mut representation = vec![0.0; p.n_columns()];
        for &item_id in rated {
            add_scaled(&mut representation, y.row(item_id), 1.0);
        }
        let norm = (rated.len().max(1) as f64).sqrt();
        for (value, explicit) in representation.iter_mut().zip(p.row(user_id)) {
            *value = *value / norm + explicit;
        }
        representation
    }

    /// Materializes the user factors from `p` and `y`.
    fn calculate_user_factors(&mut self) {
        for (user_id, rated) in self.who_rated_what.iter().enumerate() {
            let representation = Self::user_representation(&self.p, &self.y, rated, user_id);
            self.model
                .user_factors
                .row_mut(user_id)
                .copy_from_slice(&representation);
        }
    }
}

impl RatingPredictor for SvdPlusPlus {
    #[instrument(level = "info", skip_all, fields(n_factors = self.config.n_factors))]
    fn train(&mut self) -> Result {
        let (config, bias) = (self.config, self.bias);
        let mut rng = seeded_rng(config.seed);
        self.model.init(&mut rng)?;
        self.p.fill_normal(0.01, &mut rng)?;
        self.y.fill_normal(0.01, &mut rng)?;

        for epoch in 1..=config.n_epochs {
            let (model, p, y) = (&mut self.model, &mut self.p, &mut self.y);
            let who_rated_what = &self.who_rated_what;
            run_epoch(epoch, &self.store, &mut rng, |record| {
                let (user_id, item_id) = (record.user_id, record.item_id);
                let rated = &who_rated_what[user_id];
                let representation = Self::user_representation(p, y, rated, user_id);

                let prediction = model.global_bias
                    + model.user_bias[user_id]
                    + model.item_bias[item_id]
                    + dot(&representation, model.item_factors.row(item_id));
                let residual_error = f64::from(record.rating) - prediction;

                let bias_learning_rate = bias.learning_rate * config.learning_rate;
                let user_bias = &mut model.user_bias[user_id];
                *user_bias += bias_learning_rate * (residual_error - bias.user_regularization * *user_bias);
                let item_bias = &mut model.item_bias[item_id];
                *item_bias += bias_learning_rate * (residual_error - bias.item_regularization * *item_bias);

                let item_factors = model.item_factors.row(item_id).to_vec();
                sgd_assign(
                    p.row_mut(user_id),
                    &item_factors,
                    residual_error,
                    config.learning_rate,
                    config.user_regularization,
                );
                sgd_assign(
                    model.item_factors.row_mut(item_id),
                    &representation,
                    residual_error,
                    config.learning_rate,
                    config.item_regularization,
                );
                let implicit_error = residual_error / (rated.len() as f64).sqrt();
                for &rated_item_id in rated {
                    sgd_assign(
                        y.row_mut(rated_item_id),
                        &item_factors,
                        implicit_error,
                        config.learning_rate,
                        config.item_regularization,
                    );
                }
                residual_error
            });
        }

        self.calculate_user_factors();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::rmse;
    use crate::fixtures::{dense_store, scenario_store};

    fn config() -> SgdFactorizationConfig {
        SgdFactorizationConfig::default()
            .n_factors(4)
            .learning_rate(0.01)
            .regularization(0.01, 0.01)
            .n_epochs(100)
            .seed(42)
    }

    #[test]
    fn fits_training_set_ok() -> crate::Result {
        let mut svd = SvdPlusPlus::new(dense_store(), config(), BiasConfig::default())?;
        svd.train()?;
        assert!(rmse(&svd, &dense_store()) < 0.6);
        Ok(())
    }

    #[test]
    fn user_factors_materialized_ok() -> crate::Result {
        let mut svd = SvdPlusPlus::new(scenario_store(), config(), BiasConfig::default())?;
        svd.train()?;
        for user_id in 0..3 {
            let expected = SvdPlusPlus::user_representation(&svd.p, &svd.y, &svd.who_rated_what[user_id], user_id);
            assert_eq!(svd.model().user_factors.row(user_id), expected.as_slice());
        }
        Ok(())
    }

    #[test]
    fn unknown_ids_fall_back_to_mean_ok() -> crate::Result {
        let svd = SvdPlusPlus::new(scenario_store(), config(), BiasConfig::default())?;
        assert!((svd.predict(0, 2, true) - 3.0).abs() < f64::EPSILON);
        Ok(())
    }
}
