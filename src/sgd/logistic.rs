use rand::rngs::StdRng;

use crate::dataset::{InteractionRecord, InteractionStore, Summary};
use crate::helpers::seeded_rng;
use crate::math::{add_scaled, logit, sgd_assign_pair, sigmoid, Matrix};
use crate::predictor::RatingPredictor;
use crate::prelude::*;
use crate::sgd::{run_epoch, BiasConfig, LatentFactorModel, SgdFactorizationConfig, SocialRegularization};

/// Biased matrix factorization squashed into the rating range by the logistic function:
/// `min + sigmoid(global + user bias + item bias + dot) · (max − min)`.
///
/// With a [`SocialRegularization`] attached, gradients are accumulated over the whole epoch
/// and applied in one full-batch step.
pub struct LogisticFactorization {
    store: InteractionStore,
    summary: Summary,
    config: SgdFactorizationConfig,
    bias: BiasConfig,
    social: Option<SocialRegularization>,
    model: LatentFactorModel,
}

/// Derivatives of the squared error with respect to the score.
struct Step {
    prediction_error: f64,
    gradient: f64,
}

impl LogisticFactorization {
    pub fn new(store: InteractionStore, config: SgdFactorizationConfig, bias: BiasConfig) -> Result<Self> {
        let summary = store.summary()?;
        config.validate()?;
        if summary.bounds.min == summary.bounds.max {
            bail!("all the training ratings are equal to {}", summary.bounds.min);
        }
        let mut model =
            LatentFactorModel::new(summary.n_users, summary.n_items, config.n_factors, true);
        model.global_bias =
            logit((summary.mean_rating - f64::from(summary.bounds.min)) / summary.bounds.range());
        Ok(Self {
            store,
            summary,
            config,
            bias,
            social: None,
            model,
        })
    }

    #[must_use]
    pub fn with_social(mut self, social: SocialRegularization) -> Self {
        self.social = Some(social);
        self
    }

    #[must_use]
    pub const fn model(&self) -> &LatentFactorModel {
        &self.model
    }

    fn step(model: &LatentFactorModel, summary: &Summary, record: InteractionRecord) -> Step {
        let range = summary.bounds.range();
        let sigmoid_score = sigmoid(model.score(record.user_id, record.item_id));
        let prediction = f64::from(summary.bounds.min) + sigmoid_score * range;
        let prediction_error = prediction - f64::from(record.rating);
        Step {
            prediction_error,
            gradient: prediction_error * sigmoid_score * (1.0 - sigmoid_score) * range,
        }
    }

    fn stochastic_epoch(&mut self, epoch: usize, rng: &mut StdRng) {
        let (config, bias, summary) = (self.config, self.bias, self.summary);
        let model = &mut self.model;
        run_epoch(epoch, &self.store, rng, |record| {
            let Step {
                prediction_error,
                gradient,
            } = Self::step(model, &summary, record);
            let bias_learning_rate = bias.learning_rate * config.learning_rate;

            let user_bias = &mut model.user_bias[record.user_id];
            *user_bias -= bias_learning_rate * (gradient + bias.user_regularization * *user_bias);
            let item_bias = &mut model.item_bias[record.item_id];
            *item_bias -= bias_learning_rate * (gradient + bias.item_regularization * *item_bias);

            // Descent along the gradient is the ascent along its negation.
            sgd_assign_pair(
                model.user_factors.row_mut(record.user_id),
                model.item_factors.row_mut(record.item_id),
                -gradient,
                config.learning_rate,
                config.user_regularization,
                config.item_regularization,
            );
            prediction_error
        });
    }

    fn full_batch_epoch(&mut self, epoch: usize, rng: &mut StdRng, social: &SocialRegularization) {
        let (config, bias, summary) = (self.config, self.bias, self.summary);
        let n_factors = config.n_factors;
        let mut user_factor_gradients = Matrix::zeros(summary.n_users, n_factors);
        let mut item_factor_gradients = Matrix::zeros(summary.n_items, n_factors);
        let mut user_bias_gradients = vec![0.0; summary.n_users];
        let mut item_bias_gradients = vec![0.0; summary.n_items];

        let model = &self.model;
        run_epoch(epoch, &self.store, rng, |record| {
            let Step {
                prediction_error,
                gradient,
            } = Self::step(model, &summary, record);
            user_bias_gradients[record.user_id] += gradient;
            item_bias_gradients[record.item_id] += gradient;
            add_scaled(
                user_factor_gradients.row_mut(record.user_id),
                model.item_factors.row(record.item_id),
                gradient,
            );
            add_scaled(
                item_factor_gradients.row_mut(record.item_id),
                model.user_factors.row(record.user_id),
                gradient,
            );
            prediction_error
        });

        // L2 regularization.
        for (gradient, value) in user_bias_gradients.iter_mut().zip(&model.user_bias) {
            *gradient += value * config.user_regularization * bias.user_regularization;
        }
        for (gradient, value) in item_bias_gradients.iter_mut().zip(&model.item_bias) {
            *gradient += value * config.item_regularization * bias.item_regularization;
        }
        for user_id in 0..summary.n_users {
            add_scaled(
                user_factor_gradients.row_mut(user_id),
                model.user_factors.row(user_id),
                config.user_regularization,
            );
        }
        for item_id in 0..summary.n_items {
            add_scaled(
                item_factor_gradients.row_mut(item_id),
                model.item_factors.row(item_id),
                config.item_regularization,
            );
        }

        social.add_gradients(model, &mut user_factor_gradients, &mut user_bias_gradients);

        let model = &mut self.model;
        let bias_learning_rate = bias.learning_rate * config.learning_rate;
        add_scaled(&mut model.user_bias, &user_bias_gradients, -bias_learning_rate);
        add_scaled(&mut model.item_bias, &item_bias_gradients, -bias_learning_rate);
        for user_id in 0..summary.n_users {
            add_scaled(
                model.user_factors.row_mut(user_id),
                user_factor_gradients.row(user_id),
                -config.learning_rate,
            );
        }
        for item_id in 0..summary.n_items {
            add_scaled(
                model.item_factors.row_mut(item_id),
                item_factor_gradients.row(item_id),
                -config.learning_rate,
            );
        }
    }
}

impl RatingPredictor for LogisticFactorization {
    #[instrument(
        level = "info",
        skip_all,
        fields(
            n_factors = self.config.n_factors,
            social_weight = self.social.as_ref().map(SocialRegularization::weight),
        ),
    )]
    fn train(&mut self) -> Result {
        let mut rng = seeded_rng(self.config.seed);
        self.model.init(&mut rng)?;

        let social = self.social.take();
        for epoch in 1..=self.config.n_epochs {
            match &social {
                Some(social) => self.full_batch_epoch(epoch, &mut rng, social),
                None => self.stochastic_epoch(epoch, &mut rng),
            }
        }
        self.social = social;
        Ok(())
    }

    fn predict(&self, user_id: usize, item_id: usize, bound: bool) -> f64 {
        if !self.model.contains(user_id, item_id) {
            return self.summary.mean_rating;
        }
        let bounds = self.summary.bounds;
        let prediction =
            f64::from(bounds.min) + sigmoid(self.model.score(user_id, item_id)) * bounds.range();
        bounds.apply(prediction, bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::rmse;
    use crate::fixtures::{dense_store, scenario_store};
    use crate::{GlobalAverage, TrustGraph};

    fn config() -> SgdFactorizationConfig {
        SgdFactorizationConfig::default()
            .n_factors(4)
            .learning_rate(0.05)
            .regularization(0.01, 0.01)
            .n_epochs(150)
            .seed(42)
    }

    #[test]
    fn global_bias_is_mean_logit_ok() -> crate::Result {
        let factorization = LogisticFactorization::new(scenario_store(), config(), BiasConfig::default())?;
        // (3 − 1) / 4 = ½.
        assert!(factorization.model().global_bias.abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn fits_training_set_ok() -> crate::Result {
        let mut factorization = LogisticFactorization::new(dense_store(), config(), BiasConfig::default())?;
        factorization.train()?;
        assert!(rmse(&factorization, &dense_store()) < 0.6);
        Ok(())
    }

    #[test]
    fn unbounded_stays_within_range_ok() -> crate::Result {
        let mut factorization = LogisticFactorization::new(scenario_store(), config(), BiasConfig::default())?;
        factorization.train()?;
        let prediction = factorization.predict(0, 1, false);
        assert!(prediction > 1.0 && prediction < 5.0);
        Ok(())
    }

    #[test]
    fn unknown_ids_fall_back_to_mean_ok() -> crate::Result {
        let factorization = LogisticFactorization::new(scenario_store(), config(), BiasConfig::default())?;
        assert!((factorization.predict(3, 0, true) - 3.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn constant_ratings_fail() {
        let store = [(0, 0, 3), (1, 1, 3)].into_iter().collect::<InteractionStore>();
        assert!(LogisticFactorization::new(store, config(), BiasConfig::default()).is_err());
    }

    #[test]
    fn social_full_batch_beats_global_average_ok() -> crate::Result {
        let graph = (0..20).map(|user_id| (user_id, (user_id + 3) % 20)).collect();
        let config = config().learning_rate(0.01).n_epochs(300);
        let mut factorization = LogisticFactorization::new(dense_store(), config, BiasConfig::default())?
            .with_social(SocialRegularization::new(graph, 0.01));
        factorization.train()?;
        assert!(factorization.social.is_some());

        let mut average = GlobalAverage::new(dense_store())?;
        average.train()?;
        assert!(rmse(&factorization, &dense_store()) < rmse(&average, &dense_store()));
        Ok(())
    }

    #[test]
    fn social_term_pulls_trusting_users_together_ok() -> crate::Result {
        fn squared_distance(model: &LatentFactorModel) -> f64 {
            let bias = model.user_bias[0] - model.user_bias[1];
            let factors = model
                .user_factors
                .row(0)
                .iter()
                .zip(model.user_factors.row(1))
                .map(|(left, right)| (left - right).powi(2))
                .sum::<f64>();
            bias * bias + factors
        }

        let config = config().learning_rate(0.01).n_epochs(200);
        let train = |weight: f64| -> crate::Result<LatentFactorModel> {
            let graph = [(0, 1), (1, 0)].into_iter().collect();
            let mut factorization = LogisticFactorization::new(dense_store(), config, BiasConfig::default())?
                .with_social(SocialRegularization::new(graph, weight));
            factorization.train()?;
            Ok(factorization.model().clone())
        };
        let independent = train(0.0)?;
        let social = train(1.0)?;
        assert!(
            squared_distance(&social) < squared_distance(&independent),
            "{} >= {}",
            squared_distance(&social),
            squared_distance(&independent),
        );
        Ok(())
    }

    #[test]
    fn full_batch_epoch_steps_once_from_frozen_model_ok() -> crate::Result {
        let store = [(0, 0, 5), (0, 1, 1)].into_iter().collect::<InteractionStore>();
        let config = config().n_factors(2).learning_rate(0.1).regularization(0.2, 0.3);
        let bias = BiasConfig::default();
        let mut factorization = LogisticFactorization::new(store, config, bias)?;
        let mut rng = seeded_rng(Some(42));
        factorization.model.init(&mut rng)?;
        factorization.model.user_factors.row_mut(0).copy_from_slice(&[0.5, -0.3]);
        factorization.model.item_factors.row_mut(0).copy_from_slice(&[0.4, 0.2]);
        factorization.model.item_factors.row_mut(1).copy_from_slice(&[-0.6, 0.1]);
        let frozen = factorization.model.clone();

        let social = SocialRegularization::new(TrustGraph::new(), 0.0);
        factorization.full_batch_epoch(1, &mut rng, &social);
        let model = factorization.model();

        // ∂E/∂score = (prediction − rating) · σ · (1 − σ) · (max − min), from the frozen parameters.
        let gradients = [(0, 5.0), (1, 1.0)].map(|(item_id, rating)| {
            let sigmoid_score = sigmoid(frozen.score(0, item_id));
            (1.0 + 4.0 * sigmoid_score - rating) * sigmoid_score * (1.0 - sigmoid_score) * 4.0
        });
        let bias_learning_rate = bias.learning_rate * config.learning_rate;

        let expected_user_bias = frozen.user_bias[0]
            - bias_learning_rate
                * (gradients[0] + gradients[1] + frozen.user_bias[0] * 0.2 * bias.user_regularization);
        assert!((model.user_bias[0] - expected_user_bias).abs() < 1e-12);

        for item_id in 0..2 {
            let expected_item_bias = frozen.item_bias[item_id]
                - bias_learning_rate
                    * (gradients[item_id] + frozen.item_bias[item_id] * 0.3 * bias.item_regularization);
            assert!((model.item_bias[item_id] - expected_item_bias).abs() < 1e-12);
        }

        for k in 0..2 {
            let user_factor = frozen.user_factors[(0, k)];
            let expected_user_factor = user_factor
                - 0.1
                    * (gradients[0] * frozen.item_factors[(0, k)]
                        + gradients[1] * frozen.item_factors[(1, k)]
                        + 0.2 * user_factor);
            assert!((model.user_factors[(0, k)] - expected_user_factor).abs() < 1e-12);

            for item_id in 0..2 {
                let item_factor = frozen.item_factors[(item_id, k)];
                let expected_item_factor =
                    item_factor - 0.1 * (gradients[item_id] * user_factor + 0.3 * item_factor);
                assert!((model.item_factors[(item_id, k)] - expected_item_factor).abs() < 1e-12);
            }
        }
        Ok(())
    }
}
