//! Restricted Boltzmann machine with softmax visible units, trained by contrastive divergence.
//!
//! See: Salakhutdinov, Mnih, Hinton, «Restricted Boltzmann Machines for Collaborative Filtering», ICML 2007.
//!
//! There is no divergence detection: a too large learning rate silently produces garbage.

use rand::rngs::StdRng;
use rand::Rng;

use self::schedule::{n_gibbs_steps, Annealing, LearningRates};
use crate::dataset::{IndexedInteractions, InteractionStore};
use crate::evaluate::Rmse;
use crate::helpers::seeded_rng;
use crate::helpers::tracing::format_elapsed;
use crate::math::{sigmoid, Matrix, Tensor3};
use crate::opts::parsers::{non_negative_f64, non_zero_usize, positive_f64};
use crate::predictor::RatingPredictor;
use crate::prelude::*;

pub mod schedule;

#[derive(Debug, Copy, Clone, clap::Args)]
pub struct RbmConfig {
    /// Number of hidden units
    #[arg(long = "hidden", default_value_t = 100, value_parser = non_zero_usize)]
    pub n_hidden: usize,

    /// Number of rating categories of a visible unit
    #[arg(long, default_value_t = 5, value_parser = non_zero_usize)]
    pub softmax: usize,

    /// Rating that maps onto the first category
    #[arg(long, default_value_t = 1)]
    pub min_rating: i32,

    /// Learning rate of the weights
    #[arg(long = "epsilon-w", default_value_t = 0.001, value_parser = positive_f64)]
    pub weight_learning_rate: f64,

    /// Learning rate of the visible biases
    #[arg(long = "epsilon-vb", default_value_t = 0.008, value_parser = positive_f64)]
    pub visible_learning_rate: f64,

    /// Learning rate of the hidden biases
    #[arg(long = "epsilon-hb", default_value_t = 0.0006, value_parser = positive_f64)]
    pub hidden_learning_rate: f64,

    /// Weight decay
    #[arg(long, default_value_t = 0.0001, value_parser = non_negative_f64)]
    pub weight_cost: f64,

    /// Momentum of the first five epochs
    #[arg(long, default_value_t = 0.8, value_parser = non_negative_f64)]
    pub momentum: f64,

    /// Momentum of the later epochs
    #[arg(long, default_value_t = 0.9, value_parser = non_negative_f64)]
    pub final_momentum: f64,

    /// Number of users per minibatch
    #[arg(long, default_value_t = 100, value_parser = non_zero_usize)]
    pub batch_size: usize,

    /// Number of passes over the users
    #[arg(long = "epochs", default_value_t = 20, value_parser = non_zero_usize)]
    pub n_epochs: usize,

    /// Random seed, drawn from the OS when omitted
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for RbmConfig {
    fn default() -> Self {
        Self {
            n_hidden: 100,
            softmax: 5,
            min_rating: 1,
            weight_learning_rate: 0.001,
            visible_learning_rate: 0.008,
            hidden_learning_rate: 0.0006,
            weight_cost: 0.0001,
            momentum: 0.8,
            final_momentum: 0.9,
            batch_size: 100,
            n_epochs: 20,
            seed: None,
        }
    }
}

impl RbmConfig {
    #[must_use]
    fn learning_rates(&self) -> LearningRates {
        LearningRates {
            weights: self.weight_learning_rate,
            visible_biases: self.visible_learning_rate,
            hidden_biases: self.hidden_learning_rate,
        }
    }

    #[must_use]
    fn momentum_at(&self, epoch: usize) -> f64 {
        if epoch > 5 { self.final_momentum } else { self.momentum }
    }
}

/// Sufficient statistics of a minibatch.
struct BatchStatistics {
    positive_products: Tensor3,
    negative_products: Tensor3,
    positive_hidden: Vec<f64>,
    negative_hidden: Vec<f64>,
    positive_visible: Matrix,
    negative_visible: Matrix,

    /// Number of the batch users who rated the item.
    item_counts: Vec<usize>,
}

impl BatchStatistics {
    fn new(n_items: usize, softmax: usize, n_hidden: usize) -> Self {
        Self {
            positive_products: Tensor3::zeros(n_items, softmax, n_hidden),
            negative_products: Tensor3::zeros(n_items, softmax, n_hidden),
            positive_hidden: vec![0.0; n_hidden],
            negative_hidden: vec![0.0; n_hidden],
            positive_visible: Matrix::zeros(n_items, softmax),
            negative_visible: Matrix::zeros(n_items, softmax),
            item_counts: vec![0; n_items],
        }
    }

    fn reset(&mut self) {
        self.positive_products.fill(0.0);
        self.negative_products.fill(0.0);
        self.positive_hidden.fill(0.0);
        self.negative_hidden.fill(0.0);
        self.positive_visible.fill(0.0);
        self.negative_visible.fill(0.0);
        self.item_counts.fill(0);
    }
}

pub struct RestrictedBoltzmannMachine {
    data: IndexedInteractions,
    test: Option<InteractionStore>,
    config: RbmConfig,

    /// `W[item][category][hidden]`.
    weights: Tensor3,
    visible_biases: Matrix,
    hidden_biases: Vec<f64>,

    weight_increments: Tensor3,
    visible_bias_increments: Matrix,
    hidden_bias_increments: Vec<f64>,
}

impl RestrictedBoltzmannMachine {
    pub fn new(store: InteractionStore, config: RbmConfig) -> Result<Self> {
        if config.n_hidden == 0 || config.softmax == 0 {
            bail!("numbers of hidden units and categories must be positive");
        }
        let data = store.into_indexed_form()?;
        let bounds = data.summary.bounds;
        let max_rating = i64::from(config.min_rating) + config.softmax as i64 - 1;
        if bounds.min < config.min_rating || i64::from(bounds.max) > max_rating {
            bail!(
                "ratings [{}, {}] do not fit the scale [{}, {}]",
                bounds.min,
                bounds.max,
                config.min_rating,
                max_rating,
            );
        }

        let (n_items, softmax, n_hidden) = (data.n_items(), config.softmax, config.n_hidden);
        Ok(Self {
            data,
            test: None,
            config,
            weights: Tensor3::zeros(n_items, softmax, n_hidden),
            visible_biases: Matrix::zeros(n_items, softmax),
            hidden_biases: vec![0.0; n_hidden],
            weight_increments: Tensor3::zeros(n_items, softmax, n_hidden),
            visible_bias_increments: Matrix::zeros(n_items, softmax),
            hidden_bias_increments: vec![0.0; n_hidden],
        })
    }

    /// Attaches a test set, the error on which is logged after each epoch.
    #[must_use]
    pub fn with_test(mut self, test: InteractionStore) -> Self {
        self.test = Some(test);
        self
    }

    /// Normalized probabilities of the item's rating categories for the user.
    #[must_use]
    pub fn visible_probabilities(&self, user_id: usize, item_id: usize) -> Option<Vec<f64>> {
        if user_id >= self.data.n_users() || item_id >= self.data.n_items() {
            return None;
        }
        let hidden = self.hidden_probabilities(user_id);
        Some(self.visible_probabilities_given(&hidden, item_id))
    }

    fn category(&self, rating: i32) -> usize {
        (rating - self.config.min_rating) as usize
    }

    fn init(&mut self, rng: &mut StdRng) {
        for weight in self.weights.iter_mut() {
            *weight = rng.gen_range(-0.01..=0.01);
        }

        let softmax = self.config.softmax;
        let mut counts = Matrix::zeros(self.data.n_items(), softmax);
        for user_id in 0..self.data.n_users() {
            for event in self.data.user_events(user_id) {
                counts[(event.item_id, self.category(event.rating))] += 1.0;
            }
        }
        for (item_id, counts) in counts.rows().enumerate() {
            let total: f64 = counts.iter().sum();
            let biases = self.visible_biases.row_mut(item_id);
            if total == 0.0 {
                biases.iter_mut().for_each(|bias| *bias = rng.gen::<f64>() * 0.001);
            } else {
                for (bias, count) in biases.iter_mut().zip(counts) {
                    *bias = ((count + 1.0) / (total + softmax as f64)).ln();
                }
            }
        }

        self.hidden_biases.fill(0.0);
        self.weight_increments.fill(0.0);
        self.visible_bias_increments.fill(0.0);
        self.hidden_bias_increments.fill(0.0);
    }

    /// `Σ W[item][category][..]` over the `(item, category)` pairs.
    fn hidden_inputs(&self, visible: impl Iterator<Item = (usize, usize)>) -> Vec<f64> {
        let mut inputs = self.hidden_biases.clone();
        for (item_id, category) in visible {
            for (input, weight) in inputs.iter_mut().zip(self.weights.lane(item_id, category)) {
                *input += weight;
            }
        }
        inputs
    }

    /// Deterministic hidden activations given the user's actual ratings.
    fn hidden_probabilities(&self, user_id: usize) -> Vec<f64> {
        let events = self.data.user_events(user_id);
        let mut probabilities =
            self.hidden_inputs(events.iter().map(|event| (event.item_id, self.category(event.rating))));
        probabilities.iter_mut().for_each(|input| *input = sigmoid(*input));
        probabilities
    }

    /// Softmax probabilities of the item's categories given the hidden activations.
    fn visible_probabilities_given(&self, hidden: &[f64], item_id: usize) -> Vec<f64> {
        let mut probabilities = (0..self.config.softmax)
            .map(|category| {
                let input = self
                    .weights
                    .lane(item_id, category)
                    .iter()
                    .zip(hidden)
                    .map(|(weight, state)| weight * state)
                    .sum::<f64>();
                sigmoid(input + self.visible_biases[(item_id, category)])
            })
            .collect::<Vec<_>>();
        let sum: f64 = probabilities.iter().sum();
        if sum != 0.0 {
            probabilities.iter_mut().for_each(|probability| *probability /= sum);
        }
        probabilities
    }

    fn expected_rating(&self, hidden: &[f64], item_id: usize) -> f64 {
        let expected_category: f64 = self
            .visible_probabilities_given(hidden, item_id)
            .iter()
            .enumerate()
            .map(|(category, probability)| category as f64 * probability)
            .sum();
        f64::from(self.config.min_rating) + expected_category
    }

    /// Runs the positive and the negative phase on the user, accumulating the statistics.
    fn contrast(&self, user_id: usize, n_steps: usize, statistics: &mut BatchStatistics, rng: &mut StdRng) {
        let visible = self
            .data
            .user_events(user_id)
            .iter()
            .map(|event| (event.item_id, self.category(event.rating)))
            .collect_vec();
        for &(item_id, category) in &visible {
            statistics.item_counts[item_id] += 1;
            statistics.positive_visible[(item_id, category)] += 1.0;
        }

        let positive_hidden = sample_bernoulli(self.hidden_inputs(visible.iter().copied()), rng);
        for (activity, state) in statistics.positive_hidden.iter_mut().zip(&positive_hidden) {
            *activity += state;
        }

        let mut hidden = positive_hidden.clone();
        let mut negative_visible = vec![0; visible.len()];
        let mut negative_hidden = Vec::new();
        for step in 1..=n_steps {
            let is_final = step == n_steps;
            for (negative_category, &(item_id, _)) in negative_visible.iter_mut().zip(&visible) {
                let probabilities = self.visible_probabilities_given(&hidden, item_id);
                *negative_category = sample_categorical(&probabilities, rng);
                if is_final {
                    statistics.negative_visible[(item_id, *negative_category)] += 1.0;
                }
            }
            let inputs = self.hidden_inputs(
                visible
                    .iter()
                    .zip(&negative_visible)
                    .map(|(&(item_id, _), &category)| (item_id, category)),
            );
            negative_hidden = sample_bernoulli(inputs, rng);
            if is_final {
                for (activity, state) in statistics.negative_hidden.iter_mut().zip(&negative_hidden) {
                    *activity += state;
                }
            } else {
                hidden.clone_from(&negative_hidden);
            }
        }

        for (&(item_id, category), &negative_category) in visible.iter().zip(&negative_visible) {
            let products = statistics.positive_products.lane_mut(item_id, category);
            for (product, state) in products.iter_mut().zip(&positive_hidden) {
                *product += state;
            }
            let products = statistics.negative_products.lane_mut(item_id, negative_category);
            for (product, state) in products.iter_mut().zip(&negative_hidden) {
                *product += state;
            }
        }
    }

    /// Applies the minibatch gradients of `n_cases` users.
    fn update(&mut self, statistics: &BatchStatistics, n_cases: usize, rates: LearningRates, momentum: f64) {
        let weight_cost = self.config.weight_cost;
        for (item_id, &count) in statistics.item_counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let count = count as f64;
            for category in 0..self.config.softmax {
                let positive = statistics.positive_products.lane(item_id, category);
                let negative = statistics.negative_products.lane(item_id, category);
                let increments = self.weight_increments.lane_mut(item_id, category);
                let weights = self.weights.lane_mut(item_id, category);
                for (((weight, increment), positive), negative) in
                    weights.iter_mut().zip(increments).zip(positive).zip(negative)
                {
                    if *positive == 0.0 && *negative == 0.0 {
                        continue;
                    }
                    let gradient = (positive - negative) / count - weight_cost * *weight;
                    *increment = momentum * *increment + rates.weights * gradient;
                    *weight += *increment;
                }

                let positive = statistics.positive_visible[(item_id, category)];
                let negative = statistics.negative_visible[(item_id, category)];
                if positive != 0.0 || negative != 0.0 {
                    let increment = &mut self.visible_bias_increments[(item_id, category)];
                    *increment = momentum * *increment + rates.visible_biases * (positive - negative) / count;
                    self.visible_biases[(item_id, category)] += *increment;
                }
            }
        }

        let n_cases = n_cases as f64;
        for (((bias, increment), positive), negative) in self
            .hidden_biases
            .iter_mut()
            .zip(&mut self.hidden_bias_increments)
            .zip(&statistics.positive_hidden)
            .zip(&statistics.negative_hidden)
        {
            if *positive == 0.0 && *negative == 0.0 {
                continue;
            }
            *increment = momentum * *increment + rates.hidden_biases * (positive - negative) / n_cases;
            *bias += *increment;
        }
    }

    fn training_error(&self) -> Rmse {
        let mut error = Rmse::default();
        for user_id in 0..self.data.n_users() {
            let hidden = self.hidden_probabilities(user_id);
            for event in self.data.user_events(user_id) {
                error.push(self.expected_rating(&hidden, event.item_id) - f64::from(event.rating));
            }
        }
        error
    }

    fn test_error(&self, test: &InteractionStore) -> Rmse {
        let mut error = Rmse::default();
        for (user_id, positions) in test.indices_by_user().iter().enumerate() {
            if positions.is_empty() {
                continue;
            }
            let hidden = (user_id < self.data.n_users()).then(|| self.hidden_probabilities(user_id));
            for &position in positions {
                let record = test.record(position);
                let prediction = match &hidden {
                    Some(hidden) if record.item_id < self.data.n_items() => {
                        self.expected_rating(hidden, record.item_id)
                    }
                    _ => self.data.summary.mean_rating,
                };
                error.push(self.data.summary.bounds.apply(prediction, true) - f64::from(record.rating));
            }
        }
        error
    }
}

/// Turns the inputs into binary states, each being on with the probability `sigmoid(input)`.
fn sample_bernoulli(mut inputs: Vec<f64>, rng: &mut StdRng) -> Vec<f64> {
    for input in &mut inputs {
        *input = if sigmoid(*input) > rng.gen::<f64>() { 1.0 } else { 0.0 };
    }
    inputs
}

fn sample_categorical(probabilities: &[f64], rng: &mut StdRng) -> usize {
    let mut remainder = rng.gen::<f64>();
    for (category, probability) in probabilities.iter().enumerate() {
        remainder -= probability;
        if remainder <= 0.0 {
            return category;
        }
    }
    probabilities.len() - 1
}

impl RatingPredictor for RestrictedBoltzmannMachine {
    #[instrument(
        level = "info",
        skip_all,
        fields(n_hidden = self.config.n_hidden, softmax = self.config.softmax),
    )]
    fn train(&mut self) -> Result {
        let config = self.config;
        let mut rng = seeded_rng(config.seed);
        self.init(&mut rng);

        let n_users = self.data.n_users();
        let mut statistics = BatchStatistics::new(self.data.n_items(), config.softmax, config.n_hidden);
        let mut annealing = Annealing::new(config.learning_rates(), config.n_hidden);

        for epoch in 1..=config.n_epochs {
            let start_instant = Instant::now();
            let rates = annealing.next().unwrap_or_else(|| config.learning_rates());
            let (n_steps, momentum) = (n_gibbs_steps(epoch), config.momentum_at(epoch));
            debug!(epoch, n_steps, momentum, ?rates, "starting epoch");

            statistics.reset();
            for user_id in 0..n_users {
                self.contrast(user_id, n_steps, &mut statistics, &mut rng);
                if (user_id + 1) % config.batch_size == 0 || user_id + 1 == n_users {
                    self.update(&statistics, user_id % config.batch_size + 1, rates, momentum);
                    statistics.reset();
                }
            }

            let test_rmse = self.test.as_ref().map(|test| self.test_error(test).average());
            info!(
                epoch,
                rmse = self.training_error().average(),
                test_rmse,
                elapsed = %format_elapsed(start_instant),
                "epoch done",
            );
        }
        Ok(())
    }

    fn predict(&self, user_id: usize, item_id: usize, bound: bool) -> f64 {
        if user_id >= self.data.n_users() || item_id >= self.data.n_items() {
            return self.data.summary.mean_rating;
        }
        let hidden = self.hidden_probabilities(user_id);
        self.data
            .summary
            .bounds
            .apply(self.expected_rating(&hidden, item_id), bound)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::fixtures::{dense_store, scenario_store};

    fn config() -> RbmConfig {
        RbmConfig {
            n_hidden: 8,
            batch_size: 2,
            n_epochs: 12,
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn single_rating_probabilities_ok() -> crate::Result {
        let store = [(0, 0, 3)].into_iter().collect::<InteractionStore>();
        let mut rbm = RestrictedBoltzmannMachine::new(store, config())?;
        rbm.train()?;
        let probabilities = rbm.visible_probabilities(0, 0).unwrap();
        assert_eq!(probabilities.len(), 5);
        assert!(probabilities.iter().all(|probability| *probability >= 0.0));
        assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(rbm.visible_probabilities(1, 0).is_none());
        Ok(())
    }

    #[test]
    fn bounded_predictions_ok() -> crate::Result {
        let mut rbm = RestrictedBoltzmannMachine::new(dense_store(), config())?.with_test(scenario_store());
        rbm.train()?;
        for user_id in 0..20 {
            for item_id in 0..10 {
                let prediction = rbm.predict(user_id, item_id, true);
                assert!((1.0..=5.0).contains(&prediction), "{}", prediction);
            }
        }
        Ok(())
    }

    #[test]
    fn unknown_ids_fall_back_to_mean_ok() -> crate::Result {
        let rbm = RestrictedBoltzmannMachine::new(scenario_store(), config())?;
        assert!((rbm.predict(0, 2, true) - 3.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn ratings_off_the_scale_fail() {
        let store = [(0, 0, 0), (1, 0, 3)].into_iter().collect::<InteractionStore>();
        assert!(RestrictedBoltzmannMachine::new(store, config()).is_err());

        let store = [(0, 0, 6)].into_iter().collect::<InteractionStore>();
        assert!(RestrictedBoltzmannMachine::new(store, config()).is_err());
    }

    #[test]
    fn visible_biases_follow_frequencies_ok() -> crate::Result {
        let mut rbm = RestrictedBoltzmannMachine::new(scenario_store(), config())?;
        rbm.init(&mut StdRng::seed_from_u64(42));
        // Item 0 is rated 5, 4 and 1.
        let expected = (2.0_f64 / 8.0).ln();
        assert!((rbm.visible_biases[(0, 4)] - expected).abs() < 1e-12);
        assert!(rbm.visible_biases[(0, 4)] > rbm.visible_biases[(0, 1)]);
        Ok(())
    }

    #[test]
    fn sample_categorical_ok() {
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(sample_categorical(&[0.0, 1.0, 0.0], &mut rng), 1);
        assert_eq!(sample_categorical(&[0.0, 0.0, 0.0], &mut rng), 2);
    }
}
