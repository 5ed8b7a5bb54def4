//! Probabilistic latent semantic analysis with Gaussian rating emissions, fitted by
//! tempered expectation maximization.
//!
//! See: Hofmann, «Collaborative Filtering via Gaussian Probabilistic Latent Semantic Analysis», SIGIR 2003.

use rand::rngs::StdRng;
use rand::Rng;

use crate::dataset::{IndexedInteractions, InteractionStore};
use crate::evaluate::Rmse;
use crate::helpers::seeded_rng;
use crate::helpers::tracing::format_elapsed;
use crate::math::statistics::{gaussian_density, MIN_VARIANCE};
use crate::math::{dot, Matrix};
use crate::opts::parsers::{non_zero_usize, positive_f64};
use crate::predictor::RatingPredictor;
use crate::prelude::*;

#[derive(Debug, Copy, Clone, clap::Args)]
pub struct PlsaConfig {
    /// Number of latent topics
    #[arg(long = "topics", default_value_t = 10, value_parser = non_zero_usize)]
    pub n_topics: usize,

    /// Tempering exponent of the responsibilities
    #[arg(long, default_value_t = 1.0, value_parser = positive_f64)]
    pub beta: f64,

    /// Number of EM iterations
    #[arg(long = "epochs", default_value_t = 30, value_parser = non_zero_usize)]
    pub n_epochs: usize,

    /// Random seed, drawn from the OS when omitted
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for PlsaConfig {
    fn default() -> Self {
        Self {
            n_topics: 10,
            beta: 1.0,
            n_epochs: 30,
            seed: None,
        }
    }
}

pub struct ProbabilisticLatentSemanticAnalysis {
    data: IndexedInteractions,
    config: PlsaConfig,

    /// `P(z|u)`, one row per user.
    user_topics: Matrix,

    /// Gaussian means, one row per item.
    means: Matrix,

    /// Gaussian variances, one row per item.
    variances: Matrix,

    /// `Q(z|u, e)` for each user, one row per user event.
    responsibilities: Vec<Matrix>,
}

impl ProbabilisticLatentSemanticAnalysis {
    pub fn new(store: InteractionStore, config: PlsaConfig) -> Result<Self> {
        if config.n_topics == 0 {
            bail!("number of topics must be positive");
        }
        let data = store.into_indexed_form()?;
        let (n_users, n_items, n_topics) = (data.n_users(), data.n_items(), config.n_topics);
        Ok(Self {
            user_topics: Matrix::zeros(n_users, n_topics),
            means: Matrix::zeros(n_items, n_topics),
            variances: Matrix::filled(n_items, n_topics, 1.0),
            responsibilities: (0..n_users)
                .map(|user_id| Matrix::zeros(data.user_events(user_id).len(), n_topics))
                .collect(),
            data,
            config,
        })
    }

    /// `P(z|u)` of the user.
    #[must_use]
    pub fn topic_distribution(&self, user_id: usize) -> Option<&[f64]> {
        self.user_topics.get_row(user_id)
    }

    /// Responsibilities of the user's events, in the order the events were added.
    #[must_use]
    pub fn responsibilities(&self, user_id: usize) -> Option<&Matrix> {
        self.responsibilities.get(user_id)
    }

    fn init(&mut self, rng: &mut StdRng) {
        for user_id in 0..self.data.n_users() {
            let row = self.user_topics.row_mut(user_id);
            for probability in row.iter_mut() {
                *probability = rng.gen::<f64>();
            }
            normalize(row);
        }

        let bounds = self.data.summary.bounds;
        let (min, max) = (f64::from(bounds.min), f64::from(bounds.max));
        let max_variance = f64::max(((max - min) / 2.0).powi(2), 1.0);
        for item_id in 0..self.data.n_items() {
            for z in 0..self.config.n_topics {
                self.means[(item_id, z)] = rng.gen_range(min..=max);
                self.variances[(item_id, z)] = (rng.gen::<f64>() * max_variance).max(MIN_VARIANCE);
            }
        }
    }

    fn expectation_step(&mut self) -> Result {
        let beta = self.config.beta;
        for user_id in 0..self.data.n_users() {
            let user_topics = self.user_topics.row(user_id);
            let responsibilities = &mut self.responsibilities[user_id];
            for (position, event) in self.data.user_events(user_id).iter().enumerate() {
                let row = responsibilities.row_mut(position);
                for (z, responsibility) in row.iter_mut().enumerate() {
                    let density = gaussian_density(
                        f64::from(event.rating),
                        self.means[(event.item_id, z)],
                        self.variances[(event.item_id, z)],
                    )?;
                    *responsibility = (density * user_topics[z]).powf(beta);
                }
                normalize(row);
            }
        }
        Ok(())
    }

    fn maximization_step(&mut self) {
        let n_topics = self.config.n_topics;

        for user_id in 0..self.data.n_users() {
            let responsibilities = &self.responsibilities[user_id];
            if responsibilities.n_rows() == 0 {
                continue;
            }
            let row = self.user_topics.row_mut(user_id);
            row.fill(0.0);
            for event_responsibilities in responsibilities.rows() {
                for (probability, responsibility) in row.iter_mut().zip(event_responsibilities) {
                    *probability += responsibility;
                }
            }
            normalize(row);
        }

        for item_id in 0..self.data.n_items() {
            let events = self.data.item_events(item_id);
            for z in 0..n_topics {
                let responsibility =
                    |user_id: usize, position: usize| self.responsibilities[user_id][(position, z)];

                let (mut weighted_sum, mut mass) = (0.0, 0.0);
                for event in events {
                    let q = responsibility(event.user_id, event.user_position);
                    weighted_sum += q * f64::from(event.rating);
                    mass += q;
                }
                if mass == 0.0 {
                    continue;
                }
                let mean = weighted_sum / mass;

                let mut squared_deviation = 0.0;
                for event in events {
                    let q = responsibility(event.user_id, event.user_position);
                    squared_deviation += q * (f64::from(event.rating) - mean).powi(2);
                }
                self.means[(item_id, z)] = mean;
                if squared_deviation != 0.0 {
                    self.variances[(item_id, z)] = (squared_deviation / mass).max(MIN_VARIANCE);
                }
            }
        }
    }

    fn score(&self, user_id: usize, item_id: usize) -> f64 {
        dot(self.user_topics.row(user_id), self.means.row(item_id))
    }

    fn training_error(&self) -> Rmse {
        let mut error = Rmse::default();
        for user_id in 0..self.data.n_users() {
            for event in self.data.user_events(user_id) {
                error.push(self.score(user_id, event.item_id) - f64::from(event.rating));
            }
        }
        error
    }
}

/// Scales the weights to sum up to one, falling back to the uniform distribution.
fn normalize(weights: &mut [f64]) {
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        weights.iter_mut().for_each(|weight| *weight /= sum);
    } else {
        weights.fill(1.0 / weights.len() as f64);
    }
}

impl RatingPredictor for ProbabilisticLatentSemanticAnalysis {
    #[instrument(level = "info", skip_all, fields(n_topics = self.config.n_topics, beta = self.config.beta))]
    fn train(&mut self) -> Result {
        let mut rng = seeded_rng(self.config.seed);
        self.init(&mut rng);

        for epoch in 1..=self.config.n_epochs {
            let start_instant = Instant::now();
            self.expectation_step()?;
            self.maximization_step();
            info!(
                epoch,
                rmse = self.training_error().average(),
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
        self.data.summary.bounds.apply(self.score(user_id, item_id), bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::rmse;
    use crate::fixtures::{dense_store, scenario_store};
    use crate::GlobalAverage;

    fn config() -> PlsaConfig {
        PlsaConfig {
            n_topics: 3,
            n_epochs: 20,
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn distributions_are_normalized_ok() -> crate::Result {
        let mut plsa = ProbabilisticLatentSemanticAnalysis::new(dense_store(), config())?;
        plsa.train()?;
        for user_id in 0..20 {
            let sum: f64 = plsa.topic_distribution(user_id).unwrap().iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "user #{}: {}", user_id, sum);
            for row in plsa.responsibilities(user_id).unwrap().rows() {
                let sum: f64 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-9, "user #{}: {}", user_id, sum);
            }
        }
        Ok(())
    }

    #[test]
    fn tempered_distributions_are_normalized_ok() -> crate::Result {
        let config = PlsaConfig {
            beta: 0.5,
            ..config()
        };
        let mut plsa = ProbabilisticLatentSemanticAnalysis::new(scenario_store(), config)?;
        plsa.train()?;
        let sum: f64 = plsa.responsibilities(0).unwrap().row(1).iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn beats_global_average_ok() -> crate::Result {
        let mut plsa = ProbabilisticLatentSemanticAnalysis::new(dense_store(), config())?;
        plsa.train()?;
        let mut average = GlobalAverage::new(dense_store())?;
        average.train()?;
        assert!(rmse(&plsa, &dense_store()) < rmse(&average, &dense_store()));
        Ok(())
    }

    #[test]
    fn bounded_predictions_ok() -> crate::Result {
        let mut plsa = ProbabilisticLatentSemanticAnalysis::new(scenario_store(), config())?;
        plsa.train()?;
        for user_id in 0..3 {
            for item_id in 0..2 {
                let prediction = plsa.predict(user_id, item_id, true);
                assert!((1.0..=5.0).contains(&prediction), "{}", prediction);
            }
        }
        assert!((plsa.predict(3, 0, true) - 3.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn normalize_underflow_ok() {
        let mut weights = [0.0, 0.0, 0.0, 0.0];
        normalize(&mut weights);
        assert_eq!(weights, [0.25; 4]);
    }

    #[test]
    fn empty_store_fails() {
        assert!(ProbabilisticLatentSemanticAnalysis::new(InteractionStore::new(), config()).is_err());
    }
}
