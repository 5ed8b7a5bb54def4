//! Per-epoch schedules of the contrastive divergence trainer.

/// Learning rates of the weights, visible biases and hidden biases.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LearningRates {
    pub weights: f64,
    pub visible_biases: f64,
    pub hidden_biases: f64,
}

impl LearningRates {
    #[must_use]
    fn scaled(self, factor: f64) -> Self {
        Self {
            weights: self.weights * factor,
            visible_biases: self.visible_biases * factor,
            hidden_biases: self.hidden_biases * factor,
        }
    }
}

/// Yields the learning rates of each consecutive epoch, annealing them after every epoch.
///
/// Wide machines are slowed down faster. The wide schedule covers every machine with 200 hidden
/// units or more, not only exactly 200.
pub struct Annealing {
    rates: LearningRates,
    is_wide: bool,
    n_epochs_done: usize,
}

impl Annealing {
    #[must_use]
    pub const fn new(initial: LearningRates, n_hidden: usize) -> Self {
        Self {
            rates: initial,
            is_wide: n_hidden >= 200,
            n_epochs_done: 0,
        }
    }

    /// Multiplier applied once the 1-based epoch is over.
    #[must_use]
    fn factor(&self, epoch: usize) -> f64 {
        if self.is_wide {
            match epoch {
                7.. => 0.9,
                6 => 0.5,
                3..=5 => 0.7,
                _ => 1.0,
            }
        } else {
            match epoch {
                9.. => 0.92,
                7..=8 => 0.9,
                3..=6 => 0.78,
                _ => 1.0,
            }
        }
    }
}

impl Iterator for Annealing {
    type Item = LearningRates;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.rates;
        self.n_epochs_done += 1;
        self.rates = self.rates.scaled(self.factor(self.n_epochs_done));
        Some(current)
    }
}

/// Number of Gibbs sampling steps in the 1-based epoch.
#[must_use]
pub const fn n_gibbs_steps(epoch: usize) -> usize {
    if epoch > 10 { 3 + (epoch - 11) / 5 } else { 1 }
}
