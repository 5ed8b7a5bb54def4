use crate::math::{add_scaled, Matrix};
use crate::prelude::*;
use crate::sgd::LatentFactorModel;
use crate::trust::TrustGraph;

/// Social network regularization term: pulls every user towards the users they trust.
///
/// See: Jamali & Ester, «A Matrix Factorization Technique with Trust Propagation for
/// Recommendation in Social Networks», RecSys 2010, eq. (13).
pub struct SocialRegularization {
    graph: TrustGraph,
    weight: f64,
}

/// A user's bias and factors minus the average ones of the users they trust.
struct Deviation {
    bias: f64,
    factors: Vec<f64>,
}

impl SocialRegularization {
    #[must_use]
    pub const fn new(graph: TrustGraph, weight: f64) -> Self {
        Self { graph, weight }
    }

    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Adds the social gradients of every user to the full-batch buffers.
    ///
    /// Trust edges pointing outside the trained user range are ignored.
    pub fn add_gradients(
        &self,
        model: &LatentFactorModel,
        user_factor_gradients: &mut Matrix,
        user_bias_gradients: &mut [f64],
    ) {
        let n_users = model.user_factors.n_rows();
        let deviations = (0..n_users)
            .map(|user_id| self.deviation(model, user_id))
            .collect_vec();

        for user_id in 0..n_users {
            // Pull towards the trusted users.
            if let Some(deviation) = &deviations[user_id] {
                user_bias_gradients[user_id] += self.weight * deviation.bias;
                add_scaled(user_factor_gradients.row_mut(user_id), &deviation.factors, self.weight);
            }

            // Pull from the users who trust this one.
            for truster_id in self.graph.trusted_by(user_id).filter(|id| *id < n_users) {
                let Some(deviation) = &deviations[truster_id] else { continue };
                let trust = 1.0 / self.n_trusted_within(truster_id, n_users) as f64;
                user_bias_gradients[user_id] -= self.weight * trust * deviation.bias;
                add_scaled(
                    user_factor_gradients.row_mut(user_id),
                    &deviation.factors,
                    -self.weight * trust,
                );
            }
        }
    }

    fn trusts_within(&self, user_id: usize, n_users: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.trusts(user_id).filter(move |id| *id < n_users)
    }

    fn n_trusted_within(&self, user_id: usize, n_users: usize) -> usize {
        self.trusts_within(user_id, n_users).count()
    }

    /// `None` when the user trusts nobody.
    fn deviation(&self, model: &LatentFactorModel, user_id: usize) -> Option<Deviation> {
        let n_users = model.user_factors.n_rows();
        let mut bias_sum = 0.0;
        let mut factor_sums = vec![0.0; model.n_factors()];
        let mut n_trusted = 0_usize;
        for trustee_id in self.trusts_within(user_id, n_users) {
            bias_sum += model.user_bias[trustee_id];
            add_scaled(&mut factor_sums, model.user_factors.row(trustee_id), 1.0);
            n_trusted += 1;
        }
        if n_trusted == 0 {
            return None;
        }

        let n_trusted = n_trusted as f64;
        let factors = model
            .user_factors
            .row(user_id)
            .iter()
            .zip(&factor_sums)
            .map(|(factor, sum)| factor - sum / n_trusted)
            .collect();
        Some(Deviation {
            bias: model.user_bias[user_id] - bias_sum / n_trusted,
            factors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> LatentFactorModel {
        let mut model = LatentFactorModel::new(3, 1, 1, true);
        model.user_bias.copy_from_slice(&[1.0, 3.0, 5.0]);
        model.user_factors.row_mut(0)[0] = 2.0;
        model.user_factors.row_mut(1)[0] = 4.0;
        model.user_factors.row_mut(2)[0] = 8.0;
        model
    }

    #[test]
    fn add_gradients_ok() {
        // 0 trusts 1 and 2, 1 trusts 0.
        let social = SocialRegularization::new([(0, 1), (0, 2), (1, 0)].into_iter().collect(), 0.5);
        let model = model();
        let mut factor_gradients = Matrix::zeros(3, 1);
        let mut bias_gradients = vec![0.0; 3];
        social.add_gradients(&model, &mut factor_gradients, &mut bias_gradients);

        // Deviations: user 0 (1 − 4, 2 − 6) = (−3, −4), user 1 (3 − 1, 4 − 2) = (2, 2).
        // User 0: own 0.5·(−3, −4), trusted by 1 with trust 1: −0.5·(2, 2).
        assert!((bias_gradients[0] - (-2.5)).abs() < 1e-12);
        assert!((factor_gradients[(0, 0)] - (-3.0)).abs() < 1e-12);
        // User 1: own 0.5·(2, 2), trusted by 0 with trust ½: −0.25·(−3, −4).
        assert!((bias_gradients[1] - 1.75).abs() < 1e-12);
        assert!((factor_gradients[(1, 0)] - 2.0).abs() < 1e-12);
        // User 2: trusted by 0 with trust ½.
        assert!((bias_gradients[2] - 0.75).abs() < 1e-12);
        assert!((factor_gradients[(2, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_edges_ignored_ok() {
        let social = SocialRegularization::new([(0, 7), (7, 0)].into_iter().collect(), 1.0);
        let model = model();
        let mut factor_gradients = Matrix::zeros(3, 1);
        let mut bias_gradients = vec![0.0; 3];
        social.add_gradients(&model, &mut factor_gradients, &mut bias_gradients);
        assert!(bias_gradients.iter().all(|gradient| gradient.abs() < f64::EPSILON));
    }
}
