//! Offline rating prediction for collaborative filtering.
//!
//! Build an [`InteractionStore`] from `(user, item, rating)` triples, hand it to exactly one
//! trainer, call [`RatingPredictor::train`] and then [`RatingPredictor::predict`] as often as needed.

pub use self::als::{AlsConfig, AlternatingLeastSquares};
pub use self::baseline::{BaselineConfig, BiasedBaseline, GlobalAverage, ItemAverage, UserAverage};
pub use self::dataset::{IndexedInteractions, InteractionRecord, InteractionStore, RatingBounds};
pub use self::evaluate::{rmse, Rmse};
pub use self::plsa::{PlsaConfig, ProbabilisticLatentSemanticAnalysis};
pub use self::predictor::RatingPredictor;
pub use self::prelude::Result;
pub use self::rbm::{RbmConfig, RestrictedBoltzmannMachine};
pub use self::sgd::{
    BiasConfig, LogisticFactorization, ProbabilisticMatrixFactorization, SgdFactorizationConfig,
    SocialRegularization, SvdPlusPlus,
};
pub use self::trust::TrustGraph;

pub mod als;
pub mod baseline;
pub mod dataset;
pub mod evaluate;
pub mod helpers;
pub mod math;
pub mod opts;
pub mod plsa;
pub mod predictor;
pub mod prelude;
pub mod rbm;
pub mod sgd;
pub mod trust;

#[cfg(test)]
pub(crate) mod fixtures;
