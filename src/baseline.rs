//! Predictors that ignore the user–item interplay.

pub use self::average::{GlobalAverage, ItemAverage, UserAverage};
pub use self::biased::{BaselineConfig, BiasedBaseline};

pub mod average;
pub mod biased;
