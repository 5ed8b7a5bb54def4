/// Shared contract of every trainer: fit once, then answer point queries.
pub trait RatingPredictor {
    /// Fits the model parameters. Blocks until every epoch is done.
    fn train(&mut self) -> crate::Result;

    /// Predicts the rating of the item by the user.
    ///
    /// Never fails: IDs outside the trained range fall back to an unconditional estimate.
    /// With `bound` set, the prediction is clamped into the training rating range.
    fn predict(&self, user_id: usize, item_id: usize, bound: bool) -> f64;
}
