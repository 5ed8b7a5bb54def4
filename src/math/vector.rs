#[must_use]
pub fn norm(x: &[f64]) -> f64 {
    x.iter().map(|xi| xi * xi).sum::<f64>().sqrt()
}

#[must_use]
#[inline]
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y).fold(0.0, |dot, (xi, yi)| dot + xi * yi)
}

/// `x += scale * y`
#[inline]
pub fn add_scaled(x: &mut [f64], y: &[f64], scale: f64) {
    debug_assert_eq!(x.len(), y.len());
    for (xi, yi) in x.iter_mut().zip(y) {
        *xi += scale * yi;
    }
}

/// Adjusts the latent factors towards the residual error.
/// See: https://sifter.org/~simon/journal/20061211.html.
#[inline]
pub fn sgd_assign(
    left: &mut [f64],
    right: &[f64],
    residual_error: f64,
    learning_rate: f64,
    regularization: f64,
) {
    debug_assert!(learning_rate >= 0.0);
    debug_assert!(regularization >= 0.0);
    debug_assert!(!residual_error.is_nan());

    for (left, right) in left.iter_mut().zip(right) {
        *left += learning_rate * (residual_error * right - regularization * *left);
    }
}

/// Simultaneous [`sgd_assign`] of a user and an item row, each one stepping along the other's
/// values from before the update.
#[inline]
pub fn sgd_assign_pair(
    user: &mut [f64],
    item: &mut [f64],
    residual_error: f64,
    learning_rate: f64,
    user_regularization: f64,
    item_regularization: f64,
) {
    debug_assert_eq!(user.len(), item.len());
    debug_assert!(!residual_error.is_nan());

    for (user, item) in user.iter_mut().zip(item.iter_mut()) {
        let (old_user, old_item) = (*user, *item);
        *user += learning_rate * (residual_error * old_item - user_regularization * old_user);
        *item += learning_rate * (residual_error * old_user - item_regularization * old_item);
    }
}
