pub use self::matrix::*;
pub use self::vector::*;

pub mod matrix;
pub mod statistics;
pub mod vector;

#[must_use]
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[must_use]
#[inline]
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logit_inverts_sigmoid_ok() {
        for x in [-3.0, -0.5, 0.0, 0.25, 4.0] {
            assert!((logit(sigmoid(x)) - x).abs() < 1e-9);
        }
    }
}
