use std::str::FromStr;

use crate::prelude::*;

pub fn non_zero_usize(value: &str) -> Result<usize> {
    match FromStr::from_str(value)? {
        value if value >= 1 => Ok(value),
        _ => Err(anyhow!("expected a positive number")),
    }
}

pub fn non_negative_f64(value: &str) -> Result<f64> {
    match f64::from_str(value)? {
        value if value >= 0.0 => Ok(value),
        _ => Err(anyhow!("expected a non-negative number")),
    }
}

pub fn positive_f64(value: &str) -> Result<f64> {
    match f64::from_str(value)? {
        value if value > 0.0 => Ok(value),
        _ => Err(anyhow!("expected a positive number")),
    }
}
