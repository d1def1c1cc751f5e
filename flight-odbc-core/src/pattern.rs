//! SQL `LIKE` search patterns as used by the catalog functions.
//!
//! `%` matches any run of characters, `_` exactly one and `\` escapes the
//! next character. Matching is done by Arrow's `like` kernel, the same one the
//! server applies to Flight SQL filter patterns.

use arrow::{
    array::{BooleanArray, Scalar, StringArray},
    compute::kernels::comparison::like,
};

use crate::error::{DriverError, Result};

/// Evaluate a `LIKE` pattern against every value, in order
pub fn like_mask(pattern: &str, values: &StringArray) -> Result<BooleanArray> {
    let pattern = Scalar::new(StringArray::from_iter_values([pattern]));

    like(values, &pattern)
        .map_err(|e| DriverError::Metadata(format!("Invalid search pattern: {e}")))
}

/// A pattern that matches everything needs no filtering.
pub fn is_match_all(pattern: Option<&str>) -> bool {
    match pattern {
        None => true,
        Some(pattern) => !pattern.is_empty() && pattern.chars().all(|c| c == '%'),
    }
}
