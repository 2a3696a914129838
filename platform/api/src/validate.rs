//! Input checks shared by module commands. Failures map to `400`.

use crate::{ApiError, ApiResult};

/// Trimmed `value`, rejecting blank input.
pub fn text(field: &str, value: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trimmed optional text; blank input collapses to `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

pub fn email(field: &str, value: &str) -> ApiResult<String> {
    let trimmed = text(field, value)?;
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(trimmed.to_lowercase())
        }
        _ => Err(ApiError::invalid(format!("{field} is not a valid email"))),
    }
}

pub fn non_negative(field: &str, value: i64) -> ApiResult<i64> {
    if value < 0 {
        return Err(ApiError::invalid(format!("{field} must not be negative")));
    }
    Ok(value)
}

pub fn positive(field: &str, value: i64) -> ApiResult<i64> {
    if value <= 0 {
        return Err(ApiError::invalid(format!("{field} must be positive")));
    }
    Ok(value)
}

pub fn within(field: &str, value: f64, min: f64, max: f64) -> ApiResult<f64> {
    if !(min..=max).contains(&value) {
        return Err(ApiError::invalid(format!(
            "{field} must be between {min} and {max}"
        )));
    }
    Ok(value)
}

/// `quantity * unit`, rejecting totals that do not fit in an `i64`.
pub fn line_total(field: &str, quantity: i64, unit: i64) -> ApiResult<i64> {
    quantity
        .checked_mul(unit)
        .ok_or_else(|| ApiError::invalid(format!("{field} is too large")))
}

/// Sum of `values`, rejecting totals that do not fit in an `i64`.
pub fn total<I>(field: &str, values: I) -> ApiResult<i64>
where
    I: IntoIterator<Item = i64>,
{
    values
        .into_iter()
        .try_fold(0i64, i64::checked_add)
        .ok_or_else(|| ApiError::invalid(format!("{field} is too large")))
}
