use thiserror::Error;

/// Longest horizon, in years, accepted by the month-by-month simulators.
pub const MAX_HORIZON_YEARS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Limit exceeded: {field} must be <= {limit}")]
    LimitExceeded { field: String, limit: u32 },
}

pub type PlannerResult<T> = Result<T, PlannerError>;

impl PlannerError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        PlannerError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the offending input.
    pub fn field(&self) -> &str {
        match self {
            PlannerError::InvalidInput { field, .. } | PlannerError::LimitExceeded { field, .. } => {
                field
            }
        }
    }
}

pub(crate) fn ensure_non_negative(field: &str, value: f64) -> PlannerResult<f64> {
    if !value.is_finite() {
        return Err(PlannerError::invalid(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(PlannerError::invalid(field, format!("must be >= 0, got {value}")));
    }
    Ok(value)
}

pub(crate) fn ensure_positive(field: &str, value: f64) -> PlannerResult<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PlannerError::invalid(field, format!("must be > 0, got {value}")));
    }
    Ok(value)
}

/// Annual growth rates may be negative but must stay above -100%.
pub(crate) fn ensure_growth_rate(field: &str, value: f64) -> PlannerResult<f64> {
    if !value.is_finite() || value <= -1.0 {
        return Err(PlannerError::invalid(
            field,
            format!("must be a finite rate above -100%, got {value}"),
        ));
    }
    Ok(value)
}

pub(crate) fn ensure_horizon(field: &str, years: u32) -> PlannerResult<u32> {
    if years == 0 {
        return Err(PlannerError::invalid(field, "must be > 0"));
    }
    if years > MAX_HORIZON_YEARS {
        return Err(PlannerError::LimitExceeded {
            field: field.to_string(),
            limit: MAX_HORIZON_YEARS,
        });
    }
    Ok(years)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_negative_rejects_negative_and_nan() {
        assert!(ensure_non_negative("income", -1.0).is_err());
        assert!(ensure_non_negative("income", f64::NAN).is_err());
        assert_eq!(ensure_non_negative("income", 0.0), Ok(0.0));
    }

    #[test]
    fn horizon_rejects_zero_and_oversized_terms() {
        let err = ensure_horizon("termYears", 0).expect_err("zero term");
        assert_eq!(err.field(), "termYears");
        let err = ensure_horizon("termYears", MAX_HORIZON_YEARS + 1).expect_err("too long");
        assert!(matches!(err, PlannerError::LimitExceeded { limit: 100, .. }));
        assert_eq!(ensure_horizon("termYears", 27), Ok(27));
    }

    #[test]
    fn growth_rate_allows_negative_returns_above_total_loss() {
        assert!(ensure_growth_rate("isaRate", -0.5).is_ok());
        assert!(ensure_growth_rate("isaRate", -1.0).is_err());
    }

    #[test]
    fn error_messages_name_the_field() {
        let err = PlannerError::invalid("grossIncome", "must be >= 0");
        assert_eq!(err.to_string(), "Invalid input: grossIncome - must be >= 0");
    }
}
