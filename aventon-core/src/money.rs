use crate::error::EngineError;

/// All money in the engine is integer cents. No floating point anywhere.
pub type Cents = i64;

/// Checked addition; overflow rejects the operation instead of wrapping.
pub fn add(a: Cents, b: Cents) -> Result<Cents, EngineError> {
    a.checked_add(b).ok_or(EngineError::AmountOverflow)
}

/// Checked subtraction.
pub fn sub(a: Cents, b: Cents) -> Result<Cents, EngineError> {
    a.checked_sub(b).ok_or(EngineError::AmountOverflow)
}

/// Amounts supplied by callers must be strictly positive.
pub fn require_positive(amount: Cents) -> Result<Cents, EngineError> {
    if amount <= 0 {
        return Err(EngineError::InvalidAmount(amount));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_is_rejected() {
        assert_eq!(add(i64::MAX, 1), Err(EngineError::AmountOverflow));
        assert_eq!(sub(i64::MIN, 1), Err(EngineError::AmountOverflow));
        assert_eq!(add(1, 2), Ok(3));
    }

    #[test]
    fn test_zero_and_negative_amounts_rejected() {
        assert_eq!(require_positive(0), Err(EngineError::InvalidAmount(0)));
        assert_eq!(require_positive(-5), Err(EngineError::InvalidAmount(-5)));
        assert_eq!(require_positive(100), Ok(100));
    }
}
