//! Geometric chaining of daily cash-flow-adjusted returns.
//!
//! The factor is always threaded explicitly through return values; nothing
//! here keeps a running factor between calls.

use crate::errors::CalculatorError;

use super::performance_model::{CompoundingFactor, PeriodBoundarySnapshot};

/// Applies one day's change: `factor * (1 + change / 100)`.
///
/// A change of exactly -100% is a total wipeout and yields a zero factor.
/// Anything below -100%, any non-finite input, and any non-zero change applied
/// to an already wiped-out factor is rejected rather than producing a number.
pub fn advance(
    factor: CompoundingFactor,
    daily_change_percent: f64,
) -> Result<CompoundingFactor, CalculatorError> {
    if !daily_change_percent.is_finite() {
        return Err(CalculatorError::NonFiniteInput {
            field: "dailyChangePercent",
            value: daily_change_percent,
            date: None,
        });
    }
    if daily_change_percent < -100.0 {
        return Err(CalculatorError::ChangeBelowTotalLoss {
            change_percent: daily_change_percent,
        });
    }
    if factor.is_wiped_out() {
        if daily_change_percent == 0.0 {
            return Ok(factor);
        }
        return Err(CalculatorError::ChainAfterWipeout {
            change_percent: daily_change_percent,
        });
    }

    let next = factor.value() * (1.0 + daily_change_percent / 100.0);
    CompoundingFactor::new(next)
}

/// Folds [`advance`] over `daily_changes` in order. Calendar order matters for
/// the boundary snapshots built on top of this; an empty sequence returns
/// `start` unchanged.
pub fn chain_sequence<I>(
    start: CompoundingFactor,
    daily_changes: I,
) -> Result<CompoundingFactor, CalculatorError>
where
    I: IntoIterator<Item = f64>,
{
    daily_changes
        .into_iter()
        .try_fold(start, |factor, change| advance(factor, change))
}

/// Captures the factor before the first change, then chains the whole period.
///
/// The start is taken before any change is applied, so the period's first
/// day is always part of `factor_at_end / factor_at_start`.
pub fn capture_period<I>(
    start: CompoundingFactor,
    daily_changes: I,
) -> Result<PeriodBoundarySnapshot, CalculatorError>
where
    I: IntoIterator<Item = f64>,
{
    let factor_at_start = start;
    let factor_at_end = chain_sequence(factor_at_start, daily_changes)?;
    Ok(PeriodBoundarySnapshot {
        factor_at_start,
        factor_at_end,
    })
}

/// Multiplies period ratios (not raw factors) in chronological order.
pub fn chain_ratios<I>(start: CompoundingFactor, ratios: I) -> Result<CompoundingFactor, CalculatorError>
where
    I: IntoIterator<Item = f64>,
{
    ratios.into_iter().try_fold(start, |factor, ratio| {
        if !ratio.is_finite() {
            return Err(CalculatorError::NonFiniteFactor(ratio));
        }
        CompoundingFactor::new(factor.value() * ratio)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn advance_applies_percentage_change() {
        let factor = advance(CompoundingFactor::ONE, 10.0).unwrap();
        assert!(approx(factor.value(), 1.1));
        let factor = advance(factor, -5.0).unwrap();
        assert!(approx(factor.value(), 1.045));
    }

    #[test]
    fn empty_sequence_returns_start_factor() {
        let start = CompoundingFactor::new(1.37).unwrap();
        assert_eq!(chain_sequence(start, Vec::<f64>::new()).unwrap(), start);
    }

    #[test]
    fn advance_rejects_malformed_changes() {
        assert!(matches!(
            advance(CompoundingFactor::ONE, f64::NAN),
            Err(CalculatorError::NonFiniteInput { .. })
        ));
        assert!(matches!(
            advance(CompoundingFactor::ONE, f64::INFINITY),
            Err(CalculatorError::NonFiniteInput { .. })
        ));
        assert!(matches!(
            advance(CompoundingFactor::ONE, -100.01),
            Err(CalculatorError::ChangeBelowTotalLoss { .. })
        ));
    }

    #[test]
    fn wipeout_is_terminal_for_non_zero_changes() {
        let wiped = advance(CompoundingFactor::ONE, -100.0).unwrap();
        assert!(wiped.is_wiped_out());
        assert_eq!(advance(wiped, 0.0).unwrap(), wiped);
        assert!(matches!(
            advance(wiped, 5.0),
            Err(CalculatorError::ChainAfterWipeout { .. })
        ));
        assert!(matches!(
            advance(wiped, -100.0),
            Err(CalculatorError::ChainAfterWipeout { .. })
        ));
    }

    #[test]
    fn extreme_days_stay_finite() {
        let changes = std::iter::repeat(50.0).take(250);
        let factor = chain_sequence(CompoundingFactor::ONE, changes).unwrap();
        assert!(factor.value().is_finite());

        let changes = std::iter::repeat(-30.0).take(500);
        let factor = chain_sequence(CompoundingFactor::ONE, changes).unwrap();
        assert!(factor.value() > 0.0);
    }

    #[test]
    fn overflow_is_reported_not_returned() {
        let huge = CompoundingFactor::new(f64::MAX / 2.0).unwrap();
        assert!(matches!(
            advance(huge, 500.0),
            Err(CalculatorError::NonFiniteFactor(_))
        ));
    }

    #[test]
    fn period_capture_includes_first_day() {
        // Capturing after day 1 would leave only 1.02 * 0.995.
        let snapshot = capture_period(CompoundingFactor::ONE, [1.0, 2.0, -0.5]).unwrap();
        assert_eq!(snapshot.factor_at_start, CompoundingFactor::ONE);
        let expected = 1.01 * 1.02 * 0.995;
        assert!((snapshot.ratio().unwrap() - expected).abs() < 1e-12);
        assert!((snapshot.ratio().unwrap() - 1.02 * 0.995).abs() > 1e-3);
    }

    #[test]
    fn chain_ratios_multiplies_in_order() {
        let factor = chain_ratios(CompoundingFactor::ONE, [1.1, 0.9, 1.05]).unwrap();
        assert!(approx(factor.value(), 1.1 * 0.9 * 1.05));
        assert!(chain_ratios(CompoundingFactor::ONE, [f64::NAN]).is_err());
    }
}
