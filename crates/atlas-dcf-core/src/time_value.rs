use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::AtlasError;
use crate::types::{Money, Rate};
use crate::AtlasResult;

/// Discount factor 1 / (1 + rate)^period.
///
/// Whole periods use exact integer powers; fractional periods (mid-year
/// convention) go through `powd`.
pub fn discount_factor(rate: Rate, period: Decimal) -> AtlasResult<Rate> {
    if rate <= dec!(-1) {
        return Err(AtlasError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    let one_plus_r = Decimal::ONE + rate;
    let compounded = if period.fract().is_zero() {
        let whole = period.to_i64().ok_or_else(|| AtlasError::InvalidInput {
            field: "period".into(),
            reason: format!("Period {period} is out of range"),
        })?;
        one_plus_r.checked_powi(whole)
    } else {
        one_plus_r.checked_powd(period)
    }
    .ok_or_else(|| AtlasError::overflow(format!("discount factor at period {period}")))?;
    if compounded.is_zero() {
        return Err(AtlasError::DivisionByZero {
            context: format!("discount factor at period {period}"),
        });
    }
    Decimal::ONE
        .checked_div(compounded)
        .ok_or_else(|| AtlasError::overflow(format!("discount factor at period {period}")))
}

/// Present value of a single amount received at `period`.
pub fn present_value(amount: Money, rate: Rate, period: Decimal) -> AtlasResult<Money> {
    amount
        .checked_mul(discount_factor(rate, period)?)
        .ok_or_else(|| AtlasError::overflow(format!("present value at period {period}")))
}

/// Net present value of flows received at the end of years 1..=N.
pub fn npv_end_of_year(rate: Rate, cash_flows: &[Money]) -> AtlasResult<Money> {
    let mut total = Decimal::ZERO;
    for (idx, cf) in cash_flows.iter().enumerate() {
        total = total
            .checked_add(present_value(*cf, rate, Decimal::from(idx as u64 + 1))?)
            .ok_or_else(|| AtlasError::overflow("net present value"))?;
    }
    Ok(total)
}

/// Gordon growth perpetuity valued one period after `final_cash_flow`.
///
/// TV = CF_N * (1 + g) / (r - g). Requires r > g.
pub fn gordon_terminal_value(final_cash_flow: Money, rate: Rate, growth: Rate) -> AtlasResult<Money> {
    let spread = rate - growth;
    if spread <= Decimal::ZERO {
        return Err(AtlasError::configuration(format!(
            "wacc ({rate}) must exceed terminal_growth_rate ({growth}) for the Gordon growth model"
        )));
    }
    final_cash_flow
        .checked_mul(Decimal::ONE + growth)
        .and_then(|grown| grown.checked_div(spread))
        .ok_or_else(|| AtlasError::overflow("terminal value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_factor_integer_period() {
        let df = discount_factor(dec!(0.10), dec!(2)).unwrap();
        assert_eq!(df, Decimal::ONE / dec!(1.21));
    }

    #[test]
    fn test_discount_factor_period_zero_is_one() {
        assert_eq!(discount_factor(dec!(0.08), Decimal::ZERO).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_discount_factor_mid_year_between_neighbours() {
        let d0 = discount_factor(dec!(0.10), dec!(0)).unwrap();
        let d_half = discount_factor(dec!(0.10), dec!(0.5)).unwrap();
        let d1 = discount_factor(dec!(0.10), dec!(1)).unwrap();
        assert!(d_half < d0 && d_half > d1);
    }

    #[test]
    fn test_discount_factor_rejects_minus_one() {
        assert!(discount_factor(dec!(-1), dec!(1)).is_err());
    }

    #[test]
    fn test_npv_end_of_year_zero_rate_is_sum() {
        let cfs = vec![dec!(50), dec!(50), dec!(50)];
        assert_eq!(npv_end_of_year(Decimal::ZERO, &cfs).unwrap(), dec!(150));
    }

    #[test]
    fn test_gordon_terminal_value() {
        // 100 * 1.02 / 0.08 = 1275
        let tv = gordon_terminal_value(dec!(100), dec!(0.10), dec!(0.02)).unwrap();
        assert_eq!(tv, dec!(1275));
    }

    #[test]
    fn test_gordon_rejects_growth_at_or_above_rate() {
        let err = gordon_terminal_value(dec!(100), dec!(0.05), dec!(0.05)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_compounding_beyond_decimal_range_is_an_error() {
        // 11^100 is far past the ~7.9e28 decimal ceiling.
        let err = discount_factor(dec!(10), dec!(100)).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.violations()[0].contains("overflows the decimal range"));
    }

    #[test]
    fn test_gordon_overflow_is_an_error() {
        let err = gordon_terminal_value(Decimal::MAX, dec!(0.10), dec!(0.02)).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.violations()[0].starts_with("terminal value overflows"));
    }
}
