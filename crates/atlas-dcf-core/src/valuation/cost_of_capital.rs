//! Discount-rate derivation: CAPM cost of equity blended with after-tax debt.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AtlasError;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::AtlasResult;

const WEIGHT_TOLERANCE: Decimal = dec!(0.01);

/// Inputs for a CAPM build-up WACC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaccInput {
    pub risk_free_rate: Rate,
    pub equity_risk_premium: Rate,
    /// Levered equity beta
    pub beta: Decimal,
    /// Pre-tax cost of debt
    pub cost_of_debt: Rate,
    pub tax_rate: Rate,
    /// Market-value weights; must sum to 1 within 0.01
    pub debt_weight: Rate,
    pub equity_weight: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_premium: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_risk_premium: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_risk_premium: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaccOutput {
    pub wacc: Rate,
    pub cost_of_equity: Rate,
    pub after_tax_cost_of_debt: Rate,
}

/// Ke = Rf + beta * ERP + premiums; Kd_at = Kd * (1 - t); WACC = Ke * We + Kd_at * Wd.
pub fn calculate_wacc(input: &WaccInput) -> AtlasResult<ComputationOutput<WaccOutput>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let output = compute_wacc(input, &mut warnings)?;

    Ok(with_metadata(
        "WACC via CAPM build-up",
        input,
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

pub(crate) fn compute_wacc(input: &WaccInput, warnings: &mut Vec<String>) -> AtlasResult<WaccOutput> {
    validate_wacc_input(input)?;

    let premiums = [
        input.size_premium,
        input.country_risk_premium,
        input.specific_risk_premium,
    ]
    .into_iter()
    .flatten()
    .sum::<Decimal>();
    let cost_of_equity = input.risk_free_rate + input.beta * input.equity_risk_premium + premiums;
    let after_tax_cost_of_debt = input.cost_of_debt * (Decimal::ONE - input.tax_rate);
    let wacc = cost_of_equity * input.equity_weight + after_tax_cost_of_debt * input.debt_weight;

    if input.beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({}): betas above 3.0 are unusual, verify market data",
            input.beta
        ));
    }
    if wacc > dec!(0.20) {
        warnings.push(format!("WACC of {wacc} exceeds 20%"));
    }

    tracing::debug!(%wacc, %cost_of_equity, "wacc derived");
    Ok(WaccOutput {
        wacc,
        cost_of_equity,
        after_tax_cost_of_debt,
    })
}

fn validate_wacc_input(input: &WaccInput) -> AtlasResult<()> {
    let non_negative = [
        ("risk_free_rate", input.risk_free_rate),
        ("equity_risk_premium", input.equity_risk_premium),
        ("cost_of_debt", input.cost_of_debt),
        ("debt_weight", input.debt_weight),
        ("equity_weight", input.equity_weight),
    ];
    for (field, value) in non_negative {
        if value < Decimal::ZERO {
            return Err(AtlasError::InvalidInput {
                field: field.into(),
                reason: format!("{field} cannot be negative"),
            });
        }
    }
    if input.beta <= Decimal::ZERO {
        return Err(AtlasError::InvalidInput {
            field: "beta".into(),
            reason: "Beta must be positive".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(AtlasError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be in [0, 1)".into(),
        });
    }
    let weight_sum = input.debt_weight + input.equity_weight;
    if (weight_sum - Decimal::ONE).abs() > WEIGHT_TOLERANCE {
        return Err(AtlasError::InvalidInput {
            field: "debt_weight + equity_weight".into(),
            reason: format!("Capital structure weights must sum to 1.0, got {weight_sum}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> WaccInput {
        WaccInput {
            risk_free_rate: dec!(0.042),
            equity_risk_premium: dec!(0.055),
            beta: dec!(1.10),
            cost_of_debt: dec!(0.055),
            tax_rate: dec!(0.21),
            debt_weight: dec!(0.30),
            equity_weight: dec!(0.70),
            size_premium: None,
            country_risk_premium: None,
            specific_risk_premium: None,
        }
    }

    #[test]
    fn test_basic_wacc() {
        let out = calculate_wacc(&sample_input()).unwrap().result;
        // Ke = 0.042 + 1.10 * 0.055 = 0.1025
        assert_eq!(out.cost_of_equity, dec!(0.1025));
        // Kd_at = 0.055 * 0.79 = 0.04345
        assert_eq!(out.after_tax_cost_of_debt, dec!(0.04345));
        // 0.1025 * 0.70 + 0.04345 * 0.30 = 0.084785
        assert_eq!(out.wacc, dec!(0.084785));
    }

    #[test]
    fn test_premiums_add_to_cost_of_equity() {
        let mut input = sample_input();
        input.size_premium = Some(dec!(0.015));
        input.country_risk_premium = Some(dec!(0.025));
        input.specific_risk_premium = Some(dec!(0.010));
        let out = calculate_wacc(&input).unwrap().result;
        assert_eq!(out.cost_of_equity, dec!(0.1525));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut input = sample_input();
        input.debt_weight = dec!(0.50);
        input.equity_weight = dec!(0.60);
        match calculate_wacc(&input).unwrap_err() {
            AtlasError::InvalidInput { field, .. } => assert!(field.contains("weight")),
            e => panic!("Expected InvalidInput, got {e:?}"),
        }
    }

    #[test]
    fn test_non_positive_beta_rejected() {
        let mut input = sample_input();
        input.beta = Decimal::ZERO;
        assert!(calculate_wacc(&input).is_err());
    }

    #[test]
    fn test_high_beta_warning() {
        let mut input = sample_input();
        input.beta = dec!(3.5);
        let out = calculate_wacc(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("High beta")));
    }
}
