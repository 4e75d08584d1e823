use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AtlasError;
use crate::projection::{project_with_sbc, ProjectionRow};
use crate::sbc::{SbcForecast, SbcForecastConfig};
use crate::stages::MultiStageDcfConfig;
use crate::types::{render_warnings, with_metadata, ComputationOutput, Money, Rate};
use crate::AtlasResult;

use super::calculator::{value_cash_flows, ValuationInput, ValuationResult};
use super::comparison::{compare_with_without_sbc, SbcImpact};
use super::cost_of_capital::{compute_wacc, WaccInput, WaccOutput};

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything needed for one end-to-end valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStageDcfInput {
    pub config: MultiStageDcfConfig,
    /// SBC forecast parameters. When absent the per-stage ratios are used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbc_forecast: Option<SbcForecastConfig>,
    #[serde(default = "default_true")]
    pub include_sbc: bool,
    pub shares_outstanding: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Money>,
    /// Also value `fcff_before_sbc` and report the difference.
    #[serde(default = "default_true")]
    pub compare_sbc: bool,
    #[serde(default)]
    pub mid_year_convention: bool,
    /// When present, replaces `config.wacc` before validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wacc_input: Option<WaccInput>,
}

impl MultiStageDcfInput {
    pub fn new(config: MultiStageDcfConfig, shares_outstanding: Decimal) -> Self {
        Self {
            config,
            sbc_forecast: None,
            include_sbc: true,
            shares_outstanding,
            current_price: None,
            compare_sbc: true,
            mid_year_convention: false,
            wacc_input: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStageDcfOutput {
    pub wacc_used: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_of_capital: Option<WaccOutput>,
    pub projections: Vec<ProjectionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbc_forecast: Option<SbcForecast>,
    pub valuation: ValuationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbc_impact: Option<SbcImpact>,
    /// value_per_share / current_price - 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_upside: Option<Rate>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Project, apply SBC, discount and (optionally) compare against the
/// SBC-free baseline.
pub fn run_multi_stage_dcf(input: &MultiStageDcfInput) -> AtlasResult<ComputationOutput<MultiStageDcfOutput>> {
    let start = Instant::now();
    let (output, warnings) = evaluate_multi_stage(input)?;
    let methodology = if input.include_sbc {
        "Multi-stage FCFF DCF, SBC treated as a cash cost"
    } else {
        "Multi-stage FCFF DCF"
    };
    Ok(with_metadata(
        methodology,
        input,
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

/// The pipeline without the output envelope; shared by sensitivity, Monte
/// Carlo and batch runs.
pub(crate) fn evaluate_multi_stage(input: &MultiStageDcfInput) -> AtlasResult<(MultiStageDcfOutput, Vec<String>)> {
    let mut string_warnings: Vec<String> = Vec::new();

    // --- Resolve WACC ---
    let mut config = input.config.clone();
    let cost_of_capital = match &input.wacc_input {
        Some(wacc_input) => {
            let mut wacc_warnings = Vec::new();
            let out = compute_wacc(wacc_input, &mut wacc_warnings)?;
            string_warnings.extend(wacc_warnings.into_iter().map(|w| format!("[WACC] {w}")));
            config.wacc = out.wacc;
            Some(out)
        }
        None => None,
    };

    if input.shares_outstanding <= Decimal::ZERO {
        return Err(AtlasError::InvalidInput {
            field: "shares_outstanding".into(),
            reason: "Shares outstanding must be positive".into(),
        });
    }

    // --- Project (validates stages and SBC together) ---
    let projection = project_with_sbc(&config, input.include_sbc, input.sbc_forecast.as_ref())?;
    let mut warnings = projection.warnings;

    // --- Value ---
    let (valuation, valuation_warnings) = value_cash_flows(&ValuationInput {
        fcff: projection.rows.iter().map(|r| r.fcff).collect(),
        wacc: config.wacc,
        terminal_growth_rate: config.terminal_growth_rate,
        shares_outstanding: input.shares_outstanding,
        mid_year_convention: input.mid_year_convention,
    })?;
    warnings.extend(valuation_warnings);

    // --- Compare ---
    let sbc_impact = if input.include_sbc && input.compare_sbc {
        let (impact, impact_warnings) = compare_with_without_sbc(
            &projection.rows,
            config.wacc,
            config.terminal_growth_rate,
            input.shares_outstanding,
            input.mid_year_convention,
        )?;
        warnings.extend(impact_warnings);
        Some(impact)
    } else {
        None
    };

    let implied_upside = input
        .current_price
        .filter(|p| *p > Decimal::ZERO)
        .map(|p| {
            valuation
                .value_per_share
                .checked_div(p)
                .map(|ratio| ratio - Decimal::ONE)
                .ok_or_else(|| AtlasError::overflow("implied upside"))
        })
        .transpose()?;

    tracing::debug!(
        years = projection.rows.len(),
        enterprise_value = %valuation.enterprise_value,
        "multi-stage dcf complete"
    );

    let output = MultiStageDcfOutput {
        wacc_used: config.wacc,
        cost_of_capital,
        projections: projection.rows,
        sbc_forecast: projection.sbc_forecast,
        valuation,
        sbc_impact,
        implied_upside,
    };

    let mut rendered = render_warnings(&warnings);
    rendered.extend(string_warnings);
    Ok((output, rendered))
}

/// Value per share for `config` with the rest of `input` held fixed.
///
/// Skips the comparison pass and leaves warnings unreported; used by the
/// scenario sweeps, which run many variants of one input.
#[cfg_attr(not(feature = "scenarios"), allow(dead_code))]
pub(crate) fn value_per_share_for(config: &MultiStageDcfConfig, input: &MultiStageDcfInput) -> AtlasResult<Money> {
    let projection = project_with_sbc(config, input.include_sbc, input.sbc_forecast.as_ref())?;
    let (valuation, _) = value_cash_flows(&ValuationInput {
        fcff: projection.rows.iter().map(|r| r.fcff).collect(),
        wacc: config.wacc,
        terminal_growth_rate: config.terminal_growth_rate,
        shares_outstanding: input.shares_outstanding,
        mid_year_convention: input.mid_year_convention,
    })?;
    Ok(valuation.value_per_share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::TemplateKind;
    use rust_decimal_macros::dec;

    fn mature_input() -> MultiStageDcfInput {
        MultiStageDcfInput::new(TemplateKind::MatureCompany.config(), dec!(10))
    }

    #[test]
    fn test_pipeline_produces_rows_and_value() {
        let out = run_multi_stage_dcf(&mature_input()).unwrap().result;
        assert_eq!(out.projections.len(), 10);
        assert!(out.valuation.enterprise_value > Decimal::ZERO);
        assert_eq!(out.wacc_used, dec!(0.08));
        assert!(out.sbc_impact.is_some());
        assert!(out.implied_upside.is_none());
    }

    #[test]
    fn test_excluding_sbc_skips_comparison() {
        let mut input = mature_input();
        input.include_sbc = false;
        let out = run_multi_stage_dcf(&input).unwrap().result;
        assert!(out.sbc_impact.is_none());
        assert!(out.sbc_forecast.is_none());
        assert!(out.projections.iter().all(|r| r.sbc_amount.is_zero()));
    }

    #[test]
    fn test_wacc_input_overrides_config() {
        let mut input = mature_input();
        input.wacc_input = Some(WaccInput {
            risk_free_rate: dec!(0.04),
            equity_risk_premium: dec!(0.05),
            beta: dec!(1.0),
            cost_of_debt: dec!(0.05),
            tax_rate: dec!(0.20),
            debt_weight: dec!(0.20),
            equity_weight: dec!(0.80),
            size_premium: None,
            country_risk_premium: None,
            specific_risk_premium: None,
        });
        let out = run_multi_stage_dcf(&input).unwrap().result;
        // 0.09 * 0.8 + 0.04 * 0.2 = 0.08
        assert_eq!(out.wacc_used, dec!(0.080));
        assert!(out.cost_of_capital.is_some());
    }

    #[test]
    fn test_implied_upside() {
        let mut input = mature_input();
        let value = run_multi_stage_dcf(&input).unwrap().result.valuation.value_per_share;
        input.current_price = Some(value / dec!(2));
        let upside = run_multi_stage_dcf(&input).unwrap().result.implied_upside.unwrap();
        assert!((upside - Decimal::ONE).abs() < dec!(0.000001));
    }

    #[test]
    fn test_invalid_shares_rejected_before_projection() {
        let mut input = mature_input();
        input.shares_outstanding = Decimal::ZERO;
        assert!(matches!(
            run_multi_stage_dcf(&input).unwrap_err(),
            AtlasError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_stage_and_sbc_violations_reported_together() {
        let mut input = mature_input();
        input.config.wacc = dec!(0.02);
        input.sbc_forecast = Some(SbcForecastConfig::maintain_current(dec!(0.70)));
        let err = run_multi_stage_dcf(&input).unwrap_err();
        let violations = err.violations();
        assert!(violations.iter().any(|v| v.starts_with("wacc")));
        assert!(violations.iter().any(|v| v.starts_with("sbc")));
    }
}
