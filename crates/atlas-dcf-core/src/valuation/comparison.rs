//! With/without-SBC valuation diff and materiality classification.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::error::AtlasError;
use crate::projection::ProjectionRow;
use crate::types::{render_warnings, with_metadata, ComputationOutput, DataQualityWarning, Money, Rate};
use crate::AtlasResult;

use super::calculator::{value_cash_flows, ValuationInput};

/// Presentational bucket for the share of value lost to SBC. Never gates anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Materiality {
    Minimal,
    Minor,
    Moderate,
    Major,
    Critical,
}

impl Materiality {
    /// >15% critical, 10-15% major, 5-10% moderate, 2-5% minor, below 2% minimal.
    pub fn classify(pct_impact: Rate) -> Self {
        if pct_impact > dec!(0.15) {
            Materiality::Critical
        } else if pct_impact >= dec!(0.10) {
            Materiality::Major
        } else if pct_impact >= dec!(0.05) {
            Materiality::Moderate
        } else if pct_impact >= dec!(0.02) {
            Materiality::Minor
        } else {
            Materiality::Minimal
        }
    }
}

impl fmt::Display for Materiality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Materiality::Minimal => "MINIMAL",
            Materiality::Minor => "MINOR",
            Materiality::Moderate => "MODERATE",
            Materiality::Major => "MAJOR",
            Materiality::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbcImpactInput {
    pub projections: Vec<ProjectionRow>,
    pub wacc: Rate,
    pub terminal_growth_rate: Rate,
    pub shares_outstanding: Decimal,
    #[serde(default)]
    pub mid_year_convention: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbcImpact {
    pub enterprise_value_with_sbc: Money,
    pub enterprise_value_without_sbc: Money,
    pub value_per_share_with_sbc: Money,
    pub value_per_share_without_sbc: Money,
    /// EV without SBC minus EV with SBC
    pub sbc_present_value: Money,
    /// sbc_present_value / EV without SBC; zero when that baseline is not positive
    pub pct_impact: Rate,
    pub per_share_impact: Money,
    /// Undiscounted SBC over the explicit horizon
    pub total_sbc_forecast: Money,
    pub materiality: Materiality,
}

/// Value the projection twice, on `fcff` and on `fcff_before_sbc`, and diff.
pub fn analyze_sbc_impact(input: &SbcImpactInput) -> AtlasResult<ComputationOutput<SbcImpact>> {
    let start = Instant::now();
    let (impact, warnings) = compare_with_without_sbc(
        &input.projections,
        input.wacc,
        input.terminal_growth_rate,
        input.shares_outstanding,
        input.mid_year_convention,
    )?;
    Ok(with_metadata(
        "SBC impact: FCFF DCF with and without SBC as a cash cost",
        input,
        render_warnings(&warnings),
        start.elapsed().as_micros() as u64,
        impact,
    ))
}

pub(crate) fn compare_with_without_sbc(
    rows: &[ProjectionRow],
    wacc: Rate,
    terminal_growth_rate: Rate,
    shares_outstanding: Decimal,
    mid_year_convention: bool,
) -> AtlasResult<(SbcImpact, Vec<DataQualityWarning>)> {
    let valuation_of = |fcff: Vec<Money>| {
        value_cash_flows(&ValuationInput {
            fcff,
            wacc,
            terminal_growth_rate,
            shares_outstanding,
            mid_year_convention,
        })
    };
    let (with_sbc, _) = valuation_of(rows.iter().map(|r| r.fcff).collect())?;
    let (without_sbc, _) = valuation_of(rows.iter().map(|r| r.fcff_before_sbc).collect())?;

    let sbc_present_value = without_sbc
        .enterprise_value
        .checked_sub(with_sbc.enterprise_value)
        .ok_or_else(|| AtlasError::overflow("SBC present value"))?;
    let mut warnings = Vec::new();
    let pct_impact = if without_sbc.enterprise_value > Decimal::ZERO {
        sbc_present_value
            .checked_div(without_sbc.enterprise_value)
            .ok_or_else(|| AtlasError::overflow("SBC share of enterprise value"))?
    } else {
        warnings.push(DataQualityWarning::ImpactBaselineNotPositive {
            enterprise_value: without_sbc.enterprise_value,
        });
        Decimal::ZERO
    };

    let per_share_impact = sbc_present_value
        .checked_div(shares_outstanding)
        .ok_or_else(|| AtlasError::overflow("SBC impact per share"))?;
    let total_sbc_forecast = rows
        .iter()
        .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(r.sbc_amount))
        .ok_or_else(|| AtlasError::overflow("total SBC forecast"))?;

    let impact = SbcImpact {
        enterprise_value_with_sbc: with_sbc.enterprise_value,
        enterprise_value_without_sbc: without_sbc.enterprise_value,
        value_per_share_with_sbc: with_sbc.value_per_share,
        value_per_share_without_sbc: without_sbc.value_per_share,
        sbc_present_value,
        pct_impact,
        per_share_impact,
        total_sbc_forecast,
        materiality: Materiality::classify(pct_impact),
    };
    tracing::debug!(%pct_impact, materiality = %impact.materiality, "sbc impact");
    Ok((impact, warnings))
}
