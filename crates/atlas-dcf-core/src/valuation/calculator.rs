use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AtlasError;
use crate::time_value::{discount_factor, gordon_terminal_value};
use crate::types::{render_warnings, with_metadata, ComputationOutput, DataQualityWarning, Money, Rate};
use crate::AtlasResult;

/// Share of enterprise value in the terminal value above which a warning is raised.
pub const TERMINAL_RELIANCE_THRESHOLD: Rate = dec!(0.75);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationInput {
    /// FCFF for years 1..=N
    pub fcff: Vec<Money>,
    pub wacc: Rate,
    pub terminal_growth_rate: Rate,
    pub shares_outstanding: Decimal,
    /// Discount explicit flows at t - 0.5. The terminal value stays at N.
    #[serde(default)]
    pub mid_year_convention: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountedFlow {
    pub year: u32,
    pub fcff: Money,
    pub discount_factor: Rate,
    pub present_value: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub enterprise_value: Money,
    pub value_per_share: Money,
    /// Sum of discounted years 1..=N
    pub pv_explicit_fcf: Money,
    pub pv_terminal_value: Money,
    /// Undiscounted Gordon growth value at year N
    pub terminal_value: Money,
    /// pv_terminal_value / enterprise_value; zero when enterprise value is zero
    pub terminal_value_pct_of_total: Rate,
    pub discounted_flows: Vec<DiscountedFlow>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Discount an FCFF series plus a Gordon growth terminal value.
pub fn calculate_valuation(input: &ValuationInput) -> AtlasResult<ComputationOutput<ValuationResult>> {
    let start = Instant::now();
    let (result, warnings) = value_cash_flows(input)?;
    let methodology = if input.mid_year_convention {
        "FCFF DCF with Gordon growth terminal value (mid-year convention)"
    } else {
        "FCFF DCF with Gordon growth terminal value"
    };
    Ok(with_metadata(
        methodology,
        input,
        render_warnings(&warnings),
        start.elapsed().as_micros() as u64,
        result,
    ))
}

pub(crate) fn value_cash_flows(
    input: &ValuationInput,
) -> AtlasResult<(ValuationResult, Vec<DataQualityWarning>)> {
    if input.shares_outstanding <= Decimal::ZERO {
        return Err(AtlasError::InvalidInput {
            field: "shares_outstanding".into(),
            reason: "Shares outstanding must be positive".into(),
        });
    }
    let final_fcff = *input.fcff.last().ok_or_else(|| AtlasError::InvalidInput {
        field: "fcff".into(),
        reason: "At least one projected year is required".into(),
    })?;

    // Fails before any discounting when wacc <= g.
    let terminal_value = gordon_terminal_value(final_fcff, input.wacc, input.terminal_growth_rate)?;

    let discounted_flows = discount_cash_flows(&input.fcff, input.wacc, input.mid_year_convention)?;
    let pv_explicit_fcf = discounted_flows
        .iter()
        .try_fold(Decimal::ZERO, |acc, f| acc.checked_add(f.present_value))
        .ok_or_else(|| AtlasError::overflow("present value of explicit cash flows"))?;

    let horizon = Decimal::from(input.fcff.len() as u64);
    let pv_terminal_value = terminal_value
        .checked_mul(discount_factor(input.wacc, horizon)?)
        .ok_or_else(|| AtlasError::overflow("present value of terminal value"))?;
    let enterprise_value = pv_explicit_fcf
        .checked_add(pv_terminal_value)
        .ok_or_else(|| AtlasError::overflow("enterprise value"))?;
    let value_per_share = enterprise_value
        .checked_div(input.shares_outstanding)
        .ok_or_else(|| AtlasError::overflow("value per share"))?;

    let terminal_value_pct_of_total = if enterprise_value.is_zero() {
        Decimal::ZERO
    } else {
        pv_terminal_value
            .checked_div(enterprise_value)
            .ok_or_else(|| AtlasError::overflow("terminal value share of enterprise value"))?
    };

    let mut warnings = Vec::new();
    if enterprise_value > Decimal::ZERO && terminal_value_pct_of_total > TERMINAL_RELIANCE_THRESHOLD {
        warnings.push(DataQualityWarning::TerminalValueDominant {
            terminal_pct: terminal_value_pct_of_total,
        });
    }
    if final_fcff <= Decimal::ZERO {
        warnings.push(DataQualityWarning::NegativeTerminalCashFlow { final_fcff });
    }

    Ok((
        ValuationResult {
            enterprise_value,
            value_per_share,
            pv_explicit_fcf,
            pv_terminal_value,
            terminal_value,
            terminal_value_pct_of_total,
            discounted_flows,
        },
        warnings,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn discount_cash_flows(fcff: &[Money], wacc: Rate, mid_year: bool) -> AtlasResult<Vec<DiscountedFlow>> {
    fcff.iter()
        .enumerate()
        .map(|(idx, &cf)| {
            let year = idx as u32 + 1;
            let period = if mid_year {
                Decimal::from(year) - dec!(0.5)
            } else {
                Decimal::from(year)
            };
            let factor = discount_factor(wacc, period)?;
            let present_value = cf
                .checked_mul(factor)
                .ok_or_else(|| AtlasError::overflow(format!("year {year} present value")))?;
            Ok(DiscountedFlow {
                year,
                fcff: cf,
                discount_factor: factor,
                present_value,
            })
        })
        .collect()
}
