use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AtlasError;
use crate::sbc::{forecast_sbc, forecast_sbc_from_stages, SbcForecast, SbcForecastConfig};
use crate::stages::MultiStageDcfConfig;
use crate::types::{DataQualityWarning, Money, Rate};
use crate::AtlasResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One projected year. Cost components are positive magnitudes subtracted
/// explicitly: fcff = nopat + da - capex - delta_nwc - sbc_amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    pub year: u32,
    pub stage_number: u32,
    pub revenue: Money,
    pub revenue_growth: Rate,
    pub ebit: Money,
    pub ebit_margin: Rate,
    pub nopat: Money,
    pub da: Money,
    pub capex: Money,
    pub delta_nwc: Money,
    pub sbc_amount: Money,
    pub sbc_pct_revenue: Rate,
    pub fcff: Money,
    /// nopat + da - capex - delta_nwc, before any SBC deduction.
    pub fcff_before_sbc: Money,
}

/// Rows plus the SBC forecast that was layered onto them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub rows: Vec<ProjectionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbc_forecast: Option<SbcForecast>,
    #[serde(skip)]
    pub warnings: Vec<DataQualityWarning>,
}

/// Per-year inputs to the row arithmetic.
#[derive(Debug, Clone, Copy)]
pub(crate) struct YearDrivers {
    pub growth: Rate,
    pub margin: Rate,
    pub capex_pct: Rate,
    pub nwc_pct: Rate,
    pub da_pct: Rate,
    pub sbc_pct: Rate,
}

pub(crate) fn build_row(
    year: u32,
    stage_number: u32,
    prev_revenue: Money,
    d: YearDrivers,
    tax_rate: Rate,
) -> AtlasResult<ProjectionRow> {
    let overflow = |item: &str| AtlasError::overflow(format!("year {year} {item}"));

    let revenue = prev_revenue
        .checked_mul(Decimal::ONE + d.growth)
        .ok_or_else(|| overflow("revenue"))?;
    let ebit = revenue.checked_mul(d.margin).ok_or_else(|| overflow("ebit"))?;
    let nopat = ebit
        .checked_mul(Decimal::ONE - tax_rate)
        .ok_or_else(|| overflow("nopat"))?;
    let da = revenue.checked_mul(d.da_pct).ok_or_else(|| overflow("da"))?;
    let capex = revenue.checked_mul(d.capex_pct).ok_or_else(|| overflow("capex"))?;
    let delta_nwc = revenue
        .checked_sub(prev_revenue)
        .and_then(|delta| delta.checked_mul(d.nwc_pct))
        .ok_or_else(|| overflow("delta_nwc"))?;
    let sbc_amount = revenue.checked_mul(d.sbc_pct).ok_or_else(|| overflow("sbc_amount"))?;
    let (fcff_before_sbc, fcff) =
        free_cash_flows(nopat, da, capex, delta_nwc, sbc_amount).ok_or_else(|| overflow("fcff"))?;

    Ok(ProjectionRow {
        year,
        stage_number,
        revenue,
        revenue_growth: d.growth,
        ebit,
        ebit_margin: d.margin,
        nopat,
        da,
        capex,
        delta_nwc,
        sbc_amount,
        sbc_pct_revenue: d.sbc_pct,
        fcff,
        fcff_before_sbc,
    })
}

/// (fcff_before_sbc, fcff), or None when either leaves the decimal range.
fn free_cash_flows(
    nopat: Money,
    da: Money,
    capex: Money,
    delta_nwc: Money,
    sbc_amount: Money,
) -> Option<(Money, Money)> {
    let before = nopat
        .checked_add(da)?
        .checked_sub(capex)?
        .checked_sub(delta_nwc)?;
    Some((before, before.checked_sub(sbc_amount)?))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// First pass: validate and project every year with SBC set to zero.
///
/// All-or-nothing: an invalid configuration yields no rows.
pub fn project_revenue_and_pretax(config: &MultiStageDcfConfig) -> AtlasResult<Vec<ProjectionRow>> {
    config.validate()?;
    project_validated(config)
}

pub(crate) fn project_validated(config: &MultiStageDcfConfig) -> AtlasResult<Vec<ProjectionRow>> {
    let horizon = config.total_duration();
    let mut rows = Vec::with_capacity(horizon as usize);
    let mut prev_revenue = config.base_revenue;

    for year in 1..=horizon {
        let stage = config.stage_for_year(year).ok_or_else(|| {
            AtlasError::configuration(format!("no stage covers projection year {year}"))
        })?;
        let drivers = YearDrivers {
            growth: stage.growth_at(year),
            margin: stage.margin_at(year),
            capex_pct: stage.capex_pct_revenue,
            nwc_pct: stage.nwc_pct_delta_revenue,
            da_pct: stage.da_pct_revenue,
            sbc_pct: Decimal::ZERO,
        };
        let row = build_row(year, stage.stage_number, prev_revenue, drivers, config.tax_rate)?;
        prev_revenue = row.revenue;
        rows.push(row);
    }

    tracing::debug!(years = rows.len(), "projection first pass complete");
    Ok(rows)
}

/// Second pass: subtract the forecast SBC from each year's FCFF.
///
/// Returns new rows; the input is left untouched. Every row year must be
/// present in the forecast.
pub fn apply_sbc(rows: &[ProjectionRow], forecast: &SbcForecast) -> AtlasResult<Vec<ProjectionRow>> {
    let missing: Vec<String> = rows
        .iter()
        .filter(|r| forecast.for_year(r.year).is_none())
        .map(|r| r.year.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AtlasError::configuration(format!(
            "sbc: forecast is missing projection year(s) {}",
            missing.join(", ")
        )));
    }

    rows.iter()
        .filter_map(|row| forecast.for_year(row.year).map(|sbc| (row, sbc)))
        .map(|(row, sbc)| {
            let overflow = || AtlasError::overflow(format!("year {} fcff", row.year));
            let mut out = row.clone();
            out.sbc_pct_revenue = sbc.sbc_pct_revenue;
            out.sbc_amount = row
                .revenue
                .checked_mul(sbc.sbc_pct_revenue)
                .ok_or_else(overflow)?;
            let (before, after) =
                free_cash_flows(row.nopat, row.da, row.capex, row.delta_nwc, out.sbc_amount)
                    .ok_or_else(overflow)?;
            out.fcff_before_sbc = before;
            out.fcff = after;
            Ok(out)
        })
        .collect()
}

/// Full two-pass projection.
///
/// With `include_sbc` false every SBC amount is zero. Otherwise the supplied
/// forecast config drives SBC, or the per-stage ratios when none is given.
/// Stage and SBC violations are reported together before any row is built.
pub fn project_with_sbc(
    config: &MultiStageDcfConfig,
    include_sbc: bool,
    sbc_config: Option<&SbcForecastConfig>,
) -> AtlasResult<Projection> {
    let mut warnings = config.validate().or_else(|err| match err {
        AtlasError::Configuration { mut violations } => {
            if let (true, Some(sbc)) = (include_sbc, sbc_config) {
                violations.extend(sbc.violations(config.total_duration()));
            }
            Err(AtlasError::Configuration { violations })
        }
        other => Err(other),
    })?;

    let first_pass = project_validated(config)?;
    if !include_sbc {
        return Ok(Projection {
            rows: first_pass,
            sbc_forecast: None,
            warnings,
        });
    }

    let revenues: Vec<Money> = first_pass.iter().map(|r| r.revenue).collect();
    let forecast = match sbc_config {
        Some(sbc) => {
            let forecast = forecast_sbc(sbc, &revenues)?;
            warnings.extend(forecast.warnings.iter().cloned());
            forecast
        }
        None => forecast_sbc_from_stages(config, &revenues)?,
    };
    let rows = apply_sbc(&first_pass, &forecast)?;

    Ok(Projection {
        rows,
        sbc_forecast: Some(forecast),
        warnings,
    })
}
