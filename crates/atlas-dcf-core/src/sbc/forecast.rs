use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AtlasError;
use crate::stages::MultiStageDcfConfig;
use crate::types::{DataQualityWarning, Money, Rate};
use crate::AtlasResult;

use super::detection::SbcDetection;

pub const SBC_PCT_RANGE: (Rate, Rate) = (dec!(0), dec!(0.50));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SbcForecastMethod {
    /// Glide linearly from the starting level to the target, then hold.
    LinearNormalization,
    /// Hold the starting level.
    MaintainCurrent,
    /// Hold the starting level; SBC treated as a strategic cost tied to growth.
    ScaleWithRevenue,
    /// User-supplied percentage for every forecast year.
    CustomPath,
}

/// SBC modeling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbcForecastConfig {
    pub method: SbcForecastMethod,
    pub starting_sbc_pct_revenue: Rate,
    /// Required by `LinearNormalization`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization_target_pct: Option<Rate>,
    /// Required by `LinearNormalization`; 1..=horizon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_to_normalize: Option<u32>,
    /// Year -> SBC % of revenue. Required and exhaustive for `CustomPath`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_path: Option<BTreeMap<u32, Rate>>,
}

/// One forecast year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbcForecastYear {
    pub year: u32,
    pub revenue: Money,
    pub sbc_pct_revenue: Rate,
    pub sbc_amount: Money,
}

/// Year-indexed SBC forecast. `method` is `None` when the per-stage ratios
/// drove the forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbcForecast {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<SbcForecastMethod>,
    pub years: Vec<SbcForecastYear>,
    /// Findings from validating the forecast config.
    #[serde(skip)]
    pub warnings: Vec<DataQualityWarning>,
}

impl SbcForecast {
    pub fn for_year(&self, year: u32) -> Option<&SbcForecastYear> {
        self.years.iter().find(|y| y.year == year)
    }

    pub fn total_sbc(&self) -> AtlasResult<Money> {
        self.years
            .iter()
            .try_fold(Decimal::ZERO, |acc, y| acc.checked_add(y.sbc_amount))
            .ok_or_else(|| AtlasError::overflow("total SBC forecast"))
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

impl SbcForecastConfig {
    pub fn linear_normalization(starting: Rate, target: Rate, years: u32) -> Self {
        SbcForecastConfig {
            method: SbcForecastMethod::LinearNormalization,
            starting_sbc_pct_revenue: starting,
            normalization_target_pct: Some(target),
            years_to_normalize: Some(years),
            custom_path: None,
        }
    }

    pub fn maintain_current(pct: Rate) -> Self {
        Self::constant(SbcForecastMethod::MaintainCurrent, pct)
    }

    pub fn scale_with_revenue(pct: Rate) -> Self {
        Self::constant(SbcForecastMethod::ScaleWithRevenue, pct)
    }

    pub fn custom_path(path: BTreeMap<u32, Rate>) -> Self {
        SbcForecastConfig {
            method: SbcForecastMethod::CustomPath,
            starting_sbc_pct_revenue: path.values().next().copied().unwrap_or(Decimal::ZERO),
            normalization_target_pct: None,
            years_to_normalize: None,
            custom_path: Some(path),
        }
    }

    /// Seed a forecast from a detection result: the detected latest-year ratio
    /// becomes the starting level.
    pub fn from_detection(
        detection: &SbcDetection,
        method: SbcForecastMethod,
        target: Option<Rate>,
        years_to_normalize: Option<u32>,
    ) -> Self {
        SbcForecastConfig {
            method,
            starting_sbc_pct_revenue: detection.sbc_pct_revenue,
            normalization_target_pct: target,
            years_to_normalize,
            custom_path: None,
        }
    }

    fn constant(method: SbcForecastMethod, pct: Rate) -> Self {
        SbcForecastConfig {
            method,
            starting_sbc_pct_revenue: pct,
            normalization_target_pct: None,
            years_to_normalize: None,
            custom_path: None,
        }
    }

    /// Every violated invariant against a forecast horizon of `horizon` years.
    pub fn violations(&self, horizon: u32) -> Vec<String> {
        let mut v = Vec::new();
        check_pct(&mut v, "sbc: starting_sbc_pct_revenue", self.starting_sbc_pct_revenue);

        match self.method {
            SbcForecastMethod::LinearNormalization => {
                match self.normalization_target_pct {
                    Some(target) => check_pct(&mut v, "sbc: normalization_target_pct", target),
                    None => v.push("sbc: normalization_target_pct is required for LINEAR_NORMALIZATION".into()),
                }
                match self.years_to_normalize {
                    Some(n) if n < 1 || n > horizon => v.push(format!(
                        "sbc: years_to_normalize ({n}) must be within [1, {horizon}]"
                    )),
                    Some(_) => {}
                    None => v.push("sbc: years_to_normalize is required for LINEAR_NORMALIZATION".into()),
                }
            }
            SbcForecastMethod::CustomPath => match &self.custom_path {
                Some(path) => {
                    let missing: Vec<String> = (1..=horizon)
                        .filter(|y| !path.contains_key(y))
                        .map(|y| y.to_string())
                        .collect();
                    if !missing.is_empty() {
                        v.push(format!("sbc: custom_path is missing forecast year(s) {}", missing.join(", ")));
                    }
                    for (year, pct) in path {
                        check_pct(&mut v, &format!("sbc: custom_path year {year}"), *pct);
                    }
                }
                None => v.push("sbc: custom_path is required for CUSTOM_PATH".into()),
            },
            SbcForecastMethod::MaintainCurrent | SbcForecastMethod::ScaleWithRevenue => {}
        }
        v
    }

    /// Validate against the horizon; returns non-fatal findings on success.
    pub fn validate(&self, horizon: u32) -> AtlasResult<Vec<DataQualityWarning>> {
        let violations = self.violations(horizon);
        if !violations.is_empty() {
            return Err(AtlasError::Configuration { violations });
        }
        Ok(self.warnings())
    }

    fn warnings(&self) -> Vec<DataQualityWarning> {
        match (self.method, self.normalization_target_pct) {
            (SbcForecastMethod::LinearNormalization, Some(target))
                if target > self.starting_sbc_pct_revenue =>
            {
                vec![DataQualityWarning::SbcAboveTarget {
                    starting: self.starting_sbc_pct_revenue,
                    target,
                }]
            }
            _ => Vec::new(),
        }
    }

    /// SBC as a share of revenue in `year` (1-based).
    pub fn pct_for_year(&self, year: u32) -> AtlasResult<Rate> {
        match self.method {
            SbcForecastMethod::LinearNormalization => {
                let target = self.normalization_target_pct.ok_or_else(|| {
                    AtlasError::configuration("sbc: normalization_target_pct is required for LINEAR_NORMALIZATION")
                })?;
                let n = self.years_to_normalize.filter(|n| *n >= 1).ok_or_else(|| {
                    AtlasError::configuration("sbc: years_to_normalize must be at least 1")
                })?;
                if year >= n {
                    return Ok(target);
                }
                let start = self.starting_sbc_pct_revenue;
                Ok(start + (target - start) * Decimal::from(year) / Decimal::from(n))
            }
            SbcForecastMethod::MaintainCurrent | SbcForecastMethod::ScaleWithRevenue => {
                Ok(self.starting_sbc_pct_revenue)
            }
            SbcForecastMethod::CustomPath => self
                .custom_path
                .as_ref()
                .and_then(|path| path.get(&year))
                .copied()
                .ok_or_else(|| {
                    AtlasError::configuration(format!("sbc: custom_path is missing forecast year {year}"))
                }),
        }
    }
}

fn check_pct(v: &mut Vec<String>, field: &str, value: Rate) {
    let (lo, hi) = SBC_PCT_RANGE;
    if value < lo || value > hi {
        v.push(format!("{field} ({value}) must be within [{lo}, {hi}]"));
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Forecast SBC for years 1..=N against `revenues` (index 0 is year 1).
pub fn forecast_sbc(config: &SbcForecastConfig, revenues: &[Money]) -> AtlasResult<SbcForecast> {
    let horizon = revenues.len() as u32;
    let warnings = config.validate(horizon)?;

    let mut years = Vec::with_capacity(revenues.len());
    for (idx, revenue) in revenues.iter().enumerate() {
        let year = idx as u32 + 1;
        let pct = config.pct_for_year(year)?;
        years.push(SbcForecastYear {
            year,
            revenue: *revenue,
            sbc_pct_revenue: pct,
            sbc_amount: *revenue * pct,
        });
    }

    tracing::debug!(method = ?config.method, years = years.len(), "sbc forecast built");
    Ok(SbcForecast {
        method: Some(config.method),
        years,
        warnings,
    })
}

/// Forecast SBC from each owning stage's `sbc_pct_revenue`.
pub fn forecast_sbc_from_stages(
    config: &MultiStageDcfConfig,
    revenues: &[Money],
) -> AtlasResult<SbcForecast> {
    let mut years = Vec::with_capacity(revenues.len());
    for (idx, revenue) in revenues.iter().enumerate() {
        let year = idx as u32 + 1;
        let stage = config.stage_for_year(year).ok_or_else(|| {
            AtlasError::configuration(format!("no stage covers forecast year {year}"))
        })?;
        years.push(SbcForecastYear {
            year,
            revenue: *revenue,
            sbc_pct_revenue: stage.sbc_pct_revenue,
            sbc_amount: *revenue * stage.sbc_pct_revenue,
        });
    }
    Ok(SbcForecast {
        method: None,
        years,
        warnings: Vec::new(),
    })
}
