//! Manual override of a single projection year.
//!
//! Rows form an arena indexed by year. An override produces a new arena: years
//! before the override are copied, the overridden year is rebuilt, and later
//! years are rebuilt only when the overridden year's revenue changed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AtlasError;
use crate::stages::config::{COST_RATIO_RANGE, GROWTH_RANGE, MARGIN_RANGE, NWC_RATIO_RANGE};
use crate::stages::MultiStageDcfConfig;
use crate::types::{Money, Rate};
use crate::AtlasResult;

use super::engine::{build_row, ProjectionRow, YearDrivers};

/// Replacement inputs for one year. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearOverride {
    pub year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_growth: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebit_margin: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capex_pct_revenue: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub da_pct_revenue: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nwc_pct_delta_revenue: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbc_pct_revenue: Option<Rate>,
}

impl YearOverride {
    pub fn violations(&self) -> Vec<String> {
        let mut v = Vec::new();
        let checks = [
            ("revenue_growth", self.revenue_growth, GROWTH_RANGE),
            ("ebit_margin", self.ebit_margin, MARGIN_RANGE),
            ("capex_pct_revenue", self.capex_pct_revenue, COST_RATIO_RANGE),
            ("da_pct_revenue", self.da_pct_revenue, COST_RATIO_RANGE),
            ("nwc_pct_delta_revenue", self.nwc_pct_delta_revenue, NWC_RATIO_RANGE),
            ("sbc_pct_revenue", self.sbc_pct_revenue, COST_RATIO_RANGE),
        ];
        for (field, value, (lo, hi)) in checks {
            if let Some(value) = value {
                if value < lo || value > hi {
                    v.push(format!(
                        "override year {}: {field} ({value}) must be within [{lo}, {hi}]",
                        self.year
                    ));
                }
            }
        }
        v
    }
}

/// Apply `ov` to `rows`, returning a new projection.
pub fn apply_override(
    config: &MultiStageDcfConfig,
    rows: &[ProjectionRow],
    ov: &YearOverride,
) -> AtlasResult<Vec<ProjectionRow>> {
    if ov.year == 0 || ov.year as usize > rows.len() {
        return Err(AtlasError::InvalidInput {
            field: "year".into(),
            reason: format!("Override year {} is outside the projection 1..={}", ov.year, rows.len()),
        });
    }
    if let Some((pos, row)) = rows
        .iter()
        .enumerate()
        .find(|(pos, row)| row.year as usize != pos + 1)
    {
        return Err(AtlasError::InvalidInput {
            field: "rows".into(),
            reason: format!(
                "Projection rows must cover years 1..={} in order; position {} holds year {}",
                rows.len(),
                pos + 1,
                row.year
            ),
        });
    }
    let violations = ov.violations();
    if !violations.is_empty() {
        return Err(AtlasError::Configuration { violations });
    }

    let idx = (ov.year - 1) as usize;
    let mut out: Vec<ProjectionRow> = rows[..idx].to_vec();
    let mut prev_revenue = prev_revenue(config, &out);

    let current = &rows[idx];
    let base = drivers_from_row(config, current, prev_revenue)?;
    let drivers = YearDrivers {
        growth: ov.revenue_growth.unwrap_or(base.growth),
        margin: ov.ebit_margin.unwrap_or(base.margin),
        capex_pct: ov.capex_pct_revenue.unwrap_or(base.capex_pct),
        nwc_pct: ov.nwc_pct_delta_revenue.unwrap_or(base.nwc_pct),
        da_pct: ov.da_pct_revenue.unwrap_or(base.da_pct),
        sbc_pct: ov.sbc_pct_revenue.unwrap_or(base.sbc_pct),
    };
    let rebuilt = build_row(current.year, current.stage_number, prev_revenue, drivers, config.tax_rate)?;
    let revenue_changed = rebuilt.revenue != current.revenue;
    prev_revenue = rebuilt.revenue;
    out.push(rebuilt);

    if !revenue_changed {
        out.extend_from_slice(&rows[idx + 1..]);
        return Ok(out);
    }

    for (old_prev, row) in rows[idx..].iter().zip(&rows[idx + 1..]) {
        let d = drivers_from_row(config, row, old_prev.revenue)?;
        let rebuilt = build_row(row.year, row.stage_number, prev_revenue, d, config.tax_rate)?;
        prev_revenue = rebuilt.revenue;
        out.push(rebuilt);
    }

    tracing::debug!(year = ov.year, revenue_changed, "override applied");
    Ok(out)
}

fn prev_revenue(config: &MultiStageDcfConfig, before: &[ProjectionRow]) -> Money {
    before.last().map(|r| r.revenue).unwrap_or(config.base_revenue)
}

/// Recover the ratios that produced `row`, so earlier overrides on later
/// years survive forward propagation. Falls back to the owning stage's ratio
/// where the row carries no information (zero revenue or zero revenue change).
fn drivers_from_row(
    config: &MultiStageDcfConfig,
    row: &ProjectionRow,
    prev_revenue: Money,
) -> AtlasResult<YearDrivers> {
    let stage = config.stage_for_year(row.year).ok_or_else(|| {
        AtlasError::configuration(format!("no stage covers projection year {}", row.year))
    })?;
    let ratio_overflow = || AtlasError::overflow(format!("year {} driver ratio", row.year));
    let of_revenue = |amount: Money, fallback: Rate| -> AtlasResult<Rate> {
        if row.revenue.is_zero() {
            Ok(fallback)
        } else {
            amount.checked_div(row.revenue).ok_or_else(ratio_overflow)
        }
    };
    let revenue_delta = row
        .revenue
        .checked_sub(prev_revenue)
        .ok_or_else(ratio_overflow)?;
    let nwc_pct = if revenue_delta.is_zero() {
        stage.nwc_pct_delta_revenue
    } else {
        row.delta_nwc.checked_div(revenue_delta).ok_or_else(ratio_overflow)?
    };
    Ok(YearDrivers {
        growth: row.revenue_growth,
        margin: row.ebit_margin,
        capex_pct: of_revenue(row.capex, stage.capex_pct_revenue)?,
        nwc_pct,
        da_pct: of_revenue(row.da, stage.da_pct_revenue)?,
        sbc_pct: if row.revenue.is_zero() { Decimal::ZERO } else { row.sbc_pct_revenue },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::engine::{project_revenue_and_pretax, project_with_sbc};
    use crate::stages::TemplateKind;
    use rust_decimal_macros::dec;

    fn close(a: Decimal, b: Decimal) -> bool {
        (a - b).abs() <= dec!(0.000000001) * (Decimal::ONE + b.abs())
    }

    #[test]
    fn test_margin_override_recomputes_only_that_year() {
        let cfg = TemplateKind::GrowthCompany.config();
        let rows = project_revenue_and_pretax(&cfg).unwrap();
        let ov = YearOverride {
            year: 4,
            ebit_margin: Some(dec!(0.30)),
            ..Default::default()
        };
        let out = apply_override(&cfg, &rows, &ov).unwrap();
        assert_eq!(out.len(), rows.len());
        assert_eq!(out[..3], rows[..3]);
        assert_eq!(out[4..], rows[4..]);
        assert_eq!(out[3].ebit_margin, dec!(0.30));
        assert_eq!(out[3].revenue, rows[3].revenue);
        assert!(out[3].fcff > rows[3].fcff);
    }

    #[test]
    fn test_growth_override_propagates_forward() {
        let cfg = TemplateKind::GrowthCompany.config();
        let rows = project_revenue_and_pretax(&cfg).unwrap();
        let ov = YearOverride {
            year: 3,
            revenue_growth: Some(dec!(0.30)),
            ..Default::default()
        };
        let out = apply_override(&cfg, &rows, &ov).unwrap();
        assert_eq!(out[..2], rows[..2]);
        assert_eq!(out[2].revenue_growth, dec!(0.30));
        for t in 3..out.len() {
            // Later years keep their growth path but compound off a higher base.
            assert_eq!(out[t].revenue_growth, rows[t].revenue_growth);
            assert!(out[t].revenue > rows[t].revenue);
            assert!(close(out[t].ebit_margin, rows[t].ebit_margin));
        }
        // Input arena untouched.
        assert_eq!(rows, project_revenue_and_pretax(&cfg).unwrap());
    }

    #[test]
    fn test_propagation_preserves_sbc_ratio() {
        let cfg = TemplateKind::HypergrowthTech.config();
        let rows = project_with_sbc(&cfg, true, None).unwrap().rows;
        let ov = YearOverride {
            year: 1,
            revenue_growth: Some(dec!(0.50)),
            ..Default::default()
        };
        let out = apply_override(&cfg, &rows, &ov).unwrap();
        for (new, old) in out.iter().zip(&rows) {
            assert!(close(new.sbc_pct_revenue, old.sbc_pct_revenue));
            assert!(close(new.fcff_before_sbc - new.fcff, new.sbc_amount));
        }
    }

    #[test]
    fn test_override_year_out_of_range() {
        let cfg = TemplateKind::MatureCompany.config();
        let rows = project_revenue_and_pretax(&cfg).unwrap();
        let ov = YearOverride { year: 11, ..Default::default() };
        assert!(matches!(
            apply_override(&cfg, &rows, &ov).unwrap_err(),
            AtlasError::InvalidInput { .. }
        ));
        let ov = YearOverride { year: 0, ..Default::default() };
        assert!(apply_override(&cfg, &rows, &ov).is_err());
    }

    #[test]
    fn test_rows_out_of_year_order_rejected() {
        let cfg = TemplateKind::MatureCompany.config();
        let mut rows = project_revenue_and_pretax(&cfg).unwrap();
        rows.swap(2, 3);
        let ov = YearOverride {
            year: 3,
            ebit_margin: Some(dec!(0.25)),
            ..Default::default()
        };
        let err = apply_override(&cfg, &rows, &ov).unwrap_err();
        match err {
            AtlasError::InvalidInput { field, reason } => {
                assert_eq!(field, "rows");
                assert!(reason.contains("position 3 holds year 4"), "{reason}");
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }

        let mut gapped = project_revenue_and_pretax(&cfg).unwrap();
        gapped.remove(1);
        assert!(apply_override(&cfg, &gapped, &ov).is_err());
    }

    #[test]
    fn test_override_values_range_checked() {
        let cfg = TemplateKind::MatureCompany.config();
        let rows = project_revenue_and_pretax(&cfg).unwrap();
        let ov = YearOverride {
            year: 2,
            ebit_margin: Some(dec!(0.9)),
            capex_pct_revenue: Some(dec!(-0.1)),
            ..Default::default()
        };
        let err = apply_override(&cfg, &rows, &ov).unwrap_err();
        assert_eq!(err.violations().len(), 2);
    }
}
