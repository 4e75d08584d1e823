use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::AtlasError;
use crate::types::{DataQualityWarning, Money, Rate};
use crate::AtlasResult;

use super::stage::{MarginTrajectory, Stage};

/// Sanity ceiling on the perpetual growth rate.
pub const MAX_TERMINAL_GROWTH: Rate = dec!(0.05);
pub const WACC_RANGE: (Rate, Rate) = (dec!(0), dec!(0.30));
pub const GROWTH_RANGE: (Rate, Rate) = (dec!(-0.10), dec!(0.60));
pub const MARGIN_RANGE: (Rate, Rate) = (dec!(0), dec!(0.50));
pub const COST_RATIO_RANGE: (Rate, Rate) = (dec!(0), dec!(0.50));
pub const NWC_RATIO_RANGE: (Rate, Rate) = (dec!(0), dec!(1));
/// Largest |end - start| still accepted for a stage tagged `stable`.
pub const STABLE_MARGIN_TOLERANCE: Rate = dec!(0.01);
/// Growth rates at a stage boundary must agree to this precision.
pub const BOUNDARY_TOLERANCE: Rate = dec!(0.0000001);

/// Number of stages in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelType {
    SingleStage,
    TwoStage,
    ThreeStage,
}

impl ModelType {
    pub fn expected_stages(self) -> usize {
        match self {
            ModelType::SingleStage => 1,
            ModelType::TwoStage => 2,
            ModelType::ThreeStage => 3,
        }
    }

    pub fn for_stage_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ModelType::SingleStage),
            2 => Some(ModelType::TwoStage),
            3 => Some(ModelType::ThreeStage),
            _ => None,
        }
    }
}

/// The full multi-stage model definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStageDcfConfig {
    pub model_type: ModelType,
    /// Ordered, contiguous stages starting at year 1.
    pub stages: Vec<Stage>,
    pub terminal_growth_rate: Rate,
    pub wacc: Rate,
    /// Trailing revenue; year 0 of the projection.
    pub base_revenue: Money,
    pub tax_rate: Rate,
}

impl MultiStageDcfConfig {
    /// Last projected year (the final stage's end year).
    pub fn total_duration(&self) -> u32 {
        self.stages.last().map(|s| s.end_year).unwrap_or(0)
    }

    /// The stage whose [start_year, end_year] contains `year`.
    pub fn stage_for_year(&self, year: u32) -> Option<&Stage> {
        self.stages.iter().find(|s| s.contains_year(year))
    }

    /// Validate every invariant in one pass.
    ///
    /// Returns the non-fatal findings on success. A missing stage list is an
    /// input error; every other problem is gathered into a single
    /// `AtlasError::Configuration`.
    pub fn validate(&self) -> AtlasResult<Vec<DataQualityWarning>> {
        if self.stages.is_empty() {
            return Err(AtlasError::InvalidInput {
                field: "stages".into(),
                reason: "At least one stage is required".into(),
            });
        }
        let violations = self.violations();
        if !violations.is_empty() {
            return Err(AtlasError::Configuration { violations });
        }
        Ok(self.boundary_warnings())
    }

    /// Every violated invariant, as human-readable strings.
    pub fn violations(&self) -> Vec<String> {
        let mut v = Vec::new();

        let expected = self.model_type.expected_stages();
        if self.stages.len() != expected {
            v.push(format!(
                "model_type {:?} expects {expected} stage(s), found {}",
                self.model_type,
                self.stages.len()
            ));
        }

        check_range(&mut v, "wacc", self.wacc, WACC_RANGE);
        check_range(&mut v, "terminal_growth_rate", self.terminal_growth_rate, GROWTH_RANGE);
        if self.base_revenue <= Decimal::ZERO {
            v.push(format!("base_revenue ({}) must be positive", self.base_revenue));
        }
        if self.tax_rate < Decimal::ZERO || self.tax_rate >= Decimal::ONE {
            v.push(format!("tax_rate ({}) must be in [0, 1)", self.tax_rate));
        }

        let mut expected_start = 1u32;
        let mut previous: Option<&Stage> = None;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage_violations(&mut v, stage, idx, expected_start);
            if let Some(prev) = previous {
                // A one-year stage only ever projects its start rate.
                if prev.duration == 1
                    && (prev.revenue_growth_end - prev.revenue_growth_start).abs() > BOUNDARY_TOLERANCE
                {
                    v.push(format!(
                        "stage {} ({}): a one-year stage followed by stage {} must have revenue_growth_start ({}) equal to revenue_growth_end ({})",
                        prev.stage_number,
                        prev.name,
                        stage.stage_number,
                        prev.revenue_growth_start,
                        prev.revenue_growth_end
                    ));
                }
                let jump = (stage.revenue_growth_start - prev.revenue_growth_end).abs();
                if jump > BOUNDARY_TOLERANCE {
                    v.push(format!(
                        "stage {} ({}): revenue_growth_start ({}) must equal stage {} revenue_growth_end ({}) so growth is continuous at year {}",
                        stage.stage_number,
                        stage.name,
                        stage.revenue_growth_start,
                        prev.stage_number,
                        prev.revenue_growth_end,
                        stage.start_year
                    ));
                }
            }
            expected_start = stage.end_year.saturating_add(1);
            previous = Some(stage);
        }

        if let Some(last) = self.stages.last() {
            if self.terminal_growth_rate > last.revenue_growth_end {
                v.push(format!(
                    "terminal_growth_rate ({}) must not exceed the final stage's ending growth ({})",
                    self.terminal_growth_rate, last.revenue_growth_end
                ));
            }
        }
        if self.terminal_growth_rate > MAX_TERMINAL_GROWTH {
            v.push(format!(
                "terminal_growth_rate ({}) exceeds the {} ceiling",
                self.terminal_growth_rate, MAX_TERMINAL_GROWTH
            ));
        }
        if self.wacc <= self.terminal_growth_rate {
            v.push(format!(
                "wacc ({}) must exceed terminal_growth_rate ({}) for the Gordon growth model",
                self.wacc, self.terminal_growth_rate
            ));
        }

        v
    }

    fn boundary_warnings(&self) -> Vec<DataQualityWarning> {
        self.stages
            .windows(2)
            .filter(|pair| (pair[1].ebit_margin_start - pair[0].ebit_margin_end).abs() > BOUNDARY_TOLERANCE)
            .map(|pair| DataQualityWarning::MarginDiscontinuity {
                boundary_year: pair[1].start_year,
                margin_before: pair[0].ebit_margin_end,
                margin_after: pair[1].ebit_margin_start,
            })
            .collect()
    }
}

fn stage_violations(v: &mut Vec<String>, stage: &Stage, idx: usize, expected_start: u32) {
    let label = format!("stage {} ({})", stage.stage_number, stage.name);

    if stage.stage_number as usize != idx + 1 {
        v.push(format!("{label}: stage_number must be {}", idx + 1));
    }
    if stage.start_year != expected_start {
        if idx == 0 {
            v.push(format!("{label}: must start at year 1, starts at {}", stage.start_year));
        } else {
            v.push(format!(
                "{label}: starts at year {} but the previous stage ends at {} (gap or overlap)",
                stage.start_year,
                expected_start.saturating_sub(1)
            ));
        }
    }
    if stage.duration == 0 {
        v.push(format!("{label}: duration must be at least 1 year"));
    }
    if stage.end_year < stage.start_year || stage.duration != stage.end_year - stage.start_year + 1 {
        v.push(format!(
            "{label}: duration ({}) must equal end_year - start_year + 1 ({} - {} + 1)",
            stage.duration, stage.end_year, stage.start_year
        ));
    }

    check_range(v, &format!("{label}: revenue_growth_start"), stage.revenue_growth_start, GROWTH_RANGE);
    check_range(v, &format!("{label}: revenue_growth_end"), stage.revenue_growth_end, GROWTH_RANGE);
    if stage.is_accelerating() && !stage.turnaround {
        v.push(format!(
            "{label}: ending growth ({}) exceeds starting growth ({}); growth must mean-revert unless the stage is tagged turnaround",
            stage.revenue_growth_end, stage.revenue_growth_start
        ));
    }

    check_range(v, &format!("{label}: ebit_margin_start"), stage.ebit_margin_start, MARGIN_RANGE);
    check_range(v, &format!("{label}: ebit_margin_end"), stage.ebit_margin_end, MARGIN_RANGE);
    let delta = stage.ebit_margin_end - stage.ebit_margin_start;
    let consistent = match stage.margin_trajectory {
        MarginTrajectory::Expanding => delta >= Decimal::ZERO,
        MarginTrajectory::Contracting => delta <= Decimal::ZERO,
        MarginTrajectory::Stable => delta.abs() <= STABLE_MARGIN_TOLERANCE,
    };
    if !consistent {
        v.push(format!(
            "{label}: margin_trajectory {:?} is inconsistent with margins {} -> {}",
            stage.margin_trajectory, stage.ebit_margin_start, stage.ebit_margin_end
        ));
    }

    check_range(v, &format!("{label}: capex_pct_revenue"), stage.capex_pct_revenue, COST_RATIO_RANGE);
    check_range(v, &format!("{label}: da_pct_revenue"), stage.da_pct_revenue, COST_RATIO_RANGE);
    check_range(v, &format!("{label}: sbc_pct_revenue"), stage.sbc_pct_revenue, COST_RATIO_RANGE);
    check_range(
        v,
        &format!("{label}: nwc_pct_delta_revenue"),
        stage.nwc_pct_delta_revenue,
        NWC_RATIO_RANGE,
    );
}

fn check_range(v: &mut Vec<String>, field: &str, value: Rate, (lo, hi): (Rate, Rate)) {
    if value < lo || value > hi {
        v.push(format!("{field} ({value}) must be within [{lo}, {hi}]"));
    }
}
