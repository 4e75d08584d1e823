use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

use crate::types::Rate;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a rate moves from its starting to its ending bound across a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthDecline {
    /// start + (end - start) * p
    #[default]
    Linear,
    /// start * (end / start)^p
    Exponential,
}

/// Direction of the EBIT margin across a stage. Must agree with the bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginTrajectory {
    Expanding,
    #[default]
    Stable,
    Contracting,
}

impl MarginTrajectory {
    /// Trajectory implied by a pair of margin bounds.
    pub fn classify(start: Rate, end: Rate) -> Self {
        if end > start {
            MarginTrajectory::Expanding
        } else if end < start {
            MarginTrajectory::Contracting
        } else {
            MarginTrajectory::Stable
        }
    }
}

/// One growth phase of the company's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Ordinal position, 1-based.
    pub stage_number: u32,
    pub name: String,
    pub start_year: u32,
    pub end_year: u32,
    /// Always `end_year - start_year + 1`.
    pub duration: u32,
    pub revenue_growth_start: Rate,
    pub revenue_growth_end: Rate,
    #[serde(default)]
    pub growth_decline_type: GrowthDecline,
    pub ebit_margin_start: Rate,
    pub ebit_margin_end: Rate,
    #[serde(default)]
    pub margin_trajectory: MarginTrajectory,
    pub capex_pct_revenue: Rate,
    /// Applied to the year-over-year revenue change, not to revenue.
    pub nwc_pct_delta_revenue: Rate,
    #[serde(default)]
    pub sbc_pct_revenue: Rate,
    pub da_pct_revenue: Rate,
    /// Accelerating turnaround phase, exempt from mean reversion.
    #[serde(default)]
    pub turnaround: bool,
}

impl Stage {
    /// A stage covering `duration` years from `start_year` with every rate at zero.
    pub fn spanning(stage_number: u32, name: impl Into<String>, start_year: u32, duration: u32) -> Self {
        Stage {
            stage_number,
            name: name.into(),
            start_year,
            end_year: (start_year + duration).saturating_sub(1),
            duration,
            revenue_growth_start: Decimal::ZERO,
            revenue_growth_end: Decimal::ZERO,
            growth_decline_type: GrowthDecline::Linear,
            ebit_margin_start: Decimal::ZERO,
            ebit_margin_end: Decimal::ZERO,
            margin_trajectory: MarginTrajectory::Stable,
            capex_pct_revenue: Decimal::ZERO,
            nwc_pct_delta_revenue: Decimal::ZERO,
            sbc_pct_revenue: Decimal::ZERO,
            da_pct_revenue: Decimal::ZERO,
            turnaround: false,
        }
    }

    pub fn with_growth(mut self, start: Rate, end: Rate) -> Self {
        self.revenue_growth_start = start;
        self.revenue_growth_end = end;
        self
    }

    pub fn with_decline(mut self, decline: GrowthDecline) -> Self {
        self.growth_decline_type = decline;
        self
    }

    /// Sets the margin bounds and the matching trajectory tag.
    pub fn with_margins(mut self, start: Rate, end: Rate) -> Self {
        self.ebit_margin_start = start;
        self.ebit_margin_end = end;
        self.margin_trajectory = MarginTrajectory::classify(start, end);
        self
    }

    pub fn with_costs(mut self, capex_pct: Rate, nwc_pct_delta: Rate, da_pct: Rate) -> Self {
        self.capex_pct_revenue = capex_pct;
        self.nwc_pct_delta_revenue = nwc_pct_delta;
        self.da_pct_revenue = da_pct;
        self
    }

    pub fn with_sbc(mut self, sbc_pct: Rate) -> Self {
        self.sbc_pct_revenue = sbc_pct;
        self
    }

    pub fn as_turnaround(mut self) -> Self {
        self.turnaround = true;
        self
    }

    pub fn contains_year(&self, year: u32) -> bool {
        year >= self.start_year && year <= self.end_year
    }

    /// Stage-local progress in [0, 1]: (t - start) / max(duration - 1, 1).
    pub fn progress(&self, year: u32) -> Rate {
        let elapsed = Decimal::from(year.saturating_sub(self.start_year));
        let span = Decimal::from(self.duration.saturating_sub(1).max(1));
        (elapsed / span).clamp(Decimal::ZERO, Decimal::ONE)
    }

    /// Interpolated revenue growth for a year owned by this stage.
    pub fn growth_at(&self, year: u32) -> Rate {
        interpolate(
            self.growth_decline_type,
            self.revenue_growth_start,
            self.revenue_growth_end,
            self.progress(year),
        )
    }

    /// Interpolated EBIT margin. Margins always move linearly.
    pub fn margin_at(&self, year: u32) -> Rate {
        interpolate(
            GrowthDecline::Linear,
            self.ebit_margin_start,
            self.ebit_margin_end,
            self.progress(year),
        )
    }

    /// Growth ends above where it started.
    pub fn is_accelerating(&self) -> bool {
        self.revenue_growth_end > self.revenue_growth_start
    }
}

/// Interpolate between two bounds at progress `p`.
///
/// The bounds are returned exactly at p = 0 and p = 1 so adjacent stages that
/// share a boundary value stay continuous. Exponential interpolation is
/// undefined when the ratio end/start is not positive (including start = 0);
/// those cases fall back to linear.
pub fn interpolate(kind: GrowthDecline, start: Rate, end: Rate, p: Rate) -> Rate {
    if p <= Decimal::ZERO {
        return start;
    }
    if p >= Decimal::ONE {
        return end;
    }
    match kind {
        GrowthDecline::Linear => linear(start, end, p),
        GrowthDecline::Exponential => {
            if start.is_zero() {
                return linear(start, end, p);
            }
            let ratio = end / start;
            if ratio <= Decimal::ZERO {
                return linear(start, end, p);
            }
            match ratio.checked_powd(p) {
                Some(factor) => start * factor,
                None => linear(start, end, p),
            }
        }
    }
}

fn linear(start: Rate, end: Rate, p: Rate) -> Rate {
    start + (end - start) * p
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_stage() -> Stage {
        Stage::spanning(1, "High Growth", 1, 5)
            .with_growth(dec!(0.40), dec!(0.20))
            .with_margins(dec!(0.10), dec!(0.20))
    }

    #[test]
    fn test_spanning_sets_end_year() {
        let s = Stage::spanning(2, "Transition", 6, 4);
        assert_eq!(s.end_year, 9);
        assert_eq!(s.duration, 4);
        assert!(s.contains_year(6));
        assert!(s.contains_year(9));
        assert!(!s.contains_year(10));
    }

    #[test]
    fn test_progress_endpoints() {
        let s = sample_stage();
        assert_eq!(s.progress(1), Decimal::ZERO);
        assert_eq!(s.progress(3), dec!(0.5));
        assert_eq!(s.progress(5), Decimal::ONE);
    }

    #[test]
    fn test_single_year_stage_progress_is_zero() {
        let s = Stage::spanning(1, "One", 1, 1).with_growth(dec!(0.10), dec!(0.05));
        assert_eq!(s.progress(1), Decimal::ZERO);
        assert_eq!(s.growth_at(1), dec!(0.10));
    }

    #[test]
    fn test_linear_growth_midpoint() {
        let s = sample_stage();
        assert_eq!(s.growth_at(3), dec!(0.30));
        assert_eq!(s.growth_at(5), dec!(0.20));
    }

    #[test]
    fn test_exponential_growth_midpoint_is_geometric_mean() {
        let s = sample_stage().with_decline(GrowthDecline::Exponential);
        let mid = s.growth_at(3);
        // sqrt(0.40 * 0.20) = 0.28284...
        assert!((mid - dec!(0.2828427)).abs() < dec!(0.00001), "got {mid}");
        assert_eq!(s.growth_at(1), dec!(0.40));
        assert_eq!(s.growth_at(5), dec!(0.20));
    }

    #[test]
    fn test_exponential_zero_start_falls_back_to_linear() {
        let v = interpolate(GrowthDecline::Exponential, Decimal::ZERO, dec!(0.10), dec!(0.5));
        assert_eq!(v, dec!(0.05));
    }

    #[test]
    fn test_exponential_sign_change_falls_back_to_linear() {
        let v = interpolate(GrowthDecline::Exponential, dec!(-0.04), dec!(0.04), dec!(0.5));
        assert_eq!(v, Decimal::ZERO);
    }

    #[test]
    fn test_margin_always_linear() {
        let s = sample_stage().with_decline(GrowthDecline::Exponential);
        assert_eq!(s.margin_at(3), dec!(0.15));
    }

    #[test]
    fn test_with_margins_classifies_trajectory() {
        assert_eq!(sample_stage().margin_trajectory, MarginTrajectory::Expanding);
        let s = sample_stage().with_margins(dec!(0.2), dec!(0.2));
        assert_eq!(s.margin_trajectory, MarginTrajectory::Stable);
        let s = sample_stage().with_margins(dec!(0.2), dec!(0.1));
        assert_eq!(s.margin_trajectory, MarginTrajectory::Contracting);
    }

    #[test]
    fn test_serde_defaults_for_optional_tags() {
        let json = r#"{
            "stage_number": 1, "name": "Mature", "start_year": 1, "end_year": 10,
            "duration": 10, "revenue_growth_start": "0.06", "revenue_growth_end": "0.03",
            "ebit_margin_start": "0.2", "ebit_margin_end": "0.2",
            "capex_pct_revenue": "0.04", "nwc_pct_delta_revenue": "0.1",
            "da_pct_revenue": "0.03"
        }"#;
        let s: Stage = serde_json::from_str(json).unwrap();
        assert_eq!(s.growth_decline_type, GrowthDecline::Linear);
        assert_eq!(s.margin_trajectory, MarginTrajectory::Stable);
        assert!(!s.turnaround);
        assert_eq!(s.sbc_pct_revenue, Decimal::ZERO);
    }
}
