use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Non-fatal data-quality findings attached to a successful result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// SBC came from the industry-average tier rather than filings.
    LowConfidenceSbcEstimate { sector: String, estimate: Rate },
    /// PV of terminal value exceeds the reliance threshold.
    TerminalValueDominant { terminal_pct: Rate },
    /// EBIT margin jumps across a stage boundary.
    MarginDiscontinuity {
        boundary_year: u32,
        margin_before: Rate,
        margin_after: Rate,
    },
    /// Final explicit-year FCFF is not positive, so the terminal value is too.
    NegativeTerminalCashFlow { final_fcff: Money },
    /// Normalization target sits above the starting SBC level.
    SbcAboveTarget { starting: Rate, target: Rate },
    /// The SBC-free baseline is not positive; percentage impact is reported as zero.
    ImpactBaselineNotPositive { enterprise_value: Money },
    /// Monte Carlo paths rejected by configuration validation.
    SimulationPathsSkipped { skipped: u32, total: u32 },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::LowConfidenceSbcEstimate { sector, estimate } => write!(
                f,
                "SBC not found in filings; using low-confidence industry estimate of {:.1}% of revenue for sector '{sector}'",
                estimate * dec!(100)
            ),
            DataQualityWarning::TerminalValueDominant { terminal_pct } => write!(
                f,
                "Terminal value represents {:.1}% of enterprise value; valuation relies heavily on growth beyond the explicit forecast",
                terminal_pct * dec!(100)
            ),
            DataQualityWarning::MarginDiscontinuity {
                boundary_year,
                margin_before,
                margin_after,
            } => write!(
                f,
                "EBIT margin jumps from {:.2}% to {:.2}% at year {boundary_year}",
                margin_before * dec!(100),
                margin_after * dec!(100)
            ),
            DataQualityWarning::NegativeTerminalCashFlow { final_fcff } => write!(
                f,
                "Final-year FCFF is {final_fcff}; terminal value is not positive"
            ),
            DataQualityWarning::SbcAboveTarget { starting, target } => write!(
                f,
                "SBC normalization target ({target}) is above the starting level ({starting}); SBC will rise over the forecast"
            ),
            DataQualityWarning::ImpactBaselineNotPositive { enterprise_value } => write!(
                f,
                "Enterprise value without SBC is {enterprise_value}; percentage impact reported as zero"
            ),
            DataQualityWarning::SimulationPathsSkipped { skipped, total } => write!(
                f,
                "{skipped} of {total} simulation paths skipped (invalid sampled configuration)"
            ),
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    with_precision(methodology, assumptions, warnings, elapsed_us, "rust_decimal_128bit", result)
}

/// Same envelope with an explicit precision tag (the Monte Carlo path samples in f64).
pub fn with_precision<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    precision: &str,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: precision.to_string(),
        },
    }
}

/// Log each warning and render it for the output envelope.
pub(crate) fn render_warnings(warnings: &[DataQualityWarning]) -> Vec<String> {
    warnings
        .iter()
        .map(|w| {
            tracing::warn!(warning = %w, "data quality");
            w.to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display_formats_percentages() {
        let w = DataQualityWarning::TerminalValueDominant {
            terminal_pct: dec!(0.8),
        };
        assert!(w.to_string().starts_with("Terminal value represents 80.0%"));

        let w = DataQualityWarning::LowConfidenceSbcEstimate {
            sector: "Technology".into(),
            estimate: dec!(0.08),
        };
        assert!(w.to_string().contains("8.0%"));
    }

    #[test]
    fn test_with_metadata_envelope() {
        let out = with_metadata("test", &serde_json::json!({"a": 1}), vec![], 5, 42u32);
        assert_eq!(out.result, 42);
        assert_eq!(out.metadata.precision, "rust_decimal_128bit");
        assert_eq!(out.assumptions["a"], 1);
    }
}
