//! Tiered SBC detection: cash-flow statement, then income statement, then an
//! industry-average estimate. Detection always yields a usable ratio.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::types::{render_warnings, with_metadata, ComputationOutput, DataQualityWarning, Money, Rate};

/// Change in SBC % of revenue (first to last observation) treated as a trend.
const TREND_THRESHOLD: Rate = dec!(0.01);
/// Cash-flow observations needed for a high-confidence detection.
const HIGH_CONFIDENCE_YEARS: u32 = 3;

/// Historical SBC line items keyed by fiscal year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SbcHistory {
    #[serde(default)]
    pub cash_flow_statement: BTreeMap<i32, Money>,
    #[serde(default)]
    pub income_statement: BTreeMap<i32, Money>,
}

/// Materialized historical inputs supplied by the market-data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalFinancials {
    pub revenue_history: BTreeMap<i32, Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbc_history: Option<SbcHistory>,
    pub current_price: Money,
    pub shares_outstanding: Decimal,
    #[serde(default)]
    pub sector: String,
}

impl HistoricalFinancials {
    /// Most recent fiscal year's revenue.
    pub fn latest_revenue(&self) -> Option<Money> {
        self.revenue_history.values().next_back().copied()
    }

    /// Year-over-year growth of the two most recent revenue observations.
    pub fn latest_revenue_growth(&self) -> Option<Rate> {
        let mut recent = self.revenue_history.values().rev();
        let last = *recent.next()?;
        let prev = *recent.next()?;
        if prev <= Decimal::ZERO {
            return None;
        }
        Some(last / prev - Decimal::ONE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SbcDetectionMethod {
    CashFlowStatement,
    IncomeStatement,
    IndustryEstimate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionConfidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SbcTrend {
    Increasing,
    Decreasing,
    Stable,
    /// Fewer than two observations.
    Unknown,
}

/// SBC relative to revenue for one fiscal year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbcObservation {
    pub fiscal_year: i32,
    pub revenue: Money,
    pub sbc_amount: Money,
    pub sbc_pct_revenue: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbcDetection {
    pub method: SbcDetectionMethod,
    pub confidence: DetectionConfidence,
    /// Latest observed ratio (or the industry estimate); the forecast start.
    pub sbc_pct_revenue: Rate,
    pub average_sbc_pct_revenue: Rate,
    pub trend: SbcTrend,
    pub years_observed: u32,
    pub observations: Vec<SbcObservation>,
}

/// Industry-average SBC % of revenue used when filings carry no SBC line.
pub fn industry_sbc_estimate(sector: &str) -> Rate {
    let sector = sector.to_ascii_lowercase();
    if sector.contains("tech") {
        dec!(0.08)
    } else if sector.contains("communication") {
        dec!(0.10)
    } else {
        dec!(0.02)
    }
}

/// Detect historical SBC as a share of revenue. Never fails: missing filings
/// degrade to the industry estimate with a low-confidence warning.
pub fn detect_sbc(financials: &HistoricalFinancials) -> ComputationOutput<SbcDetection> {
    let start = Instant::now();
    let mut warnings = Vec::new();
    let history = financials.sbc_history.clone().unwrap_or_default();

    let cash_flow = observations(&financials.revenue_history, &history.cash_flow_statement);
    let income = observations(&financials.revenue_history, &history.income_statement);

    let detection = if !cash_flow.is_empty() {
        let confidence = if cash_flow.len() as u32 >= HIGH_CONFIDENCE_YEARS {
            DetectionConfidence::High
        } else {
            DetectionConfidence::Medium
        };
        from_observations(SbcDetectionMethod::CashFlowStatement, confidence, cash_flow)
    } else if !income.is_empty() {
        from_observations(SbcDetectionMethod::IncomeStatement, DetectionConfidence::Medium, income)
    } else {
        let estimate = industry_sbc_estimate(&financials.sector);
        warnings.push(DataQualityWarning::LowConfidenceSbcEstimate {
            sector: financials.sector.clone(),
            estimate,
        });
        SbcDetection {
            method: SbcDetectionMethod::IndustryEstimate,
            confidence: DetectionConfidence::Low,
            sbc_pct_revenue: estimate,
            average_sbc_pct_revenue: estimate,
            trend: SbcTrend::Unknown,
            years_observed: 0,
            observations: Vec::new(),
        }
    };

    tracing::debug!(method = ?detection.method, pct = %detection.sbc_pct_revenue, "sbc detected");
    let elapsed = start.elapsed().as_micros() as u64;
    with_metadata(
        "Tiered SBC detection (cash flow, income statement, industry estimate)",
        &serde_json::json!({
            "sector": financials.sector,
            "revenue_years": financials.revenue_history.len(),
        }),
        render_warnings(&warnings),
        elapsed,
        detection,
    )
}

fn observations(revenue: &BTreeMap<i32, Money>, sbc: &BTreeMap<i32, Money>) -> Vec<SbcObservation> {
    sbc.iter()
        .filter_map(|(year, amount)| {
            let rev = *revenue.get(year)?;
            if rev <= Decimal::ZERO {
                return None;
            }
            // Cash-flow statements report the add-back with either sign.
            let amount = amount.abs();
            Some(SbcObservation {
                fiscal_year: *year,
                revenue: rev,
                sbc_amount: amount,
                sbc_pct_revenue: amount / rev,
            })
        })
        .collect()
}

fn from_observations(
    method: SbcDetectionMethod,
    confidence: DetectionConfidence,
    observations: Vec<SbcObservation>,
) -> SbcDetection {
    let n = Decimal::from(observations.len() as u64);
    let average = observations.iter().map(|o| o.sbc_pct_revenue).sum::<Decimal>() / n;
    let first = observations.first().map(|o| o.sbc_pct_revenue).unwrap_or_default();
    let latest = observations.last().map(|o| o.sbc_pct_revenue).unwrap_or_default();

    let trend = if observations.len() < 2 {
        SbcTrend::Unknown
    } else if latest - first > TREND_THRESHOLD {
        SbcTrend::Increasing
    } else if first - latest > TREND_THRESHOLD {
        SbcTrend::Decreasing
    } else {
        SbcTrend::Stable
    };

    SbcDetection {
        method,
        confidence,
        sbc_pct_revenue: latest,
        average_sbc_pct_revenue: average,
        trend,
        years_observed: observations.len() as u32,
        observations,
    }
}
