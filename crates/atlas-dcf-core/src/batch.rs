//! Independent valuations of many companies in parallel.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::{with_metadata, ComputationOutput};
use crate::valuation::multi_stage::evaluate_multi_stage;
use crate::valuation::{MultiStageDcfInput, MultiStageDcfOutput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub ticker: String,
    pub input: MultiStageDcfInput,
}

/// One item's outcome. A failing item carries its violations instead of a
/// valuation and does not fail the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valuation: Option<MultiStageDcfOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl BatchItemResult {
    pub fn is_ok(&self) -> bool {
        self.valuation.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// Same order as the input items.
    pub results: Vec<BatchItemResult>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Value every item in parallel.
pub fn value_portfolio(items: &[BatchItem]) -> ComputationOutput<BatchOutput> {
    let start = Instant::now();

    let results: Vec<BatchItemResult> = items
        .par_iter()
        .map(|item| {
            let _span = tracing::debug_span!("batch_item", ticker = %item.ticker).entered();
            match evaluate_multi_stage(&item.input) {
                Ok((valuation, warnings)) => BatchItemResult {
                    ticker: item.ticker.clone(),
                    valuation: Some(valuation),
                    warnings,
                    errors: Vec::new(),
                },
                Err(e) => {
                    tracing::warn!(ticker = %item.ticker, error = %e, "batch item failed");
                    BatchItemResult {
                        ticker: item.ticker.clone(),
                        valuation: None,
                        warnings: Vec::new(),
                        errors: e.violations(),
                    }
                }
            }
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let failed = results.len() - succeeded;
    let warnings = if failed > 0 {
        vec![format!("{failed} of {} items failed", results.len())]
    } else {
        Vec::new()
    };

    with_metadata(
        "Batch multi-stage DCF (parallel, independent runs)",
        &serde_json::json!({
            "items": items.len(),
            "tickers": items.iter().map(|i| &i.ticker).collect::<Vec<_>>(),
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        BatchOutput {
            results,
            succeeded,
            failed,
        },
    )
}
