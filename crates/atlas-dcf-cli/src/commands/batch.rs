use clap::Args;
use serde_json::Value;

use atlas_dcf_core::batch::{value_portfolio, BatchItem};

use crate::input;

/// Arguments for valuing several companies in one run
#[derive(Args)]
pub struct BatchArgs {
    /// Path to JSON/YAML file holding an array of `{ticker, input}` items
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_batch(args: BatchArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let items: Vec<BatchItem> = input::read_required(args.input.as_deref(), "batch valuation")?;
    if items.is_empty() {
        return Err("batch input contains no items".into());
    }
    let result = value_portfolio(&items);
    if result.result.failed > 0 {
        tracing::warn!(
            failed = result.result.failed,
            succeeded = result.result.succeeded,
            "some batch items failed"
        );
    }
    Ok(serde_json::to_value(result)?)
}
