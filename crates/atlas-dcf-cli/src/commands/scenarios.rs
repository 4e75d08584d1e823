use clap::Args;
use serde_json::Value;

use atlas_dcf_core::monte_carlo::{run_monte_carlo_dcf, McDcfInput};
use atlas_dcf_core::scenarios::{wacc_terminal_sensitivity, WaccTerminalSensitivityInput};

use crate::input;

/// Arguments for the WACC x terminal growth grid
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to JSON/YAML file with `base`, `wacc_range` and `terminal_growth_range`
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for Monte Carlo DCF valuation
#[derive(Args)]
pub struct MonteCarloArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Number of paths (overrides the input file)
    #[arg(long)]
    pub simulations: Option<u32>,

    /// RNG seed for reproducible runs (overrides the input file)
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let sens_input: WaccTerminalSensitivityInput =
        input::read_required(args.input.as_deref(), "sensitivity analysis")?;
    let result = wacc_terminal_sensitivity(&sens_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_monte_carlo(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut mc_input: McDcfInput = input::read_required(args.input.as_deref(), "Monte Carlo DCF")?;
    if let Some(n) = args.simulations {
        mc_input.num_simulations = n;
    }
    if args.seed.is_some() {
        mc_input.seed = args.seed;
    }
    tracing::debug!(paths = mc_input.num_simulations, seed = ?mc_input.seed, "starting simulation");
    let result = run_monte_carlo_dcf(&mc_input)?;
    Ok(serde_json::to_value(result)?)
}
