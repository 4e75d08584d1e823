use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use atlas_dcf_core::projection::project_with_sbc;
use atlas_dcf_core::stages::get_template;
use atlas_dcf_core::valuation::{
    analyze_sbc_impact, calculate_wacc, run_multi_stage_dcf, MultiStageDcfInput, SbcImpactInput,
    WaccInput,
};

use crate::input;

/// Arguments for WACC calculation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct WaccArgs {
    /// Risk-free rate (e.g. 0.042 for 4.2%)
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,

    /// Equity risk premium (e.g. 0.055 for 5.5%)
    #[arg(long, alias = "erp")]
    pub equity_risk_premium: Option<Decimal>,

    /// Levered beta
    #[arg(long)]
    pub beta: Option<Decimal>,

    /// Pre-tax cost of debt
    #[arg(long)]
    pub cost_of_debt: Option<Decimal>,

    /// Marginal corporate tax rate
    #[arg(long)]
    pub tax_rate: Option<Decimal>,

    /// Debt weight in capital structure (market value basis)
    #[arg(long)]
    pub debt_weight: Option<Decimal>,

    /// Equity weight in capital structure (market value basis)
    #[arg(long)]
    pub equity_weight: Option<Decimal>,

    /// Size premium
    #[arg(long)]
    pub size_premium: Option<Decimal>,

    /// Country risk premium
    #[arg(long)]
    pub country_risk: Option<Decimal>,

    /// Company-specific risk premium
    #[arg(long)]
    pub specific_risk: Option<Decimal>,

    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the multi-stage DCF
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct DcfArgs {
    /// Path to JSON/YAML input file with the full valuation request
    #[arg(long)]
    pub input: Option<String>,

    /// Start from a named template instead of an input file
    #[arg(long, conflicts_with = "input")]
    pub template: Option<String>,

    /// Diluted shares outstanding (with --template)
    #[arg(long)]
    pub shares: Option<Decimal>,

    /// Base revenue for the projection
    #[arg(long)]
    pub base_revenue: Option<Decimal>,

    /// Discount rate (WACC)
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Terminal growth rate
    #[arg(long)]
    pub terminal_growth: Option<Decimal>,

    /// Current share price, for implied upside
    #[arg(long)]
    pub price: Option<Decimal>,

    /// Discount explicit flows at mid-year
    #[arg(long)]
    pub mid_year: bool,

    /// Value without deducting SBC
    #[arg(long)]
    pub no_sbc: bool,
}

/// Arguments for the with/without SBC comparison
#[derive(Args)]
pub struct SbcImpactArgs {
    /// Path to JSON/YAML input file with the full valuation request
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_wacc(args: WaccArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let wacc_input: WaccInput = match input::read_optional(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => WaccInput {
            risk_free_rate: args
                .risk_free_rate
                .ok_or("--risk-free-rate is required (or provide --input)")?,
            equity_risk_premium: args
                .equity_risk_premium
                .ok_or("--equity-risk-premium is required (or provide --input)")?,
            beta: args.beta.unwrap_or(dec!(1.0)),
            cost_of_debt: args
                .cost_of_debt
                .ok_or("--cost-of-debt is required (or provide --input)")?,
            tax_rate: args
                .tax_rate
                .ok_or("--tax-rate is required (or provide --input)")?,
            debt_weight: args
                .debt_weight
                .ok_or("--debt-weight is required (or provide --input)")?,
            equity_weight: args
                .equity_weight
                .ok_or("--equity-weight is required (or provide --input)")?,
            size_premium: args.size_premium,
            country_risk_premium: args.country_risk,
            specific_risk_premium: args.specific_risk,
        },
    };
    let result = calculate_wacc(&wacc_input)?;
    Ok(serde_json::to_value(result)?)
}

fn dcf_input_from_args(args: &DcfArgs) -> Result<MultiStageDcfInput, Box<dyn std::error::Error>> {
    let mut dcf_input = match args.template {
        Some(ref name) => {
            let shares = args
                .shares
                .ok_or("--shares is required with --template")?;
            MultiStageDcfInput::new(get_template(name)?, shares)
        }
        None => input::read_required(args.input.as_deref(), "DCF valuation")?,
    };

    if let Some(revenue) = args.base_revenue {
        dcf_input.config.base_revenue = revenue;
    }
    if let Some(wacc) = args.wacc {
        dcf_input.config.wacc = wacc;
        dcf_input.wacc_input = None;
    }
    if let Some(g) = args.terminal_growth {
        dcf_input.config.terminal_growth_rate = g;
    }
    if let Some(shares) = args.shares {
        dcf_input.shares_outstanding = shares;
    }
    if args.price.is_some() {
        dcf_input.current_price = args.price;
    }
    if args.mid_year {
        dcf_input.mid_year_convention = true;
    }
    if args.no_sbc {
        dcf_input.include_sbc = false;
    }
    Ok(dcf_input)
}

pub fn run_dcf(args: DcfArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let dcf_input = dcf_input_from_args(&args)?;
    let result = run_multi_stage_dcf(&dcf_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_sbc_impact(args: SbcImpactArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let dcf_input: MultiStageDcfInput = input::read_required(args.input.as_deref(), "SBC impact")?;

    let mut config = dcf_input.config.clone();
    if let Some(ref wacc_input) = dcf_input.wacc_input {
        config.wacc = calculate_wacc(wacc_input)?.result.wacc;
    }
    let projection = project_with_sbc(&config, true, dcf_input.sbc_forecast.as_ref())?;

    let impact_input = SbcImpactInput {
        projections: projection.rows,
        wacc: config.wacc,
        terminal_growth_rate: config.terminal_growth_rate,
        shares_outstanding: dcf_input.shares_outstanding,
        mid_year_convention: dcf_input.mid_year_convention,
    };
    let result = analyze_sbc_impact(&impact_input)?;
    Ok(serde_json::to_value(result)?)
}
