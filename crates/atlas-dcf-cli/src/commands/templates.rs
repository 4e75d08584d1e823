use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use atlas_dcf_core::stages::{get_template, recommend_template, TemplateKind};

/// Arguments for printing a template configuration
#[derive(Args)]
pub struct TemplateArgs {
    /// Template name: hypergrowth_tech, growth_company, mature_company, turnaround.
    /// Lists every template when omitted.
    pub name: Option<String>,

    /// Replace the template's base revenue
    #[arg(long)]
    pub base_revenue: Option<Decimal>,

    /// Replace the template's WACC
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Replace the template's terminal growth rate
    #[arg(long)]
    pub terminal_growth: Option<Decimal>,
}

/// Arguments for template recommendation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct RecommendArgs {
    /// Most recent annual revenue growth (e.g. 0.42 for 42%)
    #[arg(long)]
    pub growth: Decimal,

    /// EBIT margin history, oldest first, comma separated
    #[arg(long, value_delimiter = ',')]
    pub margins: Vec<Decimal>,

    /// Latest annual revenue
    #[arg(long)]
    pub revenue: Decimal,
}

pub fn run_template(args: TemplateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let Some(name) = args.name else {
        let templates: Vec<Value> = TemplateKind::ALL
            .iter()
            .map(|kind| {
                let config = kind.config();
                json!({
                    "name": kind,
                    "display_name": kind.display_name(),
                    "model_type": config.model_type,
                    "stages": config.stages.len(),
                    "total_duration": config.total_duration(),
                })
            })
            .collect();
        return Ok(json!({ "templates": templates }));
    };

    let mut config = get_template(&name)?;
    if let Some(revenue) = args.base_revenue {
        config.base_revenue = revenue;
    }
    if let Some(wacc) = args.wacc {
        config.wacc = wacc;
    }
    if let Some(g) = args.terminal_growth {
        config.terminal_growth_rate = g;
    }
    // Overrides go through the same validation as any hand-written config.
    let warnings: Vec<String> = config.validate()?.iter().map(|w| w.to_string()).collect();

    Ok(json!({ "result": config, "warnings": warnings }))
}

pub fn run_recommend(args: RecommendArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let recommendation = recommend_template(args.growth, &args.margins, args.revenue);
    Ok(json!({
        "result": {
            "template": recommendation.template,
            "display_name": recommendation.template.display_name(),
            "rationale": recommendation.rationale,
        }
    }))
}
