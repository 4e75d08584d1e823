use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use atlas_dcf_core::projection::{apply_override, project_with_sbc, Projection, YearOverride};
use atlas_dcf_core::sbc::SbcForecastConfig;
use atlas_dcf_core::stages::{get_template, MultiStageDcfConfig};

use crate::input;

/// Arguments for the revenue-to-FCFF projection
#[derive(Args)]
pub struct ProjectArgs {
    /// Path to a JSON/YAML file with `config` and optional `sbc_forecast`
    #[arg(long)]
    pub input: Option<String>,

    /// Start from a named template instead of an input file
    #[arg(long, conflicts_with = "input")]
    pub template: Option<String>,

    /// Base revenue (with --template)
    #[arg(long)]
    pub base_revenue: Option<Decimal>,

    /// Project without any SBC deduction
    #[arg(long)]
    pub no_sbc: bool,
}

/// Arguments for re-projecting with per-year overrides
#[derive(Args)]
pub struct OverrideArgs {
    /// Path to a JSON/YAML file with `config`, optional `sbc_forecast` and `overrides`
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectInput {
    config: MultiStageDcfConfig,
    #[serde(default)]
    sbc_forecast: Option<SbcForecastConfig>,
    #[serde(default = "default_true")]
    include_sbc: bool,
}

#[derive(Debug, Deserialize)]
struct OverrideInput {
    #[serde(flatten)]
    projection: ProjectInput,
    overrides: Vec<YearOverride>,
}

fn default_true() -> bool {
    true
}

fn project(input: &ProjectInput) -> Result<Projection, Box<dyn std::error::Error>> {
    Ok(project_with_sbc(
        &input.config,
        input.include_sbc,
        input.sbc_forecast.as_ref(),
    )?)
}

fn rendered_warnings(projection: &Projection) -> Vec<String> {
    projection.warnings.iter().map(|w| w.to_string()).collect()
}

pub fn run_project(args: ProjectArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut project_input: ProjectInput = match args.template {
        Some(ref name) => ProjectInput {
            config: get_template(name)?,
            sbc_forecast: None,
            include_sbc: true,
        },
        None => input::read_required(args.input.as_deref(), "projection")?,
    };
    if let Some(revenue) = args.base_revenue {
        project_input.config.base_revenue = revenue;
    }
    if args.no_sbc {
        project_input.include_sbc = false;
    }

    let projection = project(&project_input)?;
    tracing::debug!(rows = projection.rows.len(), "projection complete");
    Ok(json!({
        "result": {
            "projections": projection.rows,
            "sbc_forecast": projection.sbc_forecast,
        },
        "warnings": rendered_warnings(&projection),
    }))
}

pub fn run_override(args: OverrideArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let override_input: OverrideInput = input::read_required(args.input.as_deref(), "override")?;
    let projection = project(&override_input.projection)?;

    let mut rows = projection.rows.clone();
    for ov in &override_input.overrides {
        rows = apply_override(&override_input.projection.config, &rows, ov)?;
    }

    Ok(json!({
        "result": {
            "projections": rows,
            "overrides_applied": override_input.overrides.len(),
        },
        "warnings": rendered_warnings(&projection),
    }))
}
